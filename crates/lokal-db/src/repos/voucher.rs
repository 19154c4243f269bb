use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use lokal_common::models::voucher::{Voucher, VoucherReason};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VoucherRow {
    pub code: String,
    pub user_id: Uuid,
    pub reason: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub redeemed_by: Option<Uuid>,
}

impl TryFrom<VoucherRow> for Voucher {
    type Error = anyhow::Error;

    fn try_from(row: VoucherRow) -> Result<Self> {
        let reason = row
            .reason
            .parse::<VoucherReason>()
            .with_context(|| format!("Invalid reason stored for voucher {}", row.code))?;
        Ok(Voucher {
            code: row.code,
            user_id: row.user_id,
            reason,
            description: row.description,
            created_at: row.created_at,
            expires_at: row.expires_at,
            used: row.used,
            used_at: row.used_at,
            redeemed_by: row.redeemed_by,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewVoucherRow {
    pub code: String,
    pub user_id: Uuid,
    pub reason: VoucherReason,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Calendar year a birthday voucher is for; at most one per user and year
    pub birthday_year: Option<i32>,
}

const VOUCHER_COLUMNS: &str =
    "code, user_id, reason, description, created_at, expires_at, used, used_at, redeemed_by";

pub struct VoucherRepo;

impl VoucherRepo {
    /// Insert an unused voucher.
    ///
    /// Returns `None` when a uniqueness rule rejects the row: either the code
    /// is taken or the user already holds a birthday voucher for
    /// `birthday_year`. The caller tells the two apart with
    /// [`VoucherRepo::birthday_issued_for_year`].
    pub async fn insert(pool: &PgPool, voucher: &NewVoucherRow) -> Result<Option<VoucherRow>> {
        let row = sqlx::query_as::<_, VoucherRow>(&format!(
            "INSERT INTO voucher (code, user_id, reason, description, expires_at, birthday_year) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT DO NOTHING \
             RETURNING {}",
            VOUCHER_COLUMNS
        ))
        .bind(&voucher.code)
        .bind(voucher.user_id)
        .bind(voucher.reason.as_str())
        .bind(&voucher.description)
        .bind(voucher.expires_at)
        .bind(voucher.birthday_year)
        .fetch_optional(pool)
        .await
        .context("Failed to insert voucher")?;
        Ok(row)
    }

    pub async fn get_by_code(pool: &PgPool, code: &str) -> Result<Option<VoucherRow>> {
        let row = sqlx::query_as::<_, VoucherRow>(&format!(
            "SELECT {} FROM voucher WHERE code = $1",
            VOUCHER_COLUMNS
        ))
        .bind(code)
        .fetch_optional(pool)
        .await
        .context("Failed to get voucher by code")?;
        Ok(row)
    }

    /// Atomically flip `used` for a voucher that is still unused and not
    /// expired at `now`.
    ///
    /// Returns the updated row, or `None` if the predicate did not match
    /// (unknown code, already used, or expired). Concurrent callers for the
    /// same code are serialized by the row lock, so at most one gets `Some`.
    pub async fn mark_used(
        pool: &PgPool,
        code: &str,
        redeemed_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<VoucherRow>> {
        let row = sqlx::query_as::<_, VoucherRow>(&format!(
            "UPDATE voucher SET used = TRUE, used_at = $2, redeemed_by = $3 \
             WHERE code = $1 AND used = FALSE AND (expires_at IS NULL OR expires_at >= $2) \
             RETURNING {}",
            VOUCHER_COLUMNS
        ))
        .bind(code)
        .bind(now)
        .bind(redeemed_by)
        .fetch_optional(pool)
        .await
        .context("Failed to mark voucher used")?;
        Ok(row)
    }

    pub async fn list_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<VoucherRow>> {
        let rows = sqlx::query_as::<_, VoucherRow>(&format!(
            "SELECT {} FROM voucher WHERE user_id = $1 ORDER BY created_at DESC",
            VOUCHER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list vouchers for user")?;
        Ok(rows)
    }

    /// Whether the user already holds the birthday voucher for `year`
    pub async fn birthday_issued_for_year(pool: &PgPool, user_id: Uuid, year: i32) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM voucher WHERE user_id = $1 AND reason = 'birthday' AND birthday_year = $2)",
        )
        .bind(user_id)
        .bind(year)
        .fetch_one(pool)
        .await
        .context("Failed to check birthday vouchers")?;
        Ok(exists)
    }
}

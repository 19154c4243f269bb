//! Voucher lifecycle: issuance, redemption and the birthday sweep.
//!
//! A voucher is created `unused` and moves to `used` exactly once. The
//! transition is a single conditional UPDATE in the store; nothing here reads
//! the flag and writes it back separately.

use crate::config::VoucherConfig;
use crate::error::{store_failure, VoucherError};
use crate::notify::{Notification, Notifier, Recipient};
use crate::profiles::require_admin;
use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use lokal_common::birthday::celebrated_dates;
use lokal_common::models::auth::Identity;
use lokal_common::models::profile::Profile;
use lokal_common::models::voucher::{
    code_from_bytes, normalize_code, RedeemRejection, Voucher, VoucherReason, VoucherStatus,
    CODE_SUFFIX_LEN,
};
use lokal_db::{NewVoucherRow, ProfileRepo, VoucherRepo};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// How many fresh codes issuance tries before giving up on collisions
pub const MAX_CODE_ATTEMPTS: usize = 5;

/// Longest validity, in days, a voucher can be issued with
pub const MAX_VALID_DAYS: i64 = 3650;

/// Validity window for `days`, which must lie in `1..=MAX_VALID_DAYS`.
pub fn validity_from_days(days: i64) -> Result<Duration, VoucherError> {
    if !(1..=MAX_VALID_DAYS).contains(&days) {
        return Err(VoucherError::InvalidRequest(format!(
            "Validity must be between 1 and {} days",
            MAX_VALID_DAYS
        )));
    }
    Duration::try_days(days).ok_or_else(|| {
        VoucherError::InvalidRequest(format!("Validity of {} days is out of range", days))
    })
}

/// Generate a random code for `reason`, e.g. `LOKAL-GIFT-7KQ2ZX`
pub fn generate_code(reason: VoucherReason) -> String {
    let mut bytes = [0u8; CODE_SUFFIX_LEN];
    OsRng.fill_bytes(&mut bytes);
    code_from_bytes(reason, &bytes)
}

/// Parameters for issuing a voucher to a profile
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub user_id: Uuid,
    pub reason: VoucherReason,
    pub description: Option<String>,
    /// `None` issues a voucher without expiry
    pub valid_for: Option<Duration>,
    /// Set by the birthday batch; the store keeps one such voucher per user and year
    pub birthday_year: Option<i32>,
}

/// Issue a voucher with a freshly generated code.
///
/// A code collision surfaces as `DuplicateCode`; see [`issue_voucher_with_retry`].
pub async fn issue_voucher(
    pool: &PgPool,
    notifier: &Notifier,
    request: &IssueRequest,
) -> Result<Voucher, VoucherError> {
    issue_voucher_with_code(pool, notifier, request, generate_code(request.reason)).await
}

/// Issue a voucher under a caller-chosen code.
#[tracing::instrument(skip(pool, notifier, request), fields(user_id = %request.user_id, reason = %request.reason))]
pub async fn issue_voucher_with_code(
    pool: &PgPool,
    notifier: &Notifier,
    request: &IssueRequest,
    code: String,
) -> Result<Voucher, VoucherError> {
    let expires_at = match request.valid_for {
        Some(valid_for) if valid_for <= Duration::zero() => {
            return Err(VoucherError::InvalidRequest(
                "Validity must be positive".to_string(),
            ));
        }
        Some(valid_for) => Some(Utc::now().checked_add_signed(valid_for).ok_or_else(|| {
            VoucherError::InvalidRequest("Validity is out of range".to_string())
        })?),
        None => None,
    };

    let profile_row = ProfileRepo::get(pool, request.user_id)
        .await
        .map_err(store_failure("issue voucher"))?
        .ok_or(VoucherError::NotFound("Profile"))?;
    let profile = Profile::try_from(profile_row).map_err(store_failure("issue voucher"))?;

    let new_row = NewVoucherRow {
        code,
        user_id: request.user_id,
        reason: request.reason,
        description: request.description.clone(),
        expires_at,
        birthday_year: request.birthday_year,
    };

    let Some(row) = VoucherRepo::insert(pool, &new_row)
        .await
        .map_err(store_failure("issue voucher"))?
    else {
        if let Some(year) = request.birthday_year {
            let issued = VoucherRepo::birthday_issued_for_year(pool, request.user_id, year)
                .await
                .map_err(store_failure("issue voucher"))?;
            if issued {
                return Err(VoucherError::AlreadyIssued);
            }
        }
        return Err(VoucherError::DuplicateCode);
    };
    let voucher = Voucher::try_from(row).map_err(store_failure("issue voucher"))?;

    // The counter is informational; a failed increment must not undo the issue.
    if let Err(e) = ProfileRepo::increment_voucher_count(pool, request.user_id).await {
        tracing::warn!(
            "Failed to increment voucher count for {}: {:#}",
            request.user_id,
            e
        );
    }

    tracing::info!(code = %voucher.code, "Issued voucher");

    let recipient = Recipient::from(&profile);
    let notification = Notification::voucher_issued(&recipient, &voucher);
    notifier.notify(recipient, notification);

    Ok(voucher)
}

/// Issue a voucher, drawing a new code after each collision.
pub async fn issue_voucher_with_retry(
    pool: &PgPool,
    notifier: &Notifier,
    request: &IssueRequest,
) -> Result<Voucher, VoucherError> {
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        match issue_voucher(pool, notifier, request).await {
            Err(VoucherError::DuplicateCode) => {
                tracing::warn!(
                    "Voucher code collision (attempt {}/{}), retrying",
                    attempt,
                    MAX_CODE_ATTEMPTS
                );
            }
            other => return other,
        }
    }
    Err(VoucherError::DuplicateCode)
}

async fn load_voucher(
    pool: &PgPool,
    code: &str,
    operation: &'static str,
) -> Result<Voucher, VoucherError> {
    let row = VoucherRepo::get_by_code(pool, code)
        .await
        .map_err(|e| store_failure(operation)(e.context(format!("voucher {}", code))))?
        .ok_or(VoucherError::NotFound("Voucher"))?;
    Voucher::try_from(row).map_err(store_failure(operation))
}

/// Redeem a voucher on behalf of a staff member.
pub async fn redeem(
    pool: &PgPool,
    code: &str,
    actor: &Identity,
) -> Result<Voucher, VoucherError> {
    redeem_at(pool, code, actor, Utc::now()).await
}

/// Redeem a voucher as of `now`.
///
/// Order of checks: admin role, existence, used flag, expiry. The final
/// UPDATE re-checks the used flag and expiry in its WHERE clause, so of two
/// concurrent callers only one sees a row come back; the other re-reads the
/// record and reports `AlreadyRedeemed`.
#[tracing::instrument(skip(pool, actor, now), fields(actor = %actor.user_id))]
pub async fn redeem_at(
    pool: &PgPool,
    code: &str,
    actor: &Identity,
    now: DateTime<Utc>,
) -> Result<Voucher, VoucherError> {
    require_admin(pool, actor).await?;

    let code = normalize_code(code);
    let voucher = load_voucher(pool, &code, "redeem voucher").await?;
    if let Err(rejection) = voucher.check_redeemable(now) {
        tracing::info!(code = %code, "Redemption rejected: {}", rejection);
        return Err(rejection.into());
    }

    let updated = VoucherRepo::mark_used(pool, &code, actor.user_id, now)
        .await
        .map_err(|e| store_failure("redeem voucher")(e.context(format!("voucher {}", code))))?;

    match updated {
        Some(row) => {
            let voucher = Voucher::try_from(row).map_err(store_failure("redeem voucher"))?;
            tracing::info!(code = %voucher.code, "Voucher redeemed");
            Ok(voucher)
        }
        None => {
            // Lost the race: someone else changed the row between our read and write.
            let current = load_voucher(pool, &code, "redeem voucher").await?;
            let rejection = current
                .check_redeemable(now)
                .err()
                .unwrap_or(RedeemRejection::AlreadyRedeemed);
            tracing::info!(code = %code, "Redemption lost race: {}", rejection);
            Err(rejection.into())
        }
    }
}

/// Look up a voucher for the scan preview without changing it.
pub async fn inspect(
    pool: &PgPool,
    code: &str,
    actor: &Identity,
) -> Result<(Voucher, VoucherStatus), VoucherError> {
    require_admin(pool, actor).await?;
    let voucher = load_voucher(pool, &normalize_code(code), "inspect voucher").await?;
    let status = voucher.status_at(Utc::now());
    Ok((voucher, status))
}

/// Vouchers owned by a profile, newest first
pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Voucher>, VoucherError> {
    let rows = VoucherRepo::list_by_user(pool, user_id)
        .await
        .map_err(store_failure("list vouchers"))?;
    rows.into_iter()
        .map(|row| Voucher::try_from(row).map_err(store_failure("list vouchers")))
        .collect()
}

/// Outcome of one birthday sweep
#[derive(Debug, Clone, Serialize)]
pub struct BirthdayBatchReport {
    pub date: NaiveDate,
    pub matched: usize,
    pub issued: usize,
    pub skipped: usize,
    pub failed: usize,
    pub codes: Vec<String>,
}

/// Issue one birthday voucher to every profile celebrating on `today`,
/// unless it already holds the one for `today`'s year.
///
/// The year comes from `today`, not from the clock, so backfilling a past date
/// or a run that crosses midnight on 31 December stays idempotent. The store
/// enforces one birthday voucher per user and year, so overlapping runs
/// cannot both issue. Failures for a single profile are counted and logged;
/// they do not stop the sweep.
#[tracing::instrument(skip(pool, notifier, config))]
pub async fn run_birthday_batch(
    pool: &PgPool,
    notifier: &Notifier,
    config: &VoucherConfig,
    today: NaiveDate,
) -> Result<BirthdayBatchReport, VoucherError> {
    let valid_for = validity_from_days(config.birthday_validity_days)?;
    let year = today.year();
    let profiles = ProfileRepo::list_by_birthday(pool, &celebrated_dates(today))
        .await
        .map_err(store_failure("birthday batch"))?;

    let mut report = BirthdayBatchReport {
        date: today,
        matched: profiles.len(),
        issued: 0,
        skipped: 0,
        failed: 0,
        codes: Vec::new(),
    };

    for profile in profiles {
        let already_issued =
            match VoucherRepo::birthday_issued_for_year(pool, profile.user_id, year).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!(
                    "Failed to check birthday vouchers for {}: {:#}",
                    profile.user_id,
                    e
                );
                report.failed += 1;
                continue;
            }
        };

        if already_issued {
            report.skipped += 1;
            continue;
        }

        let request = IssueRequest {
            user_id: profile.user_id,
            reason: VoucherReason::Birthday,
            description: Some(config.birthday_description.clone()),
            valid_for: Some(valid_for),
            birthday_year: Some(year),
        };
        match issue_voucher_with_retry(pool, notifier, &request).await {
            Ok(voucher) => {
                report.issued += 1;
                report.codes.push(voucher.code);
            }
            // Another run got there between our check and the insert.
            Err(VoucherError::AlreadyIssued) => report.skipped += 1,
            Err(e) => {
                tracing::warn!(
                    "Failed to issue birthday voucher for {}: {}",
                    profile.user_id,
                    e
                );
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        "Birthday batch for {}: {} matched, {} issued, {} skipped, {} failed",
        today,
        report.matched,
        report.issued,
        report.skipped,
        report.failed
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_code_format() {
        let code = generate_code(VoucherReason::Gift);
        assert!(code.starts_with("LOKAL-GIFT-"), "got {}", code);
        assert_eq!(code.len(), "LOKAL-GIFT-".len() + CODE_SUFFIX_LEN);
        assert_eq!(normalize_code(&code), code);
    }

    #[test]
    fn test_generate_code_uses_reason_tag() {
        assert!(generate_code(VoucherReason::Birthday).starts_with("LOKAL-BDAY-"));
        assert!(generate_code(VoucherReason::Discount).starts_with("LOKAL-DISC-"));
    }

    #[test]
    fn test_validity_from_days() {
        assert_eq!(validity_from_days(7).unwrap(), Duration::days(7));
        assert_eq!(
            validity_from_days(MAX_VALID_DAYS).unwrap(),
            Duration::days(MAX_VALID_DAYS)
        );
        for days in [0, -1, MAX_VALID_DAYS + 1, 1_000_000_000, 9_000_000_000_000_000_000] {
            assert!(
                matches!(validity_from_days(days), Err(VoucherError::InvalidRequest(_))),
                "{}",
                days
            );
        }
    }

    #[test]
    fn test_generate_code_is_random() {
        let codes: std::collections::HashSet<String> =
            (0..50).map(|_| generate_code(VoucherReason::Gift)).collect();
        // 32^6 possibilities; 50 draws colliding would point at a broken RNG.
        assert!(codes.len() >= 49);
    }
}

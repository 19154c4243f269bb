use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use lokal_common::models::profile::{Profile, Role};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRow {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub voucher_count: i32,
    pub activity_count: i32,
    pub birthday: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = anyhow::Error;

    fn try_from(row: ProfileRow) -> Result<Self> {
        let role = row
            .role
            .parse::<Role>()
            .with_context(|| format!("Invalid role stored for profile {}", row.user_id))?;
        Ok(Profile {
            user_id: row.user_id,
            display_name: row.display_name,
            role,
            email: row.email,
            phone: row.phone,
            voucher_count: row.voucher_count,
            activity_count: row.activity_count,
            birthday: row.birthday,
            created_at: row.created_at,
        })
    }
}

/// Fields for inserting a profile
#[derive(Debug, Clone)]
pub struct NewProfile<'a> {
    pub user_id: Uuid,
    pub display_name: &'a str,
    pub role: Role,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub birthday: Option<NaiveDate>,
}

const PROFILE_COLUMNS: &str = "user_id, display_name, role, email, phone, voucher_count, activity_count, birthday, created_at";

pub struct ProfileRepo;

impl ProfileRepo {
    pub async fn create(pool: &PgPool, profile: &NewProfile<'_>) -> Result<()> {
        sqlx::query(
            "INSERT INTO profile (user_id, display_name, role, email, phone, birthday) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(profile.user_id)
        .bind(profile.display_name)
        .bind(profile.role.as_str())
        .bind(profile.email)
        .bind(profile.phone)
        .bind(profile.birthday)
        .execute(pool)
        .await
        .context("Failed to create profile")?;
        Ok(())
    }

    pub async fn get(pool: &PgPool, user_id: Uuid) -> Result<Option<ProfileRow>> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {} FROM profile WHERE user_id = $1",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get profile")?;
        Ok(row)
    }

    /// Return the profile for `user_id`, inserting a member profile first if
    /// none exists. Safe to call concurrently for the same user.
    pub async fn ensure(
        pool: &PgPool,
        user_id: Uuid,
        display_name: &str,
        email: &str,
    ) -> Result<ProfileRow> {
        sqlx::query(
            "INSERT INTO profile (user_id, display_name, role, email) VALUES ($1, $2, 'member', $3) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(display_name)
        .bind(email)
        .execute(pool)
        .await
        .context("Failed to insert default profile")?;

        Self::get(pool, user_id)
            .await?
            .with_context(|| format!("Profile {} missing after insert", user_id))
    }

    pub async fn set_role(pool: &PgPool, user_id: Uuid, role: Role) -> Result<bool> {
        let result = sqlx::query("UPDATE profile SET role = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(role.as_str())
            .execute(pool)
            .await
            .context("Failed to update profile role")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn increment_voucher_count(pool: &PgPool, user_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE profile SET voucher_count = voucher_count + 1 WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await
            .context("Failed to increment voucher count")?;
        Ok(())
    }

    /// Profiles whose birthday falls on any of the given (month, day) pairs
    pub async fn list_by_birthday(pool: &PgPool, dates: &[(u32, u32)]) -> Result<Vec<ProfileRow>> {
        let months: Vec<i32> = dates.iter().map(|(m, _)| *m as i32).collect();
        let days: Vec<i32> = dates.iter().map(|(_, d)| *d as i32).collect();
        let rows = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {} FROM profile \
             WHERE birthday IS NOT NULL \
             AND (EXTRACT(MONTH FROM birthday)::INT, EXTRACT(DAY FROM birthday)::INT) \
                 IN (SELECT m, d FROM UNNEST($1::INT[], $2::INT[]) AS t(m, d)) \
             ORDER BY created_at",
            PROFILE_COLUMNS
        ))
        .bind(&months)
        .bind(&days)
        .fetch_all(pool)
        .await
        .context("Failed to list profiles by birthday")?;
        Ok(rows)
    }
}

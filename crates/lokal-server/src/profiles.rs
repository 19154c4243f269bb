use crate::config::InitialAdminConfig;
use crate::error::{store_failure, VoucherError};
use anyhow::{Context, Result};
use lokal_common::models::auth::Identity;
use lokal_common::models::profile::{display_name_from_email, Profile, Role};
use lokal_db::{NewProfile, ProfileRepo, UserRepo};
use sqlx::PgPool;
use uuid::Uuid;

/// Profile of the acting identity, created on first access.
pub async fn current_profile(pool: &PgPool, identity: &Identity) -> Result<Profile, VoucherError> {
    let row = ProfileRepo::ensure(
        pool,
        identity.user_id,
        &display_name_from_email(&identity.email),
        &identity.email,
    )
    .await
    .map_err(store_failure("load profile"))?;
    Profile::try_from(row).map_err(store_failure("load profile"))
}

pub async fn get_role(pool: &PgPool, identity: &Identity) -> Result<Role, VoucherError> {
    Ok(current_profile(pool, identity).await?.role)
}

/// Fail with `Forbidden` unless the identity holds the admin role.
pub async fn require_admin(pool: &PgPool, identity: &Identity) -> Result<Profile, VoucherError> {
    let profile = current_profile(pool, identity).await?;
    if !profile.role.is_admin() {
        tracing::info!(user_id = %identity.user_id, "Rejected non-admin caller");
        return Err(VoucherError::Forbidden);
    }
    Ok(profile)
}

/// Create the configured admin account, or promote it if the user exists.
pub async fn seed_initial_admin(pool: &PgPool, admin: &InitialAdminConfig) -> Result<Uuid> {
    let display_name = admin
        .display_name
        .clone()
        .unwrap_or_else(|| display_name_from_email(&admin.email));

    let user_id = match UserRepo::get_by_email(pool, &admin.email).await? {
        Some(user) => {
            tracing::info!("Initial admin '{}' already exists", admin.email);
            user.user_id
        }
        None => {
            let password_hash = crate::auth::hash_password(&admin.password)
                .context("Failed to hash initial admin password")?;
            let user_id = Uuid::new_v4();
            UserRepo::create(pool, user_id, &admin.email, Some(&password_hash))
                .await
                .context("Failed to create initial admin user")?;
            ProfileRepo::create(
                pool,
                &NewProfile {
                    user_id,
                    display_name: &display_name,
                    role: Role::Admin,
                    email: Some(&admin.email),
                    phone: None,
                    birthday: None,
                },
            )
            .await
            .context("Failed to create initial admin profile")?;
            tracing::info!("Created initial admin: {}", admin.email);
            return Ok(user_id);
        }
    };

    ProfileRepo::ensure(pool, user_id, &display_name, &admin.email).await?;
    ProfileRepo::set_role(pool, user_id, Role::Admin).await?;
    Ok(user_id)
}

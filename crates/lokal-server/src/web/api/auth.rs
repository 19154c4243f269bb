use crate::auth::{create_access_token, verify_password};
use crate::error::{store_failure, VoucherError};
use crate::profiles::current_profile;
use crate::state::AppState;
use crate::web::api::middleware::AuthUser;
use axum::{extract::State, response::IntoResponse, Json};
use lokal_db::UserRepo;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
}

fn invalid_credentials() -> VoucherError {
    VoucherError::Unauthorized("Invalid email or password".into())
}

/// POST /api/auth/login
#[tracing::instrument(skip(state, req))]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, VoucherError> {
    let user = UserRepo::get_by_email(&state.pool, &req.email)
        .await
        .map_err(store_failure("login"))?
        .ok_or_else(invalid_credentials)?;

    let password_hash = user.password_hash.as_deref().ok_or_else(invalid_credentials)?;
    if !verify_password(&req.password, password_hash).map_err(store_failure("login"))? {
        return Err(invalid_credentials());
    }

    let auth = &state.config.auth;
    let access_token = create_access_token(
        &user.user_id.to_string(),
        &user.email,
        &auth.jwt_secret,
        auth.token_ttl_secs,
    )
    .map_err(store_failure("login"))?;

    if let Err(e) = UserRepo::touch_last_login(&state.pool, user.user_id).await {
        tracing::warn!("Failed to record login for {}: {:#}", user.user_id, e);
    }

    Ok(Json(TokenResponse {
        access_token,
        expires_in: auth.token_ttl_secs,
    }))
}

/// GET /api/auth/me
#[tracing::instrument(skip(state, auth))]
pub async fn me(
    State(state): State<Arc<AppState>>,
    AuthUser(auth): AuthUser,
) -> Result<impl IntoResponse, VoucherError> {
    let profile = current_profile(&state.pool, &auth).await?;
    Ok(Json(profile))
}

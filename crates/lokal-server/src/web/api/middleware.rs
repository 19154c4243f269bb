use crate::auth::validate_access_token;
use crate::error::VoucherError;
use crate::state::AppState;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use lokal_common::models::auth::Identity;
use std::sync::Arc;

/// Extractor that validates a JWT Bearer token and yields the caller's identity.
#[derive(Debug)]
pub struct AuthUser(pub Identity);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = VoucherError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| VoucherError::Unauthorized("Missing authorization header".into()))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            VoucherError::Unauthorized("Invalid authorization header format".into())
        })?;

        let claims = validate_access_token(token, &state.config.auth.jwt_secret)
            .map_err(|_| VoucherError::Unauthorized("Invalid or expired token".into()))?;

        let identity = Identity::try_from(&claims)
            .map_err(|_| VoucherError::Unauthorized("Invalid user ID in token".into()))?;

        Ok(AuthUser(identity))
    }
}

pub mod auth;
pub mod middleware;
pub mod vouchers;

use crate::state::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::{routing::get, routing::post, Json, Router};
use serde_json::json;
use std::sync::Arc;

/// GET /api/config -- public endpoint returning server configuration for the UI
async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "auth_required": true,
        "birthday_validity_days": state.config.vouchers.birthday_validity_days,
    }))
}

pub fn build_api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/config", get(get_config))
        // Auth
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        // Vouchers
        .route("/vouchers", post(vouchers::issue))
        .route("/vouchers/redeem", post(vouchers::redeem))
        .route("/vouchers/mine", get(vouchers::list_mine))
        .route("/vouchers/birthday-batch", post(vouchers::birthday_batch))
        .route("/vouchers/{code}", get(vouchers::show))
        .with_state(state)
}

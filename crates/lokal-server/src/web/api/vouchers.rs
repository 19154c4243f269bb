use crate::error::VoucherError;
use crate::profiles::require_admin;
use crate::state::AppState;
use crate::vouchers::{self, BirthdayBatchReport, IssueRequest};
use crate::web::api::middleware::AuthUser;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use lokal_common::models::voucher::{Voucher, VoucherReason, VoucherStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Client-facing view of a voucher. Leaves out owner and redeemer ids.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherView {
    pub code: String,
    pub reason: VoucherReason,
    pub description: Option<String>,
    pub status: VoucherStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub used_at: Option<DateTime<Utc>>,
}

impl VoucherView {
    fn at(voucher: Voucher, now: DateTime<Utc>) -> Self {
        Self {
            status: voucher.status_at(now),
            code: voucher.code,
            reason: voucher.reason,
            description: voucher.description,
            created_at: voucher.created_at,
            expires_at: voucher.expires_at,
            used_at: voucher.used_at,
        }
    }
}

impl From<Voucher> for VoucherView {
    fn from(voucher: Voucher) -> Self {
        Self::at(voucher, Utc::now())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub voucher_code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    pub message: String,
    pub voucher_code: String,
    pub voucher: VoucherView,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueVoucherRequest {
    pub user_id: Uuid,
    pub reason: VoucherReason,
    pub description: Option<String>,
    pub valid_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BirthdayBatchRequest {
    pub date: Option<NaiveDate>,
}

/// Unwrap a JSON body, turning axum's rejection into an `InvalidRequest`.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, VoucherError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| VoucherError::InvalidRequest(rejection.body_text()))
}

/// POST /api/vouchers/redeem
#[tracing::instrument(skip(state, auth, payload))]
pub async fn redeem(
    State(state): State<Arc<AppState>>,
    AuthUser(auth): AuthUser,
    payload: Result<Json<RedeemRequest>, JsonRejection>,
) -> Result<Json<RedeemResponse>, VoucherError> {
    let req = match json_body(payload) {
        Ok(req) => req,
        Err(e) => {
            // The admin check still takes precedence over a bad body.
            require_admin(&state.pool, &auth).await?;
            return Err(e);
        }
    };
    let voucher = vouchers::redeem(&state.pool, &req.voucher_code, &auth).await?;
    Ok(Json(RedeemResponse {
        message: "Voucher redeemed successfully".to_string(),
        voucher_code: voucher.code.clone(),
        voucher: voucher.into(),
    }))
}

/// GET /api/vouchers/{code} -- scan preview, does not redeem
#[tracing::instrument(skip(state, auth))]
pub async fn show(
    State(state): State<Arc<AppState>>,
    AuthUser(auth): AuthUser,
    Path(code): Path<String>,
) -> Result<Json<VoucherView>, VoucherError> {
    let (voucher, status) = vouchers::inspect(&state.pool, &code, &auth).await?;
    let mut view = VoucherView::from(voucher);
    view.status = status;
    Ok(Json(view))
}

/// GET /api/vouchers/mine
#[tracing::instrument(skip(state, auth))]
pub async fn list_mine(
    State(state): State<Arc<AppState>>,
    AuthUser(auth): AuthUser,
) -> Result<Json<Vec<VoucherView>>, VoucherError> {
    let now = Utc::now();
    let vouchers = vouchers::list_for_user(&state.pool, auth.user_id).await?;
    Ok(Json(
        vouchers
            .into_iter()
            .map(|v| VoucherView::at(v, now))
            .collect(),
    ))
}

/// POST /api/vouchers -- gift a voucher to a member
#[tracing::instrument(skip(state, auth, payload))]
pub async fn issue(
    State(state): State<Arc<AppState>>,
    AuthUser(auth): AuthUser,
    payload: Result<Json<IssueVoucherRequest>, JsonRejection>,
) -> Result<impl IntoResponse, VoucherError> {
    require_admin(&state.pool, &auth).await?;
    let req = json_body(payload)?;

    let valid_for = req
        .valid_days
        .or(state.config.vouchers.gift_validity_days)
        .map(vouchers::validity_from_days)
        .transpose()?;

    let description = req
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    let request = IssueRequest {
        user_id: req.user_id,
        reason: req.reason,
        description,
        valid_for,
        birthday_year: None,
    };
    let voucher = vouchers::issue_voucher_with_retry(&state.pool, &state.notifier, &request).await?;
    Ok((StatusCode::CREATED, Json(VoucherView::from(voucher))))
}

/// POST /api/vouchers/birthday-batch
#[tracing::instrument(skip(state, auth, payload))]
pub async fn birthday_batch(
    State(state): State<Arc<AppState>>,
    AuthUser(auth): AuthUser,
    payload: Result<Json<BirthdayBatchRequest>, JsonRejection>,
) -> Result<Json<BirthdayBatchReport>, VoucherError> {
    require_admin(&state.pool, &auth).await?;
    let req = json_body(payload)?;
    let today = req.date.unwrap_or_else(|| Utc::now().date_naive());
    let report = vouchers::run_birthday_batch(
        &state.pool,
        &state.notifier,
        &state.config.vouchers,
        today,
    )
    .await?;
    Ok(Json(report))
}

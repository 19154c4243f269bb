use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lokal_common::models::voucher::RedeemRejection;
use serde_json::json;
use thiserror::Error;

/// Failure of a voucher or profile operation.
///
/// Every variant is terminal for the current request. Only `StoreFailure`
/// carries internal detail, and that detail never reaches the client.
#[derive(Debug, Error)]
pub enum VoucherError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("Admin privileges required")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Voucher has already been redeemed")]
    AlreadyRedeemed,

    #[error("Voucher has expired")]
    Expired,

    #[error("Voucher code already exists")]
    DuplicateCode,

    #[error("Birthday voucher already issued for this year")]
    AlreadyIssued,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Store failure during {operation}")]
    StoreFailure {
        operation: &'static str,
        error: anyhow::Error,
    },
}

impl VoucherError {
    pub fn status(&self) -> StatusCode {
        match self {
            VoucherError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            VoucherError::Forbidden => StatusCode::FORBIDDEN,
            VoucherError::NotFound(_) => StatusCode::NOT_FOUND,
            VoucherError::AlreadyRedeemed
            | VoucherError::Expired
            | VoucherError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            VoucherError::DuplicateCode | VoucherError::AlreadyIssued => StatusCode::CONFLICT,
            VoucherError::StoreFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Wrap a store error with the name of the operation that hit it.
pub fn store_failure(operation: &'static str) -> impl FnOnce(anyhow::Error) -> VoucherError {
    move |error| VoucherError::StoreFailure { operation, error }
}

impl From<RedeemRejection> for VoucherError {
    fn from(rejection: RedeemRejection) -> Self {
        match rejection {
            RedeemRejection::AlreadyRedeemed => VoucherError::AlreadyRedeemed,
            RedeemRejection::Expired => VoucherError::Expired,
        }
    }
}

impl IntoResponse for VoucherError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            VoucherError::StoreFailure { operation, error } => {
                tracing::error!(operation = *operation, "Store failure: {:#}", error);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            VoucherError::Unauthorized("Missing authorization header".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(VoucherError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            VoucherError::NotFound("Voucher").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            VoucherError::AlreadyRedeemed.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(VoucherError::Expired.status(), StatusCode::BAD_REQUEST);
        assert_eq!(VoucherError::DuplicateCode.status(), StatusCode::CONFLICT);
        assert_eq!(VoucherError::AlreadyIssued.status(), StatusCode::CONFLICT);
        assert_eq!(
            store_failure("redeem")(anyhow!("connection reset")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            VoucherError::NotFound("Voucher").to_string(),
            "Voucher not found"
        );
        assert_eq!(
            VoucherError::from(RedeemRejection::Expired).to_string(),
            "Voucher has expired"
        );
    }

    #[test]
    fn test_store_failure_hides_detail() {
        let response = store_failure("redeem")(anyhow!("password authentication failed"))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

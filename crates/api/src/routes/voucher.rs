//! Voucher routes for users: validate before checkout, then redeem.

use axum::{Json, Router, extract::State, routing::post};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ApiResponse, ok};
use crate::error::AppError;
use crate::middleware::RequireUser;
use crate::services::voucher::{Redemption, Validation};
use crate::services::{VoucherOutcome, VoucherService};
use crate::state::AppState;

/// Build the voucher router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/validate", post(validate))
        .route("/use", post(use_voucher))
}

/// Voucher check request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherRequest {
    pub code: String,
    #[serde(default)]
    pub order_value: Decimal,
    #[serde(default)]
    pub plan: String,
}

/// Validation result. Invalid codes are a normal answer, not an error.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResponse {
    pub valid: bool,
    #[serde(flatten)]
    pub details: Option<Validation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<VoucherOutcome<Validation>> for ValidationResponse {
    fn from(outcome: VoucherOutcome<Validation>) -> Self {
        match outcome {
            VoucherOutcome::Accepted(details) => Self {
                valid: true,
                details: Some(details),
                message: None,
            },
            VoucherOutcome::Rejected(message) => Self {
                valid: false,
                details: None,
                message: Some(message),
            },
        }
    }
}

async fn validate(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<VoucherRequest>,
) -> Result<Json<ApiResponse<ValidationResponse>>, AppError> {
    let outcome = VoucherService::new(state.pool())
        .validate_voucher(&body.code, user.id, body.order_value, &body.plan)
        .await?;
    Ok(ok(outcome.into()))
}

async fn use_voucher(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<VoucherRequest>,
) -> Result<Json<ApiResponse<Redemption>>, AppError> {
    match VoucherService::new(state.pool())
        .use_voucher(&body.code, user.id, body.order_value, &body.plan)
        .await?
    {
        VoucherOutcome::Accepted(redemption) => Ok(ok(redemption)),
        VoucherOutcome::Rejected(msg) => Err(AppError::BadRequest(msg)),
    }
}

#[cfg(test)]
mod tests {
    use reality_cheque_core::VoucherType;

    use super::*;

    #[test]
    fn test_valid_response_flattens_details() {
        let response = ValidationResponse::from(VoucherOutcome::Accepted(Validation {
            discount: Decimal::new(250, 2),
            voucher_type: VoucherType::Percentage,
            value: Decimal::from(25),
        }));
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json["valid"], true);
        assert_eq!(json["discount"], "2.50");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_invalid_response_carries_message() {
        let response =
            ValidationResponse::from(VoucherOutcome::<Validation>::Rejected("Voucher has expired".into()));
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json, serde_json::json!({"valid": false, "message": "Voucher has expired"}));
    }

    #[test]
    fn test_request_defaults() {
        let body: VoucherRequest =
            serde_json::from_str(r#"{"code": "ab12cd"}"#).expect("deserialize");
        assert_eq!(body.order_value, Decimal::ZERO);
        assert!(body.plan.is_empty());
    }
}

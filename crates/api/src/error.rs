//! API error type
//!
//! Every error carries a correlation code (`003-RESPONSE`, `000-STRIPE`, ...)
//! that is logged once and returned to the client as
//! `{"code": "...", "message": "..."}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use modular_billing::BillingError;
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Correlation codes used by the payment routes
pub mod codes {
    pub const STRIPE_NOT_CONFIGURED: &str = "000-STRIPE";
    pub const CHECKOUT: &str = "001-RESPONSE";
    pub const WEBHOOK: &str = "002-RESPONSE";
    pub const ORDER_STATUS: &str = "003-RESPONSE";
    pub const PAYMENT_INTENT: &str = "004-RESPONSE";
    pub const ORDERS: &str = "005-RESPONSE";
    pub const CATALOG: &str = "006-RESPONSE";
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Stripe is not configured on this server")]
    BillingNotConfigured,

    #[error("{message}")]
    Validation { code: &'static str, message: String },

    #[error("{message}")]
    Upstream { code: &'static str, message: String },

    #[error("{message}")]
    Internal { code: &'static str, message: String },
}

impl ApiError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Validation {
            code,
            message: message.into(),
        }
    }

    /// Map a billing failure onto an HTTP error tagged with the route's code.
    pub fn billing(code: &'static str, err: BillingError) -> Self {
        match err {
            BillingError::UnknownProduct(message)
            | BillingError::InvalidInput(message)
            | BillingError::WebhookPayload(message) => ApiError::Validation { code, message },
            BillingError::InvalidSessionId(_)
            | BillingError::WebhookSignatureMissing
            | BillingError::WebhookSignatureInvalid => ApiError::Validation {
                code,
                message: err.to_string(),
            },
            BillingError::StripeApi(message) => ApiError::Upstream { code, message },
            BillingError::Database(_)
            | BillingError::Config(_)
            | BillingError::MissingClientReference(_) => ApiError::Internal {
                code,
                message: err.to_string(),
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BillingNotConfigured => codes::STRIPE_NOT_CONFIGURED,
            ApiError::Validation { code, .. }
            | ApiError::Upstream { code, .. }
            | ApiError::Internal { code, .. } => *code,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BillingNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        if status.is_server_error() {
            tracing::error!(code = %code, status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::warn!(code = %code, status = status.as_u16(), error = %self, "Request rejected");
        }

        let message = match &self {
            // database details stay in the log
            ApiError::Internal { .. } => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "code": code, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billing_errors_map_to_status() {
        let cases = [
            (
                BillingError::UnknownProduct("Product id 9 requested, is invalid".into()),
                StatusCode::BAD_REQUEST,
            ),
            (BillingError::WebhookSignatureInvalid, StatusCode::BAD_REQUEST),
            (BillingError::StripeApi("boom".into()), StatusCode::BAD_GATEWAY),
            (
                BillingError::MissingClientReference("cs_test_1".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            let api = ApiError::billing(codes::CHECKOUT, err);
            assert_eq!(api.status(), status);
            assert_eq!(api.code(), codes::CHECKOUT);
        }
    }

    #[test]
    fn test_unknown_product_keeps_message() {
        let api = ApiError::billing(
            codes::ORDER_STATUS,
            BillingError::UnknownProduct("Product id 3 requested, is invalid".into()),
        );
        assert_eq!(api.to_string(), "Product id 3 requested, is invalid");
    }

    #[test]
    fn test_not_configured_is_503() {
        let api = ApiError::BillingNotConfigured;
        assert_eq!(api.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(api.code(), "000-STRIPE");
    }
}

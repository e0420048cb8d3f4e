//! Billing errors

use modular_shared::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Database error: {0}")]
    Database(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid checkout session id: {0}")]
    InvalidSessionId(String),

    #[error("Checkout session {0} is paid but has no client reference id")]
    MissingClientReference(String),

    #[error("Missing Stripe signature")]
    WebhookSignatureMissing,

    #[error("Invalid Stripe signature")]
    WebhookSignatureInvalid,

    #[error("Malformed webhook payload: {0}")]
    WebhookPayload(String),
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        BillingError::StripeApi(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;

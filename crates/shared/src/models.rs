//! Order and payment event rows

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// A fulfilled (or pending) purchase, keyed by Stripe checkout session id
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub session_id: String,
    /// `sub` claim of the buyer's token
    pub user_id: String,
    /// Line items as returned by Stripe
    pub items: Option<serde_json::Value>,
    pub customer_id: Option<String>,
    /// Stripe product id of the first line item
    pub product_id: String,
    pub payment_status: Option<String>,
    /// Total in minor units
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub fulfilled: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Insert payload for an order
#[derive(Debug, Clone, Default)]
pub struct NewOrder {
    pub session_id: String,
    pub user_id: String,
    pub items: Option<serde_json::Value>,
    pub customer_id: Option<String>,
    pub product_id: String,
    pub payment_status: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub fulfilled: bool,
}

impl NewOrder {
    pub(crate) fn into_order(self, created_at: OffsetDateTime) -> Order {
        Order {
            id: Uuid::new_v4(),
            session_id: self.session_id,
            user_id: self.user_id,
            items: self.items,
            customer_id: self.customer_id,
            product_id: self.product_id,
            payment_status: self.payment_status,
            amount_total: self.amount_total,
            currency: self.currency,
            fulfilled: self.fulfilled,
            created_at,
        }
    }
}

/// Webhook audit row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PaymentEvent {
    pub id: Uuid,
    pub event_id: String,
    pub event_type: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub processed: bool,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct NewPaymentEvent {
    pub event_id: String,
    pub event_type: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub processed: bool,
    pub error_message: Option<String>,
}

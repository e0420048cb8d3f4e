//! Checkout fulfillment
//!
//! An order is written once, when Stripe reports the checkout session as
//! paid. Re-delivered webhooks and repeated callbacks for the same session
//! find the existing row and return early.

use std::sync::Arc;

use modular_shared::{InsertOutcome, NewOrder, Order, OrderStore};
use time::{Duration, OffsetDateTime};

use crate::error::{BillingError, BillingResult};
use crate::gateway::{CheckoutSessionInfo, PaymentGateway, PaymentStatus};

/// A paid order grants access to its product for this long
pub const ORDER_VALIDITY: Duration = Duration::days(30);

#[derive(Debug, Clone, PartialEq)]
pub enum FulfillmentOutcome {
    /// An order row already exists for the session
    AlreadyFulfilled,
    Fulfilled(Order),
    /// Stripe does not report the session as paid yet
    NotPaid(CheckoutSessionInfo),
}

#[derive(Clone)]
pub struct FulfillmentService {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn OrderStore>,
}

impl FulfillmentService {
    pub fn new(gateway: Arc<dyn PaymentGateway>, store: Arc<dyn OrderStore>) -> Self {
        Self { gateway, store }
    }

    pub async fn fulfill_checkout(&self, session_id: &str) -> BillingResult<FulfillmentOutcome> {
        tracing::info!(session_id = %session_id, "Fulfilling checkout session");

        if let Some(existing) = self.store.find_by_session_id(session_id).await? {
            if existing.fulfilled {
                tracing::info!(session_id = %session_id, "Checkout session was already fulfilled");
                return Ok(FulfillmentOutcome::AlreadyFulfilled);
            }
        }

        let session = self.gateway.retrieve_checkout_session(session_id).await?;

        if session.payment_status != PaymentStatus::Paid {
            tracing::info!(
                session_id = %session_id,
                payment_status = %session.payment_status.as_str(),
                "Checkout session not paid, nothing to fulfill"
            );
            return Ok(FulfillmentOutcome::NotPaid(session));
        }

        let user_id = session
            .client_reference_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BillingError::MissingClientReference(session_id.to_string()))?;

        tracing::info!(session_id = %session_id, user_id = %user_id, "Processing order for paid session");

        let order = NewOrder {
            session_id: session.id.clone(),
            user_id,
            items: session.line_items.clone(),
            customer_id: session.customer_id.clone(),
            product_id: session.product_id.clone().unwrap_or_default(),
            payment_status: Some(session.payment_status.as_str().to_string()),
            amount_total: session.amount_total,
            currency: session.currency.clone(),
            fulfilled: true,
        };

        match self.store.insert_order(order).await? {
            InsertOutcome::Inserted(order) => {
                tracing::info!(
                    session_id = %session_id,
                    order_id = %order.id,
                    product_id = %order.product_id,
                    "Checkout session has been fulfilled"
                );
                Ok(FulfillmentOutcome::Fulfilled(order))
            }
            InsertOutcome::AlreadyExists => {
                tracing::info!(
                    session_id = %session_id,
                    "Order for session was written concurrently, treating as fulfilled"
                );
                Ok(FulfillmentOutcome::AlreadyFulfilled)
            }
        }
    }

    /// Whether the user has a fulfilled order for the Stripe product within [`ORDER_VALIDITY`] of `now`.
    pub async fn has_paid(
        &self,
        user_id: &str,
        product_id: &str,
        now: OffsetDateTime,
    ) -> BillingResult<bool> {
        let since = now - ORDER_VALIDITY;
        let order = self
            .store
            .find_recent_fulfilled(user_id, product_id, since)
            .await?;
        Ok(order.is_some())
    }

    pub async fn orders_for_user(&self, user_id: &str) -> BillingResult<Vec<Order>> {
        Ok(self.store.list_for_user(user_id).await?)
    }
}

//! Hosted checkout and payment intents

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::client::StripeConfig;
use crate::error::{BillingError, BillingResult};
use crate::fulfillment::FulfillmentService;
use crate::gateway::{CheckoutRequest, PaymentGateway, PaymentIntentInfo};

pub const MIN_QUANTITY: u64 = 1;
pub const MAX_QUANTITY: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
    #[serde(skip)]
    pub session_id: String,
}

#[derive(Clone)]
pub struct CheckoutService {
    gateway: Arc<dyn PaymentGateway>,
    config: Arc<StripeConfig>,
    fulfillment: FulfillmentService,
}

impl CheckoutService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        config: Arc<StripeConfig>,
        fulfillment: FulfillmentService,
    ) -> Self {
        Self {
            gateway,
            config,
            fulfillment,
        }
    }

    /// Start a hosted checkout for a catalog slot on behalf of `user_id`.
    pub async fn checkout(
        &self,
        slot: &str,
        quantity: u64,
        user_id: &str,
    ) -> BillingResult<CheckoutResponse> {
        let entry = self.config.catalog.resolve(slot)?;

        if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&quantity) {
            return Err(BillingError::InvalidInput(format!(
                "Quantity must be between {} and {}",
                MIN_QUANTITY, MAX_QUANTITY
            )));
        }

        let started = Instant::now();
        tracing::info!(
            user_id = %user_id,
            product_id = %entry.product_id,
            quantity = quantity,
            "User is checking out product"
        );

        let session = self
            .gateway
            .create_checkout_session(CheckoutRequest {
                price_id: entry.price_id.clone(),
                quantity,
                user_id: user_id.to_string(),
                mode: self.config.checkout_mode,
                success_url: self.config.success_url.clone(),
                cancel_url: self.config.cancel_url.clone(),
            })
            .await?;

        // Covers sessions that are already settled when created (free or fully discounted).
        self.fulfillment.fulfill_checkout(&session.id).await?;

        let url = session.url.ok_or_else(|| {
            BillingError::StripeApi(format!("Checkout session {} has no url", session.id))
        })?;

        tracing::info!(
            session_id = %session.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Moving user to hosted checkout"
        );

        Ok(CheckoutResponse {
            url,
            session_id: session.id,
        })
    }

    pub async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
    ) -> BillingResult<PaymentIntentInfo> {
        if amount <= 0 || currency.trim().is_empty() {
            return Err(BillingError::InvalidInput(
                "Missing required parameters: amount and currency".to_string(),
            ));
        }

        let intent = self.gateway.create_payment_intent(amount, currency).await?;
        tracing::info!(payment_intent_id = %intent.id, amount = amount, currency = %currency, "Created payment intent");
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, CatalogEntry};
    use crate::client::CheckoutMode;
    use crate::testing::ScriptedGateway;
    use modular_shared::{MemoryOrderStore, OrderStore};

    fn config() -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: None,
            api_base: None,
            success_url: "http://localhost:3000/success".to_string(),
            cancel_url: "http://localhost:3000/cancel".to_string(),
            checkout_mode: CheckoutMode::Subscription,
            catalog: Catalog::new(vec![CatalogEntry {
                slot: "1".to_string(),
                price_id: "price_1".to_string(),
                product_id: "prod_1".to_string(),
            }]),
        }
    }

    fn service(gateway: &ScriptedGateway) -> (CheckoutService, MemoryOrderStore) {
        let store = MemoryOrderStore::new();
        let gateway: Arc<dyn PaymentGateway> = Arc::new(gateway.clone());
        let store_dyn: Arc<dyn OrderStore> = Arc::new(store.clone());
        let fulfillment = FulfillmentService::new(gateway.clone(), store_dyn);
        (
            CheckoutService::new(gateway, Arc::new(config()), fulfillment),
            store,
        )
    }

    #[tokio::test]
    async fn test_checkout_creates_session_for_slot() {
        let gateway = ScriptedGateway::new().with_price("price_1", "prod_1");
        let (svc, store) = service(&gateway);

        let response = svc.checkout("1", 2, "user_1").await.unwrap();
        assert!(response.url.contains(&response.session_id));

        let requests = gateway.checkout_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].price_id, "price_1");
        assert_eq!(requests[0].quantity, 2);
        assert_eq!(requests[0].user_id, "user_1");
        assert_eq!(requests[0].mode, CheckoutMode::Subscription);

        // new sessions are unpaid, so nothing is fulfilled yet
        assert!(store.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_checkout_rejects_unknown_slot_before_calling_stripe() {
        let gateway = ScriptedGateway::new();
        let (svc, _) = service(&gateway);

        let err = svc.checkout("3", 1, "user_1").await.unwrap_err();
        assert!(matches!(err, BillingError::UnknownProduct(_)));
        assert!(gateway.checkout_requests().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_quantity_bounds() {
        let gateway = ScriptedGateway::new();
        let (svc, _) = service(&gateway);

        for quantity in [0, MAX_QUANTITY + 1] {
            let err = svc.checkout("1", quantity, "user_1").await.unwrap_err();
            assert!(matches!(err, BillingError::InvalidInput(_)));
        }
        assert!(svc.checkout("1", MAX_QUANTITY, "user_1").await.is_ok());
    }

    #[tokio::test]
    async fn test_payment_intent_validation() {
        let gateway = ScriptedGateway::new();
        let (svc, _) = service(&gateway);

        assert!(matches!(
            svc.create_payment_intent(0, "eur").await,
            Err(BillingError::InvalidInput(_))
        ));
        assert!(matches!(
            svc.create_payment_intent(1000, " ").await,
            Err(BillingError::InvalidInput(_))
        ));

        let intent = svc.create_payment_intent(1000, "eur").await.unwrap();
        assert!(intent.client_secret.unwrap().starts_with(&intent.id));
    }
}

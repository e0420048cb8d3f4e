// Billing crate clippy configuration
#![allow(clippy::result_large_err)] // BillingError carries Stripe error text
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Modular Template Billing Module
//!
//! Stripe integration for the starter's product catalog.
//!
//! ## Features
//!
//! - **Hosted Checkout**: Create a Stripe checkout session for a catalog product
//! - **Payment Intents**: Create intents for embedded payment forms
//! - **Fulfillment**: Record a paid session as an order exactly once
//! - **Webhooks**: Verify Stripe signatures and fulfill completed checkouts
//! - **Catalog Validation**: Check configured price and product ids against Stripe

pub mod catalog;
pub mod checkout;
pub mod client;
pub mod error;
pub mod fulfillment;
pub mod gateway;
pub mod webhooks;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Catalog
pub use catalog::{Catalog, CatalogEntry, CatalogEntryValidation, CatalogValidation};

// Checkout
pub use checkout::{CheckoutResponse, CheckoutService, MAX_QUANTITY, MIN_QUANTITY};

// Client
pub use client::{CheckoutMode, StripeClient, StripeConfig};

// Error
pub use error::{BillingError, BillingResult};

// Fulfillment
pub use fulfillment::{FulfillmentOutcome, FulfillmentService, ORDER_VALIDITY};

// Gateway
pub use gateway::{
    CheckoutRequest, CheckoutSessionInfo, PaymentGateway, PaymentIntentInfo, PaymentStatus,
};

// Webhooks
pub use webhooks::{
    compute_signature, verify_signature, EventKind, WebhookEvent, WebhookHandler, WebhookOutcome,
};

use std::sync::Arc;

use modular_shared::OrderStore;

/// Main billing service that combines all billing functionality
#[derive(Clone)]
pub struct BillingService {
    pub config: Arc<StripeConfig>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub checkout: CheckoutService,
    pub fulfillment: FulfillmentService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(store: Arc<dyn OrderStore>) -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?, store))
    }

    /// Create a new billing service talking to Stripe with explicit config
    pub fn new(config: StripeConfig, store: Arc<dyn OrderStore>) -> Self {
        let stripe = StripeClient::new(config.clone());
        Self::with_gateway(config, Arc::new(stripe), store)
    }

    /// Create a billing service over any payment gateway
    pub fn with_gateway(
        config: StripeConfig,
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn OrderStore>,
    ) -> Self {
        let config = Arc::new(config);
        let fulfillment = FulfillmentService::new(gateway.clone(), store.clone());

        Self {
            checkout: CheckoutService::new(gateway.clone(), config.clone(), fulfillment.clone()),
            webhooks: WebhookHandler::new(config.webhook_secret.clone(), fulfillment.clone(), store),
            fulfillment,
            gateway,
            config,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.config.catalog
    }

    /// Check the configured catalog against the prices and products Stripe lists
    pub async fn validate_catalog(&self) -> BillingResult<CatalogValidation> {
        self.config.catalog.validate(self.gateway.as_ref()).await
    }
}

//! Shared application state

use std::sync::Arc;

use modular_billing::{BillingError, BillingService};
use modular_shared::OrderStore;

use crate::auth::JwksVerifier;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn OrderStore>,
    /// None when Stripe is not configured; payment routes answer 503.
    pub billing: Option<Arc<BillingService>>,
    pub jwks: Arc<JwksVerifier>,
}

impl AppState {
    /// Create state with billing read from the environment.
    pub fn new(config: Config, store: Arc<dyn OrderStore>) -> Result<Self, BillingError> {
        let billing = billing_from_env(store.clone())?;
        Ok(Self::with_billing(config, store, billing))
    }

    pub fn with_billing(
        config: Config,
        store: Arc<dyn OrderStore>,
        billing: Option<BillingService>,
    ) -> Self {
        let jwks = JwksVerifier::new(config.jwks_url(), config.jwks_cache_ttl);
        tracing::info!(jwks_url = %jwks.jwks_url(), cache_ttl_secs = config.jwks_cache_ttl.as_secs(), "Token verification configured");

        Self {
            config: Arc::new(config),
            store,
            billing: billing.map(Arc::new),
            jwks: Arc::new(jwks),
        }
    }

    /// Get the billing service or the 503 error payment routes return without it
    pub fn billing_service(&self) -> ApiResult<&Arc<BillingService>> {
        self.billing.as_ref().ok_or(ApiError::BillingNotConfigured)
    }
}

/// Billing is optional: no `STRIPE_SECRET_KEY` disables it, anything else
/// half-configured is a startup error.
fn billing_from_env(store: Arc<dyn OrderStore>) -> Result<Option<BillingService>, BillingError> {
    let has_key = std::env::var("STRIPE_SECRET_KEY")
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false);

    if !has_key {
        tracing::warn!("Stripe billing not configured (missing STRIPE_SECRET_KEY) - payment routes will return 503");
        return Ok(None);
    }

    let billing = BillingService::from_env(store)?;
    tracing::info!(
        products = billing.catalog().len(),
        checkout_mode = %billing.config.checkout_mode,
        webhook_signing = billing.config.webhook_secret.is_some(),
        "Stripe billing service initialized"
    );
    Ok(Some(billing))
}

//! Stripe client and configuration

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::error::{BillingError, BillingResult};

/// Mode passed to Stripe when creating a hosted checkout session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckoutMode {
    Payment,
    #[default]
    Subscription,
}

impl CheckoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutMode::Payment => "payment",
            CheckoutMode::Subscription => "subscription",
        }
    }
}

impl fmt::Display for CheckoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckoutMode {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "payment" => Ok(CheckoutMode::Payment),
            "subscription" => Ok(CheckoutMode::Subscription),
            other => Err(BillingError::Config(format!(
                "CHECKOUT_MODE must be 'payment' or 'subscription', got '{}'",
                other
            ))),
        }
    }
}

impl From<CheckoutMode> for stripe::CheckoutSessionMode {
    fn from(mode: CheckoutMode) -> Self {
        match mode {
            CheckoutMode::Payment => stripe::CheckoutSessionMode::Payment,
            CheckoutMode::Subscription => stripe::CheckoutSessionMode::Subscription,
        }
    }
}

/// Stripe settings read from the environment
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    /// Signing secret for webhook payloads. Unsigned payloads are accepted when absent.
    pub webhook_secret: Option<String>,
    /// Overrides the Stripe API base URL (stripe-mock, proxies)
    pub api_base: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub checkout_mode: CheckoutMode,
    pub catalog: Catalog,
}

impl fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[redacted]")
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[redacted]"))
            .field("api_base", &self.api_base)
            .field("success_url", &self.success_url)
            .field("cancel_url", &self.cancel_url)
            .field("checkout_mode", &self.checkout_mode)
            .field("catalog", &self.catalog)
            .finish()
    }
}

impl StripeConfig {
    pub fn from_env() -> BillingResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> BillingResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| BillingError::Config(format!("{} not set", key)))
        };

        let secret_key = require("STRIPE_SECRET_KEY")?;
        let success_url = require("SUCCESS_URL")?;
        let cancel_url = require("CANCEL_URL")?;

        let checkout_mode = match get("CHECKOUT_MODE") {
            Some(mode) => mode.parse()?,
            None => CheckoutMode::default(),
        };

        let catalog = Catalog::from_lookup(&get)?;
        if catalog.is_empty() {
            tracing::warn!("No products configured (PRODUCT_PRICE1/PRODUCT_ID1) - checkout will reject every product id");
        }

        Ok(Self {
            secret_key,
            webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
            api_base: get("STRIPE_API_BASE"),
            success_url,
            cancel_url,
            checkout_mode,
            catalog,
        })
    }
}

/// Thin wrapper over the async-stripe client carrying its configuration
#[derive(Clone)]
pub struct StripeClient {
    inner: stripe::Client,
    config: Arc<StripeConfig>,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let inner = match &config.api_base {
            Some(base) => stripe::Client::from_url(base.as_str(), config.secret_key.clone()),
            None => stripe::Client::new(config.secret_key.clone()),
        };

        Self {
            inner,
            config: Arc::new(config),
        }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    pub fn inner(&self) -> &stripe::Client {
        &self.inner
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("STRIPE_SECRET_KEY", "sk_test_123"),
        ("SUCCESS_URL", "http://localhost:3000/success"),
        ("CANCEL_URL", "http://localhost:3000/cancel"),
        ("PRODUCT_PRICE1", "price_a"),
        ("PRODUCT_ID1", "prod_a"),
    ];

    #[test]
    fn test_config_defaults() {
        let config = StripeConfig::from_lookup(lookup(BASE)).unwrap();

        assert_eq!(config.checkout_mode, CheckoutMode::Subscription);
        assert!(config.webhook_secret.is_none());
        assert!(config.api_base.is_none());
        assert_eq!(config.catalog.len(), 1);
    }

    #[test]
    fn test_missing_secret_key_is_config_error() {
        let vars: Vec<(&str, &str)> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "STRIPE_SECRET_KEY")
            .collect();

        let err = StripeConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, BillingError::Config(msg) if msg.contains("STRIPE_SECRET_KEY")));
    }

    #[test]
    fn test_blank_webhook_secret_counts_as_unset() {
        let mut vars = BASE.to_vec();
        vars.push(("STRIPE_WEBHOOK_SECRET", "  "));

        let config = StripeConfig::from_lookup(lookup(&vars)).unwrap();
        assert!(config.webhook_secret.is_none());
    }

    #[test]
    fn test_checkout_mode_parsing() {
        assert_eq!("payment".parse::<CheckoutMode>().unwrap(), CheckoutMode::Payment);
        assert_eq!(
            " Subscription ".parse::<CheckoutMode>().unwrap(),
            CheckoutMode::Subscription
        );
        assert!("setup".parse::<CheckoutMode>().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut vars = BASE.to_vec();
        vars.push(("STRIPE_WEBHOOK_SECRET", "whsec_abc"));
        let config = StripeConfig::from_lookup(lookup(&vars)).unwrap();

        let printed = format!("{:?}", config);
        assert!(!printed.contains("sk_test_123"));
        assert!(!printed.contains("whsec_abc"));
    }
}

//! Stripe webhook handling
//!
//! Verifies the `Stripe-Signature` header, parses the event envelope and
//! fulfills completed checkout sessions. Every accepted event is appended
//! to the payment event log.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use modular_shared::{NewPaymentEvent, OrderStore};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};
use crate::fulfillment::{FulfillmentOutcome, FulfillmentService};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed payload, in seconds
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Events that complete a checkout and trigger fulfillment
const FULFILLMENT_EVENTS: &[&str] = &[
    "checkout.session.completed",
    "checkout.session.async_payment_succeeded",
];

/// Events acknowledged without side effects
const INFORMATIONAL_EVENTS: &[&str] = &[
    "payment_intent.succeeded",
    "setup_intent.created",
    "setup_intent.succeeded",
    "customer.created",
    "customer.updated",
    "payment_method.attached",
    "invoice.created",
    "invoice.finalized",
    "invoice.paid",
    "invoice.payment_succeeded",
    "customer.subscription.created",
];

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

/// Stripe event envelope. Only the fields this service reads are typed.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: i64,
    pub data: WebhookEventData,
    /// The full event body
    #[serde(skip)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CheckoutCompleted,
    Informational,
    Unhandled,
}

impl WebhookEvent {
    pub fn parse(payload: &[u8]) -> BillingResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| BillingError::WebhookPayload(e.to_string()))?;
        let mut event: WebhookEvent = serde_json::from_value(value.clone())
            .map_err(|e| BillingError::WebhookPayload(e.to_string()))?;
        event.payload = value;
        Ok(event)
    }

    pub fn kind(&self) -> EventKind {
        let event_type = self.event_type.as_str();
        if FULFILLMENT_EVENTS.contains(&event_type) {
            EventKind::CheckoutCompleted
        } else if INFORMATIONAL_EVENTS.contains(&event_type) {
            EventKind::Informational
        } else {
            EventKind::Unhandled
        }
    }

    fn object_str(&self, field: &str) -> Option<&str> {
        self.data.object.get(field).and_then(serde_json::Value::as_str)
    }

    pub fn object_id(&self) -> Option<&str> {
        self.object_str("id")
    }

    pub fn client_reference_id(&self) -> Option<&str> {
        self.object_str("client_reference_id")
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.object_str("customer")
    }
}

/// What handling an event did
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Fulfillment(FulfillmentOutcome),
    Acknowledged,
    Unhandled,
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

/// Parse `t=<unix>,v1=<hex>[,v1=<hex>...]`. Other schemes (v0) are ignored.
fn parse_signature_header(header: &str) -> BillingResult<SignatureHeader> {
    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        tracing::warn!("Missing timestamp in signature header");
        BillingError::WebhookSignatureInvalid
    })?;

    if signatures.is_empty() {
        tracing::warn!("Missing v1 signature in signature header");
        return Err(BillingError::WebhookSignatureInvalid);
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn signature_mac(payload: &[u8], timestamp: i64, secret: &str) -> BillingResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| {
        tracing::error!("Invalid webhook secret key");
        BillingError::WebhookSignatureInvalid
    })?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Hex HMAC-SHA256 of `"<timestamp>.<payload>"`, as Stripe signs it.
pub fn compute_signature(payload: &[u8], timestamp: i64, secret: &str) -> BillingResult<String> {
    let mac = signature_mac(payload, timestamp, secret)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a `Stripe-Signature` header against the raw body at unix time `now`.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, now: i64) -> BillingResult<()> {
    let header = parse_signature_header(header)?;

    let age = (now - header.timestamp).abs();
    if age > SIGNATURE_TOLERANCE_SECS {
        tracing::warn!(
            timestamp = header.timestamp,
            now = now,
            diff = age,
            "Webhook timestamp outside tolerance"
        );
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let expected = signature_mac(payload, header.timestamp, secret)?
        .finalize()
        .into_bytes();

    let matched = header
        .signatures
        .iter()
        .any(|candidate| bool::from(expected.as_slice().ct_eq(candidate.as_slice())));

    if !matched {
        tracing::warn!("Webhook signature mismatch");
        return Err(BillingError::WebhookSignatureInvalid);
    }

    Ok(())
}

/// Webhook handler for Stripe events
#[derive(Clone)]
pub struct WebhookHandler {
    webhook_secret: Option<String>,
    fulfillment: FulfillmentService,
    store: Arc<dyn OrderStore>,
}

impl WebhookHandler {
    pub fn new(
        webhook_secret: Option<String>,
        fulfillment: FulfillmentService,
        store: Arc<dyn OrderStore>,
    ) -> Self {
        if webhook_secret.is_none() {
            tracing::warn!("STRIPE_WEBHOOK_SECRET not set - webhook payloads will not be verified");
        }
        Self {
            webhook_secret,
            fulfillment,
            store,
        }
    }

    /// Verify (when a secret is configured) and parse a webhook body.
    pub fn verify_event(&self, payload: &[u8], signature: Option<&str>) -> BillingResult<WebhookEvent> {
        self.verify_event_at(payload, signature, OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn verify_event_at(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: i64,
    ) -> BillingResult<WebhookEvent> {
        match (&self.webhook_secret, signature) {
            (Some(secret), Some(signature)) => verify_signature(payload, signature, secret, now)?,
            (Some(_), None) => return Err(BillingError::WebhookSignatureMissing),
            (None, _) => {
                tracing::debug!("Accepting unsigned webhook payload (no secret configured)");
            }
        }

        WebhookEvent::parse(payload)
    }

    /// Dispatch a verified event and record it in the payment event log.
    pub async fn handle_event(&self, event: &WebhookEvent) -> BillingResult<WebhookOutcome> {
        tracing::info!(event_id = %event.id, event_type = %event.event_type, "Received Stripe event");

        let result = self.process_event(event).await;

        let record = NewPaymentEvent {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            session_id: event.object_id().map(String::from),
            user_id: event.client_reference_id().map(String::from),
            payload: Some(event.payload.clone()),
            processed: result.is_ok(),
            error_message: result.as_ref().err().map(|e| e.to_string()),
        };

        // a failed log write must not fail the webhook
        if let Err(e) = self.store.record_event(record).await {
            tracing::error!(event_id = %event.id, error = %e, "Failed to log webhook event");
        }

        result
    }

    async fn process_event(&self, event: &WebhookEvent) -> BillingResult<WebhookOutcome> {
        match event.kind() {
            EventKind::CheckoutCompleted => {
                let session_id = event.object_id().ok_or_else(|| {
                    BillingError::WebhookPayload("checkout session event without object id".to_string())
                })?;

                tracing::info!(
                    event_type = %event.event_type,
                    session_id = %session_id,
                    user_id = ?event.client_reference_id(),
                    customer_id = ?event.customer_id(),
                    "Checkout completed"
                );

                let outcome = self.fulfillment.fulfill_checkout(session_id).await?;
                Ok(WebhookOutcome::Fulfillment(outcome))
            }
            EventKind::Informational => {
                tracing::debug!(event_type = %event.event_type, object_id = ?event.object_id(), "Acknowledged Stripe event");
                Ok(WebhookOutcome::Acknowledged)
            }
            EventKind::Unhandled => {
                tracing::info!(
                    event_type = %event.event_type,
                    event_id = %event.id,
                    "Received unhandled Stripe event type - no handler configured"
                );
                Ok(WebhookOutcome::Unhandled)
            }
        }
    }
}

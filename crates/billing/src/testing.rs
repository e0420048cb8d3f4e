//! Scripted payment gateway for tests
//!
//! Behaves like a tiny in-process Stripe: sessions are created unpaid and
//! can be marked paid by the test, mimicking the buyer completing the
//! hosted checkout page.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{BillingError, BillingResult};
use crate::gateway::{
    parse_currency, CheckoutRequest, CheckoutSessionInfo, PaymentGateway, PaymentIntentInfo,
    PaymentStatus,
};

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, CheckoutSessionInfo>,
    price_products: Vec<(String, String)>,
    checkout_requests: Vec<CheckoutRequest>,
    retrieve_calls: usize,
    next_id: usize,
    failing: bool,
}

#[derive(Clone, Default)]
pub struct ScriptedGateway {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a price and the product it belongs to.
    pub fn with_price(self, price_id: &str, product_id: &str) -> Self {
        self.lock()
            .price_products
            .push((price_id.to_string(), product_id.to_string()));
        self
    }

    /// Add a session directly, as if created earlier. An empty user id leaves the client reference unset.
    pub fn add_session(&self, user_id: &str, product_id: &str, status: PaymentStatus) -> String {
        let mut inner = self.lock();
        let id = next_id(&mut inner, "cs_test");
        let session = session(&id, user_id, Some(product_id.to_string()), status);
        inner.sessions.insert(id.clone(), session);
        id
    }

    /// Simulate the buyer completing payment on the hosted page.
    pub fn mark_paid(&self, session_id: &str) {
        if let Some(session) = self.lock().sessions.get_mut(session_id) {
            session.payment_status = PaymentStatus::Paid;
        }
    }

    /// Make every subsequent call fail with a Stripe API error.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    pub fn retrieve_calls(&self) -> usize {
        self.lock().retrieve_calls
    }

    pub fn checkout_requests(&self) -> Vec<CheckoutRequest> {
        self.lock().checkout_requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // a panicking test must not poison the others sharing this gateway
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_failing(&self) -> BillingResult<()> {
        if self.lock().failing {
            return Err(BillingError::StripeApi("scripted failure".to_string()));
        }
        Ok(())
    }
}

fn next_id(inner: &mut Inner, prefix: &str) -> String {
    inner.next_id += 1;
    format!("{}_{:04}", prefix, inner.next_id)
}

fn session(
    id: &str,
    user_id: &str,
    product_id: Option<String>,
    status: PaymentStatus,
) -> CheckoutSessionInfo {
    let line_items = product_id.as_ref().map(|product| {
        serde_json::json!({
            "object": "list",
            "data": [{ "price": { "product": product } }]
        })
    });

    CheckoutSessionInfo {
        id: id.to_string(),
        url: Some(format!("https://checkout.stripe.test/c/pay/{}", id)),
        payment_status: status,
        client_reference_id: Some(user_id.to_string()).filter(|u| !u.is_empty()),
        customer_id: Some("cus_test".to_string()),
        line_items,
        product_id,
        amount_total: Some(1000),
        currency: Some("eur".to_string()),
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> BillingResult<CheckoutSessionInfo> {
        self.check_failing()?;

        let mut inner = self.lock();
        let product_id = inner
            .price_products
            .iter()
            .find(|(price, _)| *price == request.price_id)
            .map(|(_, product)| product.clone());

        let id = next_id(&mut inner, "cs_test");
        let created = session(&id, &request.user_id, product_id, PaymentStatus::Unpaid);
        inner.sessions.insert(id, created.clone());
        inner.checkout_requests.push(request);
        Ok(created)
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> BillingResult<CheckoutSessionInfo> {
        self.check_failing()?;

        let mut inner = self.lock();
        inner.retrieve_calls += 1;
        inner.sessions.get(session_id).cloned().ok_or_else(|| {
            BillingError::StripeApi(format!("No such checkout.session: '{}'", session_id))
        })
    }

    async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
    ) -> BillingResult<PaymentIntentInfo> {
        self.check_failing()?;
        parse_currency(currency)?;
        if amount <= 0 {
            return Err(BillingError::StripeApi(
                "Amount must be greater than zero".to_string(),
            ));
        }

        let id = next_id(&mut self.lock(), "pi_test");
        Ok(PaymentIntentInfo {
            client_secret: Some(format!("{}_secret_test", id)),
            id,
        })
    }

    async fn list_price_ids(&self) -> BillingResult<Vec<String>> {
        self.check_failing()?;
        Ok(self
            .lock()
            .price_products
            .iter()
            .map(|(price, _)| price.clone())
            .collect())
    }

    async fn list_product_ids(&self) -> BillingResult<Vec<String>> {
        self.check_failing()?;
        Ok(self
            .lock()
            .price_products
            .iter()
            .map(|(_, product)| product.clone())
            .collect())
    }
}

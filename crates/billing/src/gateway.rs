//! Payment processor port and its Stripe adapter

use async_trait::async_trait;
use serde::Serialize;
use stripe::{
    CheckoutSession, CheckoutSessionId, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreatePaymentIntent, Currency, Expandable, ListPrices, ListProducts, PaymentIntent, Price,
    Product,
};

use crate::client::{CheckoutMode, StripeClient};
use crate::error::{BillingError, BillingResult};

/// Stripe returns at most this many objects per list call
const LIST_LIMIT: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::NoPaymentRequired => "no_payment_required",
        }
    }
}

/// The parts of a hosted checkout session this service reads
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutSessionInfo {
    pub id: String,
    pub url: Option<String>,
    pub payment_status: PaymentStatus,
    /// Buyer's user id, set when the session was created
    pub client_reference_id: Option<String>,
    pub customer_id: Option<String>,
    pub line_items: Option<serde_json::Value>,
    /// Stripe product of the first line item
    pub product_id: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub price_id: String,
    pub quantity: u64,
    pub user_id: String,
    pub mode: CheckoutMode,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentIntentInfo {
    pub id: String,
    pub client_secret: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> BillingResult<CheckoutSessionInfo>;

    /// Fetch a session with its line items expanded.
    async fn retrieve_checkout_session(&self, session_id: &str)
        -> BillingResult<CheckoutSessionInfo>;

    /// `currency` is an ISO code such as "eur"; `amount` is in minor units.
    async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
    ) -> BillingResult<PaymentIntentInfo>;

    async fn list_price_ids(&self) -> BillingResult<Vec<String>>;

    async fn list_product_ids(&self) -> BillingResult<Vec<String>>;
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> BillingResult<CheckoutSessionInfo> {
        let mut params = CreateCheckoutSession::new();
        params.mode = Some(request.mode.into());
        params.client_reference_id = Some(request.user_id.as_str());
        params.success_url = Some(request.success_url.as_str());
        params.cancel_url = Some(request.cancel_url.as_str());
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(request.price_id.clone()),
            quantity: Some(request.quantity),
            ..Default::default()
        }]);

        let session = CheckoutSession::create(self.inner(), params).await?;

        tracing::debug!(session_id = %session.id, "Created Stripe checkout session");
        Ok(session_info(session))
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> BillingResult<CheckoutSessionInfo> {
        let id = session_id
            .parse::<CheckoutSessionId>()
            .map_err(|_| BillingError::InvalidSessionId(session_id.to_string()))?;

        let session = CheckoutSession::retrieve(self.inner(), &id, &["line_items"]).await?;
        Ok(session_info(session))
    }

    async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
    ) -> BillingResult<PaymentIntentInfo> {
        let currency = parse_currency(currency)?;
        let params = CreatePaymentIntent::new(amount, currency);

        let intent = PaymentIntent::create(self.inner(), params).await?;

        Ok(PaymentIntentInfo {
            id: intent.id.to_string(),
            client_secret: intent.client_secret,
        })
    }

    async fn list_price_ids(&self) -> BillingResult<Vec<String>> {
        let mut params = ListPrices::new();
        params.limit = Some(LIST_LIMIT);

        let prices = Price::list(self.inner(), &params).await?;
        Ok(prices.data.into_iter().map(|p| p.id.to_string()).collect())
    }

    async fn list_product_ids(&self) -> BillingResult<Vec<String>> {
        let mut params = ListProducts::new();
        params.limit = Some(LIST_LIMIT);

        let products = Product::list(self.inner(), &params).await?;
        Ok(products.data.into_iter().map(|p| p.id.to_string()).collect())
    }
}

fn session_info(session: CheckoutSession) -> CheckoutSessionInfo {
    let payment_status = match session.payment_status.as_str() {
        "paid" => PaymentStatus::Paid,
        "no_payment_required" => PaymentStatus::NoPaymentRequired,
        _ => PaymentStatus::Unpaid,
    };

    let customer_id = session.customer.as_ref().map(|customer| match customer {
        Expandable::Id(id) => id.to_string(),
        Expandable::Object(customer) => customer.id.to_string(),
    });

    let product_id = session
        .line_items
        .as_ref()
        .and_then(|items| items.data.first())
        .and_then(|item| item.price.as_ref())
        .and_then(|price| price.product.as_ref())
        .map(|product| match product {
            Expandable::Id(id) => id.to_string(),
            Expandable::Object(product) => product.id.to_string(),
        });

    let line_items = session
        .line_items
        .as_ref()
        .and_then(|items| serde_json::to_value(items).ok());

    CheckoutSessionInfo {
        id: session.id.to_string(),
        url: session.url,
        payment_status,
        client_reference_id: session.client_reference_id,
        customer_id,
        line_items,
        product_id,
        amount_total: session.amount_total,
        currency: session.currency.and_then(currency_code),
    }
}

/// Parse an ISO currency code the way Stripe spells it ("eur", "usd").
pub fn parse_currency(code: &str) -> BillingResult<Currency> {
    let normalized = code.trim().to_ascii_lowercase();
    serde_json::from_value(serde_json::Value::String(normalized))
        .map_err(|_| BillingError::InvalidInput(format!("Unsupported currency: {}", code)))
}

fn currency_code(currency: Currency) -> Option<String> {
    match serde_json::to_value(currency) {
        Ok(serde_json::Value::String(code)) => Some(code),
        _ => None,
    }
}

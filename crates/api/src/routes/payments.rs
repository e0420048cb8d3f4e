//! Payment routes
//!
//! Everything here except the health check sits behind the billing gate in
//! [`super::create_router`]; checkout, order status, orders and catalog
//! validation also require a bearer token.

use axum::{
    body::Bytes,
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use modular_billing::{BillingError, CatalogValidation, CheckoutResponse, WebhookOutcome};
use modular_shared::Order;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::{
    auth::AuthUser,
    error::{codes, ApiError, ApiResult},
    state::AppState,
};

const STRIPE_SIGNATURE: &str = "Stripe-Signature";

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct PaymentIntentRequest {
    pub amount: Option<i64>,
    pub currency: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub client_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    pub quantity: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    pub has_paid: bool,
}

#[derive(Debug, Serialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create a payment intent for an embedded payment form.
///
/// Errors use the `{"error": ...}` shape the payment form expects rather
/// than the coded API error body.
pub async fn create_payment_intent(State(state): State<AppState>, body: Bytes) -> Response {
    let billing = match state.billing_service() {
        Ok(billing) => billing,
        Err(err) => return err.into_response(),
    };

    // an unparseable body is treated the same as a missing amount/currency
    let request: PaymentIntentRequest = serde_json::from_slice(&body).unwrap_or_default();
    let amount = request.amount.unwrap_or_default();
    let currency = request.currency.unwrap_or_default();

    match billing.checkout.create_payment_intent(amount, &currency).await {
        Ok(intent) => Json(PaymentIntentResponse {
            client_secret: intent.client_secret,
        })
        .into_response(),
        Err(BillingError::InvalidInput(message)) => {
            tracing::warn!(code = codes::PAYMENT_INTENT, error = %message, "Rejected payment intent request");
            (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
        }
        Err(err) => {
            tracing::error!(code = codes::PAYMENT_INTENT, error = %err, "Error creating PaymentIntent");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal Server Error" })),
            )
                .into_response()
        }
    }
}

/// Start a hosted checkout for catalog product `id`.
pub async fn checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<CheckoutResponse>> {
    let billing = state.billing_service()?;

    let request: CheckoutRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CheckoutRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            ApiError::validation(codes::CHECKOUT, format!("Invalid request body: {}", e))
        })?
    };

    let response = billing
        .checkout
        .checkout(&id, request.quantity.unwrap_or(1), &user.user_id)
        .await
        .map_err(|e| ApiError::billing(codes::CHECKOUT, e))?;

    Ok(Json(response))
}

/// Stripe webhook endpoint.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let billing = state.billing_service()?;

    let signature = headers.get(STRIPE_SIGNATURE).and_then(|v| v.to_str().ok());

    let event = billing
        .webhooks
        .verify_event(&body, signature)
        .map_err(|e| ApiError::billing(codes::WEBHOOK, e))?;

    let outcome = billing
        .webhooks
        .handle_event(&event)
        .await
        .map_err(|e| ApiError::billing(codes::WEBHOOK, e))?;

    if let WebhookOutcome::Fulfillment(outcome) = &outcome {
        tracing::debug!(event_id = %event.id, outcome = ?outcome, "Webhook fulfillment finished");
    }

    Ok(Json(json!({ "received": true })))
}

/// Whether the caller paid for catalog product `product_id` within the validity window.
pub async fn order_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(product_id): Path<String>,
) -> ApiResult<Json<OrderStatusResponse>> {
    let billing = state.billing_service()?;

    let entry = billing
        .catalog()
        .resolve(&product_id)
        .map_err(|e| ApiError::billing(codes::ORDER_STATUS, e))?;

    let has_paid = billing
        .fulfillment
        .has_paid(&user.user_id, &entry.product_id, OffsetDateTime::now_utc())
        .await
        .map_err(|e| ApiError::billing(codes::ORDER_STATUS, e))?;

    Ok(Json(OrderStatusResponse { has_paid }))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<OrdersResponse>> {
    let billing = state.billing_service()?;

    let orders = billing
        .fulfillment
        .orders_for_user(&user.user_id)
        .await
        .map_err(|e| ApiError::billing(codes::ORDERS, e))?;

    Ok(Json(OrdersResponse { orders }))
}

pub async fn validate_catalog(State(state): State<AppState>) -> ApiResult<Json<CatalogValidation>> {
    let billing = state.billing_service()?;

    let report = billing
        .validate_catalog()
        .await
        .map_err(|e| ApiError::billing(codes::CATALOG, e))?;

    Ok(Json(report))
}

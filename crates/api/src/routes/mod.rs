//! HTTP routes

pub mod health;
pub mod payments;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};

use crate::{auth::require_auth, state::AppState};

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/checkout/{id}", post(payments::checkout))
        .route("/checkout/{id}/", post(payments::checkout))
        .route("/order-status/{product_id}", get(payments::order_status))
        .route("/order-status/{product_id}/", get(payments::order_status))
        .route("/orders", get(payments::list_orders))
        .route("/validate", get(payments::validate_catalog))
        .route_layer(middleware::from_fn_with_state(
            state.jwks.clone(),
            require_auth,
        ));

    let payments = Router::new()
        .route(
            "/create-payment-intent",
            post(payments::create_payment_intent),
        )
        .route("/webhook", post(payments::webhook))
        .merge(protected)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_billing,
        ))
        // registered after the billing gate so it answers without Stripe
        .route("/health", get(health::payments_health));

    Router::new()
        .route("/api/healthcheck", get(health::healthcheck))
        .nest("/api/payments", payments)
        .layer(middleware::from_fn(no_cache))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Middleware that answers 503 on payment routes when Stripe is not configured
async fn require_billing(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match state.billing_service() {
        Ok(_) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

async fn log_request(request: Request, next: Next) -> Response {
    tracing::info!("Received {} request to {}", request.method(), request.uri().path());
    next.run(request).await
}

async fn no_cache(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, proxy-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    response
}

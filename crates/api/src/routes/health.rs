//! Liveness endpoints

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn healthcheck(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": format!("I'm alive and answering on port {}", state.config.port)
    }))
}

#[derive(Debug, Serialize)]
pub struct PaymentsHealth {
    pub status: &'static str,
    pub stripe_configured: bool,
    pub service: &'static str,
}

pub async fn payments_health(State(state): State<AppState>) -> Json<PaymentsHealth> {
    Json(PaymentsHealth {
        status: "healthy",
        stripe_configured: state.billing.is_some(),
        service: "payments",
    })
}

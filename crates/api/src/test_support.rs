//! Helpers shared by the router and auth tests

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use modular_billing::{
    testing::ScriptedGateway, BillingService, Catalog, CatalogEntry, CheckoutMode, StripeConfig,
};
use modular_shared::{MemoryOrderStore, OrderStore};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::{config::Config, routes::create_router, state::AppState};

pub const KID: &str = "test-key-1";
pub const JWKS: &str = include_str!("auth/testdata/jwks.json");
pub const SIGNING_KEY: &[u8] = include_bytes!("auth/testdata/signing_key.pem");
pub const ROGUE_KEY: &[u8] = include_bytes!("auth/testdata/rogue_key.pem");

/// Sign a token with the given key. `exp_in` is relative to now and may be negative.
pub fn sign_with(key: &[u8], kid: Option<&str>, sub: Option<&str>, exp_in: i64) -> String {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(String::from);

    let mut claims = json!({ "iat": now, "exp": now + exp_in, "iss": "https://auth.test" });
    if let Some(sub) = sub {
        claims["sub"] = json!(sub);
    }

    encode(&header, &claims, &EncodingKey::from_rsa_pem(key).unwrap()).unwrap()
}

pub fn token_for(sub: &str) -> String {
    sign_with(SIGNING_KEY, Some(KID), Some(sub), 3600)
}

pub fn bearer(sub: &str) -> String {
    format!("Bearer {}", token_for(sub))
}

/// Mock identity provider serving the test JWKS.
pub async fn jwks_server() -> (mockito::ServerGuard, mockito::Mock) {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/.well-known/jwks.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(JWKS)
        .create_async()
        .await;
    (server, mock)
}

pub fn config(auth_url: &str, jwks_cache_ttl: Duration) -> Config {
    let auth_url = auth_url.to_string();
    let mut config = Config::from_lookup(|key| match key {
        "AUTH_URL" => Some(auth_url.clone()),
        _ => None,
    })
    .unwrap();
    config.jwks_cache_ttl = jwks_cache_ttl;
    config
}

pub fn stripe_config(webhook_secret: Option<&str>) -> StripeConfig {
    StripeConfig {
        secret_key: "sk_test_123".to_string(),
        webhook_secret: webhook_secret.map(String::from),
        api_base: None,
        success_url: "http://localhost:3000/success".to_string(),
        cancel_url: "http://localhost:3000/cancel".to_string(),
        checkout_mode: CheckoutMode::Subscription,
        catalog: Catalog::new(vec![
            CatalogEntry {
                slot: "1".to_string(),
                price_id: "price_basic".to_string(),
                product_id: "prod_basic".to_string(),
            },
            CatalogEntry {
                slot: "2".to_string(),
                price_id: "price_pro".to_string(),
                product_id: "prod_pro".to_string(),
            },
        ]),
    }
}

/// Router wired to a scripted Stripe and an in-memory order store.
pub struct TestApp {
    pub router: Router,
    pub gateway: ScriptedGateway,
    pub store: MemoryOrderStore,
    // keeps the mock identity provider alive for the test's duration
    pub _jwks: (mockito::ServerGuard, mockito::Mock),
}

impl TestApp {
    pub async fn new(webhook_secret: Option<&str>) -> Self {
        let (server, mock) = jwks_server().await;
        let gateway = ScriptedGateway::new()
            .with_price("price_basic", "prod_basic")
            .with_price("price_pro", "prod_pro");
        let store = MemoryOrderStore::new();
        let store_dyn: Arc<dyn OrderStore> = Arc::new(store.clone());

        let billing = BillingService::with_gateway(
            stripe_config(webhook_secret),
            Arc::new(gateway.clone()),
            store_dyn.clone(),
        );
        let state = AppState::with_billing(
            config(&server.url(), Duration::from_secs(300)),
            store_dyn,
            Some(billing),
        );

        Self {
            router: create_router(state),
            gateway,
            store,
            _jwks: (server, mock),
        }
    }

    /// App with no Stripe configuration at all.
    pub async fn without_billing() -> Self {
        let (server, mock) = jwks_server().await;
        let store = MemoryOrderStore::new();
        let state = AppState::with_billing(
            config(&server.url(), Duration::from_secs(300)),
            Arc::new(store.clone()),
            None,
        );

        Self {
            router: create_router(state),
            gateway: ScriptedGateway::new(),
            store,
            _jwks: (server, mock),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        send(&self.router, request).await
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub fn get(uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(authorization) = authorization {
        builder = builder.header("authorization", authorization);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, authorization: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post(uri).header("content-type", "application/json");
    if let Some(authorization) = authorization {
        builder = builder.header("authorization", authorization);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

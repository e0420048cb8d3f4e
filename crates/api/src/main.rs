#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Modular Template API Server
//!
//! Verifies bearer tokens against the identity provider and fronts Stripe
//! checkout, payment intents and webhook fulfillment.

use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use modular_api::{
    config::{CorsOrigins, Environment},
    create_router, AppState, Config,
};
use modular_shared::{create_pool, run_migrations, MemoryOrderStore, OrderStore, PgOrderStore};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("invalid server configuration")?;
    init_tracing(config.environment);

    tracing::info!(
        environment = %config.environment,
        "Starting Modular Template API Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let store: Arc<dyn OrderStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = create_pool(database_url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            tracing::info!("Database connection established");

            if config.run_migrations {
                tracing::info!("Running database migrations...");
                run_migrations(&pool).await.context("database migrations failed")?;
                tracing::info!("Migrations complete");
            }

            Arc::new(PgOrderStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set - orders are kept in memory and lost on restart");
            Arc::new(MemoryOrderStore::new())
        }
    };

    let state = AppState::new(config.clone(), store).context("invalid Stripe configuration")?;

    if let Some(billing) = state.billing.clone() {
        tokio::spawn(async move {
            match billing.validate_catalog().await {
                Ok(report) if report.all_valid => {
                    tracing::info!(products = report.products.len(), "Product catalog matches Stripe");
                }
                Ok(_) => {
                    tracing::warn!("Product catalog has ids Stripe does not know - see GET /api/payments/validate");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Could not validate product catalog against Stripe");
                }
            }
        });
    }

    let app = create_router(state)
        .layer(cors_layer(&config.cors_origins))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    let addr = config.socket_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Modular Template API is listening on port {}", config.port);
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(environment: Environment) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,modular_api=debug,modular_billing=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if environment.is_prod() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    match origins {
        CorsOrigins::Any => {
            tracing::info!("CORS configured for any origin");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        CorsOrigins::List(list) => {
            let allowed_origins: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();

            tracing::info!(
                allowed_origins = ?list,
                "CORS configured with {} allowed origins",
                allowed_origins.len()
            );

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(allowed_origins))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::ORIGIN,
                    axum::http::HeaderName::from_static("stripe-signature"),
                ])
                .expose_headers([header::CONTENT_TYPE])
                .allow_credentials(true)
        }
    }
}

// API crate clippy configuration
// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Modular Template API Library
//!
//! This crate contains the HTTP server components: token verification,
//! payment routes and the application state that wires them to billing.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

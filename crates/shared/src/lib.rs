#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Modular Template shared persistence
//!
//! Database pool setup, migrations and the order store used by the
//! billing and API crates.

pub mod db;
pub mod error;
pub mod models;
pub mod store;

pub use db::{create_pool, run_migrations};
pub use error::{StoreError, StoreResult};
pub use models::{NewOrder, NewPaymentEvent, Order, PaymentEvent};
pub use store::{InsertOutcome, MemoryOrderStore, OrderStore, PgOrderStore};

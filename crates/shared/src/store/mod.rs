//! Order persistence port and its adapters

mod memory;
mod postgres;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::StoreResult;
use crate::models::{NewOrder, NewPaymentEvent, Order};

pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

/// Result of inserting an order for a session
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(Order),
    /// A row for this session id was already present
    AlreadyExists,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_session_id(&self, session_id: &str) -> StoreResult<Option<Order>>;

    /// Insert an order unless one already exists for the session id.
    async fn insert_order(&self, order: NewOrder) -> StoreResult<InsertOutcome>;

    /// Most recent fulfilled order for a user and product created at or after `since`.
    async fn find_recent_fulfilled(
        &self,
        user_id: &str,
        product_id: &str,
        since: OffsetDateTime,
    ) -> StoreResult<Option<Order>>;

    /// All orders for a user, newest first.
    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Order>>;

    /// Append a webhook event to the audit log. Duplicate event ids are ignored.
    async fn record_event(&self, event: NewPaymentEvent) -> StoreResult<()>;
}

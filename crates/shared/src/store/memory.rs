use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{InsertOutcome, OrderStore};
use crate::error::StoreResult;
use crate::models::{NewOrder, NewPaymentEvent, Order, PaymentEvent};

/// Process-local order store, used when no database is configured
#[derive(Clone, Default)]
pub struct MemoryOrderStore {
    orders: Arc<RwLock<Vec<Order>>>,
    events: Arc<RwLock<Vec<PaymentEvent>>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row as-is, bypassing the session id check. Used to seed fixtures.
    pub async fn seed(&self, order: Order) {
        self.orders.write().await.push(order);
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.orders.read().await.clone()
    }

    pub async fn events(&self) -> Vec<PaymentEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn find_by_session_id(&self, session_id: &str) -> StoreResult<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.iter().find(|o| o.session_id == session_id).cloned())
    }

    async fn insert_order(&self, order: NewOrder) -> StoreResult<InsertOutcome> {
        let mut orders = self.orders.write().await;
        if orders.iter().any(|o| o.session_id == order.session_id) {
            return Ok(InsertOutcome::AlreadyExists);
        }

        let order = order.into_order(OffsetDateTime::now_utc());
        orders.push(order.clone());
        Ok(InsertOutcome::Inserted(order))
    }

    async fn find_recent_fulfilled(
        &self,
        user_id: &str,
        product_id: &str,
        since: OffsetDateTime,
    ) -> StoreResult<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .iter()
            .filter(|o| {
                o.user_id == user_id
                    && o.product_id == product_id
                    && o.fulfilled
                    && o.created_at >= since
            })
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut found: Vec<Order> = orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn record_event(&self, event: NewPaymentEvent) -> StoreResult<()> {
        let mut events = self.events.write().await;
        if let Some(existing) = events.iter_mut().find(|e| e.event_id == event.event_id) {
            // a delivery that failed earlier is overwritten by the retry's result
            if !existing.processed {
                existing.processed = event.processed;
                existing.error_message = event.error_message;
            }
            return Ok(());
        }

        events.push(PaymentEvent {
            id: uuid::Uuid::new_v4(),
            event_id: event.event_id,
            event_type: event.event_type,
            session_id: event.session_id,
            user_id: event.user_id,
            payload: event.payload,
            processed: event.processed,
            error_message: event.error_message,
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(())
    }
}

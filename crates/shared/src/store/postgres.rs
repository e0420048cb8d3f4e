use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{InsertOutcome, OrderStore};
use crate::error::StoreResult;
use crate::models::{NewOrder, NewPaymentEvent, Order};

const ORDER_COLUMNS: &str = "id, session_id, user_id, items, customer_id, product_id, \
     payment_status, amount_total, currency, fulfilled, created_at";

/// Order store backed by the `orders` and `payment_events` tables
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn find_by_session_id(&self, session_id: &str) -> StoreResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn insert_order(&self, order: NewOrder) -> StoreResult<InsertOutcome> {
        // The unique index on session_id decides concurrent inserts for the same session.
        let inserted = sqlx::query_as::<_, Order>(&format!(
            r#"
            INSERT INTO orders
                (id, session_id, user_id, items, customer_id, product_id,
                 payment_status, amount_total, currency, fulfilled)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (session_id) DO NOTHING
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&order.session_id)
        .bind(&order.user_id)
        .bind(&order.items)
        .bind(&order.customer_id)
        .bind(&order.product_id)
        .bind(&order.payment_status)
        .bind(order.amount_total)
        .bind(&order.currency)
        .bind(order.fulfilled)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match inserted {
            Some(order) => InsertOutcome::Inserted(order),
            None => InsertOutcome::AlreadyExists,
        })
    }

    async fn find_recent_fulfilled(
        &self,
        user_id: &str,
        product_id: &str,
        since: OffsetDateTime,
    ) -> StoreResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE user_id = $1
              AND product_id = $2
              AND fulfilled = TRUE
              AND created_at >= $3
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .bind(product_id)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn record_event(&self, event: NewPaymentEvent) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_events
                (id, event_id, event_type, session_id, user_id, payload, processed, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (event_id) DO UPDATE
                SET processed = EXCLUDED.processed,
                    error_message = EXCLUDED.error_message
                WHERE payment_events.processed = FALSE
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(&event.session_id)
        .bind(&event.user_id)
        .bind(&event.payload)
        .bind(event.processed)
        .bind(&event.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations};
    use crate::models::PaymentEvent;

    async fn store() -> (PgOrderStore, PgPool) {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
        let pool = create_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        (PgOrderStore::new(pool.clone()), pool)
    }

    fn unique(prefix: &str) -> String {
        format!("{}_{}", prefix, Uuid::new_v4().simple())
    }

    #[tokio::test]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn test_insert_is_unique_per_session() {
        let (store, _pool) = store().await;
        let session_id = unique("cs");
        let user_id = unique("user");

        let order = NewOrder {
            session_id: session_id.clone(),
            user_id: user_id.clone(),
            product_id: "prod_1".to_string(),
            amount_total: Some(1500),
            fulfilled: true,
            ..Default::default()
        };

        let first = store.insert_order(order.clone()).await.unwrap();
        let InsertOutcome::Inserted(inserted) = first else {
            panic!("first insert should return the row");
        };
        assert_eq!(inserted.session_id, session_id);
        assert_eq!(inserted.amount_total, Some(1500));

        let second = store
            .insert_order(NewOrder {
                user_id: unique("other"),
                ..order
            })
            .await
            .unwrap();
        assert_eq!(second, InsertOutcome::AlreadyExists);

        let orders = store.list_for_user(&user_id).await.unwrap();
        assert_eq!(orders.len(), 1);

        let since = OffsetDateTime::now_utc() - time::Duration::days(30);
        let found = store
            .find_recent_fulfilled(&user_id, "prod_1", since)
            .await
            .unwrap();
        assert_eq!(found.map(|o| o.id), Some(inserted.id));
    }

    #[tokio::test]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn test_record_event_retry_clears_failure() {
        let (store, pool) = store().await;
        let event_id = unique("evt");
        let failed = NewPaymentEvent {
            event_id: event_id.clone(),
            event_type: "checkout.session.completed".to_string(),
            processed: false,
            error_message: Some("Stripe API error: timeout".to_string()),
            ..Default::default()
        };

        store.record_event(failed.clone()).await.unwrap();
        store
            .record_event(NewPaymentEvent {
                processed: true,
                error_message: None,
                ..failed.clone()
            })
            .await
            .unwrap();
        store.record_event(failed).await.unwrap();

        let rows = sqlx::query_as::<_, PaymentEvent>(
            "SELECT id, event_id, event_type, session_id, user_id, payload, processed, \
             error_message, created_at FROM payment_events WHERE event_id = $1",
        )
        .bind(&event_id)
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert!(rows[0].processed);
        assert!(rows[0].error_message.is_none());
    }
}

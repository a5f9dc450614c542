use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::event_sourcing::core::EventEnvelope;
use super::aggregate::Order;
use super::errors::OrderError;
use super::events::OrderEvent;

// ============================================================================
// Order Store - One Committed Write per Order at a Time
// ============================================================================
//
// `transact` holds the order's row lock for the whole unit of work. The work
// runs against a working copy; the copy and its envelopes are committed only
// when the work returns Ok, so a rejected command leaves no trace.
//
// ============================================================================

pub type OrderEnvelope = EventEnvelope<OrderEvent>;

pub type UnitOfWork = Box<dyn FnOnce(&mut Order) -> Result<Vec<OrderEnvelope>, OrderError> + Send>;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Monotonic, never reused
    async fn next_order_number(&self) -> u64;

    async fn insert(&self, order: Order, created: OrderEnvelope) -> Result<(), OrderError>;

    async fn load(&self, order_id: Uuid) -> Result<Order, OrderError>;

    /// Snapshot of every order, in order-number sequence
    async fn list(&self) -> Vec<Order>;

    async fn history(&self, order_id: Uuid) -> Result<Vec<OrderEnvelope>, OrderError>;

    async fn transact(&self, order_id: Uuid, work: UnitOfWork) -> Result<(Order, Vec<OrderEnvelope>), OrderError>;
}

struct OrderRow {
    order: Order,
    history: Vec<OrderEnvelope>,
}

pub struct InMemoryOrderStore {
    rows: RwLock<HashMap<Uuid, Arc<Mutex<OrderRow>>>>,
    sequence: AtomicU64,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    async fn row(&self, order_id: Uuid) -> Result<Arc<Mutex<OrderRow>>, OrderError> {
        self.rows
            .read()
            .await
            .get(&order_id)
            .cloned()
            .ok_or(OrderError::OrderNotFound(order_id))
    }
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn next_order_number(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn insert(&self, order: Order, created: OrderEnvelope) -> Result<(), OrderError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&order.id) {
            return Err(OrderError::DuplicateOrder(order.id));
        }

        tracing::debug!(order_id = %order.id, order_number = order.order_number, "Inserted order");

        rows.insert(
            order.id,
            Arc::new(Mutex::new(OrderRow {
                order,
                history: vec![created],
            })),
        );
        Ok(())
    }

    async fn load(&self, order_id: Uuid) -> Result<Order, OrderError> {
        let row = self.row(order_id).await?;
        let row = row.lock().await;
        Ok(row.order.clone())
    }

    async fn list(&self) -> Vec<Order> {
        let rows: Vec<_> = self.rows.read().await.values().cloned().collect();

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            orders.push(row.lock().await.order.clone());
        }
        orders.sort_by_key(|order| order.order_number);
        orders
    }

    async fn history(&self, order_id: Uuid) -> Result<Vec<OrderEnvelope>, OrderError> {
        let row = self.row(order_id).await?;
        let row = row.lock().await;
        Ok(row.history.clone())
    }

    async fn transact(&self, order_id: Uuid, work: UnitOfWork) -> Result<(Order, Vec<OrderEnvelope>), OrderError> {
        let row = self.row(order_id).await?;
        let mut row = row.lock().await;

        let mut working = row.order.clone();
        let envelopes = work(&mut working)?;

        row.order = working.clone();
        row.history.extend(envelopes.iter().cloned());

        tracing::debug!(
            order_id = %order_id,
            version = working.version,
            event_count = envelopes.len(),
            "Committed order write"
        );

        Ok((working, envelopes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::value_objects::{Actor, MenuItem, Money, NewItem, OrderKind, Role};
    use crate::event_sourcing::core::Aggregate;

    async fn seeded(store: &InMemoryOrderStore) -> Uuid {
        let waiter = Actor::new("wendy", Role::Waiter);
        let number = store.next_order_number().await;
        let items = vec![NewItem::new(MenuItem::new("soda", Money::cents(250)), 1)];
        let created = Order::open(Uuid::new_v4(), number, OrderKind::DineIn, &waiter, items).unwrap();
        let order = Order::apply_first_event(&created).unwrap();
        let id = order.id;
        let envelope = EventEnvelope::new(id, 1, created.name().to_string(), created, Uuid::new_v4());
        store.insert(order, envelope).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_order_numbers_are_unique() {
        let store = InMemoryOrderStore::new();
        let a = store.next_order_number().await;
        let b = store.next_order_number().await;
        assert_ne!(a, b);
        assert_eq!(b, a + 1);
    }

    #[tokio::test]
    async fn test_failed_work_commits_nothing() {
        let store = InMemoryOrderStore::new();
        let id = seeded(&store).await;

        let result = store
            .transact(
                id,
                Box::new(|order: &mut Order| -> Result<Vec<OrderEnvelope>, OrderError> {
                    order.cancel_reason = Some("scribbled".into());
                    Err(OrderError::EmptyItems)
                }),
            )
            .await;

        assert!(matches!(result, Err(OrderError::EmptyItems)));
        assert_eq!(store.load(id).await.unwrap().cancel_reason, None);
        assert_eq!(store.history(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_and_missing_orders() {
        let store = InMemoryOrderStore::new();
        let id = seeded(&store).await;
        let order = store.load(id).await.unwrap();
        let history = store.history(id).await.unwrap();

        assert!(matches!(
            store.insert(order, history[0].clone()).await,
            Err(OrderError::DuplicateOrder(_))
        ));
        assert!(matches!(
            store.load(Uuid::new_v4()).await,
            Err(OrderError::OrderNotFound(_))
        ));
        assert_eq!(store.list().await.len(), 1);
    }
}

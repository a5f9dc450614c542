use std::sync::Arc;
use uuid::Uuid;

use crate::event_sourcing::core::{Aggregate, DomainEvent, EventEnvelope};

use super::aggregate::Order;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::OrderEvent;
use super::repository::{OrderEnvelope, OrderStore};
use super::value_objects::{Actor, NewItem, OrderKind};

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: Command → Aggregate → Events → Order Store
//
// Command handling and event application both run inside the store's unit of
// work, so the claim check and the status change commit together.
//
// ============================================================================

/// An order write that made it into the store
#[derive(Debug, Clone)]
pub struct Committed {
    pub order: Order,
    pub events: Vec<OrderEnvelope>,
}

pub struct OrderCommandHandler {
    store: Arc<dyn OrderStore>,
}

impl OrderCommandHandler {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// Validate a new order without storing it
    pub async fn draft(&self, kind: OrderKind, actor: &Actor, items: Vec<NewItem>) -> Result<OrderEvent, OrderError> {
        let order_number = self.store.next_order_number().await;
        Order::open(Uuid::new_v4(), order_number, kind, actor, items)
    }

    /// Store a drafted order
    pub async fn create(&self, created: OrderEvent, actor: &Actor, correlation_id: Uuid) -> Result<Committed, OrderError> {
        let order = Order::apply_first_event(&created)?;
        let envelope = wrap(order.id, order.version(), created, actor, correlation_id);

        self.store.insert(order.clone(), envelope.clone()).await?;

        Ok(Committed {
            order,
            events: vec![envelope],
        })
    }

    /// Handle a command and persist resulting events
    pub async fn handle(&self, order_id: Uuid, command: OrderCommand, correlation_id: Uuid) -> Result<Committed, OrderError> {
        let (order, events) = self
            .store
            .transact(
                order_id,
                Box::new(move |order: &mut Order| {
                    let domain_events = order.handle_command(&command)?;
                    let actor = command.actor();

                    let mut envelopes = Vec::with_capacity(domain_events.len());
                    for domain_event in domain_events {
                        order.apply_event(&domain_event)?;
                        let envelope = wrap(order_id, order.version(), domain_event, actor, correlation_id);
                        order.record_timestamp(envelope.timestamp);
                        envelopes.push(envelope);
                    }
                    Ok(envelopes)
                }),
            )
            .await?;

        Ok(Committed { order, events })
    }
}

fn wrap(order_id: Uuid, sequence_number: i64, event: OrderEvent, actor: &Actor, correlation_id: Uuid) -> OrderEnvelope {
    let event_type = event.name().to_string();
    EventEnvelope::new(order_id, sequence_number, event_type, event, correlation_id)
        .with_actor(actor.id.as_str())
        .with_metadata("role", actor.role.as_str())
        .with_metadata("stream", OrderEvent::event_type())
}

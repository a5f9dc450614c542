use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::NotificationConfig;
use crate::domain::order::{ItemStatus, Order, OrderEnvelope, OrderEvent, PrepRole, Role};
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerError};

// ============================================================================
// Order Notifications
// ============================================================================
//
// Committed events are pushed to the roles they concern. Delivery happens
// on a spawned task after the order write has committed; a failed or
// dropped notice never affects the write.
//
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct OrderNotice {
    pub audience: Vec<Role>,
    pub order_id: Uuid,
    pub order_number: u64,
    pub envelope: OrderEnvelope,
}

const FLOOR: [Role; 2] = [Role::Waiter, Role::Cashier];

fn stations(items: impl Iterator<Item = Option<PrepRole>>) -> Vec<Role> {
    let mut roles: Vec<Role> = Vec::new();
    for role in items.flatten().map(PrepRole::role) {
        if !roles.contains(&role) {
            roles.push(role);
        }
    }
    roles
}

/// Roles that should hear about `event` on `order`
pub fn audience_for(order: &Order, event: &OrderEvent) -> Vec<Role> {
    let mut audience = match event {
        OrderEvent::Created(e) => {
            let mut roles = stations(e.items.iter().map(|item| item.prep_role()));
            roles.extend(FLOOR);
            roles
        }
        OrderEvent::ItemsAdded(e) => {
            let mut roles = stations(e.items.iter().map(|item| item.prep_role()));
            roles.extend(FLOOR);
            roles
        }
        // Peers drop the order from their queue
        OrderEvent::PreparerClaimed(e) => vec![e.role.role()],
        OrderEvent::ItemStatusChanged(e) => match e.to {
            ItemStatus::Ready => FLOOR.to_vec(),
            ItemStatus::Delivered => vec![Role::Cashier],
            _ => Vec::new(),
        },
        OrderEvent::ItemCancelled(e) => {
            let mut roles = stations(order.item(e.item_id).map(|item| item.prep_role()).into_iter());
            roles.extend(FLOOR);
            roles
        }
        OrderEvent::Cancelled(_) => vec![Role::Chef, Role::Barista, Role::Waiter, Role::Cashier],
        OrderEvent::Paid(_) => stations(order.items.iter().map(|item| item.prep_role())),
    };

    if order.customer.is_some() && !matches!(event, OrderEvent::PreparerClaimed(_)) {
        audience.push(Role::Customer);
    }
    audience
}

pub fn notices_for(order: &Order, envelopes: &[OrderEnvelope]) -> Vec<OrderNotice> {
    envelopes
        .iter()
        .filter_map(|envelope| {
            let audience = audience_for(order, &envelope.event_data);
            (!audience.is_empty()).then(|| OrderNotice {
                audience,
                order_id: order.id,
                order_number: order.order_number,
                envelope: envelope.clone(),
            })
        })
        .collect()
}

// ============================================================================
// Sinks
// ============================================================================

#[async_trait]
pub trait NoticeSink: Send + Sync {
    async fn deliver(&self, notice: &OrderNotice) -> anyhow::Result<()>;
}

/// In-process push channel; every subscriber sees every notice and filters
/// by audience.
pub struct BroadcastSink {
    tx: broadcast::Sender<OrderNotice>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderNotice> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl NoticeSink for BroadcastSink {
    async fn deliver(&self, notice: &OrderNotice) -> anyhow::Result<()> {
        match self.tx.send(notice.clone()) {
            Ok(receivers) => {
                tracing::trace!(receivers = receivers, "Notice broadcast");
            }
            Err(_) => {
                tracing::debug!(order_id = %notice.order_id, "No subscribers for notice");
            }
        }
        Ok(())
    }
}

// ============================================================================
// Notifier
// ============================================================================

#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NoticeSink>,
    breaker: CircuitBreaker,
    metrics: Arc<Metrics>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NoticeSink>, config: &NotificationConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            sink,
            breaker: CircuitBreaker::new(config.breaker()),
            metrics,
        }
    }

    /// Fire-and-forget delivery on a background task
    pub fn publish(&self, notices: Vec<OrderNotice>) -> Option<JoinHandle<()>> {
        if notices.is_empty() {
            return None;
        }
        let notifier = self.clone();
        Some(tokio::spawn(async move {
            notifier.deliver_all(notices).await;
        }))
    }

    async fn deliver_all(&self, notices: Vec<OrderNotice>) {
        for notice in notices {
            let result = self.breaker.call(self.sink.deliver(&notice)).await;

            match result {
                Ok(()) => self.metrics.notifications_published.inc(),
                Err(CircuitBreakerError::CircuitOpen) => {
                    self.metrics.notifications_failed.inc();
                    tracing::warn!(
                        order_id = %notice.order_id,
                        event_type = %notice.envelope.event_type,
                        "Notification breaker open, notice dropped"
                    );
                }
                Err(CircuitBreakerError::OperationFailed(e)) => {
                    self.metrics.notifications_failed.inc();
                    tracing::warn!(
                        order_id = %notice.order_id,
                        event_type = %notice.envelope.event_type,
                        error = %e,
                        "Failed to deliver notice"
                    );
                }
            }

            self.metrics
                .notifier_breaker_state
                .set(self.breaker.state().await.as_gauge());
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event_sourcing::core::DomainEvent;
use super::value_objects::{ActorId, ItemStatus, OrderItem, OrderKind, Payment, PrepRole};

// ============================================================================
// Order Events - Facts produced by the order state machine
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Created(OrderCreated),
    ItemsAdded(OrderItemsAdded),
    PreparerClaimed(PreparerClaimed),
    ItemStatusChanged(ItemStatusChanged),
    ItemCancelled(ItemCancelled),
    Cancelled(OrderCancelled),
    Paid(OrderPaid),
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "OrderCreated",
            OrderEvent::ItemsAdded(_) => "OrderItemsAdded",
            OrderEvent::PreparerClaimed(_) => "PreparerClaimed",
            OrderEvent::ItemStatusChanged(_) => "ItemStatusChanged",
            OrderEvent::ItemCancelled(_) => "ItemCancelled",
            OrderEvent::Cancelled(_) => "OrderCancelled",
            OrderEvent::Paid(_) => "OrderPaid",
        }
    }
}

impl DomainEvent for OrderEvent {
    fn event_type() -> &'static str {
        "OrderEvent"
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: Uuid,
    pub order_number: u64,
    pub kind: OrderKind,
    pub customer: Option<ActorId>,
    pub created_by: ActorId,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemsAdded {
    pub items: Vec<OrderItem>,
    pub added_by: ActorId,
}

/// First acceptance of a station's work on this order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparerClaimed {
    pub role: PrepRole,
    pub preparer: ActorId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStatusChanged {
    pub item_id: Uuid,
    pub from: ItemStatus,
    pub to: ItemStatus,
    pub actor: ActorId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCancelled {
    pub item_id: Uuid,
    pub from: ItemStatus,
    pub actor: ActorId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub reason: Option<String>,
    pub cancelled_by: ActorId,
    /// Items still active at cancellation time
    pub cancelled_items: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPaid {
    pub payment: Payment,
}

use uuid::Uuid;

use crate::domain::stock::LedgerError;
use super::value_objects::{ActorId, ItemStatus, Money, PrepRole, Role};

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("A {role} may not {action}")]
    Forbidden { role: Role, action: String },

    #[error("Item {item_id} cannot move from {from} to {to}")]
    InvalidTransition {
        item_id: Uuid,
        from: ItemStatus,
        to: ItemStatus,
    },

    #[error("Item {0} is cancelled")]
    ItemCancelled(Uuid),

    #[error("Item {item_id} is being prepared by {owner}, not {actor}")]
    NotOwner {
        item_id: Uuid,
        owner: ActorId,
        actor: ActorId,
    },

    #[error("No {0} items left to advance")]
    AllItemsResolved(PrepRole),

    #[error("Cancelling item {item_id} would leave {} without active items", scope_label(.role))]
    LastActiveItem {
        item_id: Uuid,
        role: Option<PrepRole>,
    },

    #[error("Order {0} is cancelled")]
    OrderCancelled(Uuid),

    #[error("Order {0} is already paid")]
    OrderFinalized(Uuid),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Item {item_id} not found in order {order_id}")]
    ItemNotFound { order_id: Uuid, item_id: Uuid },

    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Invalid item quantity: {0}")]
    InvalidQuantity(u32),

    #[error("Invalid amount: {0}")]
    InvalidAmount(Money),

    #[error("Unknown actor: {0}")]
    UnknownActor(String),

    #[error("Duplicate order id: {0}")]
    DuplicateOrder(Uuid),

    #[error(transparent)]
    Stock(#[from] LedgerError),

    #[error("Aggregate not initialized")]
    NotInitialized,
}

fn scope_label(role: &Option<PrepRole>) -> String {
    match role {
        Some(role) => format!("the {role} station"),
        None => "the order".to_string(),
    }
}

impl OrderError {
    /// Stable label for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::Forbidden { .. } => "forbidden",
            OrderError::InvalidTransition { .. } => "invalid_transition",
            OrderError::ItemCancelled(_) => "item_cancelled",
            OrderError::NotOwner { .. } => "not_owner",
            OrderError::AllItemsResolved(_) => "all_items_resolved",
            OrderError::LastActiveItem { .. } => "last_active_item",
            OrderError::OrderCancelled(_) => "order_cancelled",
            OrderError::OrderFinalized(_) => "order_finalized",
            OrderError::OrderNotFound(_) => "order_not_found",
            OrderError::ItemNotFound { .. } => "item_not_found",
            OrderError::EmptyItems => "empty_items",
            OrderError::InvalidQuantity(_) => "invalid_quantity",
            OrderError::InvalidAmount(_) => "invalid_amount",
            OrderError::UnknownActor(_) => "unknown_actor",
            OrderError::DuplicateOrder(_) => "duplicate_order",
            OrderError::Stock(inner) => inner.kind(),
            OrderError::NotInitialized => "not_initialized",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_active_item_names_scope() {
        let item_id = Uuid::new_v4();
        let station = OrderError::LastActiveItem { item_id, role: Some(PrepRole::Barista) };
        let whole = OrderError::LastActiveItem { item_id, role: None };

        assert!(station.to_string().contains("the barista station"));
        assert!(whole.to_string().contains("the order"));
    }

    #[test]
    fn test_stock_errors_keep_their_kind() {
        let err: OrderError = LedgerError::InsufficientStock {
            ingredient_id: Uuid::new_v4(),
            available: 0,
            requested: 1,
        }
        .into();

        assert_eq!(err.kind(), "insufficient_stock");
    }
}

use uuid::Uuid;

use super::policy::TransitionMode;
use super::value_objects::{Actor, ItemStatus, Money, OrderItem, PaymentMethod};

// ============================================================================
// Order Commands - Represent actor intent against an existing order
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    TransitionItems {
        actor: Actor,
        item_ids: Vec<Uuid>,
        target: ItemStatus,
        mode: TransitionMode,
    },
    AdvanceAll {
        actor: Actor,
    },
    AddItems {
        actor: Actor,
        items: Vec<OrderItem>,
    },
    CancelItems {
        actor: Actor,
        item_ids: Vec<Uuid>,
    },
    CancelOrder {
        actor: Actor,
        reason: Option<String>,
    },
    Pay {
        actor: Actor,
        method: PaymentMethod,
        tip: Money,
    },
}

impl OrderCommand {
    pub fn actor(&self) -> &Actor {
        match self {
            OrderCommand::TransitionItems { actor, .. }
            | OrderCommand::AdvanceAll { actor }
            | OrderCommand::AddItems { actor, .. }
            | OrderCommand::CancelItems { actor, .. }
            | OrderCommand::CancelOrder { actor, .. }
            | OrderCommand::Pay { actor, .. } => actor,
        }
    }
}

use super::errors::OrderError;
use super::value_objects::{ItemStatus, PrepRole, Role};

// ============================================================================
// Role Policy
// ============================================================================
//
// One static table per role: the item moves it may request, the moves it
// may only make through bulk advance, and the whole-order actions it may
// take. Looked up by role; the aggregate consults it on every command.
//
// ============================================================================

/// Whole-order operations gated by role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    Create,
    AddItems,
    CancelItems,
    CancelOrder,
    Pay,
    AdvanceAll,
}

impl OrderAction {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderAction::Create => "create orders",
            OrderAction::AddItems => "add items",
            OrderAction::CancelItems => "cancel items",
            OrderAction::CancelOrder => "cancel orders",
            OrderAction::Pay => "take payment",
            OrderAction::AdvanceAll => "bulk advance items",
        }
    }
}

/// How an item transition was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionMode {
    Direct,
    Bulk,
}

type Move = (ItemStatus, ItemStatus);

#[derive(Debug)]
pub struct RolePolicy {
    pub role: Role,
    moves: &'static [Move],
    bulk_only_moves: &'static [Move],
    actions: &'static [OrderAction],
}

const PREP_MOVES: &[Move] = &[
    (ItemStatus::Pending, ItemStatus::InPreparation),
    (ItemStatus::InPreparation, ItemStatus::Ready),
];

const SERVE_MOVES: &[Move] = &[(ItemStatus::Ready, ItemStatus::Delivered)];

const FLOOR_ACTIONS: &[OrderAction] = &[
    OrderAction::Create,
    OrderAction::AddItems,
    OrderAction::CancelItems,
    OrderAction::CancelOrder,
    OrderAction::Pay,
];

static CHEF: RolePolicy = RolePolicy {
    role: Role::Chef,
    moves: PREP_MOVES,
    bulk_only_moves: &[(ItemStatus::Pending, ItemStatus::Ready)],
    actions: &[OrderAction::AdvanceAll],
};

static BARISTA: RolePolicy = RolePolicy {
    role: Role::Barista,
    moves: PREP_MOVES,
    bulk_only_moves: &[],
    actions: &[OrderAction::AdvanceAll],
};

static CASHIER: RolePolicy = RolePolicy {
    role: Role::Cashier,
    moves: SERVE_MOVES,
    bulk_only_moves: &[],
    actions: FLOOR_ACTIONS,
};

static WAITER: RolePolicy = RolePolicy {
    role: Role::Waiter,
    moves: SERVE_MOVES,
    bulk_only_moves: &[],
    actions: FLOOR_ACTIONS,
};

static CUSTOMER: RolePolicy = RolePolicy {
    role: Role::Customer,
    moves: &[],
    bulk_only_moves: &[],
    actions: &[
        OrderAction::Create,
        OrderAction::AddItems,
        OrderAction::CancelItems,
        OrderAction::CancelOrder,
    ],
};

pub fn policy_for(role: Role) -> &'static RolePolicy {
    match role {
        Role::Chef => &CHEF,
        Role::Barista => &BARISTA,
        Role::Cashier => &CASHIER,
        Role::Waiter => &WAITER,
        Role::Customer => &CUSTOMER,
    }
}

impl RolePolicy {
    pub fn prep_role(&self) -> Option<PrepRole> {
        self.role.prep_role()
    }

    pub fn may(&self, action: OrderAction) -> bool {
        self.actions.contains(&action)
    }

    pub fn check_action(&self, action: OrderAction) -> Result<(), OrderError> {
        if self.may(action) {
            Ok(())
        } else {
            Err(OrderError::Forbidden {
                role: self.role,
                action: action.as_str().to_string(),
            })
        }
    }

    /// Whether any move in either table ends at `target`
    pub fn reaches(&self, target: ItemStatus) -> bool {
        self.moves
            .iter()
            .chain(self.bulk_only_moves)
            .any(|&(_, to)| to == target)
    }

    pub fn check_target(&self, target: ItemStatus) -> Result<(), OrderError> {
        if self.reaches(target) {
            Ok(())
        } else {
            Err(OrderError::Forbidden {
                role: self.role,
                action: format!("move items to {target}"),
            })
        }
    }

    pub fn permits(&self, from: ItemStatus, to: ItemStatus, mode: TransitionMode) -> bool {
        if self.moves.contains(&(from, to)) {
            return true;
        }
        mode == TransitionMode::Bulk && self.bulk_only_moves.contains(&(from, to))
    }

    /// Whether bulk advance lets PENDING items jump straight to READY
    pub fn allows_skip(&self) -> bool {
        self.bulk_only_moves
            .contains(&(ItemStatus::Pending, ItemStatus::Ready))
    }
}

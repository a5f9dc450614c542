use uuid::Uuid;

use crate::utils::IsTransient;

// ============================================================================
// Stock Ledger Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient stock for ingredient {ingredient_id}: {available} available, {requested} requested")]
    InsufficientStock {
        ingredient_id: Uuid,
        available: u64,
        requested: u64,
    },

    #[error("Ingredient not found: {0}")]
    IngredientNotFound(Uuid),

    #[error("Ingredient already registered: {0}")]
    DuplicateIngredient(Uuid),

    #[error("Invalid quantity {quantity} for ingredient {ingredient_id}")]
    InvalidQuantity { ingredient_id: Uuid, quantity: u64 },

    #[error("Lock conflict on ingredient {ingredient_id}: {reason}")]
    LockConflict { ingredient_id: Uuid, reason: String },

    #[error("Gave up on ingredient {ingredient_id} after {attempts} attempts")]
    ConcurrencyExhausted {
        ingredient_id: Uuid,
        attempts: u32,
        #[source]
        last: Box<LedgerError>,
    },

    #[error("Stock update for ingredient {ingredient_id} interrupted after {attempts} attempts")]
    Interrupted { ingredient_id: Uuid, attempts: u32 },
}

impl LedgerError {
    /// Stable label for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::InsufficientStock { .. } => "insufficient_stock",
            LedgerError::IngredientNotFound(_) => "ingredient_not_found",
            LedgerError::DuplicateIngredient(_) => "duplicate_ingredient",
            LedgerError::InvalidQuantity { .. } => "invalid_quantity",
            LedgerError::LockConflict { .. } => "lock_conflict",
            LedgerError::ConcurrencyExhausted { .. } => "concurrency_exhausted",
            LedgerError::Interrupted { .. } => "interrupted",
        }
    }
}

impl IsTransient for LedgerError {
    fn is_transient(&self) -> bool {
        matches!(self, LedgerError::LockConflict { .. })
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::LedgerError;

// ============================================================================
// Stock Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Grams,
    Milliliters,
    Pieces,
}

/// Quantity of one ingredient, tracked in whole base units of `unit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockCounter {
    pub ingredient_id: Uuid,
    pub name: String,
    pub quantity: u64,
    /// Soft ceiling, raised whenever a return overshoots it
    pub max_quantity: u64,
    pub unit: Unit,
}

impl StockCounter {
    pub fn new(name: impl Into<String>, quantity: u64, unit: Unit) -> Self {
        Self {
            ingredient_id: Uuid::new_v4(),
            name: name.into(),
            quantity,
            max_quantity: quantity,
            unit,
        }
    }

    pub fn with_max(mut self, max_quantity: u64) -> Self {
        self.max_quantity = max_quantity.max(self.quantity);
        self
    }
}

/// A single change to a counter, applied inside one locked unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockMutation {
    Deduct(u64),
    Return(u64),
}

impl StockMutation {
    pub fn operation(&self) -> &'static str {
        match self {
            StockMutation::Deduct(_) => "deduct",
            StockMutation::Return(_) => "return",
        }
    }

    /// Apply to `counter`, leaving it untouched on error
    pub fn apply(&self, counter: &mut StockCounter) -> Result<(), LedgerError> {
        match *self {
            StockMutation::Deduct(requested) => {
                if counter.quantity < requested {
                    return Err(LedgerError::InsufficientStock {
                        ingredient_id: counter.ingredient_id,
                        available: counter.quantity,
                        requested,
                    });
                }
                counter.quantity -= requested;
            }
            StockMutation::Return(amount) => {
                let raised = counter.quantity.checked_add(amount).ok_or(
                    LedgerError::InvalidQuantity {
                        ingredient_id: counter.ingredient_id,
                        quantity: amount,
                    },
                )?;
                counter.quantity = raised;
                if raised > counter.max_quantity {
                    counter.max_quantity = raised;
                }
            }
        }
        Ok(())
    }
}

/// Ingredient amount consumed by one unit of a menu item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLine {
    pub ingredient_id: Uuid,
    pub quantity: u64,
}

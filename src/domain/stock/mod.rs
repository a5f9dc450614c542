// ============================================================================
// Stock Domain - Ingredient Counters and the Stock Ledger
// ============================================================================
//
// - Value objects (StockCounter, StockMutation, RecipeLine)
// - Errors (LedgerError)
// - Store (row-locked counter persistence)
// - Ledger (retrying deduct/return entry point)
//
// No dependency on the order domain.
//
// ============================================================================

pub mod errors;
pub mod ledger;
pub mod store;
pub mod value_objects;

pub use errors::*;
pub use ledger::*;
pub use store::*;
pub use value_objects::*;

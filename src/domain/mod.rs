// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each domain has its own subdirectory:
// - stock: ingredient counters and the retrying ledger
// - order: the order/item state machine, role policy and claims
//
// The order domain depends on stock for recipe lines and ledger errors;
// stock depends on nothing here.
//
// ============================================================================

pub mod order;
pub mod stock;

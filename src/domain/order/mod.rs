// ============================================================================
// Order Domain - Fulfillment State Machine
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (OrderItem, ItemStatus, Role, Money)
// - Role policy (per-role transition tables)
// - Claims (one preparer per kitchen station)
// - Events and commands
// - Errors (OrderError enum)
// - Aggregate (Order with business logic)
// - Repository (row-locked order store)
// - Command Handler (OrderCommandHandler)
//
// ============================================================================

pub mod value_objects;
pub mod policy;
pub mod claim;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod repository;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use policy::*;
pub use claim::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use repository::*;
pub use command_handler::*;

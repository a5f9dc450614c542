// ============================================================================
// Fulfillment - caller-facing layer
// ============================================================================
//
// - Directory (username → role)
// - Queries (work queues and read models)
// - Service (commands, stock side effects, notifications)
//
// ============================================================================

pub mod directory;
pub mod queries;
pub mod service;

pub use directory::{ActorDirectory, StaticDirectory};
pub use service::FulfillmentService;

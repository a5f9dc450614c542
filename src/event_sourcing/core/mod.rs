// ============================================================================
// Event Sourcing Core
// ============================================================================
//
// Generic aggregate and event abstractions; nothing here knows about orders
// or stock.
//
// ============================================================================

pub mod aggregate;
pub mod event;

pub use aggregate::Aggregate;
pub use event::{serialize_event, DomainEvent, EventEnvelope};

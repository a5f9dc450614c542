// ============================================================================
// Event Sourcing Infrastructure
// ============================================================================
//
// Generic, reusable aggregate/event plumbing.
// Domain-specific code is in src/domain/
//
// ============================================================================

pub mod core;

pub use self::core::*;

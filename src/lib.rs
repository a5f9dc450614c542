// ============================================================================
// pos_fulfillment - restaurant order fulfillment engine
// ============================================================================
//
// - domain: order state machine, role policy, claims, stock ledger
// - event_sourcing: generic aggregate/event plumbing
// - fulfillment: caller-facing service and read models
// - messaging: best-effort order notifications
// - metrics, config, utils: ambient infrastructure
//
// ============================================================================

pub mod config;
pub mod domain;
pub mod event_sourcing;
pub mod fulfillment;
pub mod messaging;
pub mod metrics;
pub mod utils;

//! Pipeline module - the normalization half
//!
//! Reads unprocessed raw records, transforms them through the owning
//! connector, persists canonical products, and advances processed state.

pub mod normalizer;
pub mod state_tracker;

// Re-export commonly used items for convenience
pub use normalizer::{Pipeline, PipelineError, ProcessOutcome, NORMALIZED_CONFLICT_KEYS};
pub use state_tracker::ProcessingStateTracker;

//! Ingestion module - the collection half of the pipeline
//!
//! Connector → PaginatedCollector → IdentityResolver → DedupClassifier →
//! ChunkedBulkWriter → raw-record store, with `CollectionRunner` driving
//! one run end to end and logging it.

pub mod collector;
pub mod dedup;
pub mod identity;
pub mod run;
pub mod writer;

// Re-export commonly used items for convenience
pub use collector::{CollectedBatch, CollectorConfig, PaginatedCollector};
pub use dedup::{ClassifiedBatch, DedupClassifier};
pub use identity::IdentityResolver;
pub use run::{CollectionRunner, RunRequest, RAW_CONFLICT_KEYS};
pub use writer::{ChunkedBulkWriter, WriteCounters};

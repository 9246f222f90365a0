//! supplier-hub - supplier catalog ingestion and normalization
//!
//! Aggregates product catalogs from heterogeneous suppliers (paginated
//! APIs, spreadsheet exports, listing-page crawling) into one normalized
//! store. Collection pages through a supplier connector under rate-limit
//! pacing, assigns stable identity to inconsistent records, classifies a
//! batch as new vs update against an existing-id snapshot, and writes in
//! size-bounded chunks with an insert→upsert fallback. A separate
//! normalization pass transforms stored raw records into canonical
//! products and tracks processed state, at-least-once.
//!
//! Marketplace listing, pricing rules and scheduling live in consumer
//! crates; they drive this one through [`ingest::CollectionRunner`] and
//! [`pipeline::Pipeline`].

// Module declarations
pub mod domain;
pub mod infrastructure;
pub mod ingest;
pub mod pipeline;

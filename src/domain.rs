//! Domain module - core entities and the supplier connector contract
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod connector;
pub mod record;

// Re-export commonly used items for convenience
pub use connector::{
    AccountCredentials, CollectFilters, CollectedPage, ConnectorError, RawItem, SupplierConnector,
};
pub use record::{
    product_status, run_status, CollectionMethod, NormalizedFields, NormalizedProduct,
    ProcessReport, RawRecord, RunSummary, UNKNOWN_STOCK_SENTINEL,
};

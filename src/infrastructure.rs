//! Infrastructure module - transports, configuration and the backing store
//!
//! Everything here is a collaborator the pipeline depends on through a
//! trait seam: connectors behind `SupplierConnector`, the store behind
//! `CatalogStore`, credentials behind `CredentialSource`.

pub mod config;
pub mod connectors;
pub mod database_connection;
pub mod http_client;
pub mod logging;
pub mod store;

// Re-export commonly used items for convenience
pub use config::{CredentialSource, StaticCredentialSource, SupplierProfile};
pub use connectors::{build_connector, ConnectorFactory, DefaultConnectorFactory};
pub use database_connection::DatabaseConnection;
pub use store::{CatalogStore, Filter, Page, SqliteStore, StoreError};

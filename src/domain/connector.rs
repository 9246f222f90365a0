//! Supplier connector contract
//!
//! Each supplier implements this once, polymorphic over a fixed capability
//! set: collect raw pages, transform one raw item into canonical fields,
//! validate credentials. Only `collect_products` performs I/O; transform is
//! a pure function so it can run against stored payloads long after the
//! collection run that produced them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::record::{CollectionMethod, NormalizedFields};

/// One raw supplier item, shaped however the supplier shapes it.
pub type RawItem = Value;

/// One page of collected items plus the opaque token for the next page.
#[derive(Debug, Clone, Default)]
pub struct CollectedPage {
    pub items: Vec<RawItem>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Caller-supplied collection filters, passed through to the supplier API.
#[derive(Debug, Clone, Default)]
pub struct CollectFilters {
    pub category: Option<String>,
    pub keyword: Option<String>,
    pub updated_since: Option<DateTime<Utc>>,
    /// Supplier-specific query parameters forwarded verbatim.
    pub extra: HashMap<String, String>,
}

/// Failure modes of a connector, classified for run-level policy.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Fatal for the run: abort immediately, no partial write.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Fatal for the run: the connector cannot be constructed or driven.
    #[error("connector configuration invalid: {0}")]
    Config(String),

    /// Aborts further pagination but keeps already-collected pages.
    #[error("page fetch failed (cursor: {cursor:?}): {message}")]
    PageFetch {
        cursor: Option<String>,
        message: String,
    },

    /// Per-item: counted and isolated, the record stays unprocessed.
    #[error("transform failed: {0}")]
    Transform(String),

    /// The run's cancellation token fired between pages.
    #[error("collection cancelled")]
    Cancelled,
}

impl ConnectorError {
    /// Fatal errors abort the whole run before anything is written.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Config(_))
    }
}

/// Per-supplier adapter: fetch raw pages, transform items, check credentials.
#[async_trait]
pub trait SupplierConnector: Send + Sync {
    fn supplier_id(&self) -> &str;

    fn collection_method(&self) -> CollectionMethod;

    /// URL, file path or job tag recorded on every RawRecord this
    /// connector produces.
    fn collection_source(&self) -> String;

    /// Fetch one page. Must be restartable from any previously returned
    /// cursor. Non-paged sources (spreadsheet, crawl of a single listing)
    /// return everything in one page with `has_more = false`.
    async fn collect_products(
        &self,
        filters: &CollectFilters,
        cursor: Option<&str>,
    ) -> Result<CollectedPage, ConnectorError>;

    /// Pure transform of one raw item into canonical fields. No network
    /// I/O, and missing optional fields fall back to defaults rather than
    /// failing the item.
    fn transform_product(&self, raw: &RawItem) -> Result<NormalizedFields, ConnectorError>;

    /// `Ok(false)` means the credentials were rejected; `Err` means the
    /// check itself could not be performed.
    async fn validate_credentials(&self) -> Result<bool, ConnectorError>;
}

/// What a connector needs besides its profile: the account's secrets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountCredentials {
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    pub access_token: Option<String>,
    pub api_key: Option<String>,
    /// Anything supplier-specific the above fields cannot carry.
    pub extra: HashMap<String, String>,
}

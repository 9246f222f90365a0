//! Supplier configuration and credential sourcing
//!
//! A `SupplierProfile` carries everything needed to construct a connector:
//! where the catalog lives, how requests are paced, how the response is
//! shaped, and how raw fields map onto canonical product fields. The
//! profile is configuration, not code: the three connector kinds differ
//! only by transport, so a new supplier is usually just a new profile.
//!
//! Credential storage itself is out of scope; `CredentialSource` is the
//! contract through which an external vault/config system hands the
//! pipeline its secrets.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::connector::AccountCredentials;
use crate::domain::record::CollectionMethod;

/// Default inter-page delay, rate-limit courtesy toward supplier APIs.
pub const DEFAULT_PAGE_DELAY_MS: u64 = 500;
/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
/// Backend request-size ceiling for bulk writes.
pub const DEFAULT_BULK_CHUNK_SIZE: usize = 5_000;
/// Chunk size for narrow processed-state updates. Deliberately much
/// smaller than the bulk chunk: the operation touches two columns and
/// rides a different request-size limit.
pub const DEFAULT_STATE_CHUNK_SIZE: usize = 100;
/// Page size when snapshotting existing ids for dedup.
pub const DEFAULT_SNAPSHOT_PAGE_SIZE: u32 = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown supplier: {0}")]
    UnknownSupplier(String),

    #[error("no credentials for supplier {supplier_id} (account {account_id:?})")]
    MissingCredentials {
        supplier_id: String,
        account_id: Option<String>,
    },
}

/// How requests to the supplier are authenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    #[default]
    None,
    /// `Authorization: Bearer <access_token>`
    Bearer,
    /// API key in a named header.
    ApiKey { header: String },
}

/// Dot-paths from a raw supplier item into canonical product fields.
///
/// Paths step through nested objects with `.` and arrays with numeric
/// segments (`options.0.price`). Missing optional paths fall back to
/// defaults during transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub title: String,
    pub description: Option<String>,
    pub price: String,
    pub cost_price: Option<String>,
    pub currency: Option<String>,
    /// Used when the payload carries no currency field.
    pub default_currency: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub stock: Option<String>,
    pub status: Option<String>,
    /// Path to an image URL array, or to a single image URL.
    pub images: Option<String>,
    /// Path to an option/variant array. When present and non-empty, the
    /// first option's price wins over the top-level price.
    pub options: Option<String>,
    /// Price path inside one option element.
    pub option_price: Option<String>,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            title: "title".to_string(),
            description: Some("description".to_string()),
            price: "price".to_string(),
            cost_price: Some("cost_price".to_string()),
            currency: Some("currency".to_string()),
            default_currency: "KRW".to_string(),
            category: Some("category".to_string()),
            brand: Some("brand".to_string()),
            stock: Some("stock".to_string()),
            status: Some("status".to_string()),
            images: Some("images".to_string()),
            options: Some("options".to_string()),
            option_price: Some("price".to_string()),
        }
    }
}

/// Response shape of a paginated supplier API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiPagination {
    /// Dot-path to the item array in a page response.
    pub items_path: String,
    /// Dot-path to the opaque next-page cursor, absent on the last page.
    pub cursor_path: String,
    /// Query parameter name carrying the cursor on the next request.
    pub cursor_param: String,
    /// Optional dot-path to an explicit has-more flag.
    pub has_more_path: Option<String>,
}

impl Default for ApiPagination {
    fn default() -> Self {
        Self {
            items_path: "items".to_string(),
            cursor_path: "next_cursor".to_string(),
            cursor_param: "cursor".to_string(),
            has_more_path: None,
        }
    }
}

/// CSS selectors driving the web-crawling connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSelectors {
    /// Selector for one product card in a listing page.
    pub product: String,
    pub title: String,
    pub price: String,
    pub image: Option<String>,
    pub link: Option<String>,
    /// Selector that matches only when a next page exists.
    pub next_page: Option<String>,
}

/// Everything needed to construct and drive one supplier's connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierProfile {
    pub supplier_id: String,
    pub name: String,
    pub collection_method: CollectionMethod,
    /// API base URL, listing-page URL, or spreadsheet path.
    pub source: String,
    pub auth_type: AuthType,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub page_delay_ms: u64,
    /// Per-page retry budget before pagination gives up (transient
    /// failures only).
    pub page_retries: u32,
    pub bulk_chunk_size: usize,
    pub state_chunk_size: usize,
    pub snapshot_page_size: u32,
    /// Supplier-specific id field checked before the shared priority list.
    pub id_field: Option<String>,
    pub field_mapping: FieldMapping,
    pub api_pagination: ApiPagination,
    pub web_selectors: Option<WebSelectors>,
}

impl SupplierProfile {
    pub fn new(supplier_id: &str, name: &str, method: CollectionMethod, source: &str) -> Self {
        Self {
            supplier_id: supplier_id.to_string(),
            name: name.to_string(),
            collection_method: method,
            source: source.to_string(),
            auth_type: AuthType::default(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            max_retries: 3,
            page_delay_ms: DEFAULT_PAGE_DELAY_MS,
            page_retries: 2,
            bulk_chunk_size: DEFAULT_BULK_CHUNK_SIZE,
            state_chunk_size: DEFAULT_STATE_CHUNK_SIZE,
            snapshot_page_size: DEFAULT_SNAPSHOT_PAGE_SIZE,
            id_field: None,
            field_mapping: FieldMapping::default(),
            api_pagination: ApiPagination::default(),
            web_selectors: None,
        }
    }
}

/// Contract with the external credential/config system: given a supplier
/// (and optionally one of its accounts), return the profile and secrets.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn profile(&self, supplier_id: &str) -> Result<SupplierProfile, ConfigError>;

    async fn credentials(
        &self,
        supplier_id: &str,
        account_id: Option<&str>,
    ) -> Result<AccountCredentials, ConfigError>;
}

/// In-memory credential source for embedding and tests.
#[derive(Default)]
pub struct StaticCredentialSource {
    profiles: HashMap<String, SupplierProfile>,
    credentials: HashMap<(String, Option<String>), AccountCredentials>,
}

impl StaticCredentialSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_profile(&mut self, profile: SupplierProfile) -> &mut Self {
        self.profiles.insert(profile.supplier_id.clone(), profile);
        self
    }

    pub fn add_credentials(
        &mut self,
        supplier_id: &str,
        account_id: Option<&str>,
        credentials: AccountCredentials,
    ) -> &mut Self {
        self.credentials.insert(
            (supplier_id.to_string(), account_id.map(str::to_string)),
            credentials,
        );
        self
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn profile(&self, supplier_id: &str) -> Result<SupplierProfile, ConfigError> {
        self.profiles
            .get(supplier_id)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownSupplier(supplier_id.to_string()))
    }

    async fn credentials(
        &self,
        supplier_id: &str,
        account_id: Option<&str>,
    ) -> Result<AccountCredentials, ConfigError> {
        let key = (supplier_id.to_string(), account_id.map(str::to_string));
        if let Some(found) = self.credentials.get(&key) {
            return Ok(found.clone());
        }
        // Accounts without dedicated credentials fall back to the
        // supplier-wide entry.
        self.credentials
            .get(&(supplier_id.to_string(), None))
            .cloned()
            .ok_or(ConfigError::MissingCredentials {
                supplier_id: supplier_id.to_string(),
                account_id: account_id.map(str::to_string),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_falls_back_to_supplier_wide_credentials() {
        let mut source = StaticCredentialSource::new();
        source.add_profile(SupplierProfile::new(
            "acme",
            "Acme Wholesale",
            CollectionMethod::Api,
            "https://api.acme.test/products",
        ));
        source.add_credentials(
            "acme",
            None,
            AccountCredentials {
                api_key: Some("k1".to_string()),
                ..Default::default()
            },
        );

        let creds = source.credentials("acme", Some("acct-7")).await.unwrap();
        assert_eq!(creds.api_key.as_deref(), Some("k1"));

        let err = source.credentials("ghost", None).await.unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredentials { .. }));
    }

    #[tokio::test]
    async fn unknown_supplier_profile_is_an_error() {
        let source = StaticCredentialSource::new();
        assert!(matches!(
            source.profile("nope").await,
            Err(ConfigError::UnknownSupplier(_))
        ));
    }
}

//! Shared test doubles: an in-memory CatalogStore with failure injection
//! and call recording, and a scripted connector that serves fixed pages.

// Not every test binary touches every helper.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use supplier_hub::domain::connector::{
    AccountCredentials, CollectFilters, CollectedPage, ConnectorError, RawItem, SupplierConnector,
};
use supplier_hub::domain::record::{CollectionMethod, NormalizedFields};
use supplier_hub::infrastructure::config::{FieldMapping, SupplierProfile};
use supplier_hub::infrastructure::connectors::{mapping, ConnectorFactory};
use supplier_hub::infrastructure::store::{CatalogStore, Filter, FilterClause, Page, StoreError};

#[derive(Debug, Clone)]
pub struct StoreCall {
    pub op: &'static str,
    pub table: String,
    pub rows: usize,
}

/// In-memory store honoring the same unique keys as the SQLite schema.
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    unique_keys: HashMap<String, Vec<String>>,
    calls: Mutex<Vec<StoreCall>>,
    fail_select: Mutex<HashSet<String>>,
    fail_insert: Mutex<HashSet<String>>,
    fail_upsert: Mutex<HashSet<String>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut unique_keys = HashMap::new();
        unique_keys.insert(
            "raw_records".to_string(),
            vec!["supplier_id".to_string(), "supplier_product_id".to_string()],
        );
        unique_keys.insert(
            "normalized_products".to_string(),
            vec!["raw_record_id".to_string()],
        );
        unique_keys.insert("collection_runs".to_string(), vec!["id".to_string()]);
        Self {
            tables: Mutex::new(HashMap::new()),
            unique_keys,
            calls: Mutex::new(Vec::new()),
            fail_select: Mutex::new(HashSet::new()),
            fail_insert: Mutex::new(HashSet::new()),
            fail_upsert: Mutex::new(HashSet::new()),
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Largest row count any single write primitive ever received.
    pub fn max_rows_per_write(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.op != "select")
            .map(|c| c.rows)
            .max()
            .unwrap_or(0)
    }

    pub fn fail_select_on(&self, table: &str) {
        self.fail_select.lock().unwrap().insert(table.to_string());
    }

    pub fn fail_insert_on(&self, table: &str) {
        self.fail_insert.lock().unwrap().insert(table.to_string());
    }

    pub fn fail_upsert_on(&self, table: &str) {
        self.fail_upsert.lock().unwrap().insert(table.to_string());
    }

    fn record(&self, op: &'static str, table: &str, rows: usize) {
        self.calls.lock().unwrap().push(StoreCall {
            op,
            table: table.to_string(),
            rows,
        });
    }

    fn key_of(row: &Value, keys: &[String]) -> String {
        keys.iter()
            .map(|k| row.get(k).map(std::string::ToString::to_string).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        page: Option<Page>,
    ) -> Result<Vec<Value>, StoreError> {
        self.record("select", table, 0);
        if self.fail_select.lock().unwrap().contains(table) {
            return Err(StoreError::Backend("injected select failure".to_string()));
        }
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|all| all.iter().filter(|row| filter.matches(row)).cloned().collect())
            .unwrap_or_default();
        if let Some(page) = page {
            let start = (page.offset as usize).min(rows.len());
            let end = (start + page.limit as usize).min(rows.len());
            rows = rows[start..end].to_vec();
        }
        Ok(rows)
    }

    async fn bulk_insert(&self, table: &str, rows: &[Value]) -> Result<u64, StoreError> {
        self.record("insert", table, rows.len());
        if self.fail_insert.lock().unwrap().contains(table) {
            return Err(StoreError::Backend("injected insert failure".to_string()));
        }
        let mut tables = self.tables.lock().unwrap();
        let existing = tables.entry(table.to_string()).or_default();

        if let Some(keys) = self.unique_keys.get(table) {
            let mut seen: HashSet<String> =
                existing.iter().map(|row| Self::key_of(row, keys)).collect();
            for row in rows {
                if !seen.insert(Self::key_of(row, keys)) {
                    return Err(StoreError::Backend(format!(
                        "UNIQUE constraint failed: {table}({})",
                        keys.join(", ")
                    )));
                }
            }
        }

        existing.extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    async fn bulk_upsert(
        &self,
        table: &str,
        rows: &[Value],
        conflict_keys: &[&str],
    ) -> Result<u64, StoreError> {
        self.record("upsert", table, rows.len());
        if self.fail_upsert.lock().unwrap().contains(table) {
            return Err(StoreError::Backend("injected upsert failure".to_string()));
        }
        let keys: Vec<String> = conflict_keys.iter().map(|k| (*k).to_string()).collect();
        let mut tables = self.tables.lock().unwrap();
        let existing = tables.entry(table.to_string()).or_default();

        for row in rows {
            let key = Self::key_of(row, &keys);
            if let Some(found) = existing.iter_mut().find(|r| Self::key_of(r, &keys) == key) {
                *found = row.clone();
            } else {
                existing.push(row.clone());
            }
        }
        Ok(rows.len() as u64)
    }

    async fn update(&self, table: &str, filter: &Filter, patch: &Value) -> Result<u64, StoreError> {
        // Row count of an update is how many ids its filter names, so
        // chunk-bound assertions cover narrow patches too
        let targeted = filter
            .clauses()
            .iter()
            .map(|clause| match clause {
                FilterClause::In(_, values) => values.len(),
                FilterClause::Eq(..) => 1,
            })
            .sum();
        self.record("update", table, targeted);
        let fields = patch
            .as_object()
            .ok_or_else(|| StoreError::InvalidRow("patch is not an object".to_string()))?;
        let mut tables = self.tables.lock().unwrap();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let mut touched = 0;
        for row in rows.iter_mut().filter(|row| filter.matches(row)) {
            if let Some(object) = row.as_object_mut() {
                for (k, v) in fields {
                    object.insert(k.clone(), v.clone());
                }
                touched += 1;
            }
        }
        Ok(touched)
    }
}

/// Connector serving a fixed page script. Items whose payload carries
/// `"poison": true` fail transform, mimicking a supplier row the mapping
/// cannot digest.
pub struct ScriptedConnector {
    pub supplier_id: String,
    pub pages: Vec<CollectedPage>,
    pub auth_ok: bool,
    /// Page index that always fails with a transient error.
    pub fail_page: Option<usize>,
}

impl ScriptedConnector {
    pub fn new(supplier_id: &str, pages: Vec<CollectedPage>) -> Self {
        Self {
            supplier_id: supplier_id.to_string(),
            pages,
            auth_ok: true,
            fail_page: None,
        }
    }

    /// Build a page script from item arrays, wiring cursors `c1, c2, ...`.
    pub fn paged(items_per_page: Vec<Vec<Value>>) -> Vec<CollectedPage> {
        let total = items_per_page.len();
        items_per_page
            .into_iter()
            .enumerate()
            .map(|(i, items)| CollectedPage {
                items,
                next_cursor: (i + 1 < total).then(|| format!("c{}", i + 1)),
                has_more: i + 1 < total,
            })
            .collect()
    }
}

#[async_trait]
impl SupplierConnector for ScriptedConnector {
    fn supplier_id(&self) -> &str {
        &self.supplier_id
    }

    fn collection_method(&self) -> CollectionMethod {
        CollectionMethod::Api
    }

    fn collection_source(&self) -> String {
        "scripted://catalog".to_string()
    }

    async fn collect_products(
        &self,
        _filters: &CollectFilters,
        cursor: Option<&str>,
    ) -> Result<CollectedPage, ConnectorError> {
        if !self.auth_ok {
            return Err(ConnectorError::Auth("scripted auth rejection".to_string()));
        }
        let index = cursor.map_or(0, |c| {
            c.trim_start_matches('c').parse::<usize>().unwrap_or(0)
        });
        if self.fail_page == Some(index) {
            return Err(ConnectorError::PageFetch {
                cursor: cursor.map(str::to_string),
                message: "scripted page failure".to_string(),
            });
        }
        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }

    fn transform_product(&self, raw: &RawItem) -> Result<NormalizedFields, ConnectorError> {
        if raw.get("poison").and_then(Value::as_bool) == Some(true) {
            return Err(ConnectorError::Transform("poisoned payload".to_string()));
        }
        mapping::transform_with_mapping(raw, &FieldMapping::default())
    }

    async fn validate_credentials(&self) -> Result<bool, ConnectorError> {
        Ok(self.auth_ok)
    }
}

/// Factory ignoring the profile and always returning one connector.
pub struct FixedFactory {
    connector: Arc<dyn SupplierConnector>,
}

impl FixedFactory {
    pub fn new(connector: Arc<dyn SupplierConnector>) -> Arc<Self> {
        Arc::new(Self { connector })
    }
}

impl ConnectorFactory for FixedFactory {
    fn build(
        &self,
        _profile: &SupplierProfile,
        _credentials: &AccountCredentials,
    ) -> Result<Arc<dyn SupplierConnector>, ConnectorError> {
        Ok(self.connector.clone())
    }
}

/// Profile with timings zeroed so tests run fast.
pub fn fast_profile(supplier_id: &str) -> SupplierProfile {
    let mut profile = SupplierProfile::new(
        supplier_id,
        "Test Supplier",
        CollectionMethod::Api,
        "https://api.test/products",
    );
    profile.page_delay_ms = 0;
    profile.page_retries = 0;
    profile
}

/// Credential source knowing exactly one supplier.
pub fn source_for(
    profile: SupplierProfile,
) -> Arc<supplier_hub::infrastructure::config::StaticCredentialSource> {
    let mut source = supplier_hub::infrastructure::config::StaticCredentialSource::new();
    let supplier_id = profile.supplier_id.clone();
    source.add_profile(profile);
    source.add_credentials(&supplier_id, None, AccountCredentials::default());
    Arc::new(source)
}

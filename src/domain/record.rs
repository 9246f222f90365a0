//! Core persisted shapes for the ingestion pipeline
//!
//! `RawRecord` is one supplier item exactly as collected, before any
//! normalization. `NormalizedProduct` is the canonical marketplace-agnostic
//! product derived from it. Both are stored as rows through the
//! `CatalogStore` primitives, with nested documents serialized as JSON text.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// How a supplier catalog is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMethod {
    Api,
    Excel,
    WebCrawling,
}

impl CollectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Excel => "excel",
            Self::WebCrawling => "web_crawling",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "api" => Ok(Self::Api),
            "excel" => Ok(Self::Excel),
            "web_crawling" => Ok(Self::WebCrawling),
            other => Err(anyhow!("unknown collection method: {}", other)),
        }
    }
}

impl std::fmt::Display for CollectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ingested supplier item before normalization.
///
/// `(supplier_id, supplier_product_id)` is unique in the store: later
/// collections overwrite the same row in place, they never append a second
/// live copy of the same external item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: Uuid,
    pub supplier_id: String,
    pub supplier_account_id: Option<String>,
    pub supplier_product_id: String,
    pub raw_payload: Value,
    pub collection_method: CollectionMethod,
    pub collection_source: String,
    /// Change-detection hash over payload + collection timestamp.
    /// Not used for identity; see `ingest::identity`.
    pub data_hash: String,
    pub is_processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    /// Free-form collection context (run id, account name).
    pub metadata: Value,
    pub collected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RawRecord {
    /// Serialize into a store row. Nested documents go out as compact JSON
    /// text so the row binds cleanly to TEXT columns.
    pub fn to_row(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "supplier_id": self.supplier_id,
            "supplier_account_id": self.supplier_account_id,
            "supplier_product_id": self.supplier_product_id,
            "raw_payload": self.raw_payload.to_string(),
            "collection_method": self.collection_method.as_str(),
            "collection_source": self.collection_source,
            "data_hash": self.data_hash,
            "is_processed": self.is_processed,
            "processed_at": self.processed_at.map(|t| t.to_rfc3339()),
            "metadata": self.metadata.to_string(),
            "collected_at": self.collected_at.to_rfc3339(),
            "updated_at": self.updated_at.to_rfc3339(),
        })
    }

    /// Rebuild from a store row. Accepts nested documents either inline or
    /// as JSON text, so SQLite rows and in-memory test rows both decode.
    pub fn from_row(row: &Value) -> Result<Self> {
        Ok(Self {
            id: Uuid::parse_str(&str_field(row, "id")?)?,
            supplier_id: str_field(row, "supplier_id")?,
            supplier_account_id: opt_str_field(row, "supplier_account_id"),
            supplier_product_id: str_field(row, "supplier_product_id")?,
            raw_payload: json_field(row, "raw_payload")?,
            collection_method: CollectionMethod::parse(&str_field(row, "collection_method")?)?,
            collection_source: str_field(row, "collection_source")?,
            data_hash: str_field(row, "data_hash")?,
            is_processed: bool_field(row, "is_processed")?,
            processed_at: opt_time_field(row, "processed_at")?,
            metadata: json_field(row, "metadata")?,
            collected_at: time_field(row, "collected_at")?,
            updated_at: time_field(row, "updated_at")?,
        })
    }
}

/// Product status after normalization, stored as plain text.
pub mod product_status {
    pub const ACTIVE: &str = "active";
    pub const SOLD_OUT: &str = "sold_out";
    pub const INACTIVE: &str = "inactive";
}

/// Stock quantity used when a supplier omits stock entirely.
///
/// Suppliers that never report stock are treated as "ample" rather than
/// zero so downstream listing does not mark everything sold out.
pub const UNKNOWN_STOCK_SENTINEL: i64 = 999;

/// Canonical field set produced by `SupplierConnector::transform_product`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFields {
    pub title: String,
    pub description: Option<String>,
    pub price: f64,
    pub cost_price: Option<f64>,
    pub currency: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub stock_quantity: i64,
    pub status: String,
    pub images: Vec<String>,
    /// Supplier-specific passthrough the canonical fields cannot carry.
    pub attributes: Value,
}

/// Canonical, marketplace-agnostic product.
///
/// Created exactly once per successfully transformed `RawRecord`;
/// re-processing upserts on `raw_record_id` instead of duplicating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedProduct {
    pub id: Uuid,
    pub raw_record_id: Uuid,
    pub supplier_id: String,
    pub supplier_product_id: String,
    pub title: String,
    pub description: Option<String>,
    pub price: f64,
    pub cost_price: Option<f64>,
    pub currency: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub stock_quantity: i64,
    pub status: String,
    pub images: Vec<String>,
    pub attributes: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NormalizedProduct {
    pub fn from_fields(record: &RawRecord, fields: NormalizedFields) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            raw_record_id: record.id,
            supplier_id: record.supplier_id.clone(),
            supplier_product_id: record.supplier_product_id.clone(),
            title: fields.title,
            description: fields.description,
            price: fields.price,
            cost_price: fields.cost_price,
            currency: fields.currency,
            category: fields.category,
            brand: fields.brand,
            stock_quantity: fields.stock_quantity,
            status: fields.status,
            images: fields.images,
            attributes: fields.attributes,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_row(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "raw_record_id": self.raw_record_id.to_string(),
            "supplier_id": self.supplier_id,
            "supplier_product_id": self.supplier_product_id,
            "title": self.title,
            "description": self.description,
            "price": self.price,
            "cost_price": self.cost_price,
            "currency": self.currency,
            "category": self.category,
            "brand": self.brand,
            "stock_quantity": self.stock_quantity,
            "status": self.status,
            "images": Value::Array(self.images.iter().map(|i| Value::String(i.clone())).collect()).to_string(),
            "attributes": self.attributes.to_string(),
            "created_at": self.created_at.to_rfc3339(),
            "updated_at": self.updated_at.to_rfc3339(),
        })
    }

    pub fn from_row(row: &Value) -> Result<Self> {
        let images = match json_field(row, "images")? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        Ok(Self {
            id: Uuid::parse_str(&str_field(row, "id")?)?,
            raw_record_id: Uuid::parse_str(&str_field(row, "raw_record_id")?)?,
            supplier_id: str_field(row, "supplier_id")?,
            supplier_product_id: str_field(row, "supplier_product_id")?,
            title: str_field(row, "title")?,
            description: opt_str_field(row, "description"),
            price: num_field(row, "price")?,
            cost_price: row.get("cost_price").and_then(Value::as_f64),
            currency: str_field(row, "currency")?,
            category: opt_str_field(row, "category"),
            brand: opt_str_field(row, "brand"),
            stock_quantity: row
                .get("stock_quantity")
                .and_then(Value::as_i64)
                .unwrap_or(UNKNOWN_STOCK_SENTINEL),
            status: str_field(row, "status")?,
            images,
            attributes: json_field(row, "attributes")?,
            created_at: time_field(row, "created_at")?,
            updated_at: time_field(row, "updated_at")?,
        })
    }
}

/// Collection run status values for the run log.
pub mod run_status {
    pub const RUNNING: &str = "running";
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
}

/// Per-run report returned to scheduling/CLI glue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub supplier_id: String,
    pub collected: u64,
    pub new: u64,
    pub updated: u64,
    pub failed: u64,
    pub duration_ms: u64,
    /// Set when pagination stopped early; collected pages were still written.
    pub error: Option<String>,
}

/// Outcome of a `process_all_unprocessed` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessReport {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
}

// Row decoding helpers shared by the two record shapes. SQLite hands JSON
// columns back as TEXT and booleans as integers; the in-memory test store
// keeps native values. Both forms are accepted here.

fn str_field(row: &Value, key: &str) -> Result<String> {
    row.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("row missing text field '{}'", key))
}

fn opt_str_field(row: &Value, key: &str) -> Option<String> {
    row.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bool_field(row: &Value, key: &str) -> Result<bool> {
    match row.get(key) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::Number(n)) => Ok(n.as_i64().unwrap_or(0) != 0),
        other => Err(anyhow!("row field '{}' is not a boolean: {:?}", key, other)),
    }
}

fn num_field(row: &Value, key: &str) -> Result<f64> {
    row.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow!("row missing numeric field '{}'", key))
}

fn json_field(row: &Value, key: &str) -> Result<Value> {
    match row.get(key) {
        Some(Value::String(text)) => {
            serde_json::from_str(text).map_err(|e| anyhow!("field '{}' holds invalid JSON: {}", key, e))
        }
        Some(value) => Ok(value.clone()),
        None => Err(anyhow!("row missing JSON field '{}'", key)),
    }
}

fn time_field(row: &Value, key: &str) -> Result<DateTime<Utc>> {
    let text = str_field(row, key)?;
    Ok(DateTime::parse_from_rfc3339(&text)?.with_timezone(&Utc))
}

fn opt_time_field(row: &Value, key: &str) -> Result<Option<DateTime<Utc>>> {
    match row.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc))),
        other => Err(anyhow!("row field '{}' is not a timestamp: {:?}", key, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> RawRecord {
        RawRecord {
            id: Uuid::new_v4(),
            supplier_id: "acme".to_string(),
            supplier_account_id: Some("acct-1".to_string()),
            supplier_product_id: "SKU-9".to_string(),
            raw_payload: json!({"sku": "SKU-9", "price": 1200}),
            collection_method: CollectionMethod::Api,
            collection_source: "https://api.acme.test/products".to_string(),
            data_hash: "abc".to_string(),
            is_processed: false,
            processed_at: None,
            metadata: json!({"run_id": "r1"}),
            collected_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn raw_record_row_round_trip() {
        let record = sample_record();
        let row = record.to_row();
        // JSON columns travel as text, the way SQLite hands them back
        assert!(row["raw_payload"].is_string());

        let decoded = RawRecord::from_row(&row).unwrap();
        assert_eq!(decoded.supplier_product_id, record.supplier_product_id);
        assert_eq!(decoded.raw_payload, record.raw_payload);
        assert_eq!(decoded.collection_method, CollectionMethod::Api);
        assert!(!decoded.is_processed);
    }

    #[test]
    fn is_processed_decodes_from_sqlite_integer() {
        let mut row = sample_record().to_row();
        row["is_processed"] = json!(1);
        let decoded = RawRecord::from_row(&row).unwrap();
        assert!(decoded.is_processed);
    }

    #[test]
    fn normalized_product_row_round_trip() {
        let record = sample_record();
        let fields = NormalizedFields {
            title: "Widget".to_string(),
            description: None,
            price: 1200.0,
            cost_price: Some(800.0),
            currency: "KRW".to_string(),
            category: Some("tools".to_string()),
            brand: None,
            stock_quantity: 5,
            status: product_status::ACTIVE.to_string(),
            images: vec!["https://img.test/1.jpg".to_string()],
            attributes: json!({"color": "red"}),
        };
        let product = NormalizedProduct::from_fields(&record, fields);
        let decoded = NormalizedProduct::from_row(&product.to_row()).unwrap();
        assert_eq!(decoded.raw_record_id, record.id);
        assert_eq!(decoded.images.len(), 1);
        assert_eq!(decoded.price, 1200.0);
        assert_eq!(decoded.attributes["color"], "red");
    }
}

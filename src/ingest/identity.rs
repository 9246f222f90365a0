//! Stable external identity for raw supplier items
//!
//! Suppliers are inconsistent about which field carries the product id,
//! so resolution walks an ordered priority list. When no id field exists
//! at all, identity degrades to a content hash: same content, same
//! identity. The hash runs over a canonical serialization (object keys
//! sorted recursively), so differently-ordered but logically equal
//! payloads hash the same at every nesting level.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::connector::RawItem;

/// Id-bearing fields checked in order, most specific suppliers last.
pub const ID_FIELD_PRIORITY: &[&str] = &[
    "id",
    "product_id",
    "productId",
    "productCode",
    "sku",
    "item_id",
    "itemId",
    "goodsNo",
    "key",
    "supplier_key",
];

pub struct IdentityResolver {
    /// Supplier-specific key from the profile, checked before the shared
    /// priority list.
    supplier_id_field: Option<String>,
}

impl IdentityResolver {
    pub fn new(supplier_id_field: Option<String>) -> Self {
        Self { supplier_id_field }
    }

    /// Resolve the external id for one raw item. `None` means the item is
    /// unusable (not an object, or empty) and must be dropped and counted.
    pub fn resolve(&self, item: &RawItem) -> Option<String> {
        if let Some(field) = &self.supplier_id_field {
            if let Some(found) = id_from_field(item, field) {
                return Some(found);
            }
        }
        for field in ID_FIELD_PRIORITY {
            if let Some(found) = id_from_field(item, field) {
                return Some(found);
            }
        }

        // Content-hash fallback: same content = same identity
        match item {
            Value::Object(map) if !map.is_empty() => Some(content_hash(item)),
            _ => None,
        }
    }
}

fn id_from_field(item: &RawItem, field: &str) -> Option<String> {
    match item.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// blake3 over the canonical serialization of a JSON document.
pub fn content_hash(value: &Value) -> String {
    let mut buffer = String::new();
    write_canonical(value, &mut buffer);
    blake3::hash(buffer.as_bytes()).to_hex().to_string()
}

/// Change-detection hash: payload content plus the collection timestamp.
/// Distinct from identity on purpose; two collections of identical
/// content still get distinct data hashes.
pub fn data_hash(payload: &Value, collected_at: DateTime<Utc>) -> String {
    let mut buffer = String::new();
    write_canonical(payload, &mut buffer);
    buffer.push('|');
    buffer.push_str(&collected_at.to_rfc3339());
    blake3::hash(buffer.as_bytes()).to_hex().to_string()
}

/// Canonical JSON text: compact, object keys sorted recursively. This is
/// the serialization the identity fallback is defined over; changing it
/// changes every hash-derived identity in the store.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

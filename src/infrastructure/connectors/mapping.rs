//! Field-mapping driven transform shared by all connector kinds
//!
//! A raw supplier item is an arbitrary JSON document; the profile's
//! `FieldMapping` says where the canonical fields live in it. The
//! transform is pure and tolerant: a missing optional path produces a
//! default, never an error. Only an unusable title or price fails the
//! item.

use serde_json::{json, Value};

use crate::domain::connector::{ConnectorError, RawItem};
use crate::domain::record::{product_status, NormalizedFields, UNKNOWN_STOCK_SENTINEL};
use crate::infrastructure::config::FieldMapping;

/// Walk a dot-path through nested objects and arrays.
/// `options.0.price` steps into the first element of an `options` array.
pub fn lookup<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = item;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn lookup_string(item: &Value, path: &str) -> Option<String> {
    match lookup(item, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numbers arrive as JSON numbers or as strings with separators
/// ("12,900원"). Strip everything that is not digit, sign or dot.
fn lookup_number(item: &Value, path: &str) -> Option<f64> {
    match lookup(item, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_loose_number(s),
        _ => None,
    }
}

pub fn parse_loose_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Effective price: first option's price when options exist, else the
/// top-level price path.
fn resolve_price(item: &Value, mapping: &FieldMapping) -> Option<f64> {
    if let (Some(options_path), Some(option_price)) = (&mapping.options, &mapping.option_price) {
        if let Some(Value::Array(options)) = lookup(item, options_path) {
            if let Some(first) = options.first() {
                if let Some(price) = lookup_number(first, option_price) {
                    return Some(price);
                }
            }
        }
    }
    lookup_number(item, &mapping.price)
}

fn resolve_images(item: &Value, mapping: &FieldMapping) -> Vec<String> {
    let Some(path) = &mapping.images else {
        return Vec::new();
    };
    match lookup(item, path) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Some(Value::String(single)) if !single.is_empty() => vec![single.clone()],
        _ => Vec::new(),
    }
}

fn resolve_status(item: &Value, mapping: &FieldMapping) -> String {
    let raw = mapping
        .status
        .as_deref()
        .and_then(|path| lookup_string(item, path));
    match raw.as_deref() {
        Some("sold_out" | "soldout" | "SOLD_OUT") => product_status::SOLD_OUT.to_string(),
        Some("inactive" | "stopped" | "INACTIVE") => product_status::INACTIVE.to_string(),
        _ => product_status::ACTIVE.to_string(),
    }
}

/// Apply a field mapping to one raw item.
pub fn transform_with_mapping(
    raw: &RawItem,
    mapping: &FieldMapping,
) -> Result<NormalizedFields, ConnectorError> {
    let title = lookup_string(raw, &mapping.title)
        .ok_or_else(|| ConnectorError::Transform(format!("no title at '{}'", mapping.title)))?;

    let price = resolve_price(raw, mapping)
        .ok_or_else(|| ConnectorError::Transform(format!("no usable price at '{}'", mapping.price)))?;

    let stock_quantity = mapping
        .stock
        .as_deref()
        .and_then(|path| lookup_number(raw, path))
        .map_or(UNKNOWN_STOCK_SENTINEL, |n| n as i64);

    let currency = mapping
        .currency
        .as_deref()
        .and_then(|path| lookup_string(raw, path))
        .unwrap_or_else(|| mapping.default_currency.clone());

    Ok(NormalizedFields {
        title,
        description: mapping
            .description
            .as_deref()
            .and_then(|path| lookup_string(raw, path)),
        price,
        cost_price: mapping
            .cost_price
            .as_deref()
            .and_then(|path| lookup_number(raw, path)),
        currency,
        category: mapping
            .category
            .as_deref()
            .and_then(|path| lookup_string(raw, path)),
        brand: mapping
            .brand
            .as_deref()
            .and_then(|path| lookup_string(raw, path)),
        stock_quantity,
        status: resolve_status(raw, mapping),
        images: resolve_images(raw, mapping),
        attributes: raw
            .get("attributes")
            .cloned()
            .unwrap_or_else(|| json!({})),
    })
}

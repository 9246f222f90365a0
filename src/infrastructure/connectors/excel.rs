//! Spreadsheet-export connector
//!
//! Suppliers without an API hand over CSV exports. The whole file is one
//! page: `collect_products` reads it, turns each row into a JSON object
//! keyed by the header line, and reports `has_more = false`.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

use crate::domain::connector::{
    CollectFilters, CollectedPage, ConnectorError, RawItem, SupplierConnector,
};
use crate::domain::record::{CollectionMethod, NormalizedFields};
use crate::infrastructure::config::SupplierProfile;
use crate::infrastructure::connectors::mapping;

pub struct ExcelConnector {
    profile: SupplierProfile,
}

impl ExcelConnector {
    pub fn new(profile: SupplierProfile) -> Result<Self, ConnectorError> {
        if profile.source.trim().is_empty() {
            return Err(ConnectorError::Config(
                "excel connector needs a spreadsheet path".to_string(),
            ));
        }
        Ok(Self { profile })
    }

    fn row_to_item(headers: &csv::StringRecord, row: &csv::StringRecord) -> RawItem {
        let mut object = Map::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            let key = header.trim();
            if key.is_empty() {
                continue;
            }
            // Numeric-looking cells stay numeric so price/stock mapping
            // works without per-supplier casts
            let value = cell
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|n| serde_json::Number::from_f64(n).map(Value::Number))
                .unwrap_or_else(|| Value::String(cell.trim().to_string()));
            object.insert(key.to_string(), value);
        }
        Value::Object(object)
    }
}

#[async_trait]
impl SupplierConnector for ExcelConnector {
    fn supplier_id(&self) -> &str {
        &self.profile.supplier_id
    }

    fn collection_method(&self) -> CollectionMethod {
        CollectionMethod::Excel
    }

    fn collection_source(&self) -> String {
        self.profile.source.clone()
    }

    async fn collect_products(
        &self,
        _filters: &CollectFilters,
        _cursor: Option<&str>,
    ) -> Result<CollectedPage, ConnectorError> {
        let bytes = tokio::fs::read(&self.profile.source)
            .await
            .map_err(|e| ConnectorError::PageFetch {
                cursor: None,
                message: format!("cannot read spreadsheet '{}': {e}", self.profile.source),
            })?;

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes.as_slice());

        let headers = reader
            .headers()
            .map_err(|e| ConnectorError::PageFetch {
                cursor: None,
                message: format!("spreadsheet has no header row: {e}"),
            })?
            .clone();

        let mut items = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|e| ConnectorError::PageFetch {
                cursor: None,
                message: format!("malformed spreadsheet row: {e}"),
            })?;
            items.push(Self::row_to_item(&headers, &row));
        }

        debug!(
            supplier = %self.profile.supplier_id,
            rows = items.len(),
            "spreadsheet read as a single page"
        );

        Ok(CollectedPage {
            items,
            next_cursor: None,
            has_more: false,
        })
    }

    fn transform_product(&self, raw: &RawItem) -> Result<NormalizedFields, ConnectorError> {
        mapping::transform_with_mapping(raw, &self.profile.field_mapping)
    }

    async fn validate_credentials(&self) -> Result<bool, ConnectorError> {
        // No credentials for a file drop; the check is that the file exists.
        Ok(Path::new(&self.profile.source).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn profile_for(path: &str) -> SupplierProfile {
        SupplierProfile::new("sheet-co", "Sheet Co", CollectionMethod::Excel, path)
    }

    #[tokio::test]
    async fn reads_csv_as_single_page() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sku,title,price,stock").unwrap();
        writeln!(file, "A-1,Mug,4500,12").unwrap();
        writeln!(file, "A-2,Plate,7000,").unwrap();

        let connector = ExcelConnector::new(profile_for(file.path().to_str().unwrap())).unwrap();
        let page = connector
            .collect_products(&CollectFilters::default(), None)
            .await
            .unwrap();

        assert_eq!(page.items.len(), 2);
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
        assert_eq!(page.items[0]["sku"], "A-1");
        assert_eq!(page.items[0]["price"], 4500.0);
    }

    #[tokio::test]
    async fn missing_file_is_a_page_fetch_error() {
        let connector = ExcelConnector::new(profile_for("/no/such/file.csv")).unwrap();
        let err = connector
            .collect_products(&CollectFilters::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::PageFetch { .. }));
        assert!(!connector.validate_credentials().await.unwrap());
    }
}

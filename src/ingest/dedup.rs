//! New-vs-update classification against an existing-id snapshot
//!
//! Before writing a collected batch, page the store once for every
//! `supplier_product_id` the supplier already has, then classify each
//! item in O(1) against the in-memory set. This replaces per-row
//! existence checks and keeps the fast pure-insert path for the common
//! case where most of a batch is new.

use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::domain::record::RawRecord;
use crate::infrastructure::store::{tables, CatalogStore, Filter, Page, StoreError};

/// A collected batch split by whether the store already knows each id.
#[derive(Debug, Default)]
pub struct ClassifiedBatch {
    pub new_items: Vec<RawRecord>,
    pub update_items: Vec<RawRecord>,
    /// Set when the snapshot fetch failed and everything was routed to
    /// the upsert path.
    pub degraded: bool,
}

pub struct DedupClassifier<'a> {
    store: &'a dyn CatalogStore,
    snapshot_page_size: u32,
}

impl<'a> DedupClassifier<'a> {
    pub fn new(store: &'a dyn CatalogStore, snapshot_page_size: u32) -> Self {
        Self {
            store,
            snapshot_page_size,
        }
    }

    /// Page the store to exhaustion and gather every existing external id
    /// for this supplier.
    async fn existing_ids(&self, supplier_id: &str) -> Result<HashSet<String>, StoreError> {
        let mut ids = HashSet::new();
        let mut offset = 0_u64;

        loop {
            let rows = self
                .store
                .select(
                    tables::RAW_RECORDS,
                    &Filter::new().eq("supplier_id", supplier_id),
                    Some(Page {
                        limit: self.snapshot_page_size,
                        offset,
                    }),
                )
                .await?;
            let page_len = rows.len();

            for row in rows {
                if let Some(id) = row.get("supplier_product_id").and_then(Value::as_str) {
                    ids.insert(id.to_string());
                }
            }

            if page_len < self.snapshot_page_size as usize {
                break;
            }
            offset += page_len as u64;
        }

        debug!(supplier_id, existing = ids.len(), "existing-id snapshot built");
        Ok(ids)
    }

    /// Partition a batch into new vs update. Every record lands in
    /// exactly one bucket. A snapshot failure degrades to treating the
    /// whole batch as updates (pure upsert) instead of failing the run.
    pub async fn classify(&self, supplier_id: &str, records: Vec<RawRecord>) -> ClassifiedBatch {
        let existing = match self.existing_ids(supplier_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(
                    supplier_id,
                    error = %e,
                    "existing-id snapshot failed, degrading to all-upsert"
                );
                return ClassifiedBatch {
                    new_items: Vec::new(),
                    update_items: records,
                    degraded: true,
                };
            }
        };

        let mut batch = ClassifiedBatch::default();
        for record in records {
            if existing.contains(&record.supplier_product_id) {
                batch.update_items.push(record);
            } else {
                batch.new_items.push(record);
            }
        }
        debug!(
            supplier_id,
            new = batch.new_items.len(),
            update = batch.update_items.len(),
            "batch classified"
        );
        batch
    }
}

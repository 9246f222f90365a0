//! Processed-state tracking for raw records
//!
//! After a record's transform succeeds and its normalized product is
//! persisted, the tracker flips `is_processed`. The patch touches two
//! columns, so it rides a much smaller chunk size than the bulk writer.
//! Marking is idempotent, and a failed chunk is only logged: the record
//! will be picked up and re-normalized by a later pass, which is safe
//! because the normalized write is an upsert.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use crate::infrastructure::store::{tables, CatalogStore, Filter};

pub struct ProcessingStateTracker<'a> {
    store: &'a dyn CatalogStore,
    chunk_size: usize,
}

impl<'a> ProcessingStateTracker<'a> {
    pub fn new(store: &'a dyn CatalogStore, chunk_size: usize) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Mark the given raw records processed. Returns how many ids were
    /// covered by successful patches; failed chunks are logged and left
    /// unprocessed for the next pass.
    pub async fn mark_processed(&self, record_ids: &[String]) -> u64 {
        let processed_at = Utc::now().to_rfc3339();
        let patch = json!({
            "is_processed": true,
            "processed_at": processed_at,
        });

        let mut marked = 0_u64;
        for chunk in record_ids.chunks(self.chunk_size) {
            let filter = Filter::new().is_in(
                "id",
                chunk.iter().map(|id| Value::String(id.clone())).collect(),
            );
            match self.store.update(tables::RAW_RECORDS, &filter, &patch).await {
                Ok(_) => marked += chunk.len() as u64,
                Err(e) => {
                    warn!(
                        ids = chunk.len(),
                        error = %e,
                        "processed-state patch failed, records stay unprocessed"
                    );
                }
            }
        }
        marked
    }
}

//! Normalization orchestrator
//!
//! Pulls unprocessed raw records, resolves the owning supplier's
//! connector, runs the pure transform, persists the canonical product and
//! advances the processed state. Transform failures are strictly
//! per-record: the record is counted and stays unprocessed for a later
//! pass, and its neighbors are unaffected.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::connector::{ConnectorError, SupplierConnector};
use crate::domain::record::{NormalizedProduct, ProcessReport, RawRecord};
use crate::infrastructure::config::{ConfigError, CredentialSource};
use crate::infrastructure::connectors::{ConnectorFactory, DefaultConnectorFactory};
use crate::infrastructure::store::{tables, CatalogStore, Filter, Page, StoreError};
use crate::pipeline::state_tracker::ProcessingStateTracker;

/// Conflict key for normalized products: re-processing a raw record
/// upserts, it never duplicates.
pub const NORMALIZED_CONFLICT_KEYS: &[&str] = &["raw_record_id"];

#[derive(Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    Processed,
    /// The record was already processed; short-circuited as a no-op.
    AlreadyProcessed,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("raw record not found: {0}")]
    NotFound(String),

    #[error("stored row unusable: {0}")]
    InvalidRow(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

pub struct Pipeline {
    store: Arc<dyn CatalogStore>,
    credentials: Arc<dyn CredentialSource>,
    factory: Arc<dyn ConnectorFactory>,
    /// Connectors are reused across records of the same supplier/account
    /// within this pipeline instance.
    connectors: Mutex<HashMap<String, Arc<dyn SupplierConnector>>>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn CatalogStore>, credentials: Arc<dyn CredentialSource>) -> Self {
        Self::with_factory(store, credentials, Arc::new(DefaultConnectorFactory))
    }

    pub fn with_factory(
        store: Arc<dyn CatalogStore>,
        credentials: Arc<dyn CredentialSource>,
        factory: Arc<dyn ConnectorFactory>,
    ) -> Self {
        Self {
            store,
            credentials,
            factory,
            connectors: Mutex::new(HashMap::new()),
        }
    }

    async fn connector_for(
        &self,
        supplier_id: &str,
        account_id: Option<&str>,
    ) -> Result<Arc<dyn SupplierConnector>, PipelineError> {
        let key = format!("{supplier_id}|{}", account_id.unwrap_or(""));
        let mut cache = self.connectors.lock().await;
        if let Some(found) = cache.get(&key) {
            return Ok(found.clone());
        }

        let profile = self.credentials.profile(supplier_id).await?;
        let credentials = self.credentials.credentials(supplier_id, account_id).await?;
        let connector = self.factory.build(&profile, &credentials)?;
        cache.insert(key, connector.clone());
        Ok(connector)
    }

    /// Normalize one raw record by id. Already-processed records are a
    /// no-op, not an error.
    pub async fn process_one(&self, raw_record_id: &str) -> Result<ProcessOutcome, PipelineError> {
        let rows = self
            .store
            .select(
                tables::RAW_RECORDS,
                &Filter::new().eq("id", raw_record_id),
                Some(Page { limit: 1, offset: 0 }),
            )
            .await?;
        let row = rows
            .first()
            .ok_or_else(|| PipelineError::NotFound(raw_record_id.to_string()))?;
        let record = RawRecord::from_row(row).map_err(|e| PipelineError::InvalidRow(e.to_string()))?;

        if record.is_processed {
            debug!(raw_record_id, "already processed, skipping");
            return Ok(ProcessOutcome::AlreadyProcessed);
        }

        let connector = self
            .connector_for(&record.supplier_id, record.supplier_account_id.as_deref())
            .await?;
        let fields = connector.transform_product(&record.raw_payload)?;

        let product = NormalizedProduct::from_fields(&record, fields);
        self.store
            .bulk_upsert(
                tables::NORMALIZED_PRODUCTS,
                &[product.to_row()],
                NORMALIZED_CONFLICT_KEYS,
            )
            .await?;

        // Transform + persist happened-before the state flip
        let profile = self.credentials.profile(&record.supplier_id).await?;
        ProcessingStateTracker::new(self.store.as_ref(), profile.state_chunk_size)
            .mark_processed(&[record.id.to_string()])
            .await;

        debug!(raw_record_id, supplier = %record.supplier_id, "record normalized");
        Ok(ProcessOutcome::Processed)
    }

    /// Normalize up to `limit` unprocessed records, optionally scoped to
    /// one supplier. One bad record never aborts the batch.
    pub async fn process_all_unprocessed(
        &self,
        supplier_id: Option<&str>,
        limit: u32,
    ) -> Result<ProcessReport, StoreError> {
        let mut filter = Filter::new().eq("is_processed", false);
        if let Some(supplier_id) = supplier_id {
            filter = filter.eq("supplier_id", supplier_id);
        }

        let rows = self
            .store
            .select(tables::RAW_RECORDS, &filter, Some(Page { limit, offset: 0 }))
            .await?;

        let mut report = ProcessReport {
            total: rows.len() as u64,
            ..Default::default()
        };

        for row in rows {
            let Some(id) = row.get("id").and_then(Value::as_str) else {
                report.failed += 1;
                continue;
            };
            match self.process_one(id).await {
                Ok(_) => report.success += 1,
                Err(e) => {
                    warn!(raw_record_id = id, error = %e, "record failed to normalize");
                    report.failed += 1;
                }
            }
        }

        info!(
            supplier = ?supplier_id,
            total = report.total,
            success = report.success,
            failed = report.failed,
            "normalization pass finished"
        );
        Ok(report)
    }
}

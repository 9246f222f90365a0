//! One collection run, end to end
//!
//! Credentials are validated before anything touches the store; an auth
//! or config failure aborts with no partial write. After that, the run
//! is best-effort: a page failure mid-run still persists the pages that
//! were collected, chunk failures cost only their own rows, and
//! everything that happened lands in the `collection_runs` log row and
//! the returned `RunSummary`.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::connector::CollectFilters;
use crate::domain::record::{run_status, RawRecord, RunSummary};
use crate::infrastructure::config::CredentialSource;
use crate::infrastructure::connectors::{ConnectorFactory, DefaultConnectorFactory};
use crate::infrastructure::store::{tables, CatalogStore, Filter};
use crate::ingest::collector::{CollectorConfig, PaginatedCollector};
use crate::ingest::dedup::DedupClassifier;
use crate::ingest::identity::{data_hash, IdentityResolver};
use crate::ingest::writer::ChunkedBulkWriter;

/// Conflict key for the raw-record table: one live row per external item.
pub const RAW_CONFLICT_KEYS: &[&str] = &["supplier_id", "supplier_product_id"];

#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub supplier_id: String,
    pub account_id: Option<String>,
    pub filters: CollectFilters,
    /// Optional cap on collected items for this run.
    pub limit: Option<usize>,
}

pub struct CollectionRunner {
    store: Arc<dyn CatalogStore>,
    credentials: Arc<dyn CredentialSource>,
    factory: Arc<dyn ConnectorFactory>,
}

impl CollectionRunner {
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
        }
    }

    /// Collect, classify and persist one supplier's catalog.
    ///
    /// Returns `Err` only for total connector unavailability (auth or
    /// config); every other failure mode is absorbed into the summary.
    pub async fn run(&self, request: RunRequest, cancel: CancellationToken) -> Result<RunSummary> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let supplier_id = request.supplier_id.clone();

        let profile = self
            .credentials
            .profile(&supplier_id)
            .await
            .with_context(|| format!("no profile for supplier {supplier_id}"))?;
        let credentials = self
            .credentials
            .credentials(&supplier_id, request.account_id.as_deref())
            .await
            .with_context(|| format!("no credentials for supplier {supplier_id}"))?;

        let connector = self
            .factory
            .build(&profile, &credentials)
            .with_context(|| format!("cannot build connector for supplier {supplier_id}"))?;

        // Fatal gate: abort before the run row exists, no partial write
        match connector.validate_credentials().await {
            Ok(true) => {}
            Ok(false) => bail!("credentials rejected for supplier {supplier_id}"),
            Err(e) => bail!("credential validation failed for supplier {supplier_id}: {e}"),
        }

        info!(%run_id, supplier_id, account = ?request.account_id, "collection run started");
        self.open_run_log(run_id, &request).await;

        let collector = PaginatedCollector::new(CollectorConfig {
            page_delay: std::time::Duration::from_millis(profile.page_delay_ms),
            page_retries: profile.page_retries,
            limit: request.limit,
        });

        let batch = match collector.collect(connector.as_ref(), &request.filters, &cancel).await {
            Ok(batch) => batch,
            Err(e) => {
                // Fatal before anything was collected
                self.close_run_log(run_id, run_status::FAILED, &Default::default(), 0, Some(&e.to_string()))
                    .await;
                return Err(e).with_context(|| format!("collection aborted for supplier {supplier_id}"));
            }
        };

        let collected = batch.items.len() as u64;
        let run_error = batch.error.as_ref().map(std::string::ToString::to_string);

        // Assign identity; items with none are dropped and counted
        let resolver = IdentityResolver::new(profile.id_field.clone());
        let collected_at = Utc::now();
        let mut records = Vec::with_capacity(batch.items.len());
        let mut dropped = 0_u64;
        for item in batch.items {
            let Some(external_id) = resolver.resolve(&item) else {
                dropped += 1;
                continue;
            };
            records.push(RawRecord {
                id: Uuid::new_v4(),
                supplier_id: supplier_id.clone(),
                supplier_account_id: request.account_id.clone(),
                supplier_product_id: external_id,
                data_hash: data_hash(&item, collected_at),
                raw_payload: item,
                collection_method: connector.collection_method(),
                collection_source: connector.collection_source(),
                is_processed: false,
                processed_at: None,
                metadata: json!({
                    "run_id": run_id.to_string(),
                    "account_name": credentials.account_name,
                    "pages": batch.pages,
                }),
                collected_at,
                updated_at: collected_at,
            });
        }
        if dropped > 0 {
            warn!(supplier_id, dropped, "items without resolvable identity were dropped");
        }

        let classified = DedupClassifier::new(self.store.as_ref(), profile.snapshot_page_size)
            .classify(&supplier_id, records)
            .await;

        let writer = ChunkedBulkWriter::new(self.store.as_ref(), profile.bulk_chunk_size);
        let mut counters = writer
            .write(
                tables::RAW_RECORDS,
                classified.new_items.iter().map(RawRecord::to_row).collect(),
                classified.update_items.iter().map(RawRecord::to_row).collect(),
                RAW_CONFLICT_KEYS,
                &cancel,
            )
            .await
            .context("bulk write failed")?;
        counters.failed += dropped;

        let status = if run_error.is_some() {
            run_status::FAILED
        } else {
            run_status::COMPLETED
        };
        self.close_run_log(run_id, status, &counters, collected, run_error.as_deref())
            .await;

        let summary = RunSummary {
            run_id,
            supplier_id: supplier_id.clone(),
            collected,
            new: counters.new,
            updated: counters.updated,
            failed: counters.failed,
            duration_ms: started.elapsed().as_millis() as u64,
            error: run_error,
        };
        info!(
            %run_id,
            supplier_id,
            collected = summary.collected,
            new = summary.new,
            updated = summary.updated,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            "collection run finished"
        );
        Ok(summary)
    }

    /// Run-log writes are bookkeeping: failures are logged, never fatal.
    async fn open_run_log(&self, run_id: Uuid, request: &RunRequest) {
        let row = json!({
            "id": run_id.to_string(),
            "supplier_id": request.supplier_id,
            "account_id": request.account_id,
            "status": run_status::RUNNING,
            "collected": 0,
            "new_count": 0,
            "updated_count": 0,
            "failed_count": 0,
            "started_at": Utc::now().to_rfc3339(),
            "completed_at": Option::<String>::None,
            "error_summary": Option::<String>::None,
        });
        if let Err(e) = self.store.bulk_insert(tables::COLLECTION_RUNS, &[row]).await {
            warn!(%run_id, error = %e, "could not open run log row");
        }
    }

    async fn close_run_log(
        &self,
        run_id: Uuid,
        status: &str,
        counters: &crate::ingest::writer::WriteCounters,
        collected: u64,
        error_summary: Option<&str>,
    ) {
        let patch = json!({
            "status": status,
            "collected": collected,
            "new_count": counters.new,
            "updated_count": counters.updated,
            "failed_count": counters.failed,
            "completed_at": Utc::now().to_rfc3339(),
            "error_summary": error_summary,
        });
        if let Err(e) = self
            .store
            .update(
                tables::COLLECTION_RUNS,
                &Filter::new().eq("id", run_id.to_string()),
                &patch,
            )
            .await
        {
            warn!(%run_id, error = %e, "could not close run log row");
        }
    }
}

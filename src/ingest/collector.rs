//! Cursor-driven paginated collector
//!
//! Drives `collect_products` until exhaustion or a caller limit, pacing
//! requests with a minimum inter-page delay. Pagination is sequential by
//! necessity: page N+1 needs page N's cursor. Partial results are always
//! returned alongside the error that stopped the loop, so the caller
//! decides whether a partial run is worth persisting.

use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::connector::{CollectFilters, ConnectorError, RawItem, SupplierConnector};

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Minimum delay between page requests (rate-limit courtesy).
    pub page_delay: Duration,
    /// Transient-failure retries per page before the run stops paging.
    pub page_retries: u32,
    /// Stop after this many items even if the source has more.
    pub limit: Option<usize>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_millis(500),
            page_retries: 2,
            limit: None,
        }
    }
}

/// What a collection loop produced. `error` is set when pagination
/// stopped early; the items gathered before that are still here.
#[derive(Debug, Default)]
pub struct CollectedBatch {
    pub items: Vec<RawItem>,
    pub pages: u32,
    pub error: Option<ConnectorError>,
}

pub struct PaginatedCollector {
    config: CollectorConfig,
}

impl PaginatedCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// Page through the connector until exhaustion, the configured limit,
    /// cancellation, or an unrecoverable page failure.
    ///
    /// Fatal connector errors (auth/config) on the first page return
    /// `Err`: nothing was collected and the run must abort. After items
    /// exist, any stop condition is reported through `CollectedBatch::error`
    /// instead, because collected pages are never discarded.
    pub async fn collect(
        &self,
        connector: &dyn SupplierConnector,
        filters: &CollectFilters,
        cancel: &CancellationToken,
    ) -> Result<CollectedBatch, ConnectorError> {
        let mut batch = CollectedBatch::default();
        let mut cursor: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                warn!(supplier = connector.supplier_id(), "collection cancelled between pages");
                batch.error = Some(ConnectorError::Cancelled);
                return Ok(batch);
            }

            let page = match self.fetch_page(connector, filters, cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) if e.is_fatal() && batch.items.is_empty() => return Err(e),
                Err(e) => {
                    warn!(
                        supplier = connector.supplier_id(),
                        pages = batch.pages,
                        collected = batch.items.len(),
                        error = %e,
                        "pagination stopped early, keeping collected pages"
                    );
                    batch.error = Some(e);
                    return Ok(batch);
                }
            };

            batch.pages += 1;
            debug!(
                supplier = connector.supplier_id(),
                page = batch.pages,
                items = page.items.len(),
                has_more = page.has_more,
                "page collected"
            );
            batch.items.extend(page.items);

            if let Some(limit) = self.config.limit {
                if batch.items.len() >= limit {
                    batch.items.truncate(limit);
                    info!(
                        supplier = connector.supplier_id(),
                        limit, "collection limit reached"
                    );
                    return Ok(batch);
                }
            }

            if !page.has_more {
                return Ok(batch);
            }
            // The cursor is opaque: pass through whatever the connector returned
            cursor = page.next_cursor;
            if cursor.is_none() {
                // has_more without a cursor cannot advance; treat as exhaustion
                warn!(supplier = connector.supplier_id(), "has_more set but no cursor, stopping");
                return Ok(batch);
            }

            sleep(self.config.page_delay).await;
        }
    }

    /// One page with a bounded transient-failure retry budget and
    /// exponential backoff. Fatal errors are not retried.
    async fn fetch_page(
        &self,
        connector: &dyn SupplierConnector,
        filters: &CollectFilters,
        cursor: Option<&str>,
    ) -> Result<crate::domain::connector::CollectedPage, ConnectorError> {
        let mut last_error = None;

        for attempt in 0..=self.config.page_retries {
            if attempt > 0 {
                sleep(Duration::from_millis(250 * 2_u64.pow(attempt - 1))).await;
            }
            match connector.collect_products(filters, cursor).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        supplier = connector.supplier_id(),
                        cursor, attempt, error = %e,
                        "page fetch failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(ConnectorError::PageFetch {
            cursor: cursor.map(str::to_string),
            message: "retries exhausted".to_string(),
        }))
    }
}

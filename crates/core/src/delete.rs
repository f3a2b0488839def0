//! Bulk delete coordinator
//!
//! Fans a key list out over the worker pool in contiguous batches, collects
//! per-key failures, and merges them into one report. Within a batch keys
//! are attempted sequentially in their original order; once a batch
//! accumulates [`TransferConfig::max_batch_failures`] individual failures it
//! stops attempting the rest of its range. That ceiling is batch-level, not
//! per-key retry: it caps worst-case latency for a misbehaving range.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::aggregate::{DeleteFailure, DeleteReport, FailureAggregator};
use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::pool::{self, Batch, WorkerPool};
use crate::traits::ObjectBackend;

/// Coordinator for deleting many objects concurrently
#[derive(Debug)]
pub struct BulkDeleter<B: ?Sized> {
    backend: Arc<B>,
    config: TransferConfig,
    pool: WorkerPool,
}

impl<B: ObjectBackend + ?Sized + 'static> BulkDeleter<B> {
    pub fn new(backend: Arc<B>, config: TransferConfig) -> Self {
        let pool = WorkerPool::new(config.pool_size);
        Self {
            backend,
            config,
            pool,
        }
    }

    /// Delete every key in `keys` from `bucket`
    ///
    /// Returns `Ok(None)` when every delete succeeded (nothing to report),
    /// `Ok(Some(report))` when some keys failed; callers inspect the report
    /// to decide whether to retry the failed subset. An empty key list is an
    /// input error and spawns no workers.
    pub async fn delete_many(&self, bucket: &str, keys: Vec<String>) -> Result<Option<DeleteReport>> {
        if keys.is_empty() {
            return Err(Error::EmptyKeyList);
        }

        let total = keys.len();
        let keys = Arc::new(keys);
        let aggregator = FailureAggregator::new();
        let mut workers = JoinSet::new();

        for batch in pool::partition(total, self.config.pool_size, self.config.min_batch) {
            // admission blocks here while the pool is saturated
            let permit = self.pool.acquire().await;
            let backend = Arc::clone(&self.backend);
            let keys = Arc::clone(&keys);
            let bucket = bucket.to_string();
            let ceiling = self.config.max_batch_failures;

            workers.spawn(async move {
                let _permit = permit;
                delete_batch(backend.as_ref(), &bucket, &keys, batch, ceiling).await
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(failures) => aggregator.extend(failures),
                Err(e) => tracing::warn!(error = %e, "delete worker did not finish"),
            }
        }

        let report = aggregator.into_report();
        if report.is_empty() {
            Ok(None)
        } else {
            tracing::warn!(
                failed = report.len(),
                total = total,
                "failed to delete some objects"
            );
            Ok(Some(report))
        }
    }
}

/// Attempt one batch's keys in order, stopping at the failure ceiling
async fn delete_batch<B: ObjectBackend + ?Sized>(
    backend: &B,
    bucket: &str,
    keys: &[String],
    batch: Batch,
    ceiling: usize,
) -> Vec<DeleteFailure> {
    let mut failures = Vec::new();

    for key in &keys[batch.start..batch.end] {
        if failures.len() >= ceiling {
            tracing::debug!(
                start = batch.start,
                end = batch.end,
                "batch reached failure ceiling, remaining keys untried"
            );
            break;
        }
        if let Err(e) = backend.delete_object(bucket, key).await {
            tracing::debug!(key = %key, error = %e, "delete failed");
            failures.push(DeleteFailure::classify(key.clone(), &e));
        }
    }

    failures
}

//! Aggregation of per-key failures from concurrent workers
//!
//! Workers append their batch failures to a shared [`FailureAggregator`];
//! the merged [`DeleteReport`] keeps per-batch order but makes no ordering
//! guarantee across batches (arrival order), and drops duplicate keys.

use std::collections::HashSet;
use std::sync::Mutex;

use serde::Serialize;

use crate::error::Error;

/// Why one key could not be deleted
///
/// `code` is the backend-reported error code; `None` means a local
/// (transport/I-O) failure. Absence of an entry for a key means success.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteFailure {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl DeleteFailure {
    /// Classify an error for one key into a failure record
    pub fn classify(key: impl Into<String>, error: &Error) -> Self {
        match error {
            Error::Service { code, message } => Self {
                key: key.into(),
                code: Some(code.clone()),
                message: message.clone(),
            },
            other => Self {
                key: key.into(),
                code: None,
                message: other.to_string(),
            },
        }
    }
}

/// Itemized outcome of a bulk delete with at least the possibility of failures
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteReport {
    pub failures: Vec<DeleteFailure>,
}

impl DeleteReport {
    /// True when every key was deleted
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Keys that failed, in report order
    pub fn failed_keys(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.key.as_str())
    }
}

#[derive(Debug, Default)]
struct AggregatorInner {
    seen: HashSet<String>,
    failures: Vec<DeleteFailure>,
}

/// Thread-safe collection point merging partial failure lists
#[derive(Debug, Default)]
pub struct FailureAggregator {
    inner: Mutex<AggregatorInner>,
}

impl FailureAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one batch's failures, preserving their order and skipping keys
    /// already recorded
    pub fn extend(&self, failures: Vec<DeleteFailure>) {
        let mut inner = self.inner.lock().expect("aggregator lock poisoned");
        for failure in failures {
            if inner.seen.insert(failure.key.clone()) {
                inner.failures.push(failure);
            }
        }
    }

    /// Finish collection and produce the merged report
    pub fn into_report(self) -> DeleteReport {
        let inner = self.inner.into_inner().expect("aggregator lock poisoned");
        DeleteReport {
            failures: inner.failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_failure(key: &str) -> DeleteFailure {
        DeleteFailure::classify(key, &Error::Transport("connection reset".to_string()))
    }

    #[test]
    fn test_classify_service_error() {
        let err = Error::Service {
            code: "AccessDenied".to_string(),
            message: "forbidden".to_string(),
        };
        let failure = DeleteFailure::classify("a/b", &err);
        assert_eq!(failure.code.as_deref(), Some("AccessDenied"));
        assert_eq!(failure.message, "forbidden");
    }

    #[test]
    fn test_classify_local_error() {
        let failure = local_failure("a/b");
        assert!(failure.code.is_none());
        assert!(failure.message.contains("connection reset"));
    }

    #[test]
    fn test_extend_preserves_batch_order() {
        let agg = FailureAggregator::new();
        agg.extend(vec![local_failure("k1"), local_failure("k2")]);
        agg.extend(vec![local_failure("k3")]);

        let report = agg.into_report();
        let keys: Vec<_> = report.failed_keys().collect();
        assert_eq!(keys, vec!["k1", "k2", "k3"]);
    }

    #[test]
    fn test_extend_dedupes_by_key() {
        let agg = FailureAggregator::new();
        agg.extend(vec![local_failure("k1"), local_failure("k1")]);
        agg.extend(vec![local_failure("k1"), local_failure("k2")]);

        let report = agg.into_report();
        assert_eq!(report.len(), 2);
    }

    #[test]
    fn test_report_serialization() {
        let mut report = DeleteReport::default();
        report.failures.push(DeleteFailure {
            key: "obj".to_string(),
            code: Some("NoSuchKey".to_string()),
            message: "gone".to_string(),
        });
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"key\":\"obj\""));
        assert!(json.contains("\"code\":\"NoSuchKey\""));
    }

    #[test]
    fn test_empty_report() {
        let report = FailureAggregator::new().into_report();
        assert!(report.is_empty());
        assert_eq!(report.len(), 0);
    }
}

//! obs-core: concurrent bulk-transfer engine for object storage
//!
//! This crate provides the backend-independent core of the transfer engine:
//! - `ObjectBackend` capability trait the coordinators talk through
//! - Bounded worker pool and batch partitioning
//! - Bulk delete coordinator with partial-failure aggregation
//! - Multipart upload session life-cycle (initiate, parts, complete, abort)
//! - Retry helper with exponential backoff
//! - In-memory backend for deterministic tests
//!
//! The crate is independent of any specific SDK; the `obs-s3` crate supplies
//! the production backend over aws-sdk-s3.

pub mod aggregate;
pub mod config;
pub mod delete;
pub mod download;
pub mod error;
pub mod memory;
pub mod multipart;
pub mod pool;
pub mod retry;
pub mod traits;
pub mod types;

pub use aggregate::{DeleteFailure, DeleteReport, FailureAggregator};
pub use config::{RetryBuilder, RetryConfig, TransferConfig};
pub use delete::BulkDeleter;
pub use download::{download_range_to_file, download_to_file};
pub use error::{Error, Result};
pub use memory::InMemoryBackend;
pub use multipart::{MultipartUpload, SessionState};
pub use pool::{Batch, WorkerPermit, WorkerPool, batch_size, partition};
pub use retry::{is_retryable_error, retry_with_backoff};
pub use traits::ObjectBackend;
pub use types::{
    BucketAcl, BucketSummary, ByteRange, CannedAcl, CompletedPart, Grant, ListParams, ObjectList,
    ObjectStat, ObjectSummary, UploadParams,
};

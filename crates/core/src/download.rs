//! Object download to local files
//!
//! One-shot download with partial-read detection: the bytes written are
//! checked against the size the backend reported, and a mismatch is an
//! explicit [`Error::ShortRead`], never silently tolerated. No retry or
//! resumption happens at this layer.

use std::path::Path;

use crate::error::{Error, Result};
use crate::traits::ObjectBackend;
use crate::types::ByteRange;

/// Fetch an object and write it to `path`, returning the byte count
///
/// The file is truncated if it exists. A body shorter or longer than the
/// size reported by the backend fails with `ShortRead` after the bytes have
/// been written, so the partial file is available for inspection.
pub async fn download_to_file<B: ObjectBackend + ?Sized>(
    backend: &B,
    bucket: &str,
    key: &str,
    path: &Path,
) -> Result<u64> {
    let stat = backend.head_object(bucket, key).await?;
    let expected = stat.size_bytes.max(0) as u64;

    let data = backend.get_object(bucket, key, None).await?;
    let written = data.len() as u64;
    tokio::fs::write(path, &data).await?;

    if written != expected {
        return Err(Error::ShortRead { expected, written });
    }
    tracing::debug!(bucket = %bucket, key = %key, bytes = written, "downloaded object");
    Ok(written)
}

/// Fetch one byte range of an object and write it to `path`
///
/// For closed ranges the written count is verified against the range width.
pub async fn download_range_to_file<B: ObjectBackend + ?Sized>(
    backend: &B,
    bucket: &str,
    key: &str,
    range: ByteRange,
    path: &Path,
) -> Result<u64> {
    let data = backend.get_object(bucket, key, Some(range)).await?;
    let written = data.len() as u64;
    tokio::fs::write(path, &data).await?;

    if let Some(expected) = range.len()
        && written != expected
    {
        return Err(Error::ShortRead { expected, written });
    }
    Ok(written)
}

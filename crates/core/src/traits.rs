//! Backend capability trait
//!
//! The transfer coordinators talk to storage through [`ObjectBackend`] and
//! never to a concrete SDK. Every call either succeeds with a typed payload
//! or fails with a classified [`Error`](crate::Error): `Service` when the
//! backend reported a structured code, `Transport`/`Io` for local failures.
//!
//! There is one production implementation (the `obs-s3` crate) and one
//! in-memory implementation ([`crate::memory::InMemoryBackend`]) used for
//! deterministic coordinator tests.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::types::{
    BucketAcl, BucketSummary, ByteRange, CannedAcl, CompletedPart, ListParams, ObjectList,
    ObjectStat, UploadParams,
};

/// Capability set exposed by an object-storage backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    // ----- buckets -----

    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Create a bucket; returns its location
    async fn create_bucket(&self, bucket: &str) -> Result<String>;

    /// Delete an empty bucket
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    async fn bucket_location(&self, bucket: &str) -> Result<String>;

    async fn list_buckets(&self) -> Result<Vec<BucketSummary>>;

    async fn get_bucket_acl(&self, bucket: &str) -> Result<BucketAcl>;

    async fn put_bucket_acl(&self, bucket: &str, acl: CannedAcl) -> Result<()>;

    async fn get_bucket_storage_class(&self, bucket: &str) -> Result<String>;

    async fn put_bucket_storage_class(&self, bucket: &str, storage_class: &str) -> Result<()>;

    // ----- objects -----

    async fn list_objects(&self, bucket: &str, params: &ListParams) -> Result<ObjectList>;

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectStat>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Server-side whole-object copy; returns the new ETag
    async fn copy_object(
        &self,
        bucket: &str,
        key: &str,
        src_bucket: &str,
        src_key: &str,
        storage_class: Option<String>,
    ) -> Result<String>;

    /// Read an object, optionally restricted to a byte range
    async fn get_object(&self, bucket: &str, key: &str, range: Option<ByteRange>) -> Result<Bytes>;

    /// Write an object; returns its ETag
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        params: &UploadParams,
    ) -> Result<String>;

    // ----- multipart -----

    /// Start a multipart upload; returns the upload id
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        params: &UploadParams,
    ) -> Result<String>;

    /// Upload one part from bytes; returns the part ETag
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String>;

    /// Server-side copy of a source byte range into one part; returns the
    /// part ETag
    async fn upload_part_copy(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        src_bucket: &str,
        src_key: &str,
        range: Option<ByteRange>,
    ) -> Result<String>;

    /// Assemble the listed parts into the final object; returns its ETag
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String>;

    /// Release the backend-side upload resource
    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // every trait method must stay mockable; owned parameters keep automock
    // free of higher-ranked lifetimes
    #[tokio::test]
    async fn test_mock_backend_copy_object() {
        let mut mock = MockObjectBackend::new();
        mock.expect_copy_object()
            .withf(|bucket, key, src_bucket, src_key, storage_class| {
                bucket == "dst-bkt"
                    && key == "obj"
                    && src_bucket == "src-bkt"
                    && src_key == "obj"
                    && storage_class.as_deref() == Some("COLD")
            })
            .returning(|_, _, _, _, _| Ok("etag-copy".to_string()));

        let etag = mock
            .copy_object("dst-bkt", "obj", "src-bkt", "obj", Some("COLD".to_string()))
            .await
            .unwrap();
        assert_eq!(etag, "etag-copy");
    }

    #[tokio::test]
    async fn test_mock_backend_ranged_get() {
        let mut mock = MockObjectBackend::new();
        mock.expect_get_object()
            .withf(|_, _, range| *range == Some(ByteRange::Closed(0, 3)))
            .returning(|_, _, _| Ok(Bytes::from_static(b"head")));

        let data = mock
            .get_object("bkt", "obj", Some(ByteRange::Closed(0, 3)))
            .await
            .unwrap();
        assert_eq!(data.as_ref(), b"head");
    }
}

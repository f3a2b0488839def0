//! In-memory object backend
//!
//! Deterministic [`ObjectBackend`] implementation backing the coordinator
//! tests: no network, programmable per-key delete failures, call counters
//! and a concurrency gauge. Stricter than S3 in one spot: deleting a missing
//! key reports `NoSuchKey` instead of succeeding silently, so tests can
//! observe exactly which keys were attempted.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use jiff::Timestamp;

use crate::error::{Error, Result};
use crate::traits::ObjectBackend;
use crate::types::{
    BucketAcl, BucketSummary, ByteRange, CannedAcl, CompletedPart, Grant, ListParams, ObjectList,
    ObjectStat, ObjectSummary, UploadParams,
};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    content_type: Option<String>,
    storage_class: Option<String>,
    last_modified: Timestamp,
}

#[derive(Debug)]
struct BucketEntry {
    location: String,
    acl: CannedAcl,
    storage_class: String,
    creation_date: Timestamp,
    objects: BTreeMap<String, StoredObject>,
}

impl BucketEntry {
    fn new() -> Self {
        Self {
            location: "us-east-1".to_string(),
            acl: CannedAcl::Private,
            storage_class: "STANDARD".to_string(),
            creation_date: Timestamp::now(),
            objects: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
struct UploadEntry {
    bucket: String,
    key: String,
    params: UploadParams,
    parts: HashMap<i32, (String, Bytes)>,
}

/// Map-backed backend for deterministic tests
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    buckets: Mutex<HashMap<String, BucketEntry>>,
    uploads: Mutex<HashMap<String, UploadEntry>>,
    etag_counter: AtomicU64,
    upload_counter: AtomicU64,

    // test instrumentation
    fail_delete_keys: Mutex<HashSet<String>>,
    fail_next_complete: AtomicBool,
    truncate_next_get: AtomicUsize,
    delete_calls: AtomicUsize,
    track_concurrency: AtomicBool,
    active_deletes: AtomicUsize,
    max_concurrent_deletes: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delete of the listed keys fail with an `InternalError`
    /// service error
    pub fn fail_deletes_for(&self, keys: &[&str]) {
        let mut failing = self
            .fail_delete_keys
            .lock()
            .expect("fail set lock poisoned");
        for key in keys {
            failing.insert((*key).to_string());
        }
    }

    /// Make the next complete-multipart call fail once with a transport error
    pub fn fail_next_complete(&self) {
        self.fail_next_complete.store(true, Ordering::SeqCst);
    }

    /// Truncate the body of the next get_object call to `len` bytes once,
    /// simulating a connection dropped mid-body
    pub fn truncate_next_get(&self, len: usize) {
        self.truncate_next_get.store(len, Ordering::SeqCst);
    }

    /// Total delete_object calls observed
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Start recording the concurrency gauge for delete_object
    ///
    /// Adds a tiny delay per delete so overlapping workers actually overlap.
    pub fn track_concurrency(&self) {
        self.track_concurrency.store(true, Ordering::SeqCst);
    }

    /// Highest number of delete_object calls observed in flight at once
    pub fn max_concurrent_deletes(&self) -> usize {
        self.max_concurrent_deletes.load(Ordering::SeqCst)
    }

    /// Whether a multipart upload id is still live backend-side
    pub fn has_upload(&self, upload_id: &str) -> bool {
        self.uploads
            .lock()
            .expect("uploads lock poisoned")
            .contains_key(upload_id)
    }

    fn next_etag(&self) -> String {
        format!("etag-{:08x}", self.etag_counter.fetch_add(1, Ordering::SeqCst))
    }

    fn missing_bucket(bucket: &str) -> Error {
        Error::Service {
            code: "NoSuchBucket".to_string(),
            message: format!("bucket does not exist: {bucket}"),
        }
    }

    fn missing_upload(upload_id: &str) -> Error {
        Error::Service {
            code: "NoSuchUpload".to_string(),
            message: format!("upload does not exist: {upload_id}"),
        }
    }

    fn slice_range(data: &Bytes, range: Option<ByteRange>) -> Result<Bytes> {
        let len = data.len() as u64;
        match range {
            None => Ok(data.clone()),
            Some(ByteRange::From(start)) => {
                if start >= len {
                    return Err(Error::Service {
                        code: "InvalidRange".to_string(),
                        message: format!("range start {start} beyond object of {len} bytes"),
                    });
                }
                Ok(data.slice(start as usize..))
            }
            Some(ByteRange::Closed(start, end)) => {
                if start > end || start >= len {
                    return Err(Error::Service {
                        code: "InvalidRange".to_string(),
                        message: format!("invalid range {start}-{end} for {len} bytes"),
                    });
                }
                let end = end.min(len - 1);
                Ok(data.slice(start as usize..=end as usize))
            }
        }
    }
}

#[async_trait]
impl ObjectBackend for InMemoryBackend {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self
            .buckets
            .lock()
            .expect("buckets lock poisoned")
            .contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<String> {
        let mut buckets = self.buckets.lock().expect("buckets lock poisoned");
        if buckets.contains_key(bucket) {
            return Err(Error::Service {
                code: "BucketAlreadyExists".to_string(),
                message: format!("bucket already exists: {bucket}"),
            });
        }
        let entry = BucketEntry::new();
        let location = entry.location.clone();
        buckets.insert(bucket.to_string(), entry);
        Ok(location)
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let mut buckets = self.buckets.lock().expect("buckets lock poisoned");
        match buckets.get(bucket) {
            None => Err(Self::missing_bucket(bucket)),
            Some(entry) if !entry.objects.is_empty() => Err(Error::Service {
                code: "BucketNotEmpty".to_string(),
                message: format!("bucket is not empty: {bucket}"),
            }),
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }

    async fn bucket_location(&self, bucket: &str) -> Result<String> {
        let buckets = self.buckets.lock().expect("buckets lock poisoned");
        buckets
            .get(bucket)
            .map(|entry| entry.location.clone())
            .ok_or_else(|| Self::missing_bucket(bucket))
    }

    async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        let buckets = self.buckets.lock().expect("buckets lock poisoned");
        let mut summaries: Vec<_> = buckets
            .iter()
            .map(|(name, entry)| BucketSummary {
                name: name.clone(),
                location: Some(entry.location.clone()),
                creation_date: Some(entry.creation_date),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    async fn get_bucket_acl(&self, bucket: &str) -> Result<BucketAcl> {
        let buckets = self.buckets.lock().expect("buckets lock poisoned");
        let entry = buckets
            .get(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;

        let mut grants = vec![Grant {
            grantee: "owner".to_string(),
            permission: "FULL_CONTROL".to_string(),
        }];
        match entry.acl {
            CannedAcl::Private => {}
            CannedAcl::PublicRead => grants.push(Grant {
                grantee: "AllUsers".to_string(),
                permission: "READ".to_string(),
            }),
            CannedAcl::PublicReadWrite => {
                grants.push(Grant {
                    grantee: "AllUsers".to_string(),
                    permission: "READ".to_string(),
                });
                grants.push(Grant {
                    grantee: "AllUsers".to_string(),
                    permission: "WRITE".to_string(),
                });
            }
        }
        Ok(BucketAcl {
            owner: Some("owner".to_string()),
            grants,
        })
    }

    async fn put_bucket_acl(&self, bucket: &str, acl: CannedAcl) -> Result<()> {
        let mut buckets = self.buckets.lock().expect("buckets lock poisoned");
        let entry = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;
        entry.acl = acl;
        Ok(())
    }

    async fn get_bucket_storage_class(&self, bucket: &str) -> Result<String> {
        let buckets = self.buckets.lock().expect("buckets lock poisoned");
        buckets
            .get(bucket)
            .map(|entry| entry.storage_class.clone())
            .ok_or_else(|| Self::missing_bucket(bucket))
    }

    async fn put_bucket_storage_class(&self, bucket: &str, storage_class: &str) -> Result<()> {
        let mut buckets = self.buckets.lock().expect("buckets lock poisoned");
        let entry = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;
        entry.storage_class = storage_class.to_string();
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, params: &ListParams) -> Result<ObjectList> {
        let buckets = self.buckets.lock().expect("buckets lock poisoned");
        let entry = buckets
            .get(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;

        let prefix = params.prefix.as_deref().unwrap_or("");
        let marker = params.marker.as_deref().unwrap_or("");
        let max_keys = params.max_keys.unwrap_or(1000).max(1) as usize;

        let mut objects = Vec::new();
        let mut common_prefixes = Vec::new();
        let mut seen_prefixes = HashSet::new();
        let mut next_marker = None;
        let mut is_truncated = false;
        let mut last_emitted: Option<&String> = None;

        for (key, object) in entry.objects.iter() {
            if !key.starts_with(prefix) || key.as_str() <= marker {
                continue;
            }
            if objects.len() + common_prefixes.len() >= max_keys {
                // continuation resumes strictly after the last emitted key
                is_truncated = true;
                next_marker = last_emitted.cloned();
                break;
            }
            last_emitted = Some(key);

            // group keys under the delimiter following the prefix
            if let Some(delimiter) = params.delimiter.as_deref()
                && !delimiter.is_empty()
                && let Some(pos) = key[prefix.len()..].find(delimiter)
            {
                let group = key[..prefix.len() + pos + delimiter.len()].to_string();
                if seen_prefixes.insert(group.clone()) {
                    common_prefixes.push(group);
                }
                continue;
            }

            objects.push(ObjectSummary {
                key: key.clone(),
                size_bytes: object.data.len() as i64,
                etag: Some(object.etag.clone()),
                storage_class: object.storage_class.clone(),
                last_modified: Some(object.last_modified),
            });
        }

        Ok(ObjectList {
            objects,
            common_prefixes,
            is_truncated,
            next_marker,
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectStat> {
        let buckets = self.buckets.lock().expect("buckets lock poisoned");
        let entry = buckets
            .get(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;
        let object = entry
            .objects
            .get(key)
            .ok_or_else(|| Error::NotFound(format!("{bucket}/{key}")))?;

        Ok(ObjectStat {
            key: key.to_string(),
            size_bytes: object.data.len() as i64,
            etag: Some(object.etag.clone()),
            content_type: object.content_type.clone(),
            storage_class: object.storage_class.clone(),
            last_modified: Some(object.last_modified),
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        if self.track_concurrency.load(Ordering::SeqCst) {
            let now = self.active_deletes.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent_deletes.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            self.active_deletes.fetch_sub(1, Ordering::SeqCst);
        }

        let injected = self
            .fail_delete_keys
            .lock()
            .expect("fail set lock poisoned")
            .contains(key);
        if injected {
            return Err(Error::Service {
                code: "InternalError".to_string(),
                message: format!("injected delete failure: {key}"),
            });
        }

        let mut buckets = self.buckets.lock().expect("buckets lock poisoned");
        let entry = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;
        if entry.objects.remove(key).is_none() {
            return Err(Error::Service {
                code: "NoSuchKey".to_string(),
                message: format!("key does not exist: {key}"),
            });
        }
        Ok(())
    }

    async fn copy_object(
        &self,
        bucket: &str,
        key: &str,
        src_bucket: &str,
        src_key: &str,
        storage_class: Option<String>,
    ) -> Result<String> {
        let mut buckets = self.buckets.lock().expect("buckets lock poisoned");
        let source = buckets
            .get(src_bucket)
            .ok_or_else(|| Self::missing_bucket(src_bucket))?
            .objects
            .get(src_key)
            .ok_or_else(|| Error::NotFound(format!("{src_bucket}/{src_key}")))?
            .clone();

        let etag = self.next_etag();
        let entry = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;
        entry.objects.insert(
            key.to_string(),
            StoredObject {
                data: source.data,
                etag: etag.clone(),
                content_type: source.content_type,
                storage_class: storage_class.or(source.storage_class),
                last_modified: Timestamp::now(),
            },
        );
        Ok(etag)
    }

    async fn get_object(&self, bucket: &str, key: &str, range: Option<ByteRange>) -> Result<Bytes> {
        let buckets = self.buckets.lock().expect("buckets lock poisoned");
        let entry = buckets
            .get(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;
        let object = entry
            .objects
            .get(key)
            .ok_or_else(|| Error::NotFound(format!("{bucket}/{key}")))?;
        let data = Self::slice_range(&object.data, range)?;

        // zero means "off"; truncating to zero bytes is not expressible
        let truncate = self.truncate_next_get.swap(0, Ordering::SeqCst);
        if truncate > 0 && data.len() > truncate {
            return Ok(data.slice(..truncate));
        }
        Ok(data)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        params: &UploadParams,
    ) -> Result<String> {
        let etag = self.next_etag();
        let mut buckets = self.buckets.lock().expect("buckets lock poisoned");
        let entry = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;
        entry.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                etag: etag.clone(),
                content_type: params.content_type.clone(),
                storage_class: params.storage_class.clone(),
                last_modified: Timestamp::now(),
            },
        );
        Ok(etag)
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        params: &UploadParams,
    ) -> Result<String> {
        if !self
            .buckets
            .lock()
            .expect("buckets lock poisoned")
            .contains_key(bucket)
        {
            return Err(Self::missing_bucket(bucket));
        }

        let upload_id = format!(
            "upload-{:08x}",
            self.upload_counter.fetch_add(1, Ordering::SeqCst)
        );
        self.uploads.lock().expect("uploads lock poisoned").insert(
            upload_id.clone(),
            UploadEntry {
                bucket: bucket.to_string(),
                key: key.to_string(),
                params: params.clone(),
                parts: HashMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        let etag = self.next_etag();
        let mut uploads = self.uploads.lock().expect("uploads lock poisoned");
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| Self::missing_upload(upload_id))?;
        upload.parts.insert(part_number, (etag.clone(), data));
        Ok(etag)
    }

    async fn upload_part_copy(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        src_bucket: &str,
        src_key: &str,
        range: Option<ByteRange>,
    ) -> Result<String> {
        let data = self.get_object(src_bucket, src_key, range).await?;
        self.upload_part(bucket, key, upload_id, part_number, data)
            .await
    }

    async fn complete_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String> {
        if self.fail_next_complete.swap(false, Ordering::SeqCst) {
            return Err(Error::Transport("injected complete failure".to_string()));
        }

        // validate and assemble before touching anything; a failed complete
        // leaves the upload intact so the caller may retry or abort
        let (assembled, bucket, key, params) = {
            let uploads = self.uploads.lock().expect("uploads lock poisoned");
            let upload = uploads
                .get(upload_id)
                .ok_or_else(|| Self::missing_upload(upload_id))?;

            let mut assembled = Vec::new();
            let mut last_part_number = 0;
            for part in parts {
                if part.part_number <= last_part_number {
                    return Err(Error::Service {
                        code: "InvalidPartOrder".to_string(),
                        message: format!("part {} out of order", part.part_number),
                    });
                }
                last_part_number = part.part_number;

                let (etag, data) = upload.parts.get(&part.part_number).ok_or_else(|| {
                    Error::Service {
                        code: "InvalidPart".to_string(),
                        message: format!("part {} was never uploaded", part.part_number),
                    }
                })?;
                if *etag != part.etag {
                    return Err(Error::Service {
                        code: "InvalidPart".to_string(),
                        message: format!("part {} etag mismatch", part.part_number),
                    });
                }
                assembled.extend_from_slice(data);
            }
            (
                assembled,
                upload.bucket.clone(),
                upload.key.clone(),
                upload.params.clone(),
            )
        };

        let etag = self
            .put_object(&bucket, &key, Bytes::from(assembled), &params)
            .await?;
        self.uploads
            .lock()
            .expect("uploads lock poisoned")
            .remove(upload_id);
        Ok(etag)
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> Result<()> {
        let mut uploads = self.uploads.lock().expect("uploads lock poisoned");
        uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| Self::missing_upload(upload_id))
    }
}

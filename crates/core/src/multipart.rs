//! Multipart transfer coordinator
//!
//! A [`MultipartUpload`] owns one backend upload session through its
//! life-cycle: initiate, per-part upload or server-side copy, then complete
//! or abort. Part operations take `&self` and are safe to drive concurrently
//! for distinct part numbers; each successful part records its ETag in a
//! write-once-per-slot map. Writing the same part number twice overwrites
//! the slot (last writer wins) rather than raising a conflict.
//!
//! Chunked downloads need no session state: ranged reads go straight through
//! [`ObjectBackend::get_object`] with a [`ByteRange`], and callers drive the
//! ranges concurrently themselves. No retry or resumption happens here.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::traits::ObjectBackend;
use crate::types::{ByteRange, CompletedPart, UploadParams};

/// Life-cycle state of a multipart session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initiated; parts may be uploaded
    Active,
    /// Completion in flight; part writes are rejected
    Completing,
    /// Completed; terminal
    Done,
    /// Aborted; terminal
    Aborted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Active => "active",
            SessionState::Completing => "completing",
            SessionState::Done => "done",
            SessionState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// One in-flight multipart upload session
#[derive(Debug)]
pub struct MultipartUpload<B: ?Sized> {
    backend: Arc<B>,
    bucket: String,
    key: String,
    upload_id: String,
    parts: Mutex<BTreeMap<i32, String>>,
    state: Mutex<SessionState>,
}

impl<B: ObjectBackend + ?Sized> MultipartUpload<B> {
    /// Start a new upload session for `bucket`/`key`
    pub async fn initiate(
        backend: Arc<B>,
        bucket: impl Into<String>,
        key: impl Into<String>,
        params: &UploadParams,
    ) -> Result<Self> {
        let bucket = bucket.into();
        let key = key.into();
        let upload_id = backend
            .create_multipart_upload(&bucket, &key, params)
            .await?;
        tracing::debug!(bucket = %bucket, key = %key, upload_id = %upload_id, "multipart initiated");

        Ok(Self {
            backend,
            bucket,
            key,
            upload_id,
            parts: Mutex::new(BTreeMap::new()),
            state: Mutex::new(SessionState::Active),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("session state lock poisoned")
    }

    /// Parts recorded so far, ascending by part number
    pub fn parts(&self) -> Vec<CompletedPart> {
        self.parts
            .lock()
            .expect("session parts lock poisoned")
            .iter()
            .map(|(&part_number, etag)| CompletedPart {
                part_number,
                etag: etag.clone(),
            })
            .collect()
    }

    pub fn part_count(&self) -> usize {
        self.parts.lock().expect("session parts lock poisoned").len()
    }

    /// Upload one part from bytes; records its ETag on success
    ///
    /// Part numbers are 1-based. Re-uploading a part number overwrites the
    /// previously recorded slot.
    pub async fn upload_part(&self, part_number: i32, data: Bytes) -> Result<String> {
        self.ensure_active(part_number)?;
        let etag = self
            .backend
            .upload_part(&self.bucket, &self.key, &self.upload_id, part_number, data)
            .await?;
        self.record_part(part_number, etag.clone());
        Ok(etag)
    }

    /// Server-side copy of a source byte range into one part
    pub async fn upload_part_copy(
        &self,
        part_number: i32,
        src_bucket: &str,
        src_key: &str,
        range: Option<ByteRange>,
    ) -> Result<String> {
        self.ensure_active(part_number)?;
        let etag = self
            .backend
            .upload_part_copy(
                &self.bucket,
                &self.key,
                &self.upload_id,
                part_number,
                src_bucket,
                src_key,
                range,
            )
            .await?;
        self.record_part(part_number, etag.clone());
        Ok(etag)
    }

    /// Assemble the recorded parts into the final object
    ///
    /// Parts are sent ascending by part number; a subset with gaps is
    /// allowed, the backend decides whether to accept it. On success the
    /// session is done and unusable; on failure it stays active so the
    /// caller may retry completion or abort.
    pub async fn complete(&self) -> Result<String> {
        {
            let mut state = self.state.lock().expect("session state lock poisoned");
            match *state {
                SessionState::Active => *state = SessionState::Completing,
                other => return Err(Error::SessionClosed(other)),
            }
        }

        let parts = self.parts();
        if parts.is_empty() {
            self.set_state(SessionState::Active);
            return Err(Error::NoCompletedParts);
        }

        match self
            .backend
            .complete_multipart_upload(&self.bucket, &self.key, &self.upload_id, &parts)
            .await
        {
            Ok(etag) => {
                self.set_state(SessionState::Done);
                tracing::debug!(
                    upload_id = %self.upload_id,
                    parts = parts.len(),
                    "multipart completed"
                );
                Ok(etag)
            }
            Err(e) => {
                self.set_state(SessionState::Active);
                Err(e)
            }
        }
    }

    /// Release the backend-side upload resource
    ///
    /// Callable from any non-terminal state. A second abort is not guarded
    /// here; the backend's no-such-upload error surfaces to the caller.
    pub async fn abort(&self) -> Result<()> {
        if self.state() == SessionState::Done {
            return Err(Error::SessionClosed(SessionState::Done));
        }

        self.backend
            .abort_multipart_upload(&self.bucket, &self.key, &self.upload_id)
            .await?;
        self.set_state(SessionState::Aborted);
        tracing::debug!(upload_id = %self.upload_id, "multipart aborted");
        Ok(())
    }

    fn ensure_active(&self, part_number: i32) -> Result<()> {
        if part_number < 1 {
            return Err(Error::InvalidPartNumber(part_number));
        }
        match self.state() {
            SessionState::Active => Ok(()),
            other => Err(Error::SessionClosed(other)),
        }
    }

    fn record_part(&self, part_number: i32, etag: String) {
        self.parts
            .lock()
            .expect("session parts lock poisoned")
            .insert(part_number, etag);
    }

    fn set_state(&self, next: SessionState) {
        *self.state.lock().expect("session state lock poisoned") = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;

    async fn backend_with_bucket(bucket: &str) -> Arc<InMemoryBackend> {
        let backend = Arc::new(InMemoryBackend::new());
        backend.create_bucket(bucket).await.unwrap();
        backend
    }

    async fn new_session(backend: &Arc<InMemoryBackend>) -> MultipartUpload<InMemoryBackend> {
        MultipartUpload::initiate(
            Arc::clone(backend),
            "bkt",
            "big-object",
            &UploadParams::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_parts_assemble_in_ascending_order() {
        let backend = backend_with_bucket("bkt").await;
        let session = Arc::new(new_session(&backend).await);

        // upload parts in scrambled order from concurrent tasks
        let mut handles = Vec::new();
        for part_number in [4, 1, 3, 2] {
            let session = Arc::clone(&session);
            handles.push(tokio::spawn(async move {
                let payload = Bytes::from(vec![b'0' + part_number as u8; 8]);
                session.upload_part(part_number, payload).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(session.part_count(), 4);
        session.complete().await.unwrap();
        assert_eq!(session.state(), SessionState::Done);

        let data = backend.get_object("bkt", "big-object", None).await.unwrap();
        let mut expected = Vec::new();
        for part_number in 1..=4u8 {
            expected.extend_from_slice(&[b'0' + part_number; 8]);
        }
        assert_eq!(data.as_ref(), expected.as_slice());
    }

    #[tokio::test]
    async fn test_subset_with_gaps_completes() {
        let backend = backend_with_bucket("bkt").await;
        let session = new_session(&backend).await;

        session.upload_part(1, Bytes::from_static(b"one")).await.unwrap();
        session.upload_part(3, Bytes::from_static(b"three")).await.unwrap();
        session.complete().await.unwrap();

        let data = backend.get_object("bkt", "big-object", None).await.unwrap();
        assert_eq!(data.as_ref(), b"onethree");
    }

    #[tokio::test]
    async fn test_duplicate_part_number_last_writer_wins() {
        let backend = backend_with_bucket("bkt").await;
        let session = new_session(&backend).await;

        session.upload_part(1, Bytes::from_static(b"first")).await.unwrap();
        session.upload_part(1, Bytes::from_static(b"second")).await.unwrap();
        assert_eq!(session.part_count(), 1);
        session.complete().await.unwrap();

        let data = backend.get_object("bkt", "big-object", None).await.unwrap();
        assert_eq!(data.as_ref(), b"second");
    }

    #[tokio::test]
    async fn test_part_number_is_one_based() {
        let backend = backend_with_bucket("bkt").await;
        let session = new_session(&backend).await;

        let err = session.upload_part(0, Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidPartNumber(0)));
    }

    #[tokio::test]
    async fn test_complete_without_parts_fails_fast() {
        let backend = backend_with_bucket("bkt").await;
        let session = new_session(&backend).await;

        let err = session.complete().await.unwrap_err();
        assert!(matches!(err, Error::NoCompletedParts));
        // session is still usable afterwards
        assert_eq!(session.state(), SessionState::Active);
        session.upload_part(1, Bytes::from_static(b"x")).await.unwrap();
        session.complete().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_complete_leaves_session_retryable() {
        let backend = backend_with_bucket("bkt").await;
        let session = new_session(&backend).await;
        session.upload_part(1, Bytes::from_static(b"x")).await.unwrap();

        backend.fail_next_complete();
        assert!(session.complete().await.is_err());
        assert_eq!(session.state(), SessionState::Active);

        // retrying completion succeeds
        session.complete().await.unwrap();
        assert_eq!(session.state(), SessionState::Done);
    }

    #[tokio::test]
    async fn test_session_unusable_after_complete() {
        let backend = backend_with_bucket("bkt").await;
        let session = new_session(&backend).await;
        session.upload_part(1, Bytes::from_static(b"x")).await.unwrap();
        session.complete().await.unwrap();

        let err = session.upload_part(2, Bytes::from_static(b"y")).await.unwrap_err();
        assert!(matches!(err, Error::SessionClosed(SessionState::Done)));
        let err = session.abort().await.unwrap_err();
        assert!(matches!(err, Error::SessionClosed(SessionState::Done)));
    }

    #[tokio::test]
    async fn test_abort_before_parts_releases_upload() {
        let backend = backend_with_bucket("bkt").await;
        let session = new_session(&backend).await;
        let upload_id = session.upload_id().to_string();

        session.abort().await.unwrap();
        assert_eq!(session.state(), SessionState::Aborted);

        // upload id is gone backend-side; nothing partial is retrievable
        assert!(!backend.has_upload(&upload_id));
        assert!(matches!(
            backend.get_object("bkt", "big-object", None).await,
            Err(Error::NotFound(_))
        ));

        // part operations on the aborted session are caller errors
        let err = session.upload_part(1, Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, Error::SessionClosed(SessionState::Aborted)));
    }

    #[tokio::test]
    async fn test_part_copy_from_source_range() {
        let backend = backend_with_bucket("bkt").await;
        backend
            .put_object(
                "bkt",
                "source",
                Bytes::from_static(b"0123456789abcdef"),
                &UploadParams::default(),
            )
            .await
            .unwrap();

        let session = new_session(&backend).await;
        session
            .upload_part_copy(1, "bkt", "source", Some(ByteRange::Closed(0, 7)))
            .await
            .unwrap();
        session
            .upload_part_copy(2, "bkt", "source", Some(ByteRange::From(8)))
            .await
            .unwrap();
        session.complete().await.unwrap();

        let data = backend.get_object("bkt", "big-object", None).await.unwrap();
        assert_eq!(data.as_ref(), b"0123456789abcdef");
    }

    #[tokio::test]
    async fn test_ranged_download() {
        let backend = backend_with_bucket("bkt").await;
        backend
            .put_object(
                "bkt",
                "blob",
                Bytes::from_static(b"hello world"),
                &UploadParams::default(),
            )
            .await
            .unwrap();

        let head = backend
            .get_object("bkt", "blob", Some(ByteRange::Closed(0, 4)))
            .await
            .unwrap();
        assert_eq!(head.as_ref(), b"hello");

        let tail = backend
            .get_object("bkt", "blob", Some(ByteRange::From(6)))
            .await
            .unwrap();
        assert_eq!(tail.as_ref(), b"world");
    }
}

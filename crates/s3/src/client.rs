//! S3 backend implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectBackend trait from obs-core.

use async_trait::async_trait;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketCannedAcl, CompletedMultipartUpload, CompletedPart as S3CompletedPart, StorageClass,
};
use bytes::Bytes;
use jiff::Timestamp;

use obs_core::{
    BucketAcl, BucketSummary, ByteRange, CannedAcl, CompletedPart, Error, Grant, ListParams,
    ObjectBackend, ObjectList, ObjectStat, ObjectSummary, Result, UploadParams,
};

const HTTP_PROTOCOL: &str = "http://";
const HTTPS_PROTOCOL: &str = "https://";

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Endpoint host, with or without an http/https prefix
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
    pub use_https: bool,
    /// Path-style addressing for S3-compatible services
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: "us-east-1".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            session_token: None,
            use_https: true,
            force_path_style: true,
        }
    }
}

/// Strip any scheme from `endpoint` and re-apply the configured one
fn normalize_endpoint(endpoint: &str, use_https: bool) -> Result<String> {
    let host = endpoint
        .strip_prefix(HTTP_PROTOCOL)
        .or_else(|| endpoint.strip_prefix(HTTPS_PROTOCOL))
        .unwrap_or(endpoint);
    if host.is_empty() {
        return Err(Error::Config("endpoint is empty".to_string()));
    }
    let protocol = if use_https {
        HTTPS_PROTOCOL
    } else {
        HTTP_PROTOCOL
    };
    Ok(format!("{protocol}{host}"))
}

/// Format a byte range as an HTTP Range header value
fn format_range(range: ByteRange) -> String {
    match range {
        ByteRange::From(start) => format!("bytes={start}-"),
        ByteRange::Closed(start, end) => format!("bytes={start}-{end}"),
    }
}

/// Copy source path for copy-object and part-copy requests
fn copy_source(bucket: &str, key: &str) -> String {
    format!("{bucket}/{key}")
}

fn timestamp_from(dt: &aws_sdk_s3::primitives::DateTime) -> Option<Timestamp> {
    Timestamp::from_second(dt.secs()).ok()
}

fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

/// Classify an SDK error into the engine's taxonomy
///
/// Service errors carry the backend-reported code and message; not-found
/// codes map to `NotFound`; everything local becomes `Transport`.
fn classify_sdk_error<E>(err: SdkError<E>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::ServiceError(context) => {
            let meta = context.err().meta();
            let code = meta.code().unwrap_or("Unknown").to_string();
            let message = meta
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| context.err().to_string());
            tracing::debug!(code = %code, "backend rejected request");
            if matches!(
                code.as_str(),
                "NoSuchKey" | "NoSuchBucket" | "NotFound" | "NoSuchUpload"
            ) {
                Error::NotFound(message)
            } else {
                Error::Service { code, message }
            }
        }
        SdkError::TimeoutError(_) => Error::Transport("request timeout".to_string()),
        SdkError::DispatchFailure(e) => Error::Transport(format!("dispatch failure: {e:?}")),
        SdkError::ResponseError(e) => Error::Transport(format!("response error: {e:?}")),
        _ => Error::Transport(err.to_string()),
    }
}

/// S3 client wrapper implementing the backend capability set
pub struct S3Backend {
    inner: aws_sdk_s3::Client,
}

impl S3Backend {
    /// Create a backend from static credentials and an endpoint
    pub async fn new(config: S3Config) -> Result<Self> {
        if config.access_key.is_empty() {
            return Err(Error::Config("no access key found".to_string()));
        }
        if config.secret_key.is_empty() {
            return Err(Error::Config("no secret key found".to_string()));
        }
        let endpoint = normalize_endpoint(&config.endpoint, config.use_https)?;

        // Build credentials provider
        let credentials = aws_credential_types::Credentials::new(
            config.access_key,
            config.secret_key,
            config.session_token,
            None, // expiry
            "obs-static-credentials",
        );

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(config.region))
            .endpoint_url(&endpoint)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }
}

#[async_trait]
impl ObjectBackend for S3Backend {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.inner.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(context)) if context.err().is_not_found() => Ok(false),
            Err(e) => Err(classify_sdk_error(e)),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<String> {
        let response = self
            .inner
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(classify_sdk_error)?;
        Ok(response.location().unwrap_or("unknown").to_string())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.inner
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(classify_sdk_error)?;
        Ok(())
    }

    async fn bucket_location(&self, bucket: &str) -> Result<String> {
        let response = self
            .inner
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(classify_sdk_error)?;
        Ok(response
            .location_constraint()
            .map(|c| c.as_str().to_string())
            .unwrap_or_default())
    }

    async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        let response = self
            .inner
            .list_buckets()
            .send()
            .await
            .map_err(classify_sdk_error)?;

        Ok(response
            .buckets()
            .iter()
            .map(|b| BucketSummary {
                name: b.name().unwrap_or_default().to_string(),
                location: b.bucket_region().map(str::to_string),
                creation_date: b.creation_date().and_then(timestamp_from),
            })
            .collect())
    }

    async fn get_bucket_acl(&self, bucket: &str) -> Result<BucketAcl> {
        let response = self
            .inner
            .get_bucket_acl()
            .bucket(bucket)
            .send()
            .await
            .map_err(classify_sdk_error)?;

        let owner = response
            .owner()
            .and_then(|o| o.display_name().or(o.id()))
            .map(str::to_string);
        let grants = response
            .grants()
            .iter()
            .map(|g| Grant {
                grantee: g
                    .grantee()
                    .and_then(|gr| gr.uri().or(gr.display_name()).or(gr.id()))
                    .unwrap_or("unknown")
                    .to_string(),
                permission: g
                    .permission()
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(BucketAcl { owner, grants })
    }

    async fn put_bucket_acl(&self, bucket: &str, acl: CannedAcl) -> Result<()> {
        self.inner
            .put_bucket_acl()
            .bucket(bucket)
            .acl(BucketCannedAcl::from(acl.as_str()))
            .send()
            .await
            .map_err(classify_sdk_error)?;
        Ok(())
    }

    async fn get_bucket_storage_class(&self, _bucket: &str) -> Result<String> {
        // S3 has no bucket-level storage class; objects carry their own
        Err(Error::Unsupported("bucket storage class"))
    }

    async fn put_bucket_storage_class(&self, _bucket: &str, _storage_class: &str) -> Result<()> {
        Err(Error::Unsupported("bucket storage class"))
    }

    async fn list_objects(&self, bucket: &str, params: &ListParams) -> Result<ObjectList> {
        let mut request = self.inner.list_objects().bucket(bucket);
        if let Some(prefix) = &params.prefix {
            request = request.prefix(prefix);
        }
        if let Some(delimiter) = &params.delimiter {
            request = request.delimiter(delimiter);
        }
        if let Some(marker) = &params.marker {
            request = request.marker(marker);
        }
        if let Some(max_keys) = params.max_keys {
            request = request.max_keys(max_keys);
        }

        let response = request.send().await.map_err(classify_sdk_error)?;

        let objects = response
            .contents()
            .iter()
            .map(|o| ObjectSummary {
                key: o.key().unwrap_or_default().to_string(),
                size_bytes: o.size().unwrap_or(0),
                etag: o.e_tag().map(trim_etag),
                storage_class: o.storage_class().map(|sc| sc.as_str().to_string()),
                last_modified: o.last_modified().and_then(timestamp_from),
            })
            .collect();
        let common_prefixes = response
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        Ok(ObjectList {
            objects,
            common_prefixes,
            is_truncated: response.is_truncated().unwrap_or(false),
            next_marker: response.next_marker().map(str::to_string),
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectStat> {
        let response = match self
            .inner
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(SdkError::ServiceError(context)) if context.err().is_not_found() => {
                return Err(Error::NotFound(format!("{bucket}/{key}")));
            }
            Err(e) => return Err(classify_sdk_error(e)),
        };

        Ok(ObjectStat {
            key: key.to_string(),
            size_bytes: response.content_length().unwrap_or(0),
            etag: response.e_tag().map(trim_etag),
            content_type: response.content_type().map(str::to_string),
            storage_class: response.storage_class().map(|sc| sc.as_str().to_string()),
            last_modified: response.last_modified().and_then(timestamp_from),
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.inner
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(classify_sdk_error)?;
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
        let mut request = self
            .inner
            .copy_object()
            .copy_source(copy_source(src_bucket, src_key))
            .bucket(bucket)
            .key(key);
        if let Some(sc) = storage_class {
            request = request.storage_class(StorageClass::from(sc.as_str()));
        }

        let response = request.send().await.map_err(classify_sdk_error)?;
        Ok(response
            .copy_object_result()
            .and_then(|r| r.e_tag())
            .map(trim_etag)
            .unwrap_or_default())
    }

    async fn get_object(&self, bucket: &str, key: &str, range: Option<ByteRange>) -> Result<Bytes> {
        let mut request = self.inner.get_object().bucket(bucket).key(key);
        if let Some(range) = range {
            request = request.range(format_range(range));
        }

        let response = request.send().await.map_err(classify_sdk_error)?;
        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?
            .into_bytes();
        Ok(data)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        params: &UploadParams,
    ) -> Result<String> {
        let mut request = self
            .inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data));
        if let Some(ct) = &params.content_type {
            request = request.content_type(ct);
        }
        if let Some(sc) = &params.storage_class {
            request = request.storage_class(StorageClass::from(sc.as_str()));
        }

        let response = request.send().await.map_err(classify_sdk_error)?;
        Ok(response.e_tag().map(trim_etag).unwrap_or_default())
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        params: &UploadParams,
    ) -> Result<String> {
        let mut request = self.inner.create_multipart_upload().bucket(bucket).key(key);
        if let Some(ct) = &params.content_type {
            request = request.content_type(ct);
        }
        if let Some(sc) = &params.storage_class {
            request = request.storage_class(StorageClass::from(sc.as_str()));
        }

        let response = request.send().await.map_err(classify_sdk_error)?;
        response
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| Error::Transport("response carried no upload id".to_string()))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        let response = self
            .inner
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(classify_sdk_error)?;
        Ok(response.e_tag().map(trim_etag).unwrap_or_default())
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
        let mut request = self
            .inner
            .upload_part_copy()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .copy_source(copy_source(src_bucket, src_key));
        if let Some(range) = range {
            request = request.copy_source_range(format_range(range));
        }

        let response = request.send().await.map_err(classify_sdk_error)?;
        Ok(response
            .copy_part_result()
            .and_then(|r| r.e_tag())
            .map(trim_etag)
            .unwrap_or_default())
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String> {
        let s3_parts: Vec<S3CompletedPart> = parts
            .iter()
            .map(|p| {
                S3CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();
        let multipart = CompletedMultipartUpload::builder()
            .set_parts(Some(s3_parts))
            .build();

        let response = self
            .inner
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(multipart)
            .send()
            .await
            .map_err(classify_sdk_error)?;
        Ok(response.e_tag().map(trim_etag).unwrap_or_default())
    }

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.inner
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(classify_sdk_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(
            normalize_endpoint("s3.example.com", true).unwrap(),
            "https://s3.example.com"
        );
        assert_eq!(
            normalize_endpoint("http://s3.example.com", true).unwrap(),
            "https://s3.example.com"
        );
        assert_eq!(
            normalize_endpoint("https://s3.example.com", false).unwrap(),
            "http://s3.example.com"
        );
        assert!(matches!(normalize_endpoint("", true), Err(Error::Config(_))));
        assert!(matches!(
            normalize_endpoint("https://", true),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_format_range() {
        assert_eq!(format_range(ByteRange::From(100)), "bytes=100-");
        assert_eq!(format_range(ByteRange::Closed(0, 1023)), "bytes=0-1023");
    }

    #[test]
    fn test_copy_source() {
        assert_eq!(copy_source("bkt", "a/b.txt"), "bkt/a/b.txt");
    }

    #[test]
    fn test_trim_etag() {
        assert_eq!(trim_etag("\"abc123\""), "abc123");
        assert_eq!(trim_etag("abc123"), "abc123");
    }
}

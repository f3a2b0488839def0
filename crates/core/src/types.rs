//! Shared payload types exchanged with storage backends

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Metadata for a stored object, as reported by head/stat calls
#[derive(Debug, Clone, Default, Serialize)]
pub struct ObjectStat {
    pub key: String,
    pub size_bytes: i64,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub storage_class: Option<String>,
    pub last_modified: Option<Timestamp>,
}

/// One bucket from a list-buckets call
#[derive(Debug, Clone, Serialize)]
pub struct BucketSummary {
    pub name: String,
    pub location: Option<String>,
    pub creation_date: Option<Timestamp>,
}

/// One object from a listing
#[derive(Debug, Clone, Serialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size_bytes: i64,
    pub etag: Option<String>,
    pub storage_class: Option<String>,
    pub last_modified: Option<Timestamp>,
}

/// Parameters for a list-objects call
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub marker: Option<String>,
    pub max_keys: Option<i32>,
}

/// One page of an object listing
#[derive(Debug, Clone, Default)]
pub struct ObjectList {
    pub objects: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

/// Byte range for ranged reads and part copies
///
/// `From(start)` is open-ended ("everything from start"), `Closed(start, end)`
/// is inclusive on both ends, matching HTTP range semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    From(u64),
    Closed(u64, u64),
}

impl ByteRange {
    /// Number of bytes a closed range covers
    ///
    /// An inverted closed range (`end < start`) covers zero bytes; backends
    /// reject it as an invalid range when asked to serve it.
    pub fn len(&self) -> Option<u64> {
        match self {
            ByteRange::From(_) => None,
            ByteRange::Closed(start, end) if end < start => Some(0),
            ByteRange::Closed(start, end) => Some(end - start + 1),
        }
    }

    /// True only for an inverted closed range
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

/// A part slot recorded after a successful upload or copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

/// Optional attributes applied when creating an object or upload
#[derive(Debug, Clone, Default)]
pub struct UploadParams {
    pub content_type: Option<String>,
    pub storage_class: Option<String>,
}

/// Canned bucket ACLs accepted by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CannedAcl {
    Private,
    PublicRead,
    PublicReadWrite,
}

impl CannedAcl {
    pub fn as_str(&self) -> &'static str {
        match self {
            CannedAcl::Private => "private",
            CannedAcl::PublicRead => "public-read",
            CannedAcl::PublicReadWrite => "public-read-write",
        }
    }

    /// Parse a user-supplied canned ACL name
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "private" => Ok(CannedAcl::Private),
            "public-read" => Ok(CannedAcl::PublicRead),
            "public-read-write" => Ok(CannedAcl::PublicReadWrite),
            other => Err(Error::Config(format!("unsupported canned ACL: {other}"))),
        }
    }
}

/// One grant from a bucket ACL
#[derive(Debug, Clone, Serialize)]
pub struct Grant {
    pub grantee: String,
    pub permission: String,
}

/// Bucket ACL as reported by the backend
#[derive(Debug, Clone, Default, Serialize)]
pub struct BucketAcl {
    pub owner: Option<String>,
    pub grants: Vec<Grant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range_len() {
        assert_eq!(ByteRange::Closed(0, 9).len(), Some(10));
        assert_eq!(ByteRange::Closed(5, 5).len(), Some(1));
        assert_eq!(ByteRange::From(100).len(), None);
    }

    #[test]
    fn test_inverted_range_is_empty_not_panic() {
        let range = ByteRange::Closed(5, 2);
        assert_eq!(range.len(), Some(0));
        assert!(range.is_empty());
        assert!(!ByteRange::Closed(2, 5).is_empty());
        assert!(!ByteRange::From(0).is_empty());
    }

    #[test]
    fn test_canned_acl_roundtrip() {
        for name in ["private", "public-read", "public-read-write"] {
            assert_eq!(CannedAcl::parse(name).unwrap().as_str(), name);
        }
        assert!(CannedAcl::parse("authenticated-read").is_err());
    }
}

//! Error types for the transfer engine
//!
//! Backend failures fall into two classes: service errors (the backend
//! rejected the request and reported a structured code) and local errors
//! (transport, timeout, I/O). Input errors are fatal to the specific call
//! and never retried. A partial bulk failure is a result shape
//! ([`crate::aggregate::DeleteReport`]), not an error variant.

use crate::multipart::SessionState;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the transfer engine and its backends
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backend rejected the request with a structured code and message
    #[error("service error {code}: {message}")]
    Service { code: String, message: String },

    /// Transport-level failure (connection, timeout, dispatch)
    #[error("transport error: {0}")]
    Transport(String),

    /// Local I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bucket, object or upload id does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Bulk delete was called with an empty key list
    #[error("empty key list")]
    EmptyKeyList,

    /// Part numbers are 1-based
    #[error("invalid part number: {0}")]
    InvalidPartNumber(i32),

    /// Complete was called before any part recorded an ETag
    #[error("no completed parts to assemble")]
    NoCompletedParts,

    /// Part operation on a session that already completed or aborted
    #[error("multipart session is {0}")]
    SessionClosed(SessionState),

    /// A download wrote fewer bytes than the response promised
    #[error("short read: expected {expected} bytes, wrote {written}")]
    ShortRead { expected: u64, written: u64 },

    /// The backend cannot express this capability
    #[error("unsupported by this backend: {0}")]
    Unsupported(&'static str),

    /// Invalid endpoint or credential configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Service error code, if the backend reported one
    pub fn service_code(&self) -> Option<&str> {
        match self {
            Error::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    /// True for errors produced before any backend call was made
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::EmptyKeyList
                | Error::InvalidPartNumber(_)
                | Error::NoCompletedParts
                | Error::SessionClosed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_code() {
        let err = Error::Service {
            code: "NoSuchBucket".to_string(),
            message: "bucket does not exist".to_string(),
        };
        assert_eq!(err.service_code(), Some("NoSuchBucket"));
        assert!(Error::Transport("reset".to_string()).service_code().is_none());
    }

    #[test]
    fn test_input_errors() {
        assert!(Error::EmptyKeyList.is_input_error());
        assert!(Error::InvalidPartNumber(0).is_input_error());
        assert!(!Error::NotFound("x".to_string()).is_input_error());
        assert!(
            !Error::Service {
                code: "SlowDown".to_string(),
                message: String::new(),
            }
            .is_input_error()
        );
    }

    #[test]
    fn test_display() {
        let err = Error::ShortRead {
            expected: 100,
            written: 42,
        };
        assert_eq!(err.to_string(), "short read: expected 100 bytes, wrote 42");
    }
}

//! obs-s3: aws-sdk-s3 backend for the obs transfer engine
//!
//! Implements the `ObjectBackend` trait from obs-core over aws-sdk-s3,
//! including client construction from static credentials and SDK error
//! classification into the engine's service/transport taxonomy.

mod client;

pub use client::{S3Backend, S3Config};

//! Native S3 support for archive uploads
//!
//! Uses the official AWS SDK for Rust. Credentials and region come from the
//! standard provider chain; S3-compatible services such as MinIO work
//! through a custom endpoint with path-style addressing.

mod archive;
mod client;
mod config;
mod error;

pub use archive::S3ArchiveStore;
pub use client::S3Client;
pub use config::S3Config;
pub use error::{S3Error, S3Result};

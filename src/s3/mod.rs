//! S3-compatible object store client

pub mod client;
pub mod errors;
#[cfg(test)]
pub mod memory;
pub mod signing;
pub mod types;

use async_trait::async_trait;
use bytes::Bytes;

pub use client::{ErrorEntry, S3Client, S3Config};
pub use errors::S3Error;
pub use types::*;

/// Hierarchy delimiter used for every listing
pub const DELIMITER: &str = "/";

/// The object-store operations the gateway and the folder-size cache depend on
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket this store operates on
    fn bucket_name(&self) -> &str;

    /// List immediate sub-prefixes and objects under `prefix`
    async fn list_immediate(&self, prefix: &str) -> Result<Listing, S3Error>;

    /// Fetch head-style metadata for one object
    async fn head_object(&self, key: &str) -> Result<ObjectMetadata, S3Error>;

    /// Fetch the full content of one object
    async fn get_object(&self, key: &str) -> Result<Bytes, S3Error>;

    /// Store an object, replacing any existing content
    async fn put_object(&self, key: &str, data: Bytes, content_type: &str)
        -> Result<(), S3Error>;

    /// Delete one object
    async fn delete_object(&self, key: &str) -> Result<(), S3Error>;

    /// Connection health: "healthy", "degraded" or "unhealthy"
    fn health_status(&self) -> &'static str {
        "healthy"
    }

    /// Recently failed operations, oldest first
    fn recent_errors(&self) -> Vec<ErrorEntry> {
        Vec::new()
    }
}

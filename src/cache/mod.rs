//! Folder-size caching layer
//!
//! S3-style stores do not track folder sizes, so the gateway computes them
//! once with a recursive walk, persists the result per bucket, and serves
//! lookups from memory for the rest of the process lifetime.

pub mod folder_sizes;
pub mod snapshot;

use std::path::PathBuf;

pub use folder_sizes::{CacheLoader, FolderSizeCache, DEFAULT_MAX_AGE};
pub use snapshot::SnapshotStore;

/// Failures reading or writing a persisted snapshot
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to access snapshot {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed snapshot {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

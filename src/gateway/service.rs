//! Gateway - request-level operations over one bucket
//!
//! Listings are always fetched live from the store; only folder sizes come
//! from the cache loaded at startup.

use bytes::Bytes;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::cache::FolderSizeCache;
use crate::s3::{ErrorEntry, ObjectMetadata, ObjectStore, S3Error};

/// A sub-folder in a listing
#[derive(Debug, Clone, PartialEq)]
pub struct FolderItem {
    /// Display name (sub-prefix relative to the listed prefix, no trailing '/')
    pub name: String,
    /// Full sub-prefix
    pub path: String,
    /// Cached cumulative size in bytes
    pub size: u64,
}

/// An object directly under the listed prefix
#[derive(Debug, Clone, PartialEq)]
pub struct FileItem {
    /// Key relative to the listed prefix
    pub key: String,
    /// Full object key
    pub path: String,
    pub size: u64,
    pub last_modified: String,
}

/// One level of the bucket hierarchy
#[derive(Debug, Clone)]
pub struct FolderListing {
    pub bucket: String,
    pub prefix: String,
    pub folders: Vec<FolderItem>,
    pub files: Vec<FileItem>,
}

/// A fetched object ready to be sent as an attachment
#[derive(Debug, Clone)]
pub struct Download {
    /// Last segment of the key
    pub file_name: String,
    pub data: Bytes,
}

/// Gateway health snapshot
#[derive(Debug, Clone)]
pub struct GatewayStatus {
    pub bucket: String,
    pub store_health: &'static str,
    pub recent_errors: Vec<ErrorEntry>,
    pub cached_folders: usize,
    pub cache_last_refreshed: Option<SystemTime>,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Serves one bucket
pub struct Gateway {
    /// Object store client
    store: Arc<dyn ObjectStore>,
    /// Folder sizes loaded at startup
    folder_sizes: Arc<FolderSizeCache>,
}

impl Gateway {
    pub fn new(store: Arc<dyn ObjectStore>, folder_sizes: Arc<FolderSizeCache>) -> Self {
        Self {
            store,
            folder_sizes,
        }
    }

    /// Get the bucket name
    pub fn bucket_name(&self) -> &str {
        self.store.bucket_name()
    }

    /// List folders (with cached sizes) and files directly under `prefix`
    pub async fn list_objects(&self, prefix: &str) -> Result<FolderListing, S3Error> {
        let listing = self.store.list_immediate(prefix).await?;

        let mut folders = Vec::with_capacity(listing.sub_prefixes.len());
        for sub_prefix in listing.sub_prefixes {
            let Some(relative) = sub_prefix
                .strip_prefix(prefix)
                .filter(|rest| !rest.is_empty())
            else {
                warn!(prefix = prefix, sub_prefix = %sub_prefix, "Skipping unrelated sub-prefix");
                continue;
            };
            let name = relative.strip_suffix('/').unwrap_or(relative).to_string();
            let size = self.folder_sizes.lookup(&sub_prefix);
            folders.push(FolderItem {
                name,
                path: sub_prefix,
                size,
            });
        }

        let files: Vec<FileItem> = listing
            .objects
            .into_iter()
            // Folder marker of the listed prefix itself
            .filter(|object| object.key != prefix)
            .map(|object| FileItem {
                key: object
                    .key
                    .strip_prefix(prefix)
                    .unwrap_or(&object.key)
                    .to_string(),
                path: object.key,
                size: object.size,
                last_modified: object.last_modified,
            })
            .collect();

        debug!(
            prefix = prefix,
            folders = folders.len(),
            files = files.len(),
            "Listed prefix"
        );

        Ok(FolderListing {
            bucket: self.bucket_name().to_string(),
            prefix: prefix.to_string(),
            folders,
            files,
        })
    }

    /// Head-style metadata for one object
    pub async fn object_info(&self, key: &str) -> Result<ObjectMetadata, S3Error> {
        self.store.head_object(key).await
    }

    /// Fetch an object's bytes and the file name to present it under
    pub async fn download(&self, key: &str) -> Result<Download, S3Error> {
        let data = self.store.get_object(key).await?;
        let file_name = match key.rsplit('/').next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => key.trim_end_matches('/').to_string(),
        };

        debug!(key = key, bytes = data.len(), "Downloaded object");
        Ok(Download { file_name, data })
    }

    /// Delete one object
    ///
    /// Folder sizes are not adjusted until the next refresh.
    pub async fn delete(&self, key: &str) -> Result<String, S3Error> {
        self.store.delete_object(key).await?;
        info!(key = key, bucket = %self.bucket_name(), "Object deleted");

        Ok(format!(
            "Object '{}' deleted successfully from bucket '{}'.",
            key,
            self.bucket_name()
        ))
    }

    /// Store `data` at `path + file_name`
    pub async fn upload(
        &self,
        path: &str,
        file_name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, S3Error> {
        let key = format!("{}{}", path, file_name);
        let size = data.len();
        self.store.put_object(&key, data, content_type).await?;
        info!(key = %key, bytes = size, "Object uploaded");

        Ok(format!("Object '{}' was added successfully.", key))
    }

    pub fn status(&self) -> GatewayStatus {
        let (cache_hits, cache_misses) = self.folder_sizes.stats();
        GatewayStatus {
            bucket: self.bucket_name().to_string(),
            store_health: self.store.health_status(),
            recent_errors: self.store.recent_errors(),
            cached_folders: self.folder_sizes.len(),
            cache_last_refreshed: self.folder_sizes.last_refreshed(),
            cache_hits,
            cache_misses,
        }
    }
}

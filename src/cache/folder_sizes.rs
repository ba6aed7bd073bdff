//! Folder Size Cache Implementation
//!
//! Holds cumulative byte sizes per folder prefix, computed by a depth-first
//! walk of delimiter listings. The whole map carries one `last_refreshed`
//! timestamp; it is rebuilt wholesale, never patched.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, error, info, trace, warn};

use super::snapshot::{unix_seconds, Snapshot, SnapshotStore};
use crate::s3::{ObjectStore, S3Error};

/// Snapshots older than this are rebuilt at startup
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(15 * 60);

/// In-memory folder sizes for one bucket
///
/// Read-only after construction; share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct FolderSizeCache {
    /// Folder prefix ('/'-terminated) → cumulative size in bytes
    sizes: HashMap<String, u64>,
    /// When the sizes were computed (None for an empty fallback cache)
    last_refreshed: Option<SystemTime>,
    /// Lookup hit counter
    hits: AtomicU64,
    /// Lookup miss counter
    misses: AtomicU64,
}

impl FolderSizeCache {
    /// An empty cache; every lookup reports 0
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a cache from freshly computed sizes
    pub fn new(sizes: HashMap<String, u64>, last_refreshed: SystemTime) -> Self {
        Self {
            sizes,
            last_refreshed: Some(last_refreshed),
            ..Default::default()
        }
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            last_refreshed: snapshot.taken_at(),
            sizes: snapshot.entries.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            time: self.last_refreshed.map(unix_seconds).unwrap_or_default(),
            entries: self
                .sizes
                .iter()
                .map(|(prefix, size)| (prefix.clone(), *size))
                .collect(),
        }
    }

    /// Cached size of an exact folder prefix, 0 when unknown
    pub fn lookup(&self, prefix: &str) -> u64 {
        match self.sizes.get(prefix) {
            Some(size) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(prefix = prefix, size = size, "Folder size HIT");
                *size
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(prefix = prefix, "Folder size MISS");
                0
            }
        }
    }

    /// Number of cached folders
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn last_refreshed(&self) -> Option<SystemTime> {
        self.last_refreshed
    }

    /// Lookup statistics
    ///
    /// Returns (hits, misses)
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

/// Whether a snapshot taken at `taken_at` must be rebuilt at `now`
///
/// Stale when strictly older than `max_age`. A timestamp in the future
/// cannot be trusted and is treated as stale.
pub fn is_stale(taken_at: SystemTime, now: SystemTime, max_age: Duration) -> bool {
    match now.duration_since(taken_at) {
        Ok(age) => age > max_age,
        Err(_) => true,
    }
}

/// Compute the total size under `prefix`, recording every visited prefix
///
/// Issues one listing per prefix and recurses depth-first into each
/// sub-prefix; `sizes` receives an entry for `prefix` and all descendants.
pub fn compute_folder_size<'a>(
    store: &'a dyn ObjectStore,
    prefix: &'a str,
    sizes: &'a mut HashMap<String, u64>,
) -> Pin<Box<dyn Future<Output = Result<u64, S3Error>> + Send + 'a>> {
    Box::pin(async move {
        let listing = store.list_immediate(prefix).await?;
        let mut total = listing.immediate_bytes();

        for sub_prefix in &listing.sub_prefixes {
            if sub_prefix.len() <= prefix.len() || !sub_prefix.starts_with(prefix) {
                warn!(
                    prefix = prefix,
                    sub_prefix = %sub_prefix,
                    "Ignoring sub-prefix outside the listed prefix"
                );
                continue;
            }
            total += compute_folder_size(store, sub_prefix, &mut *sizes).await?;
        }

        trace!(prefix = prefix, size = total, "Computed folder size");
        sizes.insert(prefix.to_string(), total);
        Ok(total)
    })
}

/// Builds, persists and loads the folder-size cache of one bucket
pub struct CacheLoader {
    /// Store whose folders are measured
    store: Arc<dyn ObjectStore>,
    /// Where snapshots are persisted
    snapshots: SnapshotStore,
    /// Staleness threshold applied at load time
    max_age: Duration,
}

impl CacheLoader {
    pub fn new(store: Arc<dyn ObjectStore>, snapshots: SnapshotStore, max_age: Duration) -> Self {
        Self {
            store,
            snapshots,
            max_age,
        }
    }

    /// Load the persisted snapshot, rebuilding it when missing, unreadable or stale
    ///
    /// Only a failed rebuild is returned as an error.
    pub async fn load(&self) -> Result<FolderSizeCache, S3Error> {
        let bucket = self.store.bucket_name();

        match self.snapshots.read(bucket) {
            Ok(Some(snapshot)) => {
                // An unrepresentable timestamp is treated as stale
                let stale = match snapshot.taken_at() {
                    Some(taken_at) => is_stale(taken_at, SystemTime::now(), self.max_age),
                    None => true,
                };
                if stale {
                    info!(
                        bucket = bucket,
                        time = snapshot.time,
                        max_age_secs = self.max_age.as_secs(),
                        "Folder-size snapshot is stale, refreshing"
                    );
                    self.refresh().await
                } else {
                    let cache = FolderSizeCache::from_snapshot(snapshot);
                    info!(
                        bucket = bucket,
                        folders = cache.len(),
                        "Using persisted folder-size snapshot"
                    );
                    Ok(cache)
                }
            }
            Ok(None) => {
                info!(bucket = bucket, "No folder-size snapshot, building one");
                self.refresh().await
            }
            Err(e) => {
                warn!(bucket = bucket, error = %e, "Folder-size snapshot unreadable, rebuilding");
                self.refresh().await
            }
        }
    }

    /// Recompute every folder size from the bucket root and persist the result
    ///
    /// Any listing failure aborts the refresh and nothing is written. A failed
    /// write is logged and the fresh cache is still returned.
    pub async fn refresh(&self) -> Result<FolderSizeCache, S3Error> {
        let bucket = self.store.bucket_name();
        let started = std::time::Instant::now();
        info!(bucket = bucket, "Refreshing folder sizes...");

        let root = self.store.list_immediate("").await?;
        let mut sizes = HashMap::new();
        let mut total: u64 = 0;

        for folder in root.sub_prefixes.iter().filter(|p| !p.is_empty()) {
            let size = compute_folder_size(self.store.as_ref(), folder, &mut sizes)
                .await
                .map_err(|e| {
                    error!(bucket = bucket, prefix = %folder, error = %e, "Folder-size refresh failed");
                    e
                })?;
            debug!(prefix = %folder, size = size, "Top-level folder measured");
            total += size;
        }

        let cache = FolderSizeCache::new(sizes, SystemTime::now());

        if let Err(e) = self.snapshots.write(bucket, &cache.to_snapshot()) {
            warn!(bucket = bucket, error = %e, "Failed to persist folder-size snapshot");
        }

        info!(
            bucket = bucket,
            folders = cache.len(),
            total_bytes = total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Folder sizes refreshed"
        );
        Ok(cache)
    }
}

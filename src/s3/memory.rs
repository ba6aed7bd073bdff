//! In-memory object store for tests
//!
//! Implements delimiter listing over a sorted key map, counts listing calls
//! and can be told to fail listings.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{Listing, ObjectEntry, ObjectMetadata, ObjectStore, S3Error};

const LAST_MODIFIED: &str = "2024-03-01T10:00:00.000Z";

#[derive(Debug, Clone)]
struct StoredObject {
    size: u64,
    data: Bytes,
    content_type: String,
}

pub struct MemoryStore {
    bucket: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    list_calls: AtomicUsize,
    fail_listings: AtomicBool,
}

impl MemoryStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: RwLock::new(BTreeMap::new()),
            list_calls: AtomicUsize::new(0),
            fail_listings: AtomicBool::new(false),
        }
    }

    /// Build a store from `(key, size)` pairs without materializing content
    pub fn with_sizes(bucket: &str, objects: &[(&str, u64)]) -> Self {
        let store = Self::new(bucket);
        for (key, size) in objects {
            store.insert_sized(key, *size);
        }
        store
    }

    pub fn insert_sized(&self, key: &str, size: u64) {
        self.objects.write().unwrap().insert(
            key.to_string(),
            StoredObject {
                size,
                data: Bytes::new(),
                content_type: "application/octet-stream".to_string(),
            },
        );
    }

    pub fn insert_bytes(&self, key: &str, data: &[u8], content_type: &str) {
        self.objects.write().unwrap().insert(
            key.to_string(),
            StoredObject {
                size: data.len() as u64,
                data: Bytes::copy_from_slice(data),
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().unwrap().contains_key(key)
    }

    pub fn content(&self, key: &str) -> Option<Bytes> {
        self.objects.read().unwrap().get(key).map(|o| o.data.clone())
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_listings(&self, fail: bool) {
        self.fail_listings.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket_name(&self) -> &str {
        &self.bucket
    }

    async fn list_immediate(&self, prefix: &str) -> Result<Listing, S3Error> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listings.load(Ordering::SeqCst) {
            return Err(S3Error::Network("connection refused".to_string()));
        }

        let objects = self.objects.read().unwrap();
        let mut sub_prefixes = BTreeSet::new();
        let mut entries = Vec::new();

        for (key, object) in objects.range(prefix.to_string()..) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            match rest.find('/') {
                Some(pos) => {
                    sub_prefixes.insert(format!("{}{}", prefix, &rest[..=pos]));
                }
                None => entries.push(ObjectEntry {
                    key: key.clone(),
                    size: object.size,
                    last_modified: LAST_MODIFIED.to_string(),
                    etag: None,
                }),
            }
        }

        Ok(Listing {
            prefix: prefix.to_string(),
            sub_prefixes: sub_prefixes.into_iter().collect(),
            objects: entries,
        })
    }

    async fn head_object(&self, key: &str) -> Result<ObjectMetadata, S3Error> {
        let objects = self.objects.read().unwrap();
        let object = objects
            .get(key)
            .ok_or_else(|| S3Error::NotFound(key.to_string()))?;

        Ok(ObjectMetadata {
            key: key.to_string(),
            size: object.size,
            last_modified: "Fri, 01 Mar 2024 10:00:00 GMT".to_string(),
            content_type: Some(object.content_type.clone()),
            etag: Some("d41d8cd98f00b204e9800998ecf8427e".to_string()),
            metadata: Default::default(),
        })
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, S3Error> {
        self.objects
            .read()
            .unwrap()
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| S3Error::NotFound(key.to_string()))
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), S3Error> {
        self.insert_bytes(key, &data, content_type);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), S3Error> {
        // S3 deletes are idempotent
        self.objects.write().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delimiter_listing() {
        let store = MemoryStore::with_sizes(
            "media",
            &[("a/x.txt", 100), ("a/b/y.txt", 200), ("a/b/z/w.txt", 1), ("c.txt", 50)],
        );

        let root = store.list_immediate("").await.unwrap();
        assert_eq!(root.sub_prefixes, vec!["a/".to_string()]);
        assert_eq!(root.objects.len(), 1);
        assert_eq!(root.objects[0].key, "c.txt");

        let a = store.list_immediate("a/").await.unwrap();
        assert_eq!(a.sub_prefixes, vec!["a/b/".to_string()]);
        assert_eq!(a.immediate_bytes(), 100);
        assert_eq!(store.list_calls(), 2);
    }
}

//! S3 API types
//!
//! XML documents returned by the S3 REST API and the plain types the rest of
//! the gateway works with.

use serde::Deserialize;
use std::collections::BTreeMap;

use super::errors::S3Error;

/// One object returned by a delimiter listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Full object key within the bucket
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Last-modified timestamp as reported by the store
    pub last_modified: String,
    /// ETag without surrounding quotes
    pub etag: Option<String>,
}

/// Result of listing one prefix level with the '/' delimiter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// The prefix that was listed
    pub prefix: String,
    /// Immediate sub-prefixes, each ending in '/'
    pub sub_prefixes: Vec<String>,
    /// Objects directly under the prefix
    pub objects: Vec<ObjectEntry>,
}

impl Listing {
    /// Sum of the sizes of the objects directly under this prefix
    pub fn immediate_bytes(&self) -> u64 {
        self.objects.iter().map(|o| o.size).sum()
    }
}

/// Head-style metadata for a single object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub last_modified: String,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    /// User metadata (`x-amz-meta-*` headers with the prefix stripped)
    pub metadata: BTreeMap<String, String>,
}

/// Bucket as returned by ListBuckets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEntry {
    pub name: String,
    pub creation_date: String,
}

/// One page of a ListObjectsV2 response
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListBucketResult {
    #[serde(default)]
    pub is_truncated: bool,
    #[serde(default)]
    pub next_continuation_token: Option<String>,
    #[serde(default)]
    pub contents: Vec<ObjectXml>,
    #[serde(default)]
    pub common_prefixes: Vec<CommonPrefixXml>,
}

/// `<Contents>` element of a ListObjectsV2 response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectXml {
    pub key: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub last_modified: String,
    #[serde(rename = "ETag", default)]
    pub etag: Option<String>,
}

/// `<CommonPrefixes>` element of a ListObjectsV2 response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommonPrefixXml {
    pub prefix: String,
}

/// ListBuckets response
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListAllMyBucketsResult {
    #[serde(default)]
    buckets: BucketsXml,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BucketsXml {
    #[serde(default)]
    bucket: Vec<BucketXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BucketXml {
    name: String,
    #[serde(default)]
    creation_date: String,
}

impl From<ObjectXml> for ObjectEntry {
    fn from(xml: ObjectXml) -> Self {
        ObjectEntry {
            key: xml.key,
            size: xml.size,
            last_modified: xml.last_modified,
            etag: xml.etag.map(|e| e.trim_matches('"').to_string()),
        }
    }
}

/// Decode one ListObjectsV2 page
pub fn parse_list_page(xml: &str) -> Result<ListBucketResult, S3Error> {
    quick_xml::de::from_str(xml)
        .map_err(|e| S3Error::Parse(format!("ListObjectsV2 response: {}", e)))
}

/// Decode a ListBuckets response
pub fn parse_bucket_list(xml: &str) -> Result<Vec<BucketEntry>, S3Error> {
    let result: ListAllMyBucketsResult = quick_xml::de::from_str(xml)
        .map_err(|e| S3Error::Parse(format!("ListBuckets response: {}", e)))?;

    Ok(result
        .buckets
        .bucket
        .into_iter()
        .map(|b| BucketEntry {
            name: b.name,
            creation_date: b.creation_date,
        })
        .collect())
}

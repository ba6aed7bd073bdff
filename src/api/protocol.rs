//! HTTP wire types
//!
//! JSON bodies returned by the gateway endpoints, plus the helpers that
//! shape them: base64 query parameters in, human-readable sizes out.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::UNIX_EPOCH;

use crate::gateway::{FileItem, FolderItem, FolderListing, GatewayStatus};
use crate::s3::{ErrorEntry, ObjectMetadata};

/// Binary size units, each 1024 times the previous
const SIZE_UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

const LENIENT_PADDING: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);

/// Standard alphabet, padding optional
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT_PADDING);

/// URL-safe alphabet, padding optional
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT_PADDING);

/// Why a query parameter could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    #[error("Missing query parameter '{0}'")]
    Missing(&'static str),

    #[error("Query parameter '{0}' is not valid base64")]
    Base64(&'static str),

    #[error("Query parameter '{0}' is not valid UTF-8")]
    Utf8(&'static str),
}

/// Raw `?prefix=` query
#[derive(Debug, Default, Deserialize)]
pub struct PrefixQuery {
    pub prefix: Option<String>,
}

/// Raw `?path=` query
#[derive(Debug, Default, Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

/// Decode a base64-encoded UTF-8 query parameter
///
/// Accepts the standard and URL-safe alphabets with or without padding.
pub fn decode_param(name: &'static str, value: Option<&str>) -> Result<String, ParamError> {
    let value = value.ok_or(ParamError::Missing(name))?.trim();

    let raw = STANDARD_LENIENT
        .decode(value)
        .or_else(|_| URL_SAFE_LENIENT.decode(value))
        .map_err(|_| ParamError::Base64(name))?;

    String::from_utf8(raw).map_err(|_| ParamError::Utf8(name))
}

/// Encode a prefix the way `decode_param` expects it back
pub fn encode_param(value: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(value)
}

/// Format a byte count with binary units and two decimals ("0 B" for zero)
pub fn human_readable_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, SIZE_UNITS[unit])
}

/// Path segments of a '/'-terminated prefix ("a/b/" → ["a", "b"])
pub fn prefix_segments(prefix: &str) -> Vec<String> {
    let mut segments: Vec<String> = prefix.split('/').map(str::to_string).collect();
    segments.pop();
    segments
}

/// Response of `GET /objects`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingResponse {
    pub folders: Vec<FolderEntry>,
    pub files: Vec<FileEntry>,
    /// Listed prefix split into segments
    pub prefix: Vec<String>,
    pub bucket: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderEntry {
    pub name: String,
    pub path: String,
    /// Human-readable cached size
    pub size: String,
    pub size_bytes: u64,
    /// Query string that lists this folder
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub key: String,
    pub last_modified: String,
    pub size: String,
    pub size_bytes: u64,
    pub path: String,
}

impl From<FolderItem> for FolderEntry {
    fn from(folder: FolderItem) -> Self {
        Self {
            url: format!("?prefix={}", urlencoding::encode(&encode_param(&folder.path))),
            size: human_readable_size(folder.size),
            size_bytes: folder.size,
            name: folder.name,
            path: folder.path,
        }
    }
}

impl From<FileItem> for FileEntry {
    fn from(file: FileItem) -> Self {
        Self {
            key: file.key,
            last_modified: file.last_modified,
            size: human_readable_size(file.size),
            size_bytes: file.size,
            path: file.path,
        }
    }
}

impl From<FolderListing> for ListingResponse {
    fn from(listing: FolderListing) -> Self {
        Self {
            prefix: prefix_segments(&listing.prefix),
            folders: listing.folders.into_iter().map(FolderEntry::from).collect(),
            files: listing.files.into_iter().map(FileEntry::from).collect(),
            bucket: listing.bucket,
        }
    }
}

/// Response of `GET /object_info`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectInfoResponse {
    pub size: String,
    pub size_bytes: u64,
    pub last_modified: String,
    pub content_type: Option<String>,
    #[serde(rename = "ETag")]
    pub etag: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl From<ObjectMetadata> for ObjectInfoResponse {
    fn from(meta: ObjectMetadata) -> Self {
        Self {
            size: human_readable_size(meta.size),
            size_bytes: meta.size,
            last_modified: meta.last_modified,
            content_type: meta.content_type,
            etag: meta.etag,
            metadata: meta.metadata,
        }
    }
}

/// Success message for mutations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Error body for every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// Response of `GET /status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub bucket: String,
    pub healthy: bool,
    pub store_health: &'static str,
    pub recent_errors: Vec<ErrorEntry>,
    pub cache: CacheStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub folders: usize,
    /// Seconds since the Unix epoch, absent when the cache is an empty fallback
    pub last_refreshed: Option<u64>,
    pub hits: u64,
    pub misses: u64,
}

impl From<GatewayStatus> for StatusResponse {
    fn from(status: GatewayStatus) -> Self {
        Self {
            healthy: status.store_health == "healthy",
            bucket: status.bucket,
            store_health: status.store_health,
            recent_errors: status.recent_errors,
            cache: CacheStatus {
                folders: status.cached_folders,
                last_refreshed: status
                    .cache_last_refreshed
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs()),
                hits: status.cache_hits,
                misses: status.cache_misses,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_readable_size() {
        assert_eq!(human_readable_size(0), "0 B");
        assert_eq!(human_readable_size(50), "50.00 B");
        assert_eq!(human_readable_size(300), "300.00 B");
        assert_eq!(human_readable_size(1023), "1023.00 B");
        assert_eq!(human_readable_size(1024), "1.00 KB");
        assert_eq!(human_readable_size(1536), "1.50 KB");
        assert_eq!(human_readable_size(1_048_576), "1.00 MB");
        assert_eq!(human_readable_size(1_073_741_824), "1.00 GB");
        assert_eq!(human_readable_size(5_368_709_120), "5.00 GB");
        assert_eq!(human_readable_size(u64::MAX), "16.00 EB");
    }

    #[test]
    fn test_decode_param() {
        assert_eq!(decode_param("prefix", Some("YS9iLw==")).unwrap(), "a/b/");
        // Unpadded
        assert_eq!(decode_param("prefix", Some("YS9iLw")).unwrap(), "a/b/");
        assert_eq!(decode_param("prefix", Some("")).unwrap(), "");
        // "ü?" uses '/' in the standard alphabet and '_' in the URL-safe one
        assert_eq!(decode_param("path", Some("w7w/")).unwrap(), "ü?");
        assert_eq!(decode_param("path", Some("w7w_")).unwrap(), "ü?");
    }

    #[test]
    fn test_decode_param_errors() {
        assert_eq!(
            decode_param("prefix", None),
            Err(ParamError::Missing("prefix"))
        );
        assert_eq!(
            decode_param("prefix", Some("not base64!")),
            Err(ParamError::Base64("prefix"))
        );
        // 0xFF 0xFE
        assert_eq!(
            decode_param("path", Some("//4=")),
            Err(ParamError::Utf8("path"))
        );
    }

    #[test]
    fn test_prefix_segments() {
        assert_eq!(prefix_segments(""), Vec::<String>::new());
        assert_eq!(prefix_segments("a/"), vec!["a"]);
        assert_eq!(prefix_segments("a/b/"), vec!["a", "b"]);
    }

    #[test]
    fn test_folder_entry_url_round_trips() {
        let entry = FolderEntry::from(FolderItem {
            name: "b".to_string(),
            path: "a/b/".to_string(),
            size: 200,
        });
        assert_eq!(entry.size, "200.00 B");
        assert_eq!(entry.size_bytes, 200);

        let encoded = entry.url.strip_prefix("?prefix=").unwrap();
        let encoded = urlencoding::decode(encoded).unwrap();
        assert_eq!(decode_param("prefix", Some(&*encoded)).unwrap(), "a/b/");
    }

    #[test]
    fn test_object_info_keys() {
        let mut metadata = BTreeMap::new();
        metadata.insert("owner".to_string(), "ops".to_string());
        let response = ObjectInfoResponse::from(ObjectMetadata {
            key: "a/x.txt".to_string(),
            size: 1536,
            last_modified: "Fri, 01 Mar 2024 10:00:00 GMT".to_string(),
            content_type: Some("text/plain".to_string()),
            etag: Some("abc".to_string()),
            metadata,
        });

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["Size"], "1.50 KB");
        assert_eq!(json["SizeBytes"], 1536);
        assert_eq!(json["LastModified"], "Fri, 01 Mar 2024 10:00:00 GMT");
        assert_eq!(json["ContentType"], "text/plain");
        assert_eq!(json["ETag"], "abc");
        assert_eq!(json["Metadata"]["owner"], "ops");
    }

    #[test]
    fn test_listing_response_shape() {
        let response = ListingResponse::from(FolderListing {
            bucket: "media".to_string(),
            prefix: "a/".to_string(),
            folders: vec![],
            files: vec![FileItem {
                key: "x.txt".to_string(),
                path: "a/x.txt".to_string(),
                size: 100,
                last_modified: "2024-03-01T10:00:00.000Z".to_string(),
            }],
        });

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["bucket"], "media");
        assert_eq!(json["prefix"], serde_json::json!(["a"]));
        assert_eq!(json["files"][0]["size"], "100.00 B");
        assert_eq!(json["files"][0]["key"], "x.txt");
    }
}

//! S3 REST API Client
//!
//! Provides signed access to an S3-compatible store (MinIO, AWS S3, ...) for
//! delimiter listings and single-object operations.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response, Url};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::errors::S3Error;
use super::signing::{self, CanonicalRequest, Credentials};
use super::types::{
    parse_bucket_list, parse_list_page, BucketEntry, ListBucketResult, Listing, ObjectEntry,
    ObjectMetadata,
};
use super::{ObjectStore, DELIMITER};

/// HTTP client timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of retries for retryable errors
const MAX_RETRIES: u32 = 3;

/// Maximum number of recent errors to track
const MAX_ERROR_HISTORY: usize = 10;

/// Region that must not be sent as a LocationConstraint
const DEFAULT_REGION: &str = "us-east-1";

/// Prefix of user-defined metadata headers
const USER_METADATA_PREFIX: &str = "x-amz-meta-";

/// Health status values
pub const HEALTH_HEALTHY: u8 = 0;
pub const HEALTH_DEGRADED: u8 = 1;
pub const HEALTH_UNHEALTHY: u8 = 2;

/// Connection settings for an S3-compatible endpoint
#[derive(Clone)]
pub struct S3Config {
    /// Endpoint URL, e.g. `http://localhost:9000`
    pub endpoint: String,
    /// Signing region
    pub region: String,
    /// Bucket served by the gateway
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    /// Use `endpoint/bucket/key` instead of `bucket.endpoint/key`
    pub path_style: bool,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("path_style", &self.path_style)
            .finish()
    }
}

/// A recent error entry for tracking
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEntry {
    pub timestamp: u64,
    pub operation: String,
    pub path: String,
    pub error: String,
}

/// S3 API client bound to one bucket
#[derive(Clone)]
pub struct S3Client {
    /// HTTP client for making requests
    http_client: Client,
    /// Parsed endpoint (scheme, host, port)
    endpoint: Url,
    /// Signing region
    region: String,
    /// Signing credentials
    credentials: Credentials,
    /// Bucket to operate on
    bucket_name: String,
    /// Addressing style
    path_style: bool,
    /// Connection health (0=healthy, 1=degraded, 2=unhealthy)
    health: Arc<AtomicU8>,
    /// Recent error log
    error_log: Arc<RwLock<VecDeque<ErrorEntry>>>,
}

impl S3Client {
    /// Create a client for the configured endpoint and bucket
    ///
    /// No request is made; use [`S3Client::head_bucket`] to probe connectivity.
    pub fn new(config: &S3Config) -> Result<Self, S3Error> {
        let endpoint = Url::parse(config.endpoint.trim_end_matches('/')).map_err(|e| {
            S3Error::Request(format!("Invalid endpoint '{}': {}", config.endpoint, e))
        })?;
        if endpoint.host_str().is_none() {
            return Err(S3Error::Request(format!(
                "Endpoint '{}' has no host",
                config.endpoint
            )));
        }

        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| S3Error::Request(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            endpoint = %endpoint,
            bucket = %config.bucket,
            region = %config.region,
            path_style = config.path_style,
            "S3 client ready"
        );

        Ok(Self {
            http_client,
            endpoint,
            region: config.region.clone(),
            credentials: Credentials {
                access_key: config.access_key.clone(),
                secret_key: config.secret_key.clone(),
            },
            bucket_name: config.bucket.clone(),
            path_style: config.path_style,
            health: Arc::new(AtomicU8::new(HEALTH_HEALTHY)),
            error_log: Arc::new(RwLock::new(VecDeque::with_capacity(MAX_ERROR_HISTORY))),
        })
    }

    /// Build the request URL and its canonical (encoded) path
    ///
    /// `bucket` is `None` for service-level requests such as ListBuckets.
    fn url_for(&self, bucket: Option<&str>, key: &str, query: &str) -> Result<(Url, String), S3Error> {
        let scheme = self.endpoint.scheme();
        let host = self.endpoint.host_str().unwrap_or_default();
        let port = self
            .endpoint
            .port()
            .map(|p| format!(":{}", p))
            .unwrap_or_default();
        let encoded_key = signing::encode_key(key);

        let (authority, path) = match bucket {
            None => (format!("{}{}", host, port), "/".to_string()),
            Some(bucket) if self.path_style => {
                let path = if key.is_empty() {
                    format!("/{}", bucket)
                } else {
                    format!("/{}/{}", bucket, encoded_key)
                };
                (format!("{}{}", host, port), path)
            }
            Some(bucket) => (
                format!("{}.{}{}", bucket, host, port),
                format!("/{}", encoded_key),
            ),
        };

        let mut raw = format!("{}://{}{}", scheme, authority, path);
        if !query.is_empty() {
            raw.push('?');
            raw.push_str(query);
        }

        let url = Url::parse(&raw)
            .map_err(|e| S3Error::Request(format!("Invalid request URL '{}': {}", raw, e)))?;

        // URL parsing collapses '.' and '..' segments, even percent-encoded ones.
        // The signed path must be the one sent, and the request must not reach another key.
        if url.path() != path {
            return Err(S3Error::Request(format!(
                "Object key '{}' contains '.' or '..' segments and cannot be addressed",
                key
            )));
        }
        Ok((url, path))
    }

    /// Send one signed request, turning non-2xx statuses into errors
    async fn send(
        &self,
        method: Method,
        bucket: Option<&str>,
        key: &str,
        query: &[(&str, &str)],
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<Response, S3Error> {
        let canonical_query = signing::canonical_query(query);
        let (url, canonical_uri) = self.url_for(bucket, key, &canonical_query)?;

        let host = match url.port() {
            Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
            None => url.host_str().unwrap_or_default().to_string(),
        };
        let payload_hash = signing::sha256_hex(&body);
        let now = Utc::now();
        let amz_date = signing::amz_date(&now);

        let headers = vec![
            ("host".to_string(), host),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        let authorization = signing::authorization(
            &CanonicalRequest {
                method: method.as_str(),
                uri: &canonical_uri,
                query: &canonical_query,
                headers: &headers,
                payload_hash: &payload_hash,
            },
            &self.credentials,
            &self.region,
            &now,
        );

        let sends_body = method == Method::PUT || method == Method::POST;
        let mut request = self
            .http_client
            .request(method, url)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date)
            .header(AUTHORIZATION, authorization);

        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        if sends_body {
            request = request.body(body);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let mut body = response.text().await.unwrap_or_default();
            if body.trim().is_empty() {
                // HEAD and some DELETE failures carry no body
                body = if key.is_empty() {
                    bucket.unwrap_or("/").to_string()
                } else {
                    key.to_string()
                };
            }
            return Err(S3Error::from_status(status, &body));
        }

        Ok(response)
    }

    /// Execute an operation with retry logic and exponential backoff
    async fn with_retry<F, Fut, T>(&self, operation: &str, path: &str, f: F) -> Result<T, S3Error>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, S3Error>>,
    {
        let backoff_ms = [500u64, 1000, 2000];
        let mut attempt: u32 = 0;

        loop {
            match f().await {
                Ok(result) => {
                    self.health.store(HEALTH_HEALTHY, Ordering::Relaxed);
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    let delay = backoff_ms.get(attempt as usize).copied().unwrap_or(2000);
                    attempt += 1;
                    warn!(
                        operation = operation,
                        path = path,
                        attempt = attempt,
                        max = MAX_RETRIES,
                        delay_ms = delay,
                        error = %e,
                        "Retrying S3 operation"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => {
                    // Final failure: update health and remember it
                    match e {
                        S3Error::Network(_) | S3Error::Timeout => {
                            self.health.store(HEALTH_UNHEALTHY, Ordering::Relaxed)
                        }
                        S3Error::RateLimited(_) | S3Error::Server(_, _) => {
                            self.health.store(HEALTH_DEGRADED, Ordering::Relaxed)
                        }
                        _ => {}
                    }
                    self.log_error(operation, path, &e.to_string());
                    return Err(e);
                }
            }
        }
    }

    /// Log an error to the error history ring buffer
    fn log_error(&self, operation: &str, path: &str, error: &str) {
        let entry = ErrorEntry {
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            operation: operation.to_string(),
            path: path.to_string(),
            error: error.to_string(),
        };

        let mut log = self.error_log.write().unwrap();
        if log.len() >= MAX_ERROR_HISTORY {
            log.pop_front();
        }
        log.push_back(entry);
    }

    /// Check that the configured bucket exists and the credentials are accepted
    pub async fn head_bucket(&self) -> Result<(), S3Error> {
        let bucket = self.bucket_name.as_str();
        self.with_retry("head_bucket", bucket, move || async move {
            self.send(Method::HEAD, Some(bucket), "", &[], Bytes::new(), None)
                .await
                .map(|_| ())
        })
        .await
    }

    /// List all buckets visible to the credentials
    pub async fn list_buckets(&self) -> Result<Vec<BucketEntry>, S3Error> {
        info!("Listing buckets...");

        let buckets = self
            .with_retry("list_buckets", "/", move || async move {
                let response = self
                    .send(Method::GET, None, "", &[], Bytes::new(), None)
                    .await?;
                let xml = response.text().await?;
                parse_bucket_list(&xml)
            })
            .await?;

        info!(count = buckets.len(), "Listed buckets");
        Ok(buckets)
    }

    /// Create a bucket
    ///
    /// Outside the default region the bucket location is sent explicitly.
    pub async fn create_bucket(&self, name: &str) -> Result<(), S3Error> {
        info!(bucket = name, "Creating bucket");

        let (body, content_type) = if self.region == DEFAULT_REGION {
            (Bytes::new(), None)
        } else {
            let xml = format!(
                "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
                 <LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
                self.region
            );
            (Bytes::from(xml), Some("application/xml"))
        };

        self.with_retry("create_bucket", name, move || {
            let body = body.clone();
            async move {
                self.send(Method::PUT, Some(name), "", &[], body, content_type)
                    .await
                    .map(|_| ())
            }
        })
        .await?;

        info!(bucket = name, "Bucket created");
        Ok(())
    }

    /// Delete an (empty) bucket
    pub async fn delete_bucket(&self, name: &str) -> Result<(), S3Error> {
        info!(bucket = name, "Deleting bucket");

        self.with_retry("delete_bucket", name, move || async move {
            self.send(Method::DELETE, Some(name), "", &[], Bytes::new(), None)
                .await
                .map(|_| ())
        })
        .await?;

        info!(bucket = name, "Bucket deleted");
        Ok(())
    }

    /// Fetch one ListObjectsV2 page
    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListBucketResult, S3Error> {
        let mut query: Vec<(&str, &str)> = vec![("list-type", "2"), ("delimiter", DELIMITER)];
        if !prefix.is_empty() {
            query.push(("prefix", prefix));
        }
        if let Some(token) = continuation_token {
            query.push(("continuation-token", token));
        }

        debug!(prefix = prefix, token = ?continuation_token, "Listing objects");

        let response = self
            .send(
                Method::GET,
                Some(&self.bucket_name),
                "",
                &query,
                Bytes::new(),
                None,
            )
            .await?;
        let xml = response.text().await?;
        parse_list_page(&xml)
    }
}

/// Read a header as an owned string
fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Build object metadata from HEAD response headers
fn metadata_from_headers(key: &str, headers: &HeaderMap) -> ObjectMetadata {
    let metadata = headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.as_str();
            let user_key = name.strip_prefix(USER_METADATA_PREFIX)?;
            let value = value.to_str().ok()?;
            Some((user_key.to_string(), value.to_string()))
        })
        .collect::<BTreeMap<_, _>>();

    ObjectMetadata {
        key: key.to_string(),
        size: header_string(headers, "content-length")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        last_modified: header_string(headers, "last-modified").unwrap_or_default(),
        content_type: header_string(headers, "content-type"),
        etag: header_string(headers, "etag").map(|e| e.trim_matches('"').to_string()),
        metadata,
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    async fn list_immediate(&self, prefix: &str) -> Result<Listing, S3Error> {
        let mut listing = Listing {
            prefix: prefix.to_string(),
            ..Default::default()
        };
        let mut continuation_token: Option<String> = None;

        loop {
            let token = continuation_token.as_deref();
            let page = self
                .with_retry("list_objects", prefix, move || self.list_page(prefix, token))
                .await?;

            listing
                .sub_prefixes
                .extend(page.common_prefixes.into_iter().map(|p| p.prefix));
            listing
                .objects
                .extend(page.contents.into_iter().map(ObjectEntry::from));

            // Check for more pages
            match page.next_continuation_token {
                Some(next) if page.is_truncated => continuation_token = Some(next),
                _ => break,
            }
        }

        debug!(
            prefix = prefix,
            folders = listing.sub_prefixes.len(),
            objects = listing.objects.len(),
            "Listed prefix"
        );
        Ok(listing)
    }

    async fn head_object(&self, key: &str) -> Result<ObjectMetadata, S3Error> {
        let bucket = self.bucket_name.as_str();
        self.with_retry("head_object", key, move || async move {
            let response = self
                .send(Method::HEAD, Some(bucket), key, &[], Bytes::new(), None)
                .await?;
            Ok(metadata_from_headers(key, response.headers()))
        })
        .await
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, S3Error> {
        let bucket = self.bucket_name.as_str();
        debug!(key = key, "Downloading object");

        let data = self
            .with_retry("get_object", key, move || async move {
                let response = self
                    .send(Method::GET, Some(bucket), key, &[], Bytes::new(), None)
                    .await?;
                Ok(response.bytes().await?)
            })
            .await?;

        info!(key = key, size = data.len(), "Downloaded object");
        Ok(data)
    }

    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), S3Error> {
        let bucket = self.bucket_name.as_str();
        info!(
            key = key,
            size = data.len(),
            content_type = content_type,
            "Uploading object"
        );

        self.with_retry("put_object", key, move || {
            let data = data.clone();
            async move {
                self.send(Method::PUT, Some(bucket), key, &[], data, Some(content_type))
                    .await
                    .map(|_| ())
            }
        })
        .await?;

        info!(key = key, "Object uploaded");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), S3Error> {
        let bucket = self.bucket_name.as_str();
        info!(key = key, "Deleting object");

        self.with_retry("delete_object", key, move || async move {
            self.send(Method::DELETE, Some(bucket), key, &[], Bytes::new(), None)
                .await
                .map(|_| ())
        })
        .await?;

        info!(key = key, "Object deleted");
        Ok(())
    }

    fn health_status(&self) -> &'static str {
        match self.health.load(Ordering::Relaxed) {
            HEALTH_HEALTHY => "healthy",
            HEALTH_DEGRADED => "degraded",
            _ => "unhealthy",
        }
    }

    fn recent_errors(&self) -> Vec<ErrorEntry> {
        self.error_log.read().unwrap().iter().cloned().collect()
    }
}

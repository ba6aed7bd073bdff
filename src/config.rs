//! Environment-driven configuration

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::DEFAULT_MAX_AGE;
use crate::s3::S3Config;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_MAX_UPLOAD_MB: usize = 512;

/// Everything the gateway needs to start
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Object store connection
    pub s3: S3Config,
    /// HTTP listen address
    pub bind_addr: String,
    /// Directory holding folder-size snapshots
    pub cache_dir: PathBuf,
    /// Snapshots older than this are rebuilt at startup
    pub cache_max_age: Duration,
    /// Request body limit for uploads
    pub max_upload_bytes: usize,
}

impl GatewayConfig {
    /// Read the configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &str| {
            get(name).ok_or_else(|| anyhow!("Missing required environment variable {}", name))
        };

        let s3 = S3Config {
            endpoint: required("S3_ENDPOINT")?,
            region: get("S3_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            bucket: required("S3_BUCKET")?,
            access_key: required("S3_ACCESS_KEY")?,
            secret_key: required("S3_SECRET_KEY")?,
            path_style: match get("S3_PATH_STYLE") {
                Some(v) => parse_bool(&v).context("Invalid S3_PATH_STYLE")?,
                None => true,
            },
        };

        let cache_max_age = match get("CACHE_MAX_AGE_SECS") {
            Some(v) => Duration::from_secs(
                v.trim()
                    .parse()
                    .with_context(|| format!("Invalid CACHE_MAX_AGE_SECS '{}'", v))?,
            ),
            None => DEFAULT_MAX_AGE,
        };

        let max_upload_mb: usize = match get("MAX_UPLOAD_MB") {
            Some(v) => v
                .trim()
                .parse()
                .with_context(|| format!("Invalid MAX_UPLOAD_MB '{}'", v))?,
            None => DEFAULT_MAX_UPLOAD_MB,
        };

        Ok(Self {
            s3,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            cache_dir: get("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_cache_dir),
            cache_max_age,
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
        })
    }
}

/// Platform cache directory, e.g. `~/.cache/s3browse` on Linux
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("s3browse")
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("expected a boolean, got '{}'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("S3_ENDPOINT", "http://localhost:9000"),
        ("S3_BUCKET", "media"),
        ("S3_ACCESS_KEY", "minioadmin"),
        ("S3_SECRET_KEY", "minioadmin-secret"),
    ];

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();

        assert_eq!(config.s3.endpoint, "http://localhost:9000");
        assert_eq!(config.s3.bucket, "media");
        assert_eq!(config.s3.region, "us-east-1");
        assert!(config.s3.path_style);
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
        assert_eq!(config.cache_max_age, Duration::from_secs(900));
        assert_eq!(config.max_upload_bytes, 512 * 1024 * 1024);
        assert!(config.cache_dir.ends_with("s3browse"));
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("S3_REGION", "eu-central-1"),
            ("S3_PATH_STYLE", "false"),
            ("BIND_ADDR", "127.0.0.1:9090"),
            ("CACHE_DIR", "/var/cache/s3browse"),
            ("CACHE_MAX_AGE_SECS", "60"),
            ("MAX_UPLOAD_MB", "8"),
        ]);
        let config = GatewayConfig::from_lookup(lookup_from(&pairs)).unwrap();

        assert_eq!(config.s3.region, "eu-central-1");
        assert!(!config.s3.path_style);
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/s3browse"));
        assert_eq!(config.cache_max_age, Duration::from_secs(60));
        assert_eq!(config.max_upload_bytes, 8 * 1024 * 1024);
    }

    #[test]
    fn test_missing_required_variable() {
        let pairs: Vec<_> = REQUIRED
            .iter()
            .copied()
            .filter(|(k, _)| *k != "S3_SECRET_KEY")
            .collect();
        let err = GatewayConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(err.to_string().contains("S3_SECRET_KEY"));
    }

    #[test]
    fn test_empty_required_variable() {
        let mut pairs = REQUIRED.to_vec();
        pairs[1] = ("S3_BUCKET", "  ");
        assert!(GatewayConfig::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn test_invalid_numbers() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("CACHE_MAX_AGE_SECS", "fifteen minutes"));
        assert!(GatewayConfig::from_lookup(lookup_from(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MAX_UPLOAD_MB", "-1"));
        assert!(GatewayConfig::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("TRUE").unwrap());
        assert!(parse_bool(" 1 ").unwrap());
        assert!(!parse_bool("off").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = GatewayConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("minioadmin-secret"));
        assert!(debug.contains("<redacted>"));
    }
}

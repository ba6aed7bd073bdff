//! s3browse - HTTP gateway for browsing an S3-compatible bucket
//!
//! Serves listings, downloads, uploads and deletes over HTTP, decorating
//! folders with cumulative sizes from a persisted cache.

mod api;
mod cache;
mod config;
mod gateway;
mod s3;

use anyhow::{anyhow, Context, Result};
use std::env;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use api::{human_readable_size, GatewayServer};
use cache::{CacheLoader, FolderSizeCache, SnapshotStore};
use config::GatewayConfig;
use gateway::Gateway;
use s3::{ObjectStore, S3Client};

/// CLI command
#[derive(Debug)]
enum Command {
    /// Run the HTTP gateway (default)
    Serve,
    /// Rebuild the folder-size cache and exit
    Refresh,
    /// List buckets visible to the credentials
    Buckets,
    /// Create a bucket
    CreateBucket { name: String },
    /// Delete an empty bucket
    DeleteBucket { name: String },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"s3browse - Browse an S3-compatible bucket over HTTP with cached folder sizes

USAGE:
    s3browse                         # Run the HTTP gateway (default)
    s3browse serve
    s3browse refresh
    s3browse buckets
    s3browse create-bucket <name>
    s3browse delete-bucket <name>
    s3browse help

COMMANDS:
    serve          Load (or rebuild) the folder-size cache and serve HTTP
    refresh        Recompute every folder size and rewrite the snapshot
    buckets        List buckets visible to the credentials
    create-bucket  Create a bucket
    delete-bucket  Delete an empty bucket
    help           Show this help message

ENVIRONMENT:
    S3_ENDPOINT          Store endpoint, e.g. http://localhost:9000 (required)
    S3_BUCKET            Bucket served by the gateway (required)
    S3_ACCESS_KEY        Access key ID (required)
    S3_SECRET_KEY        Secret key (required)
    S3_REGION            Signing region (default: us-east-1)
    S3_PATH_STYLE        Path-style addressing (default: true)
    BIND_ADDR            HTTP listen address (default: 0.0.0.0:8000)
    CACHE_DIR            Snapshot directory (default: platform cache dir)
    CACHE_MAX_AGE_SECS   Snapshot staleness threshold (default: 900)
    MAX_UPLOAD_MB        Upload size limit (default: 512)
    RUST_LOG             Log filter (default: info)
"#
    );
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Serve);
    }

    match args[1].as_str() {
        "serve" => Ok(Command::Serve),
        "refresh" => Ok(Command::Refresh),
        "buckets" => Ok(Command::Buckets),
        "create-bucket" => {
            let name = args
                .get(2)
                .ok_or_else(|| anyhow!("Usage: s3browse create-bucket <name>"))?;
            Ok(Command::CreateBucket { name: name.clone() })
        }
        "delete-bucket" => {
            let name = args
                .get(2)
                .ok_or_else(|| anyhow!("Usage: s3browse delete-bucket <name>"))?;
            Ok(Command::DeleteBucket { name: name.clone() })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => Err(anyhow!("Unknown command: {}", other)),
    }
}

fn cache_loader(config: &GatewayConfig, client: &S3Client) -> CacheLoader {
    let store: Arc<dyn ObjectStore> = Arc::new(client.clone());
    CacheLoader::new(
        store,
        SnapshotStore::new(&config.cache_dir),
        config.cache_max_age,
    )
}

async fn serve(config: GatewayConfig, client: S3Client) -> Result<()> {
    info!(
        bucket = %config.s3.bucket,
        endpoint = %config.s3.endpoint,
        cache_dir = %config.cache_dir.display(),
        "Starting s3browse gateway"
    );

    if let Err(e) = client.head_bucket().await {
        warn!(bucket = %config.s3.bucket, error = %e, "Bucket check failed, continuing");
    }

    let folder_sizes = match cache_loader(&config, &client).load().await {
        Ok(cache) => cache,
        Err(e) => {
            error!(error = %e, "Failed to build folder-size cache, serving without folder sizes");
            FolderSizeCache::empty()
        }
    };
    info!(folders = folder_sizes.len(), "Folder-size cache ready");

    let store: Arc<dyn ObjectStore> = Arc::new(client);
    let gateway = Arc::new(Gateway::new(store, Arc::new(folder_sizes)));

    GatewayServer::new(config.bind_addr.clone(), gateway, config.max_upload_bytes)
        .run()
        .await?;

    info!("Shutdown complete.");
    Ok(())
}

async fn refresh(config: GatewayConfig, client: S3Client) -> Result<()> {
    let loader = cache_loader(&config, &client);
    let cache = loader
        .refresh()
        .await
        .context("Failed to refresh folder sizes")?;

    let snapshot = cache.to_snapshot();
    println!(
        "Refreshed {} folders in bucket '{}' ({})",
        cache.len(),
        config.s3.bucket,
        SnapshotStore::new(&config.cache_dir)
            .path_for(&config.s3.bucket)
            .display()
    );
    for (prefix, size) in snapshot
        .entries
        .iter()
        .filter(|(prefix, _)| prefix.matches('/').count() == 1)
    {
        println!("  {:<40} {:>12}", prefix, human_readable_size(*size));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command
    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    if let Command::Help = command {
        print_help();
        return Ok(());
    }

    let config = GatewayConfig::from_env().context("Failed to load configuration")?;
    let client = S3Client::new(&config.s3).context("Failed to create S3 client")?;

    match command {
        Command::Serve => serve(config, client).await?,
        Command::Refresh => refresh(config, client).await?,
        Command::Buckets => {
            let buckets = client.list_buckets().await.context("Failed to list buckets")?;
            if buckets.is_empty() {
                println!("No buckets.");
            } else {
                println!("Buckets:");
                for bucket in buckets {
                    println!("  {} (created {})", bucket.name, bucket.creation_date);
                }
            }
        }
        Command::CreateBucket { name } => {
            client
                .create_bucket(&name)
                .await
                .with_context(|| format!("Failed to create bucket '{}'", name))?;
            println!("Bucket '{}' created.", name);
        }
        Command::DeleteBucket { name } => {
            client
                .delete_bucket(&name)
                .await
                .with_context(|| format!("Failed to delete bucket '{}'", name))?;
            println!("Bucket '{}' deleted.", name);
        }
        Command::Help => print_help(),
    }

    Ok(())
}

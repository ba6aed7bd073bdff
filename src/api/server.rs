//! HTTP Server - axum router over the gateway
//!
//! Decodes base64 query parameters, dispatches to the [`Gateway`] and maps
//! failures to JSON `{"detail": ...}` bodies.

use anyhow::{Context, Result};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::api::protocol::{
    decode_param, ErrorResponse, ListingResponse, MessageResponse, ObjectInfoResponse, ParamError,
    PathQuery, PrefixQuery, StatusResponse,
};
use crate::gateway::Gateway;
use crate::s3::S3Error;

/// Errors returned by request handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Param(#[from] ParamError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Store(#[from] S3Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Param(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.to_string();

        if status.is_server_error() {
            error!(status = status.as_u16(), detail = %detail, "Request failed");
        } else {
            warn!(status = status.as_u16(), detail = %detail, "Rejected request");
        }

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

/// HTTP front end of the gateway
pub struct GatewayServer {
    /// Listen address, e.g. "0.0.0.0:8000"
    bind_addr: String,
    /// Shared gateway handed to every handler
    gateway: Arc<Gateway>,
    /// Request body limit for uploads
    max_upload_bytes: usize,
}

impl GatewayServer {
    pub fn new(bind_addr: String, gateway: Arc<Gateway>, max_upload_bytes: usize) -> Self {
        Self {
            bind_addr,
            gateway,
            max_upload_bytes,
        }
    }

    /// Build the router
    pub fn router(gateway: Arc<Gateway>, max_upload_bytes: usize) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/objects", get(list_objects))
            .route("/object_info", get(object_info))
            .route(
                "/object",
                get(download_object)
                    .delete(delete_object)
                    .post(upload_object),
            )
            .route("/status", get(status))
            .layer(DefaultBodyLimit::max(max_upload_bytes))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(gateway)
    }

    /// Serve until Ctrl+C
    pub async fn run(self) -> Result<()> {
        let app = Self::router(Arc::clone(&self.gateway), self.max_upload_bytes);

        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.bind_addr))?;

        info!(
            bind_addr = %self.bind_addr,
            bucket = %self.gateway.bucket_name(),
            max_upload_bytes = self.max_upload_bytes,
            "HTTP gateway listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;

        info!("HTTP gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal, draining connections..."),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

async fn list_objects(
    State(gateway): State<Arc<Gateway>>,
    Query(query): Query<PrefixQuery>,
) -> Result<Json<ListingResponse>, ApiError> {
    let prefix = decode_param("prefix", query.prefix.as_deref())?;
    let listing = gateway.list_objects(&prefix).await?;
    Ok(Json(listing.into()))
}

async fn object_info(
    State(gateway): State<Arc<Gateway>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<ObjectInfoResponse>, ApiError> {
    let key = decode_param("path", query.path.as_deref())?;
    let info = gateway.object_info(&key).await?;
    Ok(Json(info.into()))
}

async fn download_object(
    State(gateway): State<Arc<Gateway>>,
    Query(query): Query<PathQuery>,
) -> Result<Response, ApiError> {
    let key = decode_param("path", query.path.as_deref())?;
    let download = gateway.download(&key).await?;

    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        ),
        (
            header::CONTENT_DISPOSITION,
            content_disposition(&download.file_name),
        ),
        (
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static("Content-Disposition"),
        ),
    ];
    Ok((headers, download.data).into_response())
}

async fn delete_object(
    State(gateway): State<Arc<Gateway>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    let key = decode_param("path", query.path.as_deref())?;
    let message = gateway.delete(&key).await?;
    Ok(Json(MessageResponse { message }))
}

async fn upload_object(
    State(gateway): State<Arc<Gateway>>,
    Query(query): Query<PathQuery>,
    mut multipart: Multipart,
) -> Result<Json<MessageResponse>, ApiError> {
    let path = decode_param("path", query.path.as_deref())?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            debug!(field = ?field.name(), "Skipping multipart field");
            continue;
        }

        let file_name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("Multipart field 'file' has no filename".to_string()))?;
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await?;

        let message = gateway.upload(&path, &file_name, data, &content_type).await?;
        return Ok(Json(MessageResponse { message }));
    }

    Err(ApiError::BadRequest(
        "Missing multipart field 'file'".to_string(),
    ))
}

async fn status(State(gateway): State<Arc<Gateway>>) -> Json<StatusResponse> {
    Json(gateway.status().into())
}

/// `attachment;filename=<name>`, or the RFC 5987 form for non-ASCII names
fn content_disposition(file_name: &str) -> HeaderValue {
    let plain = file_name.is_ascii() && !file_name.contains(['"', ';', '\\']);
    if plain {
        if let Ok(value) = HeaderValue::from_str(&format!("attachment;filename={}", file_name)) {
            return value;
        }
    }

    let encoded = format!(
        "attachment;filename*=UTF-8''{}",
        urlencoding::encode(file_name)
    );
    HeaderValue::from_str(&encoded).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

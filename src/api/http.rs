//! Control-Plane HTTP Server
//!
//! Answers `POST /resolve_virtual_bucket` from any [`NamespacePolicy`].
//! Errors are rendered as S3 XML error documents.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Json, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::key_id_from_headers;
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::resolver::{NamespacePolicy, ResolveBucketRequest, ResolveBucketResponse, RESOLVE_PATH};

/// Header carrying the per-request id
pub const REQUEST_ID_HEADER: &str = "x-amz-request-id";

/// Shared application state
pub struct AppState {
    /// Policy answering lookups
    pub policy: Arc<dyn NamespacePolicy>,
    /// Server start time
    pub started_at: Instant,
}

/// Control-plane HTTP server
pub struct ControlPlaneServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl ControlPlaneServer {
    /// Create a new server over a namespace policy
    pub fn new(config: ApiConfig, policy: Arc<dyn NamespacePolicy>) -> Self {
        let state = Arc::new(AppState {
            policy,
            started_at: Instant::now(),
        });

        Self { config, state }
    }

    /// Get the state for sharing with other components
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Create the router
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route(RESOLVE_PATH, post(handle_resolve))
            .route("/health", get(handle_health))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state));

        if self.config.cors_enabled {
            router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
        } else {
            router
        }
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!(
            policy = self.state.policy.name(),
            "control plane listening on {}",
            self.config.bind_address
        );

        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub policy: String,
    pub uptime_seconds: u64,
}

/// Error rendered as an S3 XML document
#[derive(Debug)]
pub struct ApiError {
    error: Error,
    request_id: Uuid,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.error.kind();
        let status = StatusCode::from_u16(kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let request_id = self.request_id.to_string();

        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <Error>\n\
             <Code>{}</Code>\n\
             <Message>{}</Message>\n\
             <RequestId>{}</RequestId>\n\
             </Error>",
            kind.s3_code(),
            xml_escape(&self.error.to_string()),
            request_id
        );

        let mut response = (status, [(header::CONTENT_TYPE, "application/xml")], xml).into_response();
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
}

// ============ Handlers ============

async fn handle_resolve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ResolveBucketRequest>,
) -> std::result::Result<Response, ApiError> {
    let request_id = Uuid::new_v4();

    // Fall back to the caller's credentials when the body names no key
    let key_id = req.key_id.clone().or_else(|| key_id_from_headers(&headers));

    let span = tracing::info_span!(
        "resolve_virtual_bucket",
        %request_id,
        bucket = %req.virtual_bucket,
        key_id = key_id.as_deref().unwrap_or("-"),
    );

    async move {
        let mapping = state
            .policy
            .map(&req.virtual_bucket, key_id.as_deref())
            .await
            .and_then(|mapping| {
                if mapping.prefix.is_empty() {
                    Err(Error::UnknownBucket(format!("no prefix for '{}'", req.virtual_bucket)))
                } else {
                    Ok(mapping)
                }
            })
            .map_err(|error| {
                tracing::warn!(kind = %error.kind(), error = %error, "lookup failed");
                ApiError { error, request_id }
            })?;

        let issued_at = mapping.issued_at.unwrap_or_else(Utc::now);
        tracing::debug!(prefix = %mapping.prefix, "lookup served");

        let mut response = Json(ResolveBucketResponse {
            prefix: mapping.prefix,
            time_ms: Some(issued_at.timestamp_millis()),
        })
        .into_response();
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        Ok::<_, ApiError>(response)
    }
    .instrument(span)
    .await
}

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        policy: state.policy.name().to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// Escape XML special characters
fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

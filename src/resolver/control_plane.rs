//! Control-plane backed namespace policy
//!
//! Asks an external control plane for the prefix of a virtual bucket via
//! `POST /resolve_virtual_bucket`. Field names on the wire are fixed by the
//! existing control-plane stubs (`VirtualBucket`, `KeyID`, `Prefix`, `TimeMS`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{NamespaceMapping, NamespacePolicy};
use crate::error::{Error, Result};

/// Control-plane route
pub const RESOLVE_PATH: &str = "/resolve_virtual_bucket";

/// Request body sent to the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveBucketRequest {
    #[serde(rename = "VirtualBucket")]
    pub virtual_bucket: String,
    #[serde(rename = "KeyID", default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
}

/// Response body returned by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveBucketResponse {
    #[serde(rename = "Prefix")]
    pub prefix: String,
    /// Issue time in milliseconds since the Unix epoch
    #[serde(rename = "TimeMS", default, skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<i64>,
}

/// Namespace policy that defers to a remote control plane
pub struct ControlPlanePolicy {
    url: String,
    http: reqwest::Client,
}

impl ControlPlanePolicy {
    /// Create a policy for `endpoint` (e.g. `http://localhost:8888`).
    /// `timeout` bounds each individual request.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(Error::Config("control-plane endpoint cannot be empty".into()));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: format!("{}{}", endpoint, RESOLVE_PATH),
            http,
        })
    }

    /// Full lookup URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NamespacePolicy for ControlPlanePolicy {
    fn name(&self) -> &'static str {
        "control-plane"
    }

    async fn map(&self, bucket: &str, key_id: Option<&str>) -> Result<NamespaceMapping> {
        let request = ResolveBucketRequest {
            virtual_bucket: bucket.to_string(),
            key_id: key_id.map(str::to_string),
        };

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::UpstreamUnavailable(format!("control plane timed out: {}", e))
                } else {
                    Error::UpstreamUnavailable(format!("control plane unreachable: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("failed to read control plane reply: {}", e)))?;

        check_status(status, bucket, &body)?;

        let parsed = parse_response(&body)?;
        if parsed.prefix.is_empty() {
            return Err(Error::UnknownBucket(format!(
                "no path prefix for virtual bucket '{}'",
                bucket
            )));
        }

        let issued_at = match parsed.time_ms {
            Some(ms) => Some(DateTime::from_timestamp_millis(ms).ok_or_else(|| {
                Error::InvalidUpstreamResponse(format!("TimeMS out of range: {}", ms))
            })?),
            None => None,
        };

        Ok(NamespaceMapping {
            prefix: parsed.prefix,
            issued_at,
        })
    }
}

fn check_status(status: StatusCode, bucket: &str, body: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }

    match status {
        StatusCode::NOT_FOUND => Err(Error::UnknownBucket(bucket.to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Unauthorized(format!(
            "control plane denied access to '{}'",
            bucket
        ))),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => Err(
            Error::UpstreamUnavailable(format!("control plane returned HTTP {}: {}", s, body)),
        ),
        s => Err(Error::InvalidUpstreamResponse(format!(
            "control plane returned HTTP {}: {}",
            s, body
        ))),
    }
}

/// Strictly decode a control-plane reply
pub(crate) fn parse_response(body: &str) -> Result<ResolveBucketResponse> {
    serde_json::from_str(body)
        .map_err(|e| Error::InvalidUpstreamResponse(format!("unexpected control plane body: {}", e)))
}

//! Resolver Module
//!
//! Authoritative mapping from a virtual bucket (and optional key id) to a
//! prefix in the backing store. The mapping itself is delegated to a
//! pluggable [`NamespacePolicy`]; the resolver attaches the freshness window.

mod control_plane;
mod policy;

pub use control_plane::{ControlPlanePolicy, ResolveBucketRequest, ResolveBucketResponse, RESOLVE_PATH};
pub use policy::{
    DefaultPolicy, PerTenantPolicy, StaticPolicy, StaticRule, DEFAULT_SHARED_PREFIX,
    DEFAULT_TENANT_TEMPLATE,
};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{PolicyKind, ResolverConfig};
use crate::error::{Error, Result};

/// Composite cache/lookup key. A missing key id is its own value, distinct
/// from every concrete key id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolutionKey {
    pub bucket: String,
    pub key_id: Option<String>,
}

impl ResolutionKey {
    pub fn new(bucket: impl Into<String>, key_id: Option<impl Into<String>>) -> Self {
        Self {
            bucket: bucket.into(),
            key_id: key_id.map(Into::into),
        }
    }
}

impl std::fmt::Display for ResolutionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.key_id {
            Some(key_id) => write!(f, "{}@{}", self.bucket, key_id),
            None => write!(f, "{}@-", self.bucket),
        }
    }
}

/// A resolved prefix and the instant it stops being valid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub prefix: String,
    pub expires_at: DateTime<Utc>,
}

impl Resolution {
    /// Whether this resolution may still be served at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Output of a namespace policy before the freshness window is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceMapping {
    pub prefix: String,
    /// Issue time reported by the policy source; resolution time when absent
    pub issued_at: Option<DateTime<Utc>>,
}

impl NamespaceMapping {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            issued_at: None,
        }
    }
}

/// Tenant-namespacing rule consulted by the [`Resolver`]
#[async_trait]
pub trait NamespacePolicy: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Map a bucket (and optional key id) to a namespace prefix
    async fn map(&self, bucket: &str, key_id: Option<&str>) -> Result<NamespaceMapping>;
}

/// Invokes the configured policy and attaches `expires_at = issued_at + ttl`
pub struct Resolver {
    policy: Arc<dyn NamespacePolicy>,
    ttl: chrono::Duration,
}

impl Resolver {
    /// Create a resolver over a policy with the given freshness window
    pub fn new(policy: Arc<dyn NamespacePolicy>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::milliseconds(ttl.as_millis().min(i64::MAX as u128) as i64);
        Self { policy, ttl }
    }

    /// Build the policy named in the resolver configuration
    pub fn policy_from_config(config: &ResolverConfig) -> Result<Arc<dyn NamespacePolicy>> {
        let policy: Arc<dyn NamespacePolicy> = match config.policy {
            PolicyKind::Default => {
                let mut policy = DefaultPolicy::new(config.default_prefix.clone());
                if let Some(time_ms) = config.fixed_time_ms {
                    policy = policy.with_fixed_time_ms(time_ms)?;
                }
                Arc::new(policy)
            }
            PolicyKind::PerTenant => Arc::new(PerTenantPolicy::with_template(
                config.tenant_template.clone(),
            )),
            PolicyKind::Static => Arc::new(StaticPolicy::new(config.rules.clone())),
            PolicyKind::ControlPlane => {
                let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                    Error::Config("resolver.endpoint is required for the control-plane policy".into())
                })?;
                Arc::new(ControlPlanePolicy::new(endpoint, config.timeout())?)
            }
        };
        Ok(policy)
    }

    /// Name of the underlying policy
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Configured freshness window
    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Resolve a virtual bucket at time `now`
    pub async fn resolve(
        &self,
        bucket: &str,
        key_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Resolution> {
        if bucket.is_empty() {
            return Err(Error::MalformedAddress("virtual bucket name is empty".into()));
        }

        let mapping = self.policy.map(bucket, key_id).await?;

        if mapping.prefix.is_empty() {
            return Err(Error::UnknownBucket(format!(
                "policy '{}' returned no prefix for '{}'",
                self.policy.name(),
                bucket
            )));
        }

        let issued_at = mapping.issued_at.unwrap_or(now);
        let expires_at = issued_at
            .checked_add_signed(self.ttl)
            .ok_or_else(|| Error::Internal(format!("expiry overflow for issue time {}", issued_at)))?;

        tracing::debug!(
            bucket,
            key_id = key_id.unwrap_or("-"),
            policy = self.policy.name(),
            prefix = %mapping.prefix,
            %expires_at,
            "resolved virtual bucket"
        );

        Ok(Resolution {
            prefix: mapping.prefix,
            expires_at,
        })
    }
}

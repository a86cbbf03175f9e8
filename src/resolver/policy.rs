//! Built-in namespace policies

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NamespaceMapping, NamespacePolicy};
use crate::error::{Error, Result};

/// Prefix served by [`DefaultPolicy`] unless configured otherwise
pub const DEFAULT_SHARED_PREFIX: &str = "example";

/// Prefix template used by [`PerTenantPolicy`] unless configured otherwise
pub const DEFAULT_TENANT_TEMPLATE: &str = "namespaces/user_{key_id}";

/// Maps every bucket to one shared namespace, ignoring the key id
#[derive(Debug, Clone)]
pub struct DefaultPolicy {
    prefix: String,
    fixed_issued_at: Option<DateTime<Utc>>,
}

impl DefaultPolicy {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            fixed_issued_at: None,
        }
    }

    /// Pin the reported issue time (development override)
    pub fn with_fixed_time_ms(mut self, time_ms: i64) -> Result<Self> {
        let issued_at = DateTime::from_timestamp_millis(time_ms)
            .ok_or_else(|| Error::Config(format!("fixed_time_ms out of range: {}", time_ms)))?;
        self.fixed_issued_at = Some(issued_at);
        Ok(self)
    }
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SHARED_PREFIX)
    }
}

#[async_trait]
impl NamespacePolicy for DefaultPolicy {
    fn name(&self) -> &'static str {
        "default"
    }

    async fn map(&self, _bucket: &str, _key_id: Option<&str>) -> Result<NamespaceMapping> {
        Ok(NamespaceMapping {
            prefix: self.prefix.clone(),
            issued_at: self.fixed_issued_at,
        })
    }
}

/// Scopes each caller into its own namespace; requires a key id.
///
/// The template may reference `{key_id}` and `{bucket}`.
#[derive(Debug, Clone)]
pub struct PerTenantPolicy {
    template: String,
}

impl PerTenantPolicy {
    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl Default for PerTenantPolicy {
    fn default() -> Self {
        Self::with_template(DEFAULT_TENANT_TEMPLATE)
    }
}

#[async_trait]
impl NamespacePolicy for PerTenantPolicy {
    fn name(&self) -> &'static str {
        "per-tenant"
    }

    async fn map(&self, bucket: &str, key_id: Option<&str>) -> Result<NamespaceMapping> {
        let key_id = match key_id.map(str::trim) {
            Some(k) if !k.is_empty() => k,
            _ => {
                return Err(Error::Unauthorized(format!(
                    "bucket '{}' requires an authenticated key id",
                    bucket
                )));
            }
        };

        let prefix = self
            .template
            .replace("{key_id}", key_id)
            .replace("{bucket}", bucket);

        Ok(NamespaceMapping::new(prefix))
    }
}

/// One entry of a [`StaticPolicy`] table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRule {
    /// Virtual bucket name
    pub bucket: String,
    /// Prefix the bucket maps to
    pub prefix: String,
    /// Restrict the rule to one key id (any caller when absent)
    #[serde(default)]
    pub key_id: Option<String>,
}

/// Explicit bucket table. Key-specific rules win over open rules.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicy {
    rules: Vec<StaticRule>,
}

impl StaticPolicy {
    pub fn new(rules: Vec<StaticRule>) -> Self {
        Self { rules }
    }

    /// Add a rule
    pub fn with_rule(mut self, rule: StaticRule) -> Self {
        self.rules.push(rule);
        self
    }
}

#[async_trait]
impl NamespacePolicy for StaticPolicy {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn map(&self, bucket: &str, key_id: Option<&str>) -> Result<NamespaceMapping> {
        let candidates: Vec<&StaticRule> = self.rules.iter().filter(|r| r.bucket == bucket).collect();

        if candidates.is_empty() {
            return Err(Error::UnknownBucket(bucket.to_string()));
        }

        let keyed = key_id.and_then(|k| {
            candidates
                .iter()
                .find(|r| r.key_id.as_deref() == Some(k))
        });
        let open = candidates.iter().find(|r| r.key_id.is_none());

        match keyed.or(open) {
            Some(rule) => Ok(NamespaceMapping::new(rule.prefix.clone())),
            None => Err(Error::Unauthorized(format!(
                "key id {} has no access to bucket '{}'",
                key_id.unwrap_or("(none)"),
                bucket
            ))),
        }
    }
}

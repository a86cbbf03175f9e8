//! bucketgate Configuration
//!
//! This module provides configuration structures for the virtual-bucket
//! resolution layer. Configuration is read from a TOML file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::addressing::AddressingMode;
use crate::resolver::StaticRule;

/// Main bucketgate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Request addressing configuration
    pub addressing: AddressingConfig,

    /// Resolution cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Resolver / namespace policy configuration
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Retry budget for transient resolver failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Backing object store configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Control-plane stub API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Addressing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressingConfig {
    /// Base host for virtual-hosted addressing (e.g. storage.example.com)
    pub base_host: String,

    /// Mode used when a caller does not name one explicitly
    #[serde(default = "default_mode")]
    pub default_mode: AddressingMode,
}

/// Resolution cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Freshness window of a resolution in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Maximum number of cached resolutions
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Number of independently locked shards
    #[serde(default = "default_shards")]
    pub shards: usize,
}

/// Namespace policy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// Every bucket maps to one shared prefix
    Default,
    /// Each key id gets its own namespace
    PerTenant,
    /// Explicit bucket table from configuration
    Static,
    /// Remote control plane lookup
    ControlPlane,
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyKind::Default => write!(f, "default"),
            PolicyKind::PerTenant => write!(f, "per-tenant"),
            PolicyKind::Static => write!(f, "static"),
            PolicyKind::ControlPlane => write!(f, "control-plane"),
        }
    }
}

/// Resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Namespace policy
    #[serde(default = "default_policy")]
    pub policy: PolicyKind,

    /// Control-plane base URL (control-plane policy)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Per-call resolver timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Shared prefix (default policy)
    #[serde(default = "default_prefix")]
    pub default_prefix: String,

    /// Pinned issue time in ms since epoch (default policy, development only)
    #[serde(default)]
    pub fixed_time_ms: Option<i64>,

    /// Prefix template (per-tenant policy)
    #[serde(default = "default_tenant_template")]
    pub tenant_template: String,

    /// Bucket table (static policy)
    #[serde(default)]
    pub rules: Vec<StaticRule>,
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total resolver attempts per flight, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the first retry in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff cap in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

/// Backing object store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Object store base URL
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Physical bucket holding every namespace
    #[serde(default = "default_backend_bucket")]
    pub bucket: String,

    /// Address the backend with path-style URLs
    #[serde(default = "default_true")]
    pub path_style: bool,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Control-plane stub bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_mode() -> AddressingMode {
    AddressingMode::Path
}

fn default_ttl_secs() -> u64 {
    60
}

fn default_capacity() -> usize {
    10_000
}

fn default_shards() -> usize {
    16
}

fn default_policy() -> PolicyKind {
    PolicyKind::Default
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_prefix() -> String {
    crate::resolver::DEFAULT_SHARED_PREFIX.to_string()
}

fn default_tenant_template() -> String {
    crate::resolver::DEFAULT_TENANT_TEMPLATE.to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    1000
}

fn default_backend_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_backend_bucket() -> String {
    "bucketgate-data".to_string()
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:8888".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            capacity: default_capacity(),
            shards: default_shards(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            endpoint: None,
            timeout_ms: default_timeout_ms(),
            default_prefix: default_prefix(),
            fixed_time_ms: None,
            tenant_template: default_tenant_template(),
            rules: Vec::new(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            bucket: default_backend_bucket(),
            path_style: true,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_api_address(),
            cors_enabled: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ResolverConfig {
    /// Get resolver timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl RetryConfig {
    /// Get initial backoff as Duration
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Get backoff cap as Duration
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl GatewayConfig {
    /// Configuration with defaults for everything but the base host
    pub fn with_base_host(base_host: impl Into<String>) -> Self {
        Self {
            addressing: AddressingConfig {
                base_host: base_host.into(),
                default_mode: default_mode(),
            },
            cache: CacheConfig::default(),
            resolver: ResolverConfig::default(),
            retry: RetryConfig::default(),
            backend: BackendConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: GatewayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.addressing.base_host.trim().is_empty() {
            return Err(crate::Error::Config("addressing.base_host cannot be empty".into()));
        }

        if self.cache.ttl_secs == 0 {
            return Err(crate::Error::Config("cache.ttl_secs must be greater than 0".into()));
        }

        if self.cache.capacity == 0 {
            return Err(crate::Error::Config("cache.capacity must be greater than 0".into()));
        }

        if self.cache.shards == 0 {
            return Err(crate::Error::Config("cache.shards must be greater than 0".into()));
        }

        if self.resolver.timeout_ms == 0 {
            return Err(crate::Error::Config("resolver.timeout_ms must be greater than 0".into()));
        }

        if self.retry.max_attempts == 0 {
            return Err(crate::Error::Config("retry.max_attempts must be at least 1".into()));
        }

        match self.resolver.policy {
            PolicyKind::ControlPlane => {
                let missing = self
                    .resolver
                    .endpoint
                    .as_deref()
                    .map(|e| e.trim().is_empty())
                    .unwrap_or(true);
                if missing {
                    return Err(crate::Error::Config(
                        "resolver.endpoint is required for the control-plane policy".into(),
                    ));
                }
            }
            PolicyKind::Static => {
                if self.resolver.rules.is_empty() {
                    return Err(crate::Error::Config(
                        "resolver.rules cannot be empty for the static policy".into(),
                    ));
                }
            }
            PolicyKind::Default => {
                if self.resolver.default_prefix.is_empty() {
                    return Err(crate::Error::Config("resolver.default_prefix cannot be empty".into()));
                }
            }
            PolicyKind::PerTenant => {
                if !self.resolver.tenant_template.contains("{key_id}") {
                    return Err(crate::Error::Config(
                        "resolver.tenant_template must contain {key_id}".into(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Get cache TTL as Duration
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[addressing]
base_host = "storage.example.com"
default_mode = "virtual-hosted"

[cache]
ttl_secs = 30
capacity = 500

[resolver]
policy = "control-plane"
endpoint = "http://localhost:8888"
timeout_ms = 750

[retry]
max_attempts = 4
"#;

        let config = GatewayConfig::from_str(toml).unwrap();
        assert_eq!(config.addressing.base_host, "storage.example.com");
        assert_eq!(config.addressing.default_mode, AddressingMode::VirtualHosted);
        assert_eq!(config.cache_ttl(), Duration::from_secs(30));
        assert_eq!(config.cache.capacity, 500);
        assert_eq!(config.cache.shards, 16);
        assert_eq!(config.resolver.policy, PolicyKind::ControlPlane);
        assert_eq!(config.resolver.timeout(), Duration::from_millis(750));
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.initial_backoff(), Duration::from_millis(50));
        assert!(config.backend.path_style);
    }

    #[test]
    fn test_static_rules() {
        let toml = r#"
[addressing]
base_host = "storage.example.com"

[resolver]
policy = "static"

[[resolver.rules]]
bucket = "testbucket"
prefix = "tenants/acme"
key_id = "abc"

[[resolver.rules]]
bucket = "public"
prefix = "shared/public"
"#;

        let config = GatewayConfig::from_str(toml).unwrap();
        assert_eq!(config.resolver.rules.len(), 2);
        assert_eq!(config.resolver.rules[0].key_id.as_deref(), Some("abc"));
        assert_eq!(config.resolver.rules[1].key_id, None);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = GatewayConfig::with_base_host("storage.example.com");
        assert!(config.validate().is_ok());

        config.resolver.policy = PolicyKind::ControlPlane;
        assert!(config.validate().is_err());
        config.resolver.endpoint = Some("http://cp:8888".into());
        assert!(config.validate().is_ok());

        config.resolver.policy = PolicyKind::Static;
        assert!(config.validate().is_err());

        config.resolver.policy = PolicyKind::PerTenant;
        config.resolver.tenant_template = "namespaces/shared".into();
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::with_base_host("storage.example.com");
        config.cache.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::with_base_host("storage.example.com");
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let config = GatewayConfig::with_base_host("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[addressing]\nbase_host = \"s3.local\"").unwrap();

        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.addressing.base_host, "s3.local");
        assert_eq!(config.resolver.policy, PolicyKind::Default);

        let missing = GatewayConfig::from_file(std::path::Path::new("/nonexistent/bucketgate.toml"));
        assert!(matches!(missing, Err(crate::Error::Io(_))));
    }
}

//! Backend Path Rewriting
//!
//! Objects of a resolved virtual bucket live under `<prefix>/_data/` in one
//! physical bucket of the backing store. [`RequestRouter`] ties the pieces
//! together: parse the inbound address, resolve the prefix, build the
//! backend location.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::addressing::{AddressParser, AddressingMode};
use crate::client::ResolutionClient;
use crate::config::{BackendConfig, GatewayConfig};
use crate::error::Result;

/// Segment separating a namespace prefix from its object keys
pub const DATA_SEGMENT: &str = "_data";

/// Backend key of `object_key` inside namespace `prefix`
pub fn backend_key(prefix: &str, object_key: &str) -> String {
    format!(
        "{}/{}/{}",
        prefix.trim_end_matches('/'),
        DATA_SEGMENT,
        object_key.trim_start_matches('/')
    )
}

/// Client-visible key of a listed backend key, or `None` when the backend
/// key lies outside the namespace
pub fn strip_data_prefix<'a>(prefix: &str, backend_key: &'a str) -> Option<&'a str> {
    backend_key
        .strip_prefix(prefix.trim_end_matches('/'))?
        .strip_prefix('/')?
        .strip_prefix(DATA_SEGMENT)?
        .strip_prefix('/')
}

/// Location of the physical bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub base_url: String,
    pub bucket: String,
    pub path_style: bool,
}

impl From<&BackendConfig> for BackendTarget {
    fn from(config: &BackendConfig) -> Self {
        Self::new(config.base_url.clone(), config.bucket.clone(), config.path_style)
    }
}

impl BackendTarget {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>, path_style: bool) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            bucket: bucket.into(),
            path_style,
        }
    }

    /// Path on the backend, starting with `/`
    pub fn path(&self, prefix: &str, object_key: &str) -> String {
        let key = backend_key(prefix, object_key);
        if self.path_style {
            format!("/{}/{}", self.bucket, key)
        } else {
            format!("/{}", key)
        }
    }

    /// Full backend URL
    pub fn url(&self, prefix: &str, object_key: &str) -> String {
        format!("{}{}", self.base_url, self.path(prefix, object_key))
    }
}

/// A request mapped onto the backing store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutedRequest {
    pub bucket: String,
    pub object_key: String,
    pub key_id: Option<String>,
    pub mode: AddressingMode,
    pub prefix: String,
    pub expires_at: DateTime<Utc>,
    /// Bucket-level request (ListObjects) rather than an object request
    pub list: bool,
    pub backend_key: String,
    pub backend_url: String,
}

/// Routes inbound S3 requests to their namespace in the backing store
#[derive(Clone)]
pub struct RequestRouter {
    parser: AddressParser,
    client: ResolutionClient,
    backend: BackendTarget,
    default_mode: AddressingMode,
}

impl RequestRouter {
    pub fn new(
        parser: AddressParser,
        client: ResolutionClient,
        backend: BackendTarget,
        default_mode: AddressingMode,
    ) -> Self {
        Self {
            parser,
            client,
            backend,
            default_mode,
        }
    }

    /// Build the router and its resolution client from configuration
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let client = ResolutionClient::from_config(config)?;
        Ok(Self::new(
            AddressParser::new(config.addressing.base_host.clone()),
            client,
            BackendTarget::from(&config.backend),
            config.addressing.default_mode,
        ))
    }

    pub fn client(&self) -> &ResolutionClient {
        &self.client
    }

    pub fn backend(&self) -> &BackendTarget {
        &self.backend
    }

    pub fn default_mode(&self) -> AddressingMode {
        self.default_mode
    }

    /// Parse, resolve and rewrite one request. `mode` falls back to the
    /// configured default.
    pub async fn route(
        &self,
        host: &str,
        path: &str,
        mode: Option<AddressingMode>,
        key_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<RoutedRequest> {
        let mode = mode.unwrap_or(self.default_mode);
        let address = self.parser.parse(host, path, mode)?;
        let resolution = self.client.resolve(&address.bucket, key_id, now).await?;

        let list = address.is_bucket_request();
        let backend_key = backend_key(&resolution.prefix, &address.object_key);
        let backend_url = self.backend.url(&resolution.prefix, &address.object_key);

        tracing::debug!(
            bucket = %address.bucket,
            key = %address.object_key,
            %mode,
            list,
            url = %backend_url,
            "routed request"
        );

        Ok(RoutedRequest {
            bucket: address.bucket,
            object_key: address.object_key,
            key_id: key_id.map(str::to_string),
            mode,
            prefix: resolution.prefix,
            expires_at: resolution.expires_at,
            list,
            backend_key,
            backend_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_backend_key() {
        assert_eq!(backend_key("example", "dir/file.txt"), "example/_data/dir/file.txt");
        assert_eq!(backend_key("namespaces/user_abc/", "/a"), "namespaces/user_abc/_data/a");
        assert_eq!(backend_key("example", ""), "example/_data/");
    }

    #[test]
    fn test_strip_data_prefix() {
        assert_eq!(strip_data_prefix("example", "example/_data/dir/a.txt"), Some("dir/a.txt"));
        assert_eq!(strip_data_prefix("example", "example/_log/0001.jsonl"), None);
        assert_eq!(strip_data_prefix("example", "other/_data/a"), None);
        assert_eq!(strip_data_prefix("ex", "example/_data/a"), None);
    }

    #[test]
    fn test_backend_urls() {
        let path_style = BackendTarget::new("http://localhost:9000/", "store", true);
        assert_eq!(
            path_style.url("example", "a/b"),
            "http://localhost:9000/store/example/_data/a/b"
        );

        let vhost = BackendTarget::new("https://store.s3.example.net", "store", false);
        assert_eq!(vhost.url("example", "a/b"), "https://store.s3.example.net/example/_data/a/b");
        assert_eq!(vhost.path("example", ""), "/example/_data/");
    }

    fn router(config: &GatewayConfig) -> RequestRouter {
        RequestRouter::from_config(config).unwrap()
    }

    #[tokio::test]
    async fn test_route_path_style() {
        let config = GatewayConfig::with_base_host("storage.example.com");
        let routed = router(&config)
            .route("localhost:8080", "/testbucket/dir/file.txt", None, None, Utc::now())
            .await
            .unwrap();

        assert_eq!(routed.bucket, "testbucket");
        assert_eq!(routed.object_key, "dir/file.txt");
        assert_eq!(routed.prefix, "example");
        assert!(!routed.list);
        assert_eq!(routed.backend_key, "example/_data/dir/file.txt");
        assert_eq!(
            routed.backend_url,
            "http://localhost:9000/bucketgate-data/example/_data/dir/file.txt"
        );
    }

    #[tokio::test]
    async fn test_route_virtual_hosted_list() {
        let config = GatewayConfig::with_base_host("storage.example.com");
        let routed = router(&config)
            .route(
                "testbucket.storage.example.com",
                "/",
                Some(AddressingMode::VirtualHosted),
                Some("abc"),
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(routed.bucket, "testbucket");
        assert!(routed.list);
        assert_eq!(routed.key_id.as_deref(), Some("abc"));
        assert_eq!(routed.mode, AddressingMode::VirtualHosted);
    }

    #[tokio::test]
    async fn test_route_stays_inside_prefix() {
        let config = GatewayConfig::with_base_host("storage.example.com");
        let router = router(&config);

        let cases = [
            ("localhost", "/testbucket/../../victim/_data/secret.parquet", AddressingMode::Path),
            ("localhost", "/testbucket/%2e%2e/%2E%2E/victim/_data/a", AddressingMode::Path),
            (
                "testbucket.storage.example.com",
                "/../../victim/_data/secret.parquet",
                AddressingMode::VirtualHosted,
            ),
        ];

        for (host, path, mode) in cases {
            let err = router
                .route(host, path, Some(mode), None, Utc::now())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::MalformedAddress(_)), "path {:?}", path);
        }
        assert!(router.client().cache().is_empty());
    }

    #[tokio::test]
    async fn test_route_errors() {
        let mut config = GatewayConfig::with_base_host("storage.example.com");
        config.resolver.policy = crate::config::PolicyKind::PerTenant;
        let router = router(&config);

        let err = router
            .route("other.host", "/", Some(AddressingMode::VirtualHosted), None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedAddress(_)));

        let err = router
            .route("localhost", "/bucket/key", None, None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        let routed = router
            .route("localhost", "/bucket/key", None, Some("abc"), Utc::now())
            .await
            .unwrap();
        assert_eq!(routed.backend_key, "namespaces/user_abc/_data/key");
    }
}

//! S3 Addressing Parser
//!
//! Extracts the virtual bucket and object key from an inbound request.
//! The addressing mode is always supplied by the caller: with dotted bucket
//! names a path-style request and a virtual-hosted one can look identical.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Minimum bucket name length for virtual-hosted addressing
pub const MIN_BUCKET_NAME_LEN: usize = 3;

/// Maximum bucket name length for virtual-hosted addressing
pub const MAX_BUCKET_NAME_LEN: usize = 63;

/// How the bucket is carried in a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressingMode {
    /// `/bucket/key`
    #[serde(alias = "path-style")]
    Path,
    /// `bucket.base-host/key`
    #[serde(alias = "vhost")]
    VirtualHosted,
}

impl std::fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressingMode::Path => write!(f, "path"),
            AddressingMode::VirtualHosted => write!(f, "virtual-hosted"),
        }
    }
}

impl std::str::FromStr for AddressingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "path" | "path-style" => Ok(AddressingMode::Path),
            "virtual-hosted" | "virtual-hosted-style" | "vhost" => Ok(AddressingMode::VirtualHosted),
            other => Err(Error::Config(format!("unknown addressing mode: {}", other))),
        }
    }
}

/// Bucket and object key extracted from a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedAddress {
    /// Virtual bucket name as presented by the client
    pub bucket: String,
    /// Object key without leading slash (empty for bucket-level requests)
    pub object_key: String,
}

impl ParsedAddress {
    /// True for bucket-level requests such as ListObjects (`/bucket/`)
    pub fn is_bucket_request(&self) -> bool {
        self.object_key.is_empty()
    }
}

/// Pure parser for path-style and virtual-hosted-style addresses
#[derive(Debug, Clone)]
pub struct AddressParser {
    /// Lowercased base host, e.g. `storage.example.com`
    base_host: String,
}

impl AddressParser {
    /// Create a parser for the given base host
    pub fn new(base_host: impl Into<String>) -> Self {
        let base_host = base_host.into();
        let base_host = strip_port(base_host.trim().trim_matches('.')).to_ascii_lowercase();
        Self { base_host }
    }

    /// Configured base host
    pub fn base_host(&self) -> &str {
        &self.base_host
    }

    /// Parse a request host and path under an explicit addressing mode
    pub fn parse(&self, host: &str, path: &str, mode: AddressingMode) -> Result<ParsedAddress> {
        let path = strip_query(path);

        let parsed = match mode {
            AddressingMode::Path => parse_path_style(path)?,
            AddressingMode::VirtualHosted => self.parse_virtual_hosted(host, path)?,
        };

        validate_object_key(&parsed.object_key)?;
        Ok(parsed)
    }

    fn parse_virtual_hosted(&self, host: &str, path: &str) -> Result<ParsedAddress> {
        let host = strip_port(host.trim()).trim_end_matches('.').to_ascii_lowercase();

        let suffix = format!(".{}", self.base_host);
        let bucket = match host.strip_suffix(&suffix) {
            Some(label) => label,
            None => {
                return Err(Error::MalformedAddress(format!(
                    "host '{}' is not a subdomain of '{}'",
                    host, self.base_host
                )));
            }
        };

        if bucket.is_empty() {
            return Err(Error::MalformedAddress(format!(
                "host '{}' carries no bucket label",
                host
            )));
        }

        validate_bucket_name(bucket)?;

        Ok(ParsedAddress {
            bucket: bucket.to_string(),
            object_key: path.trim_start_matches('/').to_string(),
        })
    }
}

fn parse_path_style(path: &str) -> Result<ParsedAddress> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let (bucket, object_key) = match trimmed.split_once('/') {
        Some((bucket, rest)) => (bucket, rest),
        None => (trimmed, ""),
    };

    if bucket.is_empty() {
        return Err(Error::MalformedAddress(format!(
            "path '{}' has an empty bucket segment",
            path
        )));
    }

    if is_relative_segment(bucket) {
        return Err(Error::MalformedAddress(format!(
            "path '{}' has a relative bucket segment",
            path
        )));
    }

    Ok(ParsedAddress {
        bucket: bucket.to_string(),
        object_key: object_key.to_string(),
    })
}

/// Reject object keys with `.` or `..` segments, plain or percent-encoded.
/// Such a key would leave the bucket's namespace once the backend
/// normalizes the rewritten path.
pub fn validate_object_key(key: &str) -> Result<()> {
    if key.split(['/', '\\']).any(is_relative_segment) {
        return Err(Error::MalformedAddress(format!(
            "object key '{}' contains a relative path segment",
            key
        )));
    }
    Ok(())
}

fn is_relative_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

/// Validate DNS-compatible bucket naming: lowercase letters, digits,
/// hyphens and dots; 3-63 characters; no leading or trailing hyphen or dot;
/// no empty labels
pub fn validate_bucket_name(name: &str) -> Result<()> {
    if name.len() < MIN_BUCKET_NAME_LEN || name.len() > MAX_BUCKET_NAME_LEN {
        return Err(Error::MalformedAddress(format!(
            "bucket name '{}' must be {}-{} characters",
            name, MIN_BUCKET_NAME_LEN, MAX_BUCKET_NAME_LEN
        )));
    }

    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '.'))
    {
        return Err(Error::MalformedAddress(format!(
            "bucket name '{}' contains invalid character '{}'",
            name, c
        )));
    }

    if name.starts_with('-') || name.ends_with('-') {
        return Err(Error::MalformedAddress(format!(
            "bucket name '{}' cannot start or end with a hyphen",
            name
        )));
    }

    if name.starts_with('.') || name.ends_with('.') || name.contains("..") {
        return Err(Error::MalformedAddress(format!(
            "bucket name '{}' has an empty label",
            name
        )));
    }

    Ok(())
}

fn strip_query(path: &str) -> &str {
    match path.find('?') {
        Some(pos) => &path[..pos],
        None => path,
    }
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> AddressParser {
        AddressParser::new("storage.example.com")
    }

    #[test]
    fn test_addressing_parity() {
        let vhost = parser()
            .parse("mybucket.storage.example.com", "/foo/bar", AddressingMode::VirtualHosted)
            .unwrap();
        let path = parser()
            .parse("storage.example.com", "/mybucket/foo/bar", AddressingMode::Path)
            .unwrap();

        assert_eq!(vhost.bucket, "mybucket");
        assert_eq!(vhost.object_key, "foo/bar");
        assert_eq!(vhost, path);
    }

    #[test]
    fn test_virtual_hosted_without_subdomain() {
        let err = parser()
            .parse("storage.example.com", "/foo", AddressingMode::VirtualHosted)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedAddress(_)));
    }

    #[test]
    fn test_virtual_hosted_wrong_suffix() {
        let p = parser();
        for host in ["mybucket.other.example.com", "mybucketstorage.example.com", "localhost"] {
            let err = p.parse(host, "/", AddressingMode::VirtualHosted).unwrap_err();
            assert!(matches!(err, Error::MalformedAddress(_)), "host {}", host);
        }
    }

    #[test]
    fn test_virtual_hosted_port_and_case() {
        let parsed = parser()
            .parse("MyBucket.Storage.Example.com:8080", "/a/b.parquet", AddressingMode::VirtualHosted)
            .unwrap();
        assert_eq!(parsed.bucket, "mybucket");
        assert_eq!(parsed.object_key, "a/b.parquet");
    }

    #[test]
    fn test_dotted_bucket_names() {
        let p = parser();

        // Virtual-hosted: everything before the base host is the bucket
        let parsed = p
            .parse("logs.2024.storage.example.com", "/x", AddressingMode::VirtualHosted)
            .unwrap();
        assert_eq!(parsed.bucket, "logs.2024");

        // Path-style: a host-looking segment is still just the bucket
        let parsed = p
            .parse("storage.example.com", "/mybucket.storage.example.com/key", AddressingMode::Path)
            .unwrap();
        assert_eq!(parsed.bucket, "mybucket.storage.example.com");
        assert_eq!(parsed.object_key, "key");
    }

    #[test]
    fn test_bucket_name_rules() {
        assert!(validate_bucket_name("abc").is_ok());
        assert!(validate_bucket_name("my-bucket.v2").is_ok());
        assert!(validate_bucket_name(&"a".repeat(63)).is_ok());

        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name(&"a".repeat(64)).is_err());
        assert!(validate_bucket_name("-abc").is_err());
        assert!(validate_bucket_name("abc-").is_err());
        assert!(validate_bucket_name("my_bucket").is_err());
        assert!(validate_bucket_name(".abc").is_err());
        assert!(validate_bucket_name("abc.").is_err());
        assert!(validate_bucket_name("a..b").is_err());

        let err = parser()
            .parse("a_b.storage.example.com", "/", AddressingMode::VirtualHosted)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedAddress(_)));
    }

    #[test]
    fn test_path_style_edge_cases() {
        let p = parser();

        let parsed = p.parse("storage.example.com", "/testbucket/", AddressingMode::Path).unwrap();
        assert_eq!(parsed.bucket, "testbucket");
        assert!(parsed.is_bucket_request());

        let parsed = p
            .parse("storage.example.com", "/testbucket?list-type=2&max-keys=123", AddressingMode::Path)
            .unwrap();
        assert_eq!(parsed.bucket, "testbucket");
        assert!(parsed.is_bucket_request());

        let parsed = p
            .parse("storage.example.com", "/testbucket/some/sample.parquet", AddressingMode::Path)
            .unwrap();
        assert!(!parsed.is_bucket_request());

        for path in ["/", "", "//key"] {
            let err = p.parse("storage.example.com", path, AddressingMode::Path).unwrap_err();
            assert!(matches!(err, Error::MalformedAddress(_)), "path {:?}", path);
        }
    }

    #[test]
    fn test_relative_segments_rejected() {
        let p = parser();

        for path in [
            "/testbucket/../../victim/_data/secret.parquet",
            "/testbucket/a/./b",
            "/testbucket/..",
            "/testbucket/%2e%2e/victim",
            "/testbucket/%2E./victim",
            "/testbucket/a\\..\\b",
            "/../victim/_data/x",
            "/%2e%2e/victim/_data/x",
        ] {
            let err = p.parse("storage.example.com", path, AddressingMode::Path).unwrap_err();
            assert!(matches!(err, Error::MalformedAddress(_)), "path {:?}", path);
        }

        for path in ["/../victim/_data/x", "/%2e%2e/%2e%2e/victim", "/./x"] {
            let err = p
                .parse("testbucket.storage.example.com", path, AddressingMode::VirtualHosted)
                .unwrap_err();
            assert!(matches!(err, Error::MalformedAddress(_)), "path {:?}", path);
        }

        // Dots inside a segment are ordinary key characters
        let parsed = p
            .parse("storage.example.com", "/testbucket/a..b/.hidden/x.", AddressingMode::Path)
            .unwrap();
        assert_eq!(parsed.object_key, "a..b/.hidden/x.");
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("path".parse::<AddressingMode>().unwrap(), AddressingMode::Path);
        assert_eq!(
            "virtual-hosted".parse::<AddressingMode>().unwrap(),
            AddressingMode::VirtualHosted
        );
        assert!("dns".parse::<AddressingMode>().is_err());
    }
}

//! Authorization header parsing
//!
//! Extracts the caller's key id from an S3 `Authorization` header so it can
//! take part in bucket resolution. Signature verification happens upstream
//! of this crate; nothing here checks a signature.

use axum::http::{header, HeaderMap};
use serde::Serialize;

/// SigV4 algorithm tag
pub const SIGV4_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Credential scope of a SigV4 header: `<key_id>/<date>/<region>/<service>/<request>`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CredentialScope {
    pub key_id: String,
    pub date: String,
    pub region: String,
    pub service: String,
    pub request: String,
}

/// Parsed `Authorization` header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthHeader {
    pub credential: CredentialScope,
    pub signed_headers: Vec<String>,
    pub signature: String,
}

/// Parse a SigV4 `Authorization` header.
/// Returns `None` for other schemes or when the credential is missing.
pub fn parse_auth_header(value: &str) -> Option<AuthHeader> {
    let rest = value.trim().strip_prefix(SIGV4_ALGORITHM)?;

    let mut parsed = AuthHeader::default();
    let mut has_credential = false;

    for part in rest.split(',') {
        let (key, val) = match part.trim().split_once('=') {
            Some(kv) => kv,
            None => continue,
        };

        match key.trim() {
            "Credential" => {
                let mut scope = val.trim().splitn(5, '/');
                parsed.credential = CredentialScope {
                    key_id: scope.next().unwrap_or_default().to_string(),
                    date: scope.next().unwrap_or_default().to_string(),
                    region: scope.next().unwrap_or_default().to_string(),
                    service: scope.next().unwrap_or_default().to_string(),
                    request: scope.next().unwrap_or_default().to_string(),
                };
                has_credential = !parsed.credential.key_id.is_empty();
            }
            "SignedHeaders" => {
                parsed.signed_headers = val
                    .trim()
                    .split(';')
                    .filter(|h| !h.is_empty())
                    .map(|h| h.to_ascii_lowercase())
                    .collect();
            }
            "Signature" => parsed.signature = val.trim().to_string(),
            _ => continue,
        }
    }

    if has_credential {
        Some(parsed)
    } else {
        None
    }
}

/// Extract the key id from an `Authorization` header value.
/// Accepts SigV4 and the legacy `AWS <key_id>:<signature>` form.
pub fn key_id_from_authorization(value: &str) -> Option<String> {
    let value = value.trim();

    if value.starts_with(SIGV4_ALGORITHM) {
        return parse_auth_header(value).map(|h| h.credential.key_id);
    }

    if let Some(key_part) = value.strip_prefix("AWS ") {
        return key_part
            .split(':')
            .next()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);
    }

    None
}

/// Extract the key id from request headers, if the request is signed
pub fn key_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(key_id_from_authorization)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SIGV4: &str = "AWS4-HMAC-SHA256 Credential=AKID/20260211/us-east-1/s3/aws4_request, \
        SignedHeaders=host;x-amz-content-sha256;x-amz-date, \
        Signature=fe5f80f77d5fa3beca038a248ff027d0445342fe2855ddc963176630326f1024";

    #[test]
    fn test_parse_sigv4() {
        let parsed = parse_auth_header(SIGV4).unwrap();
        assert_eq!(parsed.credential.key_id, "AKID");
        assert_eq!(parsed.credential.date, "20260211");
        assert_eq!(parsed.credential.region, "us-east-1");
        assert_eq!(parsed.credential.service, "s3");
        assert_eq!(parsed.credential.request, "aws4_request");
        assert_eq!(parsed.signed_headers, vec!["host", "x-amz-content-sha256", "x-amz-date"]);
        assert!(parsed.signature.starts_with("fe5f80f7"));
    }

    #[test]
    fn test_parse_without_credential() {
        assert!(parse_auth_header("AWS4-HMAC-SHA256 SignedHeaders=host, Signature=abc").is_none());
        assert!(parse_auth_header("Bearer token").is_none());
    }

    #[test]
    fn test_legacy_key_id() {
        assert_eq!(key_id_from_authorization("AWS AKID:c2lnbmF0dXJl").as_deref(), Some("AKID"));
        assert_eq!(key_id_from_authorization("AWS :sig"), None);
        assert_eq!(key_id_from_authorization("Basic dXNlcjpwYXNz"), None);
    }

    #[test]
    fn test_key_id_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(key_id_from_headers(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(SIGV4));
        assert_eq!(key_id_from_headers(&headers).as_deref(), Some("AKID"));
    }
}

//! bucketgate Error Types

use thiserror::Error;

/// Result type alias for bucketgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// bucketgate error types
#[derive(Error, Debug, Clone)]
pub enum Error {
    // Addressing errors
    #[error("Malformed address: {0}")]
    MalformedAddress(String),

    // Resolution errors
    #[error("No such bucket: {0}")]
    UnknownBucket(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Invalid upstream response: {0}")]
    InvalidUpstreamResponse(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Caller-visible classification of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedAddress,
    UnknownBucket,
    Unauthorized,
    UpstreamUnavailable,
    InvalidUpstreamResponse,
    Internal,
}

impl ErrorKind {
    /// HTTP status code surfaced to the original requester
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::MalformedAddress => 400,
            ErrorKind::Unauthorized => 403,
            ErrorKind::UnknownBucket => 404,
            ErrorKind::InvalidUpstreamResponse => 502,
            ErrorKind::UpstreamUnavailable => 503,
            ErrorKind::Internal => 500,
        }
    }

    /// S3 error code used in XML error bodies
    pub fn s3_code(&self) -> &'static str {
        match self {
            ErrorKind::MalformedAddress => "InvalidBucketName",
            ErrorKind::Unauthorized => "AccessDenied",
            ErrorKind::UnknownBucket => "NoSuchBucket",
            ErrorKind::UpstreamUnavailable => "ServiceUnavailable",
            ErrorKind::InvalidUpstreamResponse | ErrorKind::Internal => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::MalformedAddress => write!(f, "MALFORMED_ADDRESS"),
            ErrorKind::UnknownBucket => write!(f, "UNKNOWN_BUCKET"),
            ErrorKind::Unauthorized => write!(f, "UNAUTHORIZED"),
            ErrorKind::UpstreamUnavailable => write!(f, "UPSTREAM_UNAVAILABLE"),
            ErrorKind::InvalidUpstreamResponse => write!(f, "INVALID_UPSTREAM_RESPONSE"),
            ErrorKind::Internal => write!(f, "INTERNAL"),
        }
    }
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::UpstreamUnavailable(_))
    }

    /// Classify this error for the caller
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedAddress(_) => ErrorKind::MalformedAddress,
            Error::UnknownBucket(_) => ErrorKind::UnknownBucket,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Error::InvalidUpstreamResponse(_) => ErrorKind::InvalidUpstreamResponse,
            Error::Config(_)
            | Error::ConfigParse(_)
            | Error::Network(_)
            | Error::Io(_)
            | Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

// Errors are fanned out to every single-flight waiter, so the enum stays
// `Clone` and foreign errors are captured by message.
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::ConfigParse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_upstream_unavailable_is_retryable() {
        assert!(Error::UpstreamUnavailable("timeout".into()).is_retryable());
        assert!(!Error::UnknownBucket("b".into()).is_retryable());
        assert!(!Error::Unauthorized("no key".into()).is_retryable());
        assert!(!Error::MalformedAddress("host".into()).is_retryable());
        assert!(!Error::InvalidUpstreamResponse("shape".into()).is_retryable());
    }

    #[test]
    fn test_kind_mapping() {
        let err = Error::UnknownBucket("testbucket".into());
        assert_eq!(err.kind(), ErrorKind::UnknownBucket);
        assert_eq!(err.kind().status_code(), 404);
        assert_eq!(err.kind().s3_code(), "NoSuchBucket");

        let err = Error::UpstreamUnavailable("down".into());
        assert_eq!(err.kind().status_code(), 503);

        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}

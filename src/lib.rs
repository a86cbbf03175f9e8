//! bucketgate - Virtual Bucket Resolution Layer
//!
//! Maps S3 virtual buckets onto namespaced prefixes inside one physical
//! bucket of a backing object store, so many tenants can share a single
//! store behind an S3-compatible front end.
//!
//! # Architecture
//!
//! An inbound request is parsed into a virtual bucket and object key
//! (path-style or virtual-hosted-style addressing), the bucket is resolved
//! to a prefix by a pluggable namespace policy, and the object key is
//! rewritten to `<prefix>/_data/<key>` on the backend. Resolutions are
//! cached for a bounded freshness window and concurrent misses for the same
//! bucket share one resolver call.
//!
//! # Features
//!
//! - Path-style and virtual-hosted-style address parsing
//! - Sharded, TTL-bounded LRU resolution cache
//! - Single-flight resolution with retry and per-call timeout
//! - Default, per-tenant, static and control-plane namespace policies
//! - SigV4 credential parsing for tenant key ids
//! - Control-plane stub serving `POST /resolve_virtual_bucket`

pub mod addressing;
pub mod api;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod resolver;
pub mod retry;
pub mod rewrite;

pub use config::GatewayConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::addressing::{AddressParser, AddressingMode, ParsedAddress};
    pub use crate::cache::ResolutionCache;
    pub use crate::client::{ClientOptions, ResolutionClient};
    pub use crate::config::GatewayConfig;
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::resolver::{NamespacePolicy, Resolution, ResolutionKey, Resolver};
    pub use crate::rewrite::{RequestRouter, RoutedRequest};
}

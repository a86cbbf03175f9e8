//! Resolution Client
//!
//! Hot-path entry point: serves prefixes from the [`ResolutionCache`] and
//! falls back to the [`Resolver`] on a miss. Concurrent misses for the same
//! key share one resolver flight. The flight runs in its own task, so a
//! caller that goes away only abandons its own wait.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;

use crate::cache::ResolutionCache;
use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::resolver::{Resolution, ResolutionKey, Resolver};
use crate::retry::{with_retry, with_timeout, RetryPolicy};

/// Value published by a flight: `None` until the flight finishes
type FlightOutcome = Option<Result<Resolution>>;

/// Flights a caller will wait on before giving up on a fresh resolution
const MAX_JOIN_ROUNDS: u32 = 3;

/// Resolver call settings applied by the client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Retry budget for transient resolver failures
    pub retry: RetryPolicy,
    /// Upper bound on a single resolver call
    pub call_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(2),
        }
    }
}

/// In-progress resolver call for one key
struct Flight {
    id: u64,
    outcome: watch::Receiver<FlightOutcome>,
}

struct Inner {
    resolver: Resolver,
    cache: Arc<ResolutionCache>,
    inflight: DashMap<ResolutionKey, Flight>,
    next_flight_id: AtomicU64,
    options: ClientOptions,
}

/// Removes a flight from the in-flight map when dropped, including when
/// the resolver panics
struct FlightGuard {
    inner: Arc<Inner>,
    key: ResolutionKey,
    id: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let id = self.id;
        self.inner.inflight.remove_if(&self.key, |_, flight| flight.id == id);
    }
}

/// Cache-first prefix resolution with single-flight misses
#[derive(Clone)]
pub struct ResolutionClient {
    inner: Arc<Inner>,
}

impl ResolutionClient {
    /// Create a client over an injected resolver and cache
    pub fn new(resolver: Resolver, cache: Arc<ResolutionCache>, options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolver,
                cache,
                inflight: DashMap::new(),
                next_flight_id: AtomicU64::new(0),
                options,
            }),
        }
    }

    /// Build the resolver, cache and client described by a configuration
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let policy = Resolver::policy_from_config(&config.resolver)?;
        let resolver = Resolver::new(policy, config.cache_ttl());
        let cache = Arc::new(ResolutionCache::new(config.cache.capacity, config.cache.shards));
        let options = ClientOptions {
            retry: RetryPolicy::from(&config.retry),
            call_timeout: config.resolver.timeout(),
        };

        tracing::info!(
            policy = resolver.policy_name(),
            ttl_secs = config.cache.ttl_secs,
            capacity = cache.capacity(),
            "resolution client initialized"
        );

        Ok(Self::new(resolver, cache, options))
    }

    /// Shared cache handle
    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.inner.cache
    }

    /// Underlying resolver
    pub fn resolver(&self) -> &Resolver {
        &self.inner.resolver
    }

    /// Number of resolver flights currently running
    pub fn inflight_count(&self) -> usize {
        self.inner.inflight.len()
    }

    /// Resolve the prefix for a virtual bucket at time `now`
    pub async fn resolve_prefix(
        &self,
        bucket: &str,
        key_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String> {
        self.resolve(bucket, key_id, now).await.map(|r| r.prefix)
    }

    /// Resolve a virtual bucket, returning the full resolution
    pub async fn resolve(
        &self,
        bucket: &str,
        key_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Resolution> {
        let key = ResolutionKey::new(bucket, key_id);

        if let Some(resolution) = self.inner.cache.get(&key, now) {
            tracing::debug!(key = %key, prefix = %resolution.prefix, "resolution cache hit");
            return Ok(resolution);
        }

        for _ in 0..MAX_JOIN_ROUNDS {
            let (mut outcome, started) = self.join_or_start(key.clone(), now);

            let result = match outcome.wait_for(Option::is_some).await {
                Ok(value) => value.clone(),
                Err(_) => None,
            };

            let result = result.unwrap_or_else(|| {
                Err(Error::Internal(format!(
                    "resolution of '{}' ended without a result",
                    bucket
                )))
            });

            // A joined flight computed its expiry from an earlier `now`
            match result {
                Ok(resolution) if !started && !resolution.is_fresh(now) => {
                    tracing::debug!(
                        key = %key,
                        expires_at = %resolution.expires_at,
                        %now,
                        "joined flight returned an expired resolution, re-resolving"
                    );
                }
                other => return other,
            }
        }

        Err(Error::UpstreamUnavailable(format!(
            "no fresh resolution for '{}' after {} flights",
            key, MAX_JOIN_ROUNDS
        )))
    }

    /// Drop the cached resolution for one key
    pub fn invalidate(&self, bucket: &str, key_id: Option<&str>) {
        self.inner.cache.invalidate(&ResolutionKey::new(bucket, key_id));
    }

    /// Subscribe to the running flight for `key`, or start one. The flag is
    /// true when this call started the flight.
    fn join_or_start(
        &self,
        key: ResolutionKey,
        now: DateTime<Utc>,
    ) -> (watch::Receiver<FlightOutcome>, bool) {
        match self.inner.inflight.entry(key) {
            Entry::Occupied(entry) => {
                tracing::trace!(key = %entry.key(), "joining in-flight resolution");
                (entry.get().outcome.clone(), false)
            }
            Entry::Vacant(entry) => {
                // A flight may have finished between the cache lookup and here
                if let Some(resolution) = self.inner.cache.get(entry.key(), now) {
                    let (_, rx) = watch::channel(Some(Ok(resolution)));
                    return (rx, false);
                }

                let id = self.inner.next_flight_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = watch::channel(None);
                let key = entry.key().clone();
                entry.insert(Flight {
                    id,
                    outcome: rx.clone(),
                });

                tracing::debug!(key = %key, flight = id, "resolution cache miss, starting flight");

                let guard = FlightGuard {
                    inner: Arc::clone(&self.inner),
                    key,
                    id,
                };
                tokio::spawn(run_flight(guard, tx, now));

                (rx, true)
            }
        }
    }
}

async fn run_flight(guard: FlightGuard, tx: watch::Sender<FlightOutcome>, now: DateTime<Utc>) {
    let inner = Arc::clone(&guard.inner);
    let key = guard.key.clone();

    let resolver = &inner.resolver;
    let timeout = inner.options.call_timeout;
    let key_ref = &key;

    let result = with_retry(&inner.options.retry, "resolve_virtual_bucket", move |_| {
        with_timeout(
            timeout,
            "resolver call",
            resolver.resolve(&key_ref.bucket, key_ref.key_id.as_deref(), now),
        )
    })
    .await;

    match &result {
        Ok(resolution) => {
            tracing::info!(
                key = %key,
                prefix = %resolution.prefix,
                expires_at = %resolution.expires_at,
                "virtual bucket resolved"
            );
            inner.cache.put(key.clone(), resolution.clone());
        }
        Err(e) => {
            tracing::warn!(key = %key, kind = %e.kind(), error = %e, "virtual bucket resolution failed");
        }
    }

    // Cache is populated before the flight leaves the map, so a newcomer
    // either joins this flight or hits the cache.
    drop(guard);
    let _ = tx.send(Some(result));
}

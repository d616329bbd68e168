//! Configuration for the client and the replica follower.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where `unregister_replica` sends its request.
///
/// Deployed servers accept unregistration on the register path; newer
/// builds also expose a dedicated route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnregisterRoute {
    /// `POST /api/oplog/v1/register`
    #[default]
    SharedRegisterPath,
    /// `POST /api/oplog/v1/unregister`
    Dedicated,
}

impl UnregisterRoute {
    /// Returns the request path.
    pub fn path(&self) -> &'static str {
        match self {
            UnregisterRoute::SharedRegisterPath => "/api/oplog/v1/register",
            UnregisterRoute::Dedicated => "/api/oplog/v1/unregister",
        }
    }
}

/// Configuration for a [`ShilpClient`](crate::ShilpClient).
///
/// Read-only once the client is built.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, without trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// How long idle pooled connections are kept.
    pub pool_idle_timeout: Option<Duration>,
    /// `User-Agent` header.
    pub user_agent: String,
    /// Caller-supplied HTTP client (shares its connection pool).
    pub http_client: Option<reqwest::Client>,
    /// Unregister endpoint.
    pub unregister_route: UnregisterRoute,
}

impl ClientConfig {
    /// Creates a configuration for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: None,
            pool_idle_timeout: None,
            user_agent: concat!("shilp-rs/", env!("CARGO_PKG_VERSION")).to_string(),
            http_client: None,
            unregister_route: UnregisterRoute::default(),
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the pool idle timeout.
    pub fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Sets the `User-Agent` header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Uses an existing HTTP client instead of building one.
    ///
    /// Connect timeout, pool and user agent settings are then taken from
    /// that client; the request timeout still applies.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the unregister endpoint.
    pub fn with_unregister_route(mut self, route: UnregisterRoute) -> Self {
        self.unregister_route = route;
        self
    }
}

/// Configuration for a [`ReplicaSync`](crate::ReplicaSync) follower.
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    /// Stable replica identity.
    pub replica_id: String,
    /// Collection to follow; empty follows every collection.
    pub collection: String,
    /// Entries requested per fetch.
    pub batch_size: u32,
    /// Retry configuration for `sync_with_retry`.
    pub retry: RetryConfig,
}

impl ReplicaConfig {
    /// Creates a follower configuration.
    pub fn new(replica_id: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            replica_id: replica_id.into(),
            collection: collection.into(),
            batch_size: 100,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the fetch batch size.
    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Backoff for [`ReplicaSync::sync_with_retry`](crate::ReplicaSync::sync_with_retry).
///
/// Only retryable failures are retried (transport errors, timeouts, 429 and
/// 5xx). Delays grow from `initial_delay` by `backoff_multiplier` and are
/// capped at `max_delay`. Jitter is derived from the replica ID, so replicas
/// knocked over by the same outage come back staggered while each replica's
/// own schedule is reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Sync attempts per call, including the first. At least 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on a delay before jitter is added.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
    /// Extra delay as a fraction of the base delay, in `0.0..=1.0`.
    pub jitter: f64,
}

impl RetryConfig {
    /// Makes up to `max_attempts` sync attempts; zero is raised to one.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: 0.25,
        }
    }

    /// A single attempt. Failures surface immediately.
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    /// Sets the delay before the first retry.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the jitter fraction, clamped to `0.0..=1.0`.
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter = fraction.clamp(0.0, 1.0);
        self
    }

    /// Disables jitter.
    pub fn without_jitter(self) -> Self {
        self.with_jitter(0.0)
    }

    /// Delay before retry number `retry` of `replica_id`. Retry 0 is the
    /// first attempt and never waits.
    pub fn delay_before(&self, retry: u32, replica_id: &str) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let base = (self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay.as_secs_f64())
            .max(0.0);
        let spread = self.jitter.clamp(0.0, 1.0) * spread_fraction(replica_id, retry);
        Duration::from_secs_f64(base * (1.0 + spread))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Stable value in `0.0..1.0` for a replica's retry.
fn spread_fraction(replica_id: &str, retry: u32) -> f64 {
    let mut hasher = DefaultHasher::new();
    (replica_id, retry).hash(&mut hasher);
    (hasher.finish() % 1024) as f64 / 1024.0
}

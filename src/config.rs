//! Configuration Module
//!
//! Loads component settings from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Settings for a sweeping [`crate::cache::SweepCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Entries kept after any `add` returns
    pub max_records: usize,
    /// Age past which the sweep removes an entry
    pub max_hold_time: Duration,
    /// How often the sweep runs
    pub sweep_interval: Duration,
}

/// Settings for a [`crate::ratelimit::RateLimiter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Average spacing between admitted requests
    pub wait_between_requests: Duration,
    /// Burst size admitted before `check_request` starts failing
    pub max_request_stack: u32,
}

/// Settings for a [`crate::pool::ConnectionPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on open connections
    pub max_connections: usize,
    /// How long `get_connection` waits for a connection to be returned
    pub get_timeout: Duration,
    /// Bound on a single liveness check
    pub validation_timeout: Duration,
    /// Checkout age after which a connection is considered leaked
    pub max_release_wait: Duration,
    /// How often leaked connections are reclaimed
    pub check_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            get_timeout: Duration::from_secs(3),
            validation_timeout: Duration::from_secs(1),
            max_release_wait: Duration::from_secs(60),
            check_interval: Duration::from_secs(10),
        }
    }
}

/// Settings shared by the session registries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How often idle handlers are reaped
    pub sweep_interval: Duration,
}

/// Process configuration.
///
/// All values can be configured via environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Memoized upstream responses
    pub cache: CacheConfig,
    /// Capacity of the access-ordered lookup cache
    pub lru_max_records: usize,
    pub limiter: LimiterConfig,
    pub pool: PoolConfig,
    pub session: SessionConfig,
    /// Admin HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_RECORDS` - Response cache capacity (default: 100)
    /// - `CACHE_MAX_HOLD_MS` - Response cache hold time (default: 600000)
    /// - `CACHE_SWEEP_MS` - Response cache sweep interval (default: 600000)
    /// - `LRU_MAX_RECORDS` - Lookup cache capacity (default: 1000)
    /// - `RATE_WAIT_MS` - Spacing between upstream requests (default: 1000)
    /// - `RATE_MAX_STACK` - Upstream burst size (default: 5)
    /// - `POOL_MAX_CONNECTIONS` - Pool size (default: 10)
    /// - `POOL_GET_TIMEOUT_MS` - Checkout wait (default: 3000)
    /// - `POOL_VALIDATION_TIMEOUT_MS` - Liveness check bound (default: 1000)
    /// - `POOL_MAX_RELEASE_WAIT_MS` - Leak threshold (default: 60000)
    /// - `POOL_CHECK_INTERVAL_MS` - Leak scan interval (default: 10000)
    /// - `SESSION_SWEEP_MS` - Idle handler reap interval (default: 600000)
    /// - `SERVER_PORT` - Admin HTTP port (default: 3000)
    pub fn from_env() -> Self {
        Self {
            cache: CacheConfig {
                max_records: env_or("CACHE_MAX_RECORDS", 100),
                max_hold_time: env_millis("CACHE_MAX_HOLD_MS", 600_000),
                sweep_interval: env_millis("CACHE_SWEEP_MS", 600_000),
            },
            lru_max_records: env_or("LRU_MAX_RECORDS", 1000),
            limiter: LimiterConfig {
                wait_between_requests: env_millis("RATE_WAIT_MS", 1000),
                max_request_stack: env_or("RATE_MAX_STACK", 5),
            },
            pool: PoolConfig {
                max_connections: env_or("POOL_MAX_CONNECTIONS", 10),
                get_timeout: env_millis("POOL_GET_TIMEOUT_MS", 3000),
                validation_timeout: env_millis("POOL_VALIDATION_TIMEOUT_MS", 1000),
                max_release_wait: env_millis("POOL_MAX_RELEASE_WAIT_MS", 60_000),
                check_interval: env_millis("POOL_CHECK_INTERVAL_MS", 10_000),
            },
            session: SessionConfig {
                sweep_interval: env_millis("SESSION_SWEEP_MS", 600_000),
            },
            server_port: env_or("SERVER_PORT", 3000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig {
                max_records: 100,
                max_hold_time: Duration::from_secs(600),
                sweep_interval: Duration::from_secs(600),
            },
            lru_max_records: 1000,
            limiter: LimiterConfig {
                wait_between_requests: Duration::from_secs(1),
                max_request_stack: 5,
            },
            pool: PoolConfig::default(),
            session: SessionConfig {
                sweep_interval: Duration::from_secs(600),
            },
            server_port: 3000,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_millis(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_or(name, default_ms))
}

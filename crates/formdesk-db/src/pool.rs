//! PostgreSQL pool for the record and blob metadata tables.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use formdesk_core::{Error, Result};

/// Sizing and timeouts for the record store pool.
///
/// Request handlers hold a connection only for single statements, so the
/// defaults stay small.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a caller waits for a free connection.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// Recycle connections after this long; `None` keeps them forever.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl PoolConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `FORMDESK_DB_MAX_CONNECTIONS` | `10` |
    /// | `FORMDESK_DB_MIN_CONNECTIONS` | `1` |
    /// | `FORMDESK_DB_CONNECT_TIMEOUT_SECS` | `30` |
    /// | `FORMDESK_DB_IDLE_TIMEOUT_SECS` | `600` |
    /// | `FORMDESK_DB_MAX_LIFETIME_SECS` | `1800` (`0` disables recycling) |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_connections = env_parse::<u32>("FORMDESK_DB_MAX_CONNECTIONS")
            .unwrap_or(defaults.max_connections)
            .max(1);
        let min_connections = env_parse::<u32>("FORMDESK_DB_MIN_CONNECTIONS")
            .unwrap_or(defaults.min_connections)
            .min(max_connections);
        let max_lifetime = match env_parse::<u64>("FORMDESK_DB_MAX_LIFETIME_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.max_lifetime,
        };

        Self {
            max_connections,
            min_connections,
            acquire_timeout: env_parse("FORMDESK_DB_CONNECT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
            idle_timeout: env_parse("FORMDESK_DB_IDLE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            max_lifetime,
        }
    }

    /// Set the pool bounds; `min` is clamped to `max`.
    pub fn with_connections(mut self, min: u32, max: u32) -> Self {
        self.max_connections = max.max(1);
        self.min_connections = min.min(self.max_connections);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Open the pool. Connection failures surface as [`Error::Database`].
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    debug!(
        subsystem = "database",
        component = "pool",
        op = "create",
        target = %redact_url(database_url),
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        "Opening record store pool"
    );

    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout);
    if let Some(lifetime) = config.max_lifetime {
        options = options.max_lifetime(lifetime);
    }

    let pool = options.connect(database_url).await.map_err(Error::Database)?;

    info!(
        subsystem = "database",
        component = "pool",
        op = "create",
        target = %redact_url(database_url),
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Record store pool ready"
    );
    Ok(pool)
}

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHealth {
    pub size: u32,
    pub idle: usize,
}

impl PoolHealth {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle(),
        }
    }

    /// Every open connection is checked out.
    pub fn is_saturated(&self) -> bool {
        self.size > 0 && self.idle == 0
    }

    /// Log at DEBUG, or WARN when saturated.
    pub fn log(&self) {
        if self.is_saturated() {
            warn!(
                subsystem = "database",
                component = "pool",
                pool_size = self.size,
                "Record store pool saturated; requests will queue"
            );
        } else {
            debug!(
                subsystem = "database",
                component = "pool",
                pool_size = self.size,
                pool_idle = self.idle,
                "Record store pool health"
            );
        }
    }
}

/// Strip credentials from a connection URL for logging.
pub fn redact_url(database_url: &str) -> String {
    let Some((scheme, rest)) = database_url.split_once("://") else {
        return "<unparseable url>".to_string();
    };
    match rest.rsplit_once('@') {
        Some((_, host)) => format!("{}://***@{}", scheme, host),
        None => format!("{}://{}", scheme, rest),
    }
}

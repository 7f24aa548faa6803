//! Client configuration management

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ClientError, Result};
use crate::transaction::{IsolationLevel, TransactionOptions};

/// Default database location when neither DATABASE_PATH nor DATABASE_URL is set
pub const DEFAULT_DATABASE_URL: &str = "sqlite:authdb.db";

/// Client configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// SQLite URL (`sqlite:path.db`, `sqlite::memory:`) or plain file path
    pub database_url: String,

    /// Maximum pool size
    pub max_connections: u32,

    /// How long connecting (and each pool acquire) may take
    pub connect_timeout: Duration,

    /// Default options for interactive transactions
    pub transaction: TransactionOptions,

    /// Statements slower than this are logged at `warn`
    pub slow_query_threshold: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 10,
            connect_timeout: Duration::from_secs(30),
            transaction: TransactionOptions::default(),
            slow_query_threshold: Duration::from_millis(500),
        }
    }
}

impl ClientConfig {
    /// Configuration for the given database URL with default settings
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }

    /// A private in-memory database.
    ///
    /// Every pooled connection to `:memory:` opens its own database, so the
    /// pool is capped at one connection.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Default::default()
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        // Prefer DATABASE_PATH, fall back to DATABASE_URL
        let database_url = lookup("DATABASE_PATH")
            .or_else(|| lookup("DATABASE_URL"))
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(defaults.database_url);

        let max_connections = parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")?
            .unwrap_or(defaults.max_connections);
        if max_connections == 0 {
            return Err(ClientError::Initialization(
                "DATABASE_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }

        let connect_timeout = parse_var::<u64, _>(&lookup, "AUTHDB_CONNECT_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.connect_timeout);

        let mut transaction = defaults.transaction;
        if let Some(ms) = parse_var::<u64, _>(&lookup, "AUTHDB_TX_MAX_WAIT_MS")? {
            transaction.max_wait = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "AUTHDB_TX_TIMEOUT_MS")? {
            transaction.timeout = Duration::from_millis(ms);
        }
        if let Some(level) = parse_var::<IsolationLevel, _>(&lookup, "AUTHDB_TX_ISOLATION")? {
            transaction.isolation_level = level;
        }

        let slow_query_threshold = parse_var::<u64, _>(&lookup, "AUTHDB_SLOW_QUERY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.slow_query_threshold);

        Ok(Self {
            database_url,
            max_connections,
            connect_timeout,
            transaction,
            slow_query_threshold,
        })
    }

    /// Whether the URL points at an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ClientError::Initialization(format!("invalid {}: {}", key, e))),
    }
}

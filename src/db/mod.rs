//! SQLite connection pool and schema management

pub mod schema_sync;

use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::ConnectOptions;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

pub use schema_sync::{SchemaSyncResult, schema_ddl, sync_all, sync_model};

/// How long a statement waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Build connect options for the configured URL
fn connect_options(config: &ClientConfig) -> Result<SqliteConnectOptions> {
    let options = SqliteConnectOptions::from_str(&config.database_url).map_err(|e| {
        ClientError::Initialization(format!(
            "invalid database url {}: {}",
            config.database_url, e
        ))
    })?;

    let options = options
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT)
        .disable_statement_logging();

    if config.is_in_memory() {
        return Ok(options);
    }

    Ok(options
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal))
}

fn pool_options(config: &ClientConfig) -> SqlitePoolOptions {
    let options = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout)
        .after_release(|conn, _meta| {
            Box::pin(async move {
                // Undo a read-uncommitted transaction
                if let Err(e) = sqlx::query("PRAGMA read_uncommitted = 0")
                    .execute(&mut *conn)
                    .await
                {
                    warn!(error = %e, "Failed to reset read_uncommitted");
                }
                Ok(true)
            })
        });

    // An in-memory database lives only as long as a connection to it
    if config.is_in_memory() {
        options
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        options
    }
}

/// Create a new connection pool
pub async fn create_pool(config: &ClientConfig) -> Result<SqlitePool> {
    let options = connect_options(config)?;
    let pool = pool_options(config)
        .connect_with(options)
        .await
        .map_err(|e| ClientError::Initialization(format!("failed to connect: {}", e)))?;

    debug!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Connection pool created"
    );
    Ok(pool)
}

/// Create a connection pool, retrying every `retry_interval` until the
/// configured connect timeout has elapsed.
pub async fn connect_with_retry(
    config: &ClientConfig,
    retry_interval: Duration,
) -> Result<SqlitePool> {
    let options = connect_options(config)?;
    let deadline = Instant::now() + config.connect_timeout;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match pool_options(config).connect_with(options.clone()).await {
            Ok(pool) => {
                debug!(attempt, "Connection pool created");
                return Ok(pool);
            }
            Err(e) if Instant::now() + retry_interval < deadline => {
                warn!(
                    attempt,
                    error = %e,
                    retry_in_ms = retry_interval.as_millis() as u64,
                    "Database connection failed, retrying"
                );
                tokio::time::sleep(retry_interval).await;
            }
            Err(e) => {
                return Err(ClientError::Initialization(format!(
                    "failed to connect after {} attempts: {}",
                    attempt, e
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_pool_enables_foreign_keys() {
        let pool = create_pool(&ClientConfig::in_memory()).await.unwrap();
        let (enabled,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn test_invalid_url_is_initialization_error() {
        let config = ClientConfig::new("sqlite:auth.db?mode=bogus");
        let err = create_pool(&config).await.unwrap_err();
        assert!(matches!(err, ClientError::Initialization(_)));
    }

    #[tokio::test]
    async fn test_connect_with_retry_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ClientConfig::new(format!(
            "sqlite:{}",
            dir.path().join("missing").join("auth.db").display()
        ));
        config.connect_timeout = Duration::from_millis(50);

        let err = connect_with_retry(&config, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Initialization(_)));
    }
}

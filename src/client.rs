//! Database client
//!
//! A [`Client`] owns the SQLite pool and hands out per-model delegates.
//!
//! ```rust,ignore
//! use authdb::{Client, ClientConfig};
//! use authdb::models::{SessionField, UserField};
//! use authdb::orm::{Data, Unique};
//!
//! let client = Client::connect(ClientConfig::from_env()?).await?;
//! client.push_schema().await;
//!
//! let user = client
//!     .transaction(None, |tx| {
//!         Box::pin(async move {
//!             let user = tx
//!                 .user()
//!                 .create(Data::new().set(UserField::Name, "Ada").set(UserField::Email, "ada@example.com"))
//!                 .await?;
//!             tx.session()
//!                 .create(
//!                     Data::new()
//!                         .set(SessionField::UserId, user.id.clone())
//!                         .set(SessionField::Token, "t0k3n")
//!                         .set(SessionField::ExpiresAt, expires_at),
//!                 )
//!                 .await?;
//!             Ok(user)
//!         })
//!     })
//!     .await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::db::{self, SchemaSyncResult};
use crate::error::{ClientError, Result};
use crate::models::*;
use crate::orm::{Delegate, FindMany, Model, QueryLog, RawRow, Target, Value, execute_raw, query_raw};
use crate::transaction::{Transaction, TransactionOptions};

struct ClientInner {
    pool: SqlitePool,
    config: ClientConfig,
}

/// Handle to the database. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Connect using `config`
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let pool = db::create_pool(&config).await?;
        info!(database_url = %config.database_url, "Client connected");
        Ok(Self::from_pool(pool, config))
    }

    /// Connect, retrying every `retry_interval` until `config.connect_timeout`
    pub async fn connect_with_retry(config: ClientConfig, retry_interval: Duration) -> Result<Self> {
        let pool = db::connect_with_retry(&config, retry_interval).await?;
        info!(database_url = %config.database_url, "Client connected");
        Ok(Self::from_pool(pool, config))
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: SqlitePool, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner { pool, config }),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Close the pool; later operations fail
    pub async fn disconnect(&self) {
        self.inner.pool.close().await;
        info!("Client disconnected");
    }

    pub fn is_connected(&self) -> bool {
        !self.inner.pool.is_closed()
    }

    /// Create missing tables, columns and indexes
    pub async fn push_schema(&self) -> SchemaSyncResult {
        let result = db::sync_all(&self.inner.pool).await;
        if !result.tables_created.is_empty() {
            info!(tables = ?result.tables_created, "Created tables");
        }
        if !result.columns_added.is_empty() {
            info!(columns = ?result.columns_added, "Added columns");
        }
        for err in &result.errors {
            warn!(error = %err, "Schema sync error");
        }
        result
    }

    /// Row count of every table, in model order
    pub async fn row_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        let mut counts = Vec::new();

        macro_rules! count_all {
            ($($method:ident => $model:ident),* $(,)?) => {
                $(
                    let count = self.$method().count(FindMany::new()).await?;
                    counts.push((<$model as Model>::NAME, count));
                )*
            };
        }

        with_models!(count_all);

        Ok(counts)
    }

    /// Delegate for any model, running on the pool
    pub fn delegate<M: Model>(&self) -> Delegate<'_, M> {
        Delegate::new(
            Target::Pool(&self.inner.pool),
            self.inner.config.slow_query_threshold,
        )
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Open a transaction to finish by hand.
    ///
    /// `timeout` is not enforced here; only [`transaction`](Self::transaction)
    /// can abort a running body.
    pub async fn begin(&self, options: Option<TransactionOptions>) -> Result<Transaction> {
        let options = options.unwrap_or(self.inner.config.transaction);
        Transaction::begin(
            &self.inner.pool,
            options,
            self.inner.config.slow_query_threshold,
        )
        .await
    }

    /// Run `f` in a transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`, and
    /// rolls back with `TransactionExpired` when it runs past the timeout.
    pub async fn transaction<T, F>(&self, options: Option<TransactionOptions>, f: F) -> Result<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut Transaction) -> BoxFuture<'t, Result<T>>,
    {
        let options = options.unwrap_or(self.inner.config.transaction);
        let timeout_ms = options.timeout.as_millis() as u64;
        let mut tx = self.begin(Some(options)).await?;

        let outcome = tokio::time::timeout(options.timeout, f(&mut tx)).await;

        match outcome {
            Ok(Ok(value)) => {
                tx.commit().await?;
                Ok(value)
            }
            Ok(Err(err)) => {
                debug!(tx_id = %tx.id(), error = %err, "Transaction body failed, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
            Err(_) => {
                warn!(tx_id = %tx.id(), timeout_ms, "Transaction expired, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(ClientError::TransactionExpired { timeout_ms })
            }
        }
    }

    // ========================================================================
    // Raw SQL
    // ========================================================================

    /// Run a raw query with positional `?` parameters
    pub async fn query_raw(&self, sql: &str, params: Vec<Value>) -> Result<Vec<RawRow>> {
        let log = QueryLog::new("raw", self.inner.config.slow_query_threshold);
        let mut conn = self.inner.pool.acquire().await?;
        query_raw(&mut conn, log, sql, params).await
    }

    /// Run a raw statement; returns the number of affected rows
    pub async fn execute_raw(&self, sql: &str, params: Vec<Value>) -> Result<u64> {
        let log = QueryLog::new("raw", self.inner.config.slow_query_threshold);
        let mut conn = self.inner.pool.acquire().await?;
        execute_raw(&mut conn, log, sql, params).await
    }
}

macro_rules! client_delegates {
    ($($method:ident => $model:ident),* $(,)?) => {
        impl Client {
            $(
                #[doc = concat!("Delegate for [`", stringify!($model), "`]")]
                pub fn $method(&self) -> Delegate<'_, $model> {
                    self.delegate()
                }
            )*
        }
    };
}

with_models!(client_delegates);

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("database_url", &self.inner.config.database_url)
            .field("connected", &self.is_connected())
            .finish()
    }
}

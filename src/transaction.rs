//! Interactive transactions
//!
//! SQLite has a single writer and snapshot readers, so isolation levels map
//! onto `BEGIN` modes:
//!
//! | Level            | Statement                                    |
//! |------------------|----------------------------------------------|
//! | `Serializable`   | `BEGIN IMMEDIATE` (write lock up front)      |
//! | `RepeatableRead` | `BEGIN DEFERRED`                             |
//! | `ReadCommitted`  | `BEGIN DEFERRED`                             |
//! | `ReadUncommitted`| `BEGIN DEFERRED; PRAGMA read_uncommitted = 1`|
//!
//! `read_uncommitted` only has an effect on shared-cache connections.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::sqlite::Sqlite;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::models::*;
use crate::orm::{Delegate, Model, QueryLog, RawRow, Target, Value, execute_raw, query_raw};

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    #[default]
    Serializable,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "ReadUncommitted",
            IsolationLevel::ReadCommitted => "ReadCommitted",
            IsolationLevel::RepeatableRead => "RepeatableRead",
            IsolationLevel::Serializable => "Serializable",
        }
    }

    fn begin_sql(&self) -> &'static str {
        match self {
            IsolationLevel::Serializable => "BEGIN IMMEDIATE",
            _ => "BEGIN DEFERRED",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationLevel {
    type Err = ClientError;

    /// Accepts `Serializable`, `serializable`, `READ COMMITTED`, `read_committed`, ...
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "readuncommitted" => Ok(IsolationLevel::ReadUncommitted),
            "readcommitted" => Ok(IsolationLevel::ReadCommitted),
            "repeatableread" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            _ => Err(ClientError::Initialization(format!(
                "unknown isolation level: {}",
                s
            ))),
        }
    }
}

/// Options of an interactive transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// How long to wait for a connection before giving up
    pub max_wait: Duration,
    /// How long the transaction may run before it is rolled back
    pub timeout: Duration,
    pub isolation_level: IsolationLevel,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_millis(2000),
            timeout: Duration::from_millis(5000),
            isolation_level: IsolationLevel::Serializable,
        }
    }
}

impl TransactionOptions {
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }
}

/// An open transaction.
///
/// Finish it with [`commit`](Self::commit) or [`rollback`](Self::rollback).
/// Dropping an open transaction rolls it back before the connection is
/// reused.
pub struct Transaction {
    id: String,
    inner: Option<sqlx::Transaction<'static, Sqlite>>,
    isolation_level: IsolationLevel,
    slow_query: Duration,
    started: Instant,
}

impl Transaction {
    /// Open the transaction, waiting at most `max_wait` for a connection
    /// and the `BEGIN`
    pub(crate) async fn begin(
        pool: &SqlitePool,
        options: TransactionOptions,
        slow_query: Duration,
    ) -> Result<Self> {
        let max_wait_ms = options.max_wait.as_millis() as u64;
        let begin = pool.begin_with(options.isolation_level.begin_sql());
        let mut inner = match tokio::time::timeout(options.max_wait, begin).await {
            Ok(Ok(inner)) => inner,
            Ok(Err(sqlx::Error::PoolTimedOut)) | Err(_) => {
                warn!(max_wait_ms, "Timed out waiting for a transaction connection");
                return Err(ClientError::TransactionStartTimeout { max_wait_ms });
            }
            Ok(Err(e)) => return Err(ClientError::from_sqlx(e, "Transaction")),
        };

        // Reset when the connection returns to the pool
        if options.isolation_level == IsolationLevel::ReadUncommitted {
            sqlx::query("PRAGMA read_uncommitted = 1")
                .execute(&mut *inner)
                .await?;
        }

        let id = uuid::Uuid::new_v4().to_string();
        debug!(
            tx_id = %id,
            isolation_level = %options.isolation_level,
            "Transaction started"
        );

        Ok(Self {
            id,
            inner: Some(inner),
            isolation_level: options.isolation_level,
            slow_query,
            started: Instant::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    /// Whether the transaction is still open
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    pub async fn commit(mut self) -> Result<()> {
        let inner = self.take()?;
        // A failed commit drops `inner`, which rolls it back
        inner
            .commit()
            .await
            .map_err(|e| ClientError::from_sqlx(e, "Transaction"))?;
        debug!(tx_id = %self.id, elapsed_ms = self.elapsed_ms(), "Transaction committed");
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        let inner = self.take()?;
        inner
            .rollback()
            .await
            .map_err(|e| ClientError::from_sqlx(e, "Transaction"))?;
        debug!(tx_id = %self.id, elapsed_ms = self.elapsed_ms(), "Transaction rolled back");
        Ok(())
    }

    fn take(&mut self) -> Result<sqlx::Transaction<'static, Sqlite>> {
        self.inner.take().ok_or(ClientError::TransactionClosed)
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Delegate for any model, running on this transaction
    pub fn delegate<M: Model>(&mut self) -> Delegate<'_, M> {
        Delegate::new(Target::Conn(self.inner.as_deref_mut()), self.slow_query)
    }

    fn connection(&mut self) -> Result<&mut SqliteConnection> {
        self.inner
            .as_deref_mut()
            .ok_or(ClientError::TransactionClosed)
    }

    /// Run a raw query inside the transaction
    pub async fn query_raw(&mut self, sql: &str, params: Vec<Value>) -> Result<Vec<RawRow>> {
        let log = QueryLog::new("raw", self.slow_query);
        query_raw(self.connection()?, log, sql, params).await
    }

    /// Run a raw statement inside the transaction
    pub async fn execute_raw(&mut self, sql: &str, params: Vec<Value>) -> Result<u64> {
        let log = QueryLog::new("raw", self.slow_query);
        execute_raw(self.connection()?, log, sql, params).await
    }
}

macro_rules! transaction_delegates {
    ($($method:ident => $model:ident),* $(,)?) => {
        impl Transaction {
            $(
                #[doc = concat!("Delegate for [`", stringify!($model), "`] on this transaction")]
                pub fn $method(&mut self) -> Delegate<'_, $model> {
                    self.delegate()
                }
            )*
        }
    };
}

with_models!(transaction_delegates);

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("isolation_level", &self.isolation_level)
            .field("open", &self.inner.is_some())
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        // sqlx rolls back `inner` when it drops
        if self.inner.is_some() {
            warn!(tx_id = %self.id, "Transaction dropped while open, rolling back");
        }
    }
}

//! authdb - typed SQLite client for the auth, organization, OAuth and billing schema
//!
//! Every table has a model in [`models`] and a delegate on [`Client`] with
//! the usual operations: `find_unique`, `find_many`, `create`, `update`,
//! `upsert`, `delete`, `count`, `aggregate`, `group_by` and their variants.
//! Writes can be grouped with [`Client::transaction`].

extern crate self as authdb;

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod orm;
pub mod transaction;

pub use client::Client;
pub use config::ClientConfig;
pub use db::SchemaSyncResult;
pub use error::{ClientError, ErrorKind, Result};
pub use transaction::{IsolationLevel, Transaction, TransactionOptions};

/// Re-exports used by `#[derive(Model)]` expansions
#[doc(hidden)]
pub mod __private {
    pub use sqlx;
    pub use sqlx::sqlite::SqliteRow;
}

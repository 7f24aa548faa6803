//! Per-model delegates
//!
//! A `Delegate` runs every data-access operation for one model, either on
//! the client's pool or on a transaction's connection.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use authdb::models::{User, UserField};
//! use authdb::orm::{Data, FindMany, Filter, OrderBy, Unique};
//!
//! let user = client
//!     .user()
//!     .create(Data::new().set(UserField::Name, "Ada").set(UserField::Email, "ada@example.com"))
//!     .await?;
//!
//! let page = client
//!     .user()
//!     .find_many(
//!         FindMany::new()
//!             .filter(Filter::contains(UserField::Email, "@example.com"))
//!             .order_by(OrderBy::desc(UserField::CreatedAt))
//!             .take(20),
//!     )
//!     .await?;
//!
//! let found = client.user().find_unique(Unique::new(UserField::Id, user.id)).await?;
//! ```

use std::collections::HashSet;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use super::aggregate::{AggregateResult, GroupRow, decode_aggregate, decode_group};
use super::args::{Aggregate, Data, FindMany, GroupBy, Update};
use super::builder::{self, OnConflict, SqlFragment, Window};
use super::filter::{Filter, Unique};
use super::record::{RawRow, Record};
use super::relation::{self, Relation};
use super::traits::{Model, ModelField};
use super::value::Value;
use crate::error::{ClientError, Result};

/// Where a delegate runs its statements
pub(crate) enum Target<'c> {
    Pool(&'c SqlitePool),
    /// A transaction's connection; `None` once the transaction has finished
    Conn(Option<&'c mut SqliteConnection>),
}

/// A connection checked out for the duration of one operation
pub(crate) enum ConnGuard<'a> {
    Pooled(PoolConnection<Sqlite>),
    Borrowed(&'a mut SqliteConnection),
}

impl Deref for ConnGuard<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        match self {
            ConnGuard::Pooled(conn) => conn,
            ConnGuard::Borrowed(conn) => conn,
        }
    }
}

impl DerefMut for ConnGuard<'_> {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        match self {
            ConnGuard::Pooled(conn) => conn,
            ConnGuard::Borrowed(conn) => conn,
        }
    }
}

impl Target<'_> {
    pub(crate) async fn acquire(&mut self) -> Result<ConnGuard<'_>> {
        match self {
            Target::Pool(pool) => pool
                .acquire()
                .await
                .map(ConnGuard::Pooled)
                .map_err(ClientError::from),
            Target::Conn(Some(conn)) => Ok(ConnGuard::Borrowed(&mut **conn)),
            Target::Conn(None) => Err(ClientError::TransactionClosed),
        }
    }
}

/// Runs statements and logs them with timing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueryLog {
    pub model: &'static str,
    /// Statements at least this slow log at `warn`
    pub slow: Duration,
}

impl QueryLog {
    pub fn new(model: &'static str, slow: Duration) -> Self {
        Self { model, slow }
    }

    pub fn for_model(self, model: &'static str) -> Self {
        Self { model, ..self }
    }

    fn trace(&self, operation: &str, sql: &str, started: Instant) {
        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        if elapsed >= self.slow {
            warn!(
                model = self.model,
                operation,
                sql,
                elapsed_ms,
                "Slow query"
            );
        } else {
            debug!(model = self.model, operation, sql, elapsed_ms, "Query executed");
        }
    }

    fn map_err(&self, err: sqlx::Error) -> ClientError {
        ClientError::from_sqlx(err, self.model)
    }

    pub async fn fetch_all(
        &self,
        conn: &mut SqliteConnection,
        operation: &str,
        frag: &SqlFragment,
    ) -> Result<Vec<SqliteRow>> {
        let started = Instant::now();
        let result = frag.query().fetch_all(conn).await;
        self.trace(operation, &frag.sql, started);
        result.map_err(|e| self.map_err(e))
    }

    pub async fn fetch_optional(
        &self,
        conn: &mut SqliteConnection,
        operation: &str,
        frag: &SqlFragment,
    ) -> Result<Option<SqliteRow>> {
        let started = Instant::now();
        let result = frag.query().fetch_optional(conn).await;
        self.trace(operation, &frag.sql, started);
        result.map_err(|e| self.map_err(e))
    }

    pub async fn fetch_one(
        &self,
        conn: &mut SqliteConnection,
        operation: &str,
        frag: &SqlFragment,
    ) -> Result<SqliteRow> {
        let started = Instant::now();
        let result = frag.query().fetch_one(conn).await;
        self.trace(operation, &frag.sql, started);
        result.map_err(|e| self.map_err(e))
    }

    /// Run a statement and return the number of affected rows
    pub async fn execute(
        &self,
        conn: &mut SqliteConnection,
        operation: &str,
        frag: &SqlFragment,
    ) -> Result<u64> {
        let started = Instant::now();
        let result = frag.query().execute(conn).await;
        self.trace(operation, &frag.sql, started);
        result.map(|r| r.rows_affected()).map_err(|e| self.map_err(e))
    }

    pub fn decode<M: Model>(&self, row: &SqliteRow) -> Result<M> {
        M::from_row(row).map_err(|e| self.map_err(e))
    }

    fn decode_all<M: Model>(&self, rows: &[SqliteRow]) -> Result<Vec<M>> {
        rows.iter().map(|row| self.decode::<M>(row)).collect()
    }
}

/// Data access for one model.
///
/// Obtained from `Client` (runs on the pool) or `Transaction` (runs on the
/// transaction's connection).
pub struct Delegate<'c, M: Model> {
    target: Target<'c>,
    log: QueryLog,
    _model: PhantomData<fn() -> M>,
}

impl<'c, M: Model> Delegate<'c, M> {
    pub(crate) fn new(target: Target<'c>, slow_query: Duration) -> Self {
        Self {
            target,
            log: QueryLog::new(M::NAME, slow_query),
            _model: PhantomData,
        }
    }

    fn not_found(operation: &'static str) -> ClientError {
        ClientError::RecordNotFound {
            model: M::NAME,
            operation,
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Find a record by its primary key or a unique field
    pub async fn find_unique(&mut self, unique: Unique<M::Field>) -> Result<Option<M>> {
        let log = self.log;
        let mut conn = self.target.acquire().await?;
        find_unique_on::<M>(&mut conn, log, &unique, "findUnique").await
    }

    /// Like `find_unique`, but a missing record is `RecordNotFound`
    pub async fn find_unique_or_throw(&mut self, unique: Unique<M::Field>) -> Result<M> {
        self.find_unique(unique)
            .await?
            .ok_or_else(|| Self::not_found("findUniqueOrThrow"))
    }

    /// First record matching `args`
    pub async fn find_first(&mut self, args: FindMany<M::Field>) -> Result<Option<M>> {
        let log = self.log;
        let mut conn = self.target.acquire().await?;
        let args = first_of(args);
        Ok(find_many_on::<M>(&mut conn, log, &args, "findFirst")
            .await?
            .into_iter()
            .next())
    }

    pub async fn find_first_or_throw(&mut self, args: FindMany<M::Field>) -> Result<M> {
        self.find_first(args)
            .await?
            .ok_or_else(|| Self::not_found("findFirstOrThrow"))
    }

    /// All records matching `args`
    pub async fn find_many(&mut self, args: FindMany<M::Field>) -> Result<Vec<M>> {
        let log = self.log;
        let mut conn = self.target.acquire().await?;
        find_many_on::<M>(&mut conn, log, &args, "findMany").await
    }

    /// Records matching `args`, projected onto `fields`
    pub async fn find_many_select(
        &mut self,
        args: FindMany<M::Field>,
        fields: &[M::Field],
    ) -> Result<Vec<Record<M::Field>>> {
        if fields.is_empty() {
            return Err(ClientError::Validation(
                "`select` must contain at least one field".to_string(),
            ));
        }
        let records = self.find_many(args).await?;
        Ok(records
            .iter()
            .map(|record| Record::from_model(record, fields))
            .collect())
    }

    /// `find_unique` with a relation loaded
    pub async fn find_unique_with<R>(
        &mut self,
        unique: Unique<M::Field>,
        relation: R,
    ) -> Result<Option<(M, R::Output)>>
    where
        R: Relation<From = M>,
    {
        let log = self.log;
        let mut conn = self.target.acquire().await?;
        let Some(record) = find_unique_on::<M>(&mut conn, log, &unique, "findUnique").await? else {
            return Ok(None);
        };
        let mut loaded = relation::load(&mut conn, log, &relation, std::slice::from_ref(&record)).await?;
        Ok(loaded.pop().map(|related| (record, related)))
    }

    /// `find_first` with a relation loaded
    pub async fn find_first_with<R>(
        &mut self,
        args: FindMany<M::Field>,
        relation: R,
    ) -> Result<Option<(M, R::Output)>>
    where
        R: Relation<From = M>,
    {
        Ok(self
            .find_many_with(first_of(args), relation)
            .await?
            .into_iter()
            .next())
    }

    /// `find_many` with a relation loaded for every record
    pub async fn find_many_with<R>(
        &mut self,
        args: FindMany<M::Field>,
        relation: R,
    ) -> Result<Vec<(M, R::Output)>>
    where
        R: Relation<From = M>,
    {
        let log = self.log;
        let mut conn = self.target.acquire().await?;
        let records = find_many_on::<M>(&mut conn, log, &args, "findMany").await?;
        let loaded = relation::load(&mut conn, log, &relation, &records).await?;
        Ok(records.into_iter().zip(loaded).collect())
    }

    /// Number of records matching `args` (filter, cursor, skip and take apply)
    pub async fn count(&mut self, args: FindMany<M::Field>) -> Result<i64> {
        let log = self.log;
        let mut conn = self.target.acquire().await?;

        if !args.distinct.is_empty() {
            let records = find_many_on::<M>(&mut conn, log, &args, "count").await?;
            return Ok(records.len() as i64);
        }

        let Some(cursor) = resolve_cursor::<M>(&mut conn, log, &args, "count").await? else {
            return Ok(0);
        };
        let frag = Window::new(&args, cursor.as_ref()).count()?;
        let row = log.fetch_one(&mut conn, "count", &frag).await?;
        row.try_get::<i64, _>(0).map_err(|e| log.map_err(e))
    }

    /// Aggregates over the records selected by `args.window`
    pub async fn aggregate(&mut self, args: Aggregate<M::Field>) -> Result<AggregateResult<M::Field>> {
        if args.aggregations.is_empty() {
            return Ok(AggregateResult::default());
        }
        let log = self.log;
        let mut conn = self.target.acquire().await?;

        let cursor = match resolve_cursor::<M>(&mut conn, log, &args.window, "aggregate").await? {
            Some(cursor) => cursor,
            // empty window: aggregate over no rows
            None => {
                let empty = FindMany::new().filter(Filter::or([]));
                let (frag, slots) = Window::<M>::new(&empty, None).aggregate(&args.aggregations)?;
                let row = log.fetch_one(&mut conn, "aggregate", &frag).await?;
                return decode_aggregate(&row, &slots).map_err(|e| log.map_err(e));
            }
        };

        let (frag, slots) = Window::new(&args.window, cursor.as_ref()).aggregate(&args.aggregations)?;
        let row = log.fetch_one(&mut conn, "aggregate", &frag).await?;
        decode_aggregate(&row, &slots).map_err(|e| log.map_err(e))
    }

    /// Group records and aggregate each group
    pub async fn group_by(&mut self, args: GroupBy<M::Field>) -> Result<Vec<GroupRow<M::Field>>> {
        let (frag, slots) = builder::group_by::<M>(&args)?;
        let log = self.log;
        let mut conn = self.target.acquire().await?;
        let rows = log.fetch_all(&mut conn, "groupBy", &frag).await?;
        rows.iter()
            .map(|row| decode_group(row, &slots).map_err(|e| log.map_err(e)))
            .collect()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert one record, applying defaults
    pub async fn create(&mut self, data: Data<M::Field>) -> Result<M> {
        let frag = builder::insert::<M>(&data, OnConflict::Fail, true)?;
        let log = self.log;
        let mut conn = self.target.acquire().await?;
        let row = log.fetch_one(&mut conn, "create", &frag).await?;
        log.decode(&row)
    }

    /// Insert many records atomically.
    ///
    /// With `skip_duplicates`, rows that hit a unique constraint are skipped.
    /// Returns the number of rows inserted.
    pub async fn create_many(&mut self, data: Vec<Data<M::Field>>, skip_duplicates: bool) -> Result<u64> {
        let statements = data
            .iter()
            .map(|d| {
                let conflict = if skip_duplicates {
                    OnConflict::Ignore
                } else {
                    OnConflict::Fail
                };
                builder::insert::<M>(d, conflict, false)
            })
            .collect::<Result<Vec<_>>>()?;

        let log = self.log;
        let mut conn = self.target.acquire().await?;
        begin_savepoint(&mut conn, log, "createMany").await?;
        let result = execute_all(&mut conn, log, "createMany", &statements).await;
        finish_savepoint(&mut conn, log, "createMany", result).await
    }

    /// Update one record selected by a unique field
    pub async fn update(&mut self, unique: Unique<M::Field>, update: Update<M::Field>) -> Result<M> {
        let filter = builder::unique_filter(&unique)?;
        let frag = builder::update::<M>(Some(&filter), &update, true)?;
        let log = self.log;
        let mut conn = self.target.acquire().await?;
        match log.fetch_optional(&mut conn, "update", &frag).await? {
            Some(row) => log.decode(&row),
            None => Err(Self::not_found("update")),
        }
    }

    /// Update every record matching `filter`; returns the number updated
    pub async fn update_many(&mut self, filter: Filter<M::Field>, update: Update<M::Field>) -> Result<u64> {
        let frag = builder::update::<M>(Some(&filter), &update, false)?;
        let log = self.log;
        let mut conn = self.target.acquire().await?;
        log.execute(&mut conn, "updateMany", &frag).await
    }

    /// Update the record selected by `unique`, or create it.
    ///
    /// When `create` sets the unique field to the selected value this is a
    /// single `INSERT ... ON CONFLICT DO UPDATE`. Otherwise the record is
    /// looked up first and then updated or created on the same connection.
    pub async fn upsert(
        &mut self,
        unique: Unique<M::Field>,
        create: Data<M::Field>,
        update: Update<M::Field>,
    ) -> Result<M> {
        let key = unique.validate()?;
        let kind = unique.field.column().kind;
        let native = create.get(unique.field).map(|v| v.clone().coerce(kind)) == Some(key);

        let log = self.log;
        if native {
            let frag = builder::insert::<M>(&create, OnConflict::Update(unique.field, &update), true)?;
            let mut conn = self.target.acquire().await?;
            let row = log.fetch_one(&mut conn, "upsert", &frag).await?;
            return log.decode(&row);
        }

        let mut conn = self.target.acquire().await?;
        begin_savepoint(&mut conn, log, "upsert").await?;
        let result = find_then_write::<M>(&mut conn, log, &unique, &create, &update).await;
        finish_savepoint(&mut conn, log, "upsert", result).await
    }

    /// Delete one record selected by a unique field and return it
    pub async fn delete(&mut self, unique: Unique<M::Field>) -> Result<M> {
        let filter = builder::unique_filter(&unique)?;
        let frag = builder::delete::<M>(Some(&filter), true)?;
        let log = self.log;
        let mut conn = self.target.acquire().await?;
        match log.fetch_optional(&mut conn, "delete", &frag).await? {
            Some(row) => log.decode(&row),
            None => Err(Self::not_found("delete")),
        }
    }

    /// Delete every record matching `filter`; returns the number deleted
    pub async fn delete_many(&mut self, filter: Filter<M::Field>) -> Result<u64> {
        let frag = builder::delete::<M>(Some(&filter), false)?;
        let log = self.log;
        let mut conn = self.target.acquire().await?;
        log.execute(&mut conn, "deleteMany", &frag).await
    }
}

/// Arguments narrowed to a single row, keeping the direction of `take`
fn first_of<F: ModelField>(mut args: FindMany<F>) -> FindMany<F> {
    args.take = Some(match args.take {
        Some(take) if take < 0 => -1,
        _ => 1,
    });
    args
}

async fn find_unique_on<M: Model>(
    conn: &mut SqliteConnection,
    log: QueryLog,
    unique: &Unique<M::Field>,
    operation: &str,
) -> Result<Option<M>> {
    let frag = builder::find_unique::<M>(unique)?;
    match log.fetch_optional(conn, operation, &frag).await? {
        Some(row) => Ok(Some(log.decode(&row)?)),
        None => Ok(None),
    }
}

/// Look up the cursor row.
///
/// `Ok(None)` means a cursor was given but matches nothing, so the page is
/// empty. `Ok(Some(None))` means no cursor.
async fn resolve_cursor<M: Model>(
    conn: &mut SqliteConnection,
    log: QueryLog,
    args: &FindMany<M::Field>,
    operation: &str,
) -> Result<Option<Option<M>>> {
    match &args.cursor {
        None => Ok(Some(None)),
        Some(cursor) => Ok(find_unique_on::<M>(conn, log, cursor, operation)
            .await?
            .map(Some)),
    }
}

async fn find_many_on<M: Model>(
    conn: &mut SqliteConnection,
    log: QueryLog,
    args: &FindMany<M::Field>,
    operation: &str,
) -> Result<Vec<M>> {
    let Some(cursor) = resolve_cursor::<M>(conn, log, args, operation).await? else {
        return Ok(Vec::new());
    };
    let window = Window::new(args, cursor.as_ref());
    let reverse = args.take.is_some_and(|t| t < 0);

    let mut records = if args.distinct.is_empty() {
        let frag = window.select()?;
        let rows = log.fetch_all(conn, operation, &frag).await?;
        log.decode_all::<M>(&rows)?
    } else {
        let skip = match args.skip {
            Some(skip) if skip < 0 => {
                return Err(ClientError::Validation(format!(
                    "`skip` must be non-negative, got {}",
                    skip
                )));
            }
            Some(skip) => skip as usize,
            None => 0,
        };
        let take = args.take.map(|t| t.unsigned_abs() as usize).unwrap_or(usize::MAX);

        let frag = window.unpaginated().select()?;
        let rows = log.fetch_all(conn, operation, &frag).await?;
        let mut seen = HashSet::new();
        log.decode_all::<M>(&rows)?
            .into_iter()
            .filter(|record| {
                let key: Vec<Option<String>> = args
                    .distinct
                    .iter()
                    .map(|f| record.get(*f).group_key())
                    .collect();
                seen.insert(key)
            })
            .skip(skip)
            .take(take)
            .collect()
    };

    if reverse {
        records.reverse();
    }
    Ok(records)
}

async fn execute_all(
    conn: &mut SqliteConnection,
    log: QueryLog,
    operation: &str,
    statements: &[SqlFragment],
) -> Result<u64> {
    let mut affected = 0;
    for frag in statements {
        affected += log.execute(conn, operation, frag).await?;
    }
    Ok(affected)
}

/// Upsert without a usable conflict target: look up, then update or insert
async fn find_then_write<M: Model>(
    conn: &mut SqliteConnection,
    log: QueryLog,
    unique: &Unique<M::Field>,
    create: &Data<M::Field>,
    update: &Update<M::Field>,
) -> Result<M> {
    let frag = match find_unique_on::<M>(conn, log, unique, "upsert").await? {
        Some(existing) => {
            let by_pk = Filter::eq(M::PRIMARY_KEY, existing.primary_key_value());
            builder::update::<M>(Some(&by_pk), update, true)?
        }
        None => builder::insert::<M>(create, OnConflict::Fail, true)?,
    };
    let row = log.fetch_one(conn, "upsert", &frag).await?;
    log.decode(&row)
}

/// Open a savepoint; works both inside a transaction and on a pooled
/// connection (where it starts one)
async fn begin_savepoint(conn: &mut SqliteConnection, log: QueryLog, operation: &str) -> Result<()> {
    log.execute(conn, operation, &SqlFragment::new("SAVEPOINT authdb_write"))
        .await
        .map(|_| ())
}

/// Release the savepoint on success, roll back to it on error
async fn finish_savepoint<T>(
    conn: &mut SqliteConnection,
    log: QueryLog,
    operation: &str,
    result: Result<T>,
) -> Result<T> {
    match result {
        Ok(value) => {
            log.execute(conn, operation, &SqlFragment::new("RELEASE SAVEPOINT authdb_write"))
                .await?;
            Ok(value)
        }
        Err(err) => {
            let rollback = SqlFragment::new("ROLLBACK TO SAVEPOINT authdb_write");
            if let Err(rollback_err) = log.execute(conn, operation, &rollback).await {
                warn!(error = %rollback_err, "Failed to roll back savepoint");
            }
            let release = SqlFragment::new("RELEASE SAVEPOINT authdb_write");
            if let Err(release_err) = log.execute(conn, operation, &release).await {
                warn!(error = %release_err, "Failed to release savepoint");
            }
            Err(err)
        }
    }
}

/// Run a raw query and decode rows by storage class
pub(crate) async fn query_raw(
    conn: &mut SqliteConnection,
    log: QueryLog,
    sql: &str,
    params: Vec<Value>,
) -> Result<Vec<RawRow>> {
    let frag = SqlFragment {
        sql: sql.to_string(),
        values: params,
    };
    let rows = log.fetch_all(conn, "queryRaw", &frag).await?;
    rows.iter()
        .map(|row| RawRow::decode(row).map_err(|e| log.map_err(e)))
        .collect()
}

/// Run a raw statement; returns the number of affected rows
pub(crate) async fn execute_raw(
    conn: &mut SqliteConnection,
    log: QueryLog,
    sql: &str,
    params: Vec<Value>,
) -> Result<u64> {
    let frag = SqlFragment {
        sql: sql.to_string(),
        values: params,
    };
    log.execute(conn, "executeRaw", &frag).await
}

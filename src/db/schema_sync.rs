//! Automatic schema synchronization from model definitions
//!
//! - Creates missing tables
//! - Adds missing columns
//! - Creates indexes for indexed and foreign key columns
//! - Does NOT handle column renames, type changes or drops

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::models::*;
use crate::orm::{ColumnDef, ColumnKind, Model};

/// Result of a schema sync operation
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSyncResult {
    pub tables_created: Vec<String>,
    pub columns_added: Vec<(String, String)>, // (table, column)
    pub indexes_created: Vec<String>,
    pub errors: Vec<String>,
}

impl SchemaSyncResult {
    /// Whether the database already matched the models
    pub fn is_unchanged(&self) -> bool {
        self.tables_created.is_empty()
            && self.columns_added.is_empty()
            && self.indexes_created.is_empty()
    }

    fn merge(&mut self, other: SchemaSyncResult) {
        self.tables_created.extend(other.tables_created);
        self.columns_added.extend(other.columns_added);
        self.indexes_created.extend(other.indexes_created);
        self.errors.extend(other.errors);
    }
}

async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool, sqlx::Error> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table_name)
            .fetch_optional(pool)
            .await?;

    Ok(result.is_some())
}

async fn index_exists(pool: &SqlitePool, index_name: &str) -> Result<bool, sqlx::Error> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'index' AND name = ?")
            .bind(index_name)
            .fetch_optional(pool)
            .await?;

    Ok(result.is_some())
}

async fn get_table_columns(
    pool: &SqlitePool,
    table_name: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(i64, String, String, i64, Option<String>, i64)> =
        sqlx::query_as(&format!("PRAGMA table_info(\"{}\")", table_name))
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|(_, name, _, _, _, _)| name).collect())
}

/// Sync a single model's table to the database
pub async fn sync_model<M: Model>(pool: &SqlitePool) -> Result<SchemaSyncResult, sqlx::Error> {
    let mut result = SchemaSyncResult::default();
    let table_name = M::TABLE;

    if !table_exists(pool, table_name).await? {
        let create_sql = M::create_table_sql();
        debug!(table = table_name, sql = %create_sql, "Creating table");

        match sqlx::query(&create_sql).execute(pool).await {
            Ok(_) => {
                info!(table = table_name, "Created table");
                result.tables_created.push(table_name.to_string());
            }
            Err(e) => {
                let msg = format!("Failed to create table {}: {}", table_name, e);
                warn!("{}", msg);
                result.errors.push(msg);
                return Ok(result);
            }
        }
    } else {
        let existing_columns = get_table_columns(pool, table_name).await?;

        for col_def in M::COLUMNS {
            if existing_columns.iter().any(|c| c == col_def.name) {
                continue;
            }
            let alter_sql = generate_add_column_sql(table_name, col_def);
            debug!(table = table_name, sql = %alter_sql, "Adding column");

            match sqlx::query(&alter_sql).execute(pool).await {
                Ok(_) => {
                    info!(table = table_name, column = col_def.name, "Added column");
                    result
                        .columns_added
                        .push((table_name.to_string(), col_def.name.to_string()));
                }
                Err(e) => {
                    let msg = format!(
                        "Failed to add column {}.{}: {}",
                        table_name, col_def.name, e
                    );
                    warn!("{}", msg);
                    result.errors.push(msg);
                }
            }
        }
    }

    for index_sql in M::create_index_sql() {
        let Some(index_name) = index_name(&index_sql) else {
            continue;
        };
        if index_exists(pool, index_name).await? {
            continue;
        }
        match sqlx::query(&index_sql).execute(pool).await {
            Ok(_) => {
                debug!(table = table_name, index = index_name, "Created index");
                result.indexes_created.push(index_name.to_string());
            }
            Err(e) => {
                let msg = format!("Failed to create index {}: {}", index_name, e);
                warn!("{}", msg);
                result.errors.push(msg);
            }
        }
    }

    Ok(result)
}

/// Name of the index created by a `CREATE INDEX IF NOT EXISTS "name" ...` statement
fn index_name(sql: &str) -> Option<&str> {
    let start = sql.find('"')? + 1;
    let len = sql[start..].find('"')?;
    Some(&sql[start..start + len])
}

/// Generate ALTER TABLE ADD COLUMN SQL
fn generate_add_column_sql(table_name: &str, col: &ColumnDef) -> String {
    let mut sql = format!(
        "ALTER TABLE \"{}\" ADD COLUMN \"{}\" {}",
        table_name,
        col.name,
        col.kind.sql_type()
    );

    // SQLite cannot add PRIMARY KEY or UNIQUE columns, and NOT NULL needs a default
    if let Some(default) = col.default.as_ref().and_then(|d| d.sql_literal()) {
        if !col.nullable {
            sql.push_str(" NOT NULL");
        }
        sql.push_str(&format!(" DEFAULT {}", default));
    } else if !col.nullable {
        let default_val = match col.kind {
            ColumnKind::Integer | ColumnKind::Boolean => "0",
            ColumnKind::Real => "0.0",
            ColumnKind::DateTime => "'1970-01-01T00:00:00.000Z'",
            ColumnKind::Text => "''",
        };
        sql.push_str(&format!(" NOT NULL DEFAULT {}", default_val));
    }

    // With foreign keys on, an added REFERENCES column must default to NULL
    if let Some(fk) = &col.references
        && col.nullable
    {
        sql.push_str(&format!(
            " REFERENCES \"{}\"(\"{}\") ON DELETE {}",
            fk.table,
            fk.column,
            fk.on_delete.to_sql()
        ));
    }

    sql
}

/// Sync every model's table, parents before children.
pub async fn sync_all(pool: &SqlitePool) -> SchemaSyncResult {
    let mut total_result = SchemaSyncResult::default();

    macro_rules! sync_one {
        ($($method:ident => $model:ident),* $(,)?) => {
            $(
                match sync_model::<$model>(pool).await {
                    Ok(result) => total_result.merge(result),
                    Err(e) => {
                        total_result.errors.push(format!(
                            "Error syncing {}: {}",
                            stringify!($model),
                            e
                        ));
                    }
                }
            )*
        };
    }

    with_models!(sync_one);

    total_result
}

/// Full DDL of the schema: every CREATE TABLE followed by its indexes
pub fn schema_ddl() -> String {
    let mut statements: Vec<String> = Vec::new();

    macro_rules! ddl_one {
        ($($method:ident => $model:ident),* $(,)?) => {
            $(
                statements.push(<$model as Model>::create_table_sql());
                statements.extend(<$model as Model>::create_index_sql());
            )*
        };
    }

    with_models!(ddl_one);

    statements
        .into_iter()
        .map(|s| format!("{};\n", s))
        .collect::<Vec<_>>()
        .join("\n")
}

//! Core traits for the ORM layer
//!
//! These traits are implemented by the `#[derive(Model)]` macro from
//! `authdb-macros`. Everything the delegates and schema sync need to know
//! about a table is read from here.

use std::fmt::Debug;
use std::hash::Hash;

use sqlx::sqlite::SqliteRow;

use super::value::Value;

/// Storage kind of a column.
///
/// Each kind maps to one SQLite type affinity and one family of Rust types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// TEXT, `String`
    Text,
    /// INTEGER, `i64` and smaller integers
    Integer,
    /// REAL, `f64`
    Real,
    /// INTEGER 0/1, `bool`
    Boolean,
    /// TEXT holding RFC 3339 UTC, `DateTime<Utc>`
    DateTime,
}

impl ColumnKind {
    /// SQLite column type used in CREATE TABLE
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Text | ColumnKind::DateTime => "TEXT",
            ColumnKind::Integer | ColumnKind::Boolean => "INTEGER",
            ColumnKind::Real => "REAL",
        }
    }

    /// Whether arithmetic, `_avg` and `_sum` apply
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Real)
    }

    /// Whether `contains` / `starts_with` / `ends_with` apply
    pub fn is_textual(&self) -> bool {
        matches!(self, ColumnKind::Text)
    }
}

/// Insert-time default for a column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    /// Random UUID v4, generated client-side
    Uuid,
    /// Current UTC time, generated client-side
    Now,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(&'static str),
}

impl DefaultValue {
    /// Produce the value to insert
    pub fn generate(&self) -> Value {
        match self {
            DefaultValue::Uuid => Value::Text(uuid::Uuid::new_v4().to_string()),
            DefaultValue::Now => Value::DateTime(chrono::Utc::now()),
            DefaultValue::Bool(b) => Value::Bool(*b),
            DefaultValue::Int(i) => Value::Int(*i),
            DefaultValue::Real(f) => Value::Float(*f),
            DefaultValue::Text(s) => Value::Text((*s).to_string()),
        }
    }

    /// SQL literal for `DEFAULT` clauses, if the default is static
    pub fn sql_literal(&self) -> Option<String> {
        match self {
            DefaultValue::Uuid | DefaultValue::Now => None,
            DefaultValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            DefaultValue::Int(i) => Some(i.to_string()),
            DefaultValue::Real(f) => Some(f.to_string()),
            DefaultValue::Text(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        }
    }
}

/// Referential action for a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    SetNull,
    Restrict,
    NoAction,
}

impl OnDelete {
    pub fn to_sql(&self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
            OnDelete::Restrict => "RESTRICT",
            OnDelete::NoAction => "NO ACTION",
        }
    }
}

/// Foreign key target of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: &'static str,
    pub column: &'static str,
    pub on_delete: OnDelete,
}

/// Column definition for schema generation and query validation.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    /// Column name in the database
    pub name: &'static str,
    /// API name of the field (camelCase), used in errors and serialized records
    pub field: &'static str,
    pub kind: ColumnKind,
    /// Whether the column can be NULL
    pub nullable: bool,
    /// Whether this is the primary key
    pub primary_key: bool,
    pub unique: bool,
    /// Whether schema sync creates an index for this column
    pub indexed: bool,
    pub default: Option<DefaultValue>,
    /// Set to now on every update
    pub updated_at: bool,
    pub references: Option<ForeignKey>,
}

impl ColumnDef {
    /// Generate the column definition SQL
    pub fn to_sql(&self) -> String {
        let mut sql = format!("\"{}\" {}", self.name, self.kind.sql_type());

        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }

        if !self.nullable && !self.primary_key {
            sql.push_str(" NOT NULL");
        }

        if self.unique && !self.primary_key {
            sql.push_str(" UNIQUE");
        }

        if let Some(default) = self.default.as_ref().and_then(|d| d.sql_literal()) {
            sql.push_str(&format!(" DEFAULT {}", default));
        }

        if let Some(fk) = &self.references {
            sql.push_str(&format!(
                " REFERENCES \"{}\"(\"{}\") ON DELETE {}",
                fk.table,
                fk.column,
                fk.on_delete.to_sql()
            ));
        }

        sql
    }

    /// Whether a create must supply this column
    pub fn is_required(&self) -> bool {
        !self.nullable && self.default.is_none()
    }

    /// Whether the column identifies at most one row
    pub fn is_unique(&self) -> bool {
        self.primary_key || self.unique
    }
}

/// Field enum generated for each model.
///
/// Variants are in column order, so `column()` is an index lookup.
pub trait ModelField:
    Copy + Debug + Eq + Ord + Hash + Send + Sync + Unpin + 'static
{
    /// Every field of the model, in column order
    fn all() -> &'static [Self];

    /// Column metadata for this field
    fn column(self) -> &'static ColumnDef;

    /// Database column name
    fn name(self) -> &'static str {
        self.column().name
    }
}

/// Metadata and row mapping for a table-backed model.
///
/// Implemented by `#[derive(Model)]`.
pub trait Model: Sized + Clone + Debug + Send + Sync + Unpin + 'static {
    /// The generated field enum
    type Field: ModelField;

    /// Model name (e.g., "User")
    const NAME: &'static str;

    /// The SQL table name (e.g., "user")
    const TABLE: &'static str;

    /// All column definitions, in field order
    const COLUMNS: &'static [ColumnDef];

    /// The primary key field
    const PRIMARY_KEY: Self::Field;

    /// Decode a SQLite row into this model
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error>;

    /// Read one field as a dynamic value
    fn get(&self, field: Self::Field) -> Value;

    /// Comma-separated, quoted and table-qualified column list
    fn select_columns() -> String {
        Self::COLUMNS
            .iter()
            .map(|c| format!("\"{}\".\"{}\"", Self::TABLE, c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Generate CREATE TABLE IF NOT EXISTS SQL
    fn create_table_sql() -> String {
        let column_defs: Vec<String> = Self::COLUMNS.iter().map(|c| c.to_sql()).collect();

        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n  {}\n)",
            Self::TABLE,
            column_defs.join(",\n  ")
        )
    }

    /// Generate CREATE INDEX statements for indexed and foreign key columns
    fn create_index_sql() -> Vec<String> {
        Self::COLUMNS
            .iter()
            .filter(|c| !c.is_unique() && (c.indexed || c.references.is_some()))
            .map(|c| {
                format!(
                    "CREATE INDEX IF NOT EXISTS \"idx_{table}_{column}\" ON \"{table}\" (\"{column}\")",
                    table = Self::TABLE,
                    column = c.name
                )
            })
            .collect()
    }

    /// Primary key value of this record
    fn primary_key_value(&self) -> Value {
        self.get(Self::PRIMARY_KEY)
    }
}

/// Quote a column of a table for use in SQL
pub(crate) fn qualified(table: &str, column: &str) -> String {
    format!("\"{}\".\"{}\"", table, column)
}

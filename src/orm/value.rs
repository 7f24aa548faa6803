//! Dynamic values bound to and decoded from SQLite
//!
//! SQLite doesn't natively support booleans or timestamps. This module owns the
//! conversions between Rust values and their stored form:
//! - booleans are INTEGER 0/1
//! - timestamps are RFC 3339 UTC TEXT with millisecond precision, so that
//!   text ordering equals time ordering

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Row, TypeInfo, ValueRef};

use super::traits::ColumnKind;

/// Represents a SQL value that can be bound to a query.
///
/// Used by filters, create/update inputs and dynamic results (select,
/// aggregates, raw queries).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Short name of the variant for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "string",
            Value::DateTime(_) => "datetime",
        }
    }

    /// Whether this value can be stored in a column of the given kind
    pub fn fits(&self, kind: ColumnKind, nullable: bool) -> bool {
        match self {
            Value::Null => nullable,
            Value::Bool(_) => kind == ColumnKind::Boolean,
            Value::Int(_) => kind.is_numeric(),
            Value::Float(_) => kind == ColumnKind::Real,
            Value::Text(_) => kind == ColumnKind::Text,
            Value::DateTime(_) => kind == ColumnKind::DateTime,
        }
    }

    /// Convert into the representation stored for `kind` (integers into REAL columns)
    pub fn coerce(self, kind: ColumnKind) -> Value {
        match (self, kind) {
            (Value::Int(i), ColumnKind::Real) => Value::Float(i as f64),
            (value, _) => value,
        }
    }

    /// Key used to match related rows; `None` for NULL
    pub(crate) fn group_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::DateTime(dt) => Some(datetime_to_str(*dt)),
        }
    }

    /// Bind this value to a sqlx query
    pub fn bind_to_query<'q>(
        &self,
        query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
        match self {
            Value::Text(s) => query.bind(s.clone()),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Bool(b) => query.bind(bool_to_int(*b)),
            Value::DateTime(dt) => query.bind(datetime_to_str(*dt)),
            Value::Null => query.bind(None::<String>),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Text(value.clone())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

// ============================================================================
// Storage helpers
// ============================================================================

/// Convert bool to SQLite integer (0 or 1)
#[inline]
pub fn bool_to_int(b: bool) -> i32 {
    if b { 1 } else { 0 }
}

/// Convert a chrono DateTime to its stored form
#[inline]
pub fn datetime_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp
pub fn str_to_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            // SQLite's datetime() format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
                .ok()
        })
}

/// Decode a result column by its SQLite storage class
pub(crate) fn decode_raw(row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
    let class = {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        raw.type_info().name().to_ascii_uppercase()
    };

    let value = if class.contains("INT") || class == "BOOLEAN" {
        Value::Int(row.try_get_unchecked::<i64, _>(index)?)
    } else if class == "REAL" || class == "FLOAT" || class == "DOUBLE" {
        Value::Float(row.try_get_unchecked::<f64, _>(index)?)
    } else if class == "NUMERIC" {
        match row.try_get_unchecked::<i64, _>(index) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Float(row.try_get_unchecked::<f64, _>(index)?),
        }
    } else if class == "BLOB" {
        let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
        Value::Text(String::from_utf8_lossy(&bytes).into_owned())
    } else {
        Value::Text(row.try_get_unchecked::<String, _>(index)?)
    };

    Ok(value)
}

/// Decode a result column that holds values of a known column kind
pub(crate) fn decode_column(
    row: &SqliteRow,
    index: usize,
    kind: ColumnKind,
) -> Result<Value, sqlx::Error> {
    let value = match (kind, decode_raw(row, index)?) {
        (_, Value::Null) => Value::Null,
        (ColumnKind::Boolean, Value::Int(i)) => Value::Bool(i != 0),
        (ColumnKind::Real, Value::Int(i)) => Value::Float(i as f64),
        (ColumnKind::DateTime, Value::Text(s)) => match str_to_datetime(&s) {
            Some(dt) => Value::DateTime(dt),
            None => Value::Text(s),
        },
        (_, other) => other,
    };
    Ok(value)
}

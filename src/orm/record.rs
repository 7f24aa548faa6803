//! Dynamically shaped rows: field projections and raw query results

use serde::ser::{Serialize, SerializeMap, Serializer};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row};

use super::traits::{Model, ModelField};
use super::value::{Value, decode_raw};

/// A row projected onto a subset of a model's fields (`select`).
#[derive(Debug, Clone, PartialEq)]
pub struct Record<F> {
    values: Vec<(F, Value)>,
}

impl<F: ModelField> Record<F> {
    /// Project a model onto `fields`
    pub fn from_model<M: Model<Field = F>>(record: &M, fields: &[F]) -> Self {
        let mut values: Vec<(F, Value)> = Vec::with_capacity(fields.len());
        for field in fields {
            if !values.iter().any(|(f, _)| f == field) {
                values.push((*field, record.get(*field)));
            }
        }
        Self { values }
    }

    pub fn get(&self, field: F) -> Option<&Value> {
        self.values
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = F> + '_ {
        self.values.iter().map(|(f, _)| *f)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<F: ModelField> Serialize for Record<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (field, value) in &self.values {
            map.serialize_entry(field.column().field, value)?;
        }
        map.end()
    }
}

/// A row returned by `query_raw`, decoded from SQLite storage classes.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl RawRow {
    pub(crate) fn decode(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
        let values = (0..columns.len())
            .map(|i| decode_raw(row, i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { columns, values })
    }

    /// Value of the named column
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl Serialize for RawRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

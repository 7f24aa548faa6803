//! Aggregate and group-by result payloads

use std::collections::BTreeMap;

use sqlx::sqlite::SqliteRow;

use super::args::Aggregated;
use super::builder::aggregate_kind;
use super::traits::ModelField;
use super::value::{Value, decode_column};

/// Result of `aggregate`, and the aggregate part of each group.
///
/// Maps only contain the fields that were requested. `avg`, `sum`, `min`
/// and `max` are `Value::Null` over an empty window.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult<F> {
    /// `_count._all`
    pub count_all: Option<i64>,
    /// `_count.<field>`: non-null values
    pub count: BTreeMap<F, i64>,
    pub avg: BTreeMap<F, Value>,
    pub sum: BTreeMap<F, Value>,
    pub min: BTreeMap<F, Value>,
    pub max: BTreeMap<F, Value>,
}

impl<F> Default for AggregateResult<F> {
    fn default() -> Self {
        Self {
            count_all: None,
            count: BTreeMap::new(),
            avg: BTreeMap::new(),
            sum: BTreeMap::new(),
            min: BTreeMap::new(),
            max: BTreeMap::new(),
        }
    }
}

impl<F: ModelField> AggregateResult<F> {
    pub fn avg_f64(&self, field: F) -> Option<f64> {
        self.avg.get(&field).and_then(Value::as_f64)
    }

    pub fn sum_of(&self, field: F) -> Option<&Value> {
        self.sum.get(&field)
    }

    fn record(&mut self, slot: &Aggregated<F>, value: Value) {
        match *slot {
            Aggregated::CountAll => self.count_all = Some(value.as_i64().unwrap_or(0)),
            Aggregated::Count(f) => {
                self.count.insert(f, value.as_i64().unwrap_or(0));
            }
            Aggregated::Avg(f) => {
                let value = value.as_f64().map(Value::Float).unwrap_or(Value::Null);
                self.avg.insert(f, value);
            }
            Aggregated::Sum(f) => {
                self.sum.insert(f, value);
            }
            Aggregated::Min(f) => {
                self.min.insert(f, value);
            }
            Aggregated::Max(f) => {
                self.max.insert(f, value);
            }
            // grouped fields are kept by GroupRow
            Aggregated::Field(_) => {}
        }
    }
}

/// One group of a `group_by`
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow<F> {
    /// Values of the `by` fields
    pub by: BTreeMap<F, Value>,
    pub aggregates: AggregateResult<F>,
}

impl<F: ModelField> GroupRow<F> {
    pub fn get(&self, field: F) -> Option<&Value> {
        self.by.get(&field)
    }

    pub fn count_all(&self) -> Option<i64> {
        self.aggregates.count_all
    }
}

/// Decode a result row whose columns follow `slots`
pub(crate) fn decode_group<F: ModelField>(
    row: &SqliteRow,
    slots: &[Aggregated<F>],
) -> Result<GroupRow<F>, sqlx::Error> {
    let mut group = GroupRow {
        by: BTreeMap::new(),
        aggregates: AggregateResult::default(),
    };
    for (i, slot) in slots.iter().enumerate() {
        let value = decode_column(row, i, aggregate_kind(slot))?;
        match slot {
            Aggregated::Field(f) => {
                group.by.insert(*f, value);
            }
            other => group.aggregates.record(other, value),
        }
    }
    Ok(group)
}

/// Decode the single row of an `aggregate`
pub(crate) fn decode_aggregate<F: ModelField>(
    row: &SqliteRow,
    slots: &[Aggregated<F>],
) -> Result<AggregateResult<F>, sqlx::Error> {
    Ok(decode_group(row, slots)?.aggregates)
}

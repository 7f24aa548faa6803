//! Query arguments
//!
//! Builders for the inputs of the delegate operations. All of them are typed
//! by the model's field enum.

use super::filter::{Condition, Filter, Unique};
use super::traits::ModelField;
use super::value::Value;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

/// Placement of NULLs in an ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// One ordering key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy<F> {
    pub field: F,
    pub order: SortOrder,
    /// `None` keeps SQLite's default: NULLs sort lowest
    pub nulls: Option<NullsOrder>,
}

impl<F: ModelField> OrderBy<F> {
    pub fn asc(field: F) -> Self {
        Self {
            field,
            order: SortOrder::Asc,
            nulls: None,
        }
    }

    pub fn desc(field: F) -> Self {
        Self {
            field,
            order: SortOrder::Desc,
            nulls: None,
        }
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullsOrder::First);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }

    /// The same key walked backwards
    pub fn reversed(self) -> Self {
        Self {
            field: self.field,
            order: self.order.reversed(),
            nulls: self.nulls.map(|n| match n {
                NullsOrder::First => NullsOrder::Last,
                NullsOrder::Last => NullsOrder::First,
            }),
        }
    }

    /// Whether NULLs come before every other value under this key
    pub(crate) fn nulls_come_first(&self) -> bool {
        match self.nulls {
            Some(NullsOrder::First) => true,
            Some(NullsOrder::Last) => false,
            None => self.order == SortOrder::Asc,
        }
    }
}

/// Arguments of `find_many`, `find_first` and `count`
#[derive(Debug, Clone)]
pub struct FindMany<F> {
    pub filter: Option<Filter<F>>,
    pub order_by: Vec<OrderBy<F>>,
    pub skip: Option<i64>,
    /// Negative values take from the end of the ordering
    pub take: Option<i64>,
    pub cursor: Option<Unique<F>>,
    pub distinct: Vec<F>,
}

impl<F> Default for FindMany<F> {
    fn default() -> Self {
        Self {
            filter: None,
            order_by: Vec::new(),
            skip: None,
            take: None,
            cursor: None,
            distinct: Vec::new(),
        }
    }
}

impl<F: ModelField> FindMany<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter; a second call ANDs with the first
    pub fn filter(mut self, filter: Filter<F>) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and_also(filter),
            None => filter,
        });
        self
    }

    pub fn order_by(mut self, order: OrderBy<F>) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    pub fn cursor(mut self, cursor: Unique<F>) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn distinct(mut self, fields: impl IntoIterator<Item = F>) -> Self {
        self.distinct.extend(fields);
        self
    }
}

/// Create input: field values in insertion order.
///
/// Setting a field twice keeps the last value.
#[derive(Debug, Clone, PartialEq)]
pub struct Data<F> {
    pub(crate) values: Vec<(F, Value)>,
}

impl<F> Default for Data<F> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<F: ModelField> Data<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: F, value: impl Into<Value>) -> Self {
        let value = value.into();
        match self.values.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = value,
            None => self.values.push((field, value)),
        }
        self
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
}

/// A single field update
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set(Value),
    Increment(Value),
    Decrement(Value),
    Multiply(Value),
    Divide(Value),
}

/// Update input
#[derive(Debug, Clone, PartialEq)]
pub struct Update<F> {
    pub(crate) ops: Vec<(F, UpdateOp)>,
}

impl<F> Default for Update<F> {
    fn default() -> Self {
        Self { ops: Vec::new() }
    }
}

impl<F: ModelField> Update<F> {
    pub fn new() -> Self {
        Self::default()
    }

    fn op(mut self, field: F, op: UpdateOp) -> Self {
        match self.ops.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = op,
            None => self.ops.push((field, op)),
        }
        self
    }

    pub fn set(self, field: F, value: impl Into<Value>) -> Self {
        self.op(field, UpdateOp::Set(value.into()))
    }

    pub fn set_null(self, field: F) -> Self {
        self.op(field, UpdateOp::Set(Value::Null))
    }

    pub fn increment(self, field: F, by: impl Into<Value>) -> Self {
        self.op(field, UpdateOp::Increment(by.into()))
    }

    pub fn decrement(self, field: F, by: impl Into<Value>) -> Self {
        self.op(field, UpdateOp::Decrement(by.into()))
    }

    pub fn multiply(self, field: F, by: impl Into<Value>) -> Self {
        self.op(field, UpdateOp::Multiply(by.into()))
    }

    pub fn divide(self, field: F, by: impl Into<Value>) -> Self {
        self.op(field, UpdateOp::Divide(by.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether `field` is written by this update
    pub fn touches(&self, field: F) -> bool {
        self.ops.iter().any(|(f, _)| *f == field)
    }
}

/// Which aggregates to compute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregations<F> {
    /// `_count._all`
    pub count_all: bool,
    pub count: Vec<F>,
    pub avg: Vec<F>,
    pub sum: Vec<F>,
    pub min: Vec<F>,
    pub max: Vec<F>,
}

impl<F> Default for Aggregations<F> {
    fn default() -> Self {
        Self {
            count_all: false,
            count: Vec::new(),
            avg: Vec::new(),
            sum: Vec::new(),
            min: Vec::new(),
            max: Vec::new(),
        }
    }
}

impl<F> Aggregations<F> {
    pub fn is_empty(&self) -> bool {
        !self.count_all
            && self.count.is_empty()
            && self.avg.is_empty()
            && self.sum.is_empty()
            && self.min.is_empty()
            && self.max.is_empty()
    }
}

macro_rules! aggregation_builders {
    () => {
        pub fn count_all(mut self) -> Self {
            self.aggregations.count_all = true;
            self
        }

        pub fn count(mut self, field: F) -> Self {
            self.aggregations.count.push(field);
            self
        }

        pub fn avg(mut self, field: F) -> Self {
            self.aggregations.avg.push(field);
            self
        }

        pub fn sum(mut self, field: F) -> Self {
            self.aggregations.sum.push(field);
            self
        }

        pub fn min(mut self, field: F) -> Self {
            self.aggregations.min.push(field);
            self
        }

        pub fn max(mut self, field: F) -> Self {
            self.aggregations.max.push(field);
            self
        }
    };
}

/// Arguments of `aggregate`
#[derive(Debug, Clone)]
pub struct Aggregate<F> {
    /// Row window the aggregates run over
    pub window: FindMany<F>,
    pub aggregations: Aggregations<F>,
}

impl<F> Default for Aggregate<F> {
    fn default() -> Self {
        Self {
            window: FindMany::default(),
            aggregations: Aggregations::default(),
        }
    }
}

impl<F: ModelField> Aggregate<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(mut self, window: FindMany<F>) -> Self {
        self.window = window;
        self
    }

    pub fn filter(mut self, filter: Filter<F>) -> Self {
        self.window = self.window.filter(filter);
        self
    }

    aggregation_builders!();
}

/// Left-hand side of a `having` condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregated<F> {
    CountAll,
    Count(F),
    Avg(F),
    Sum(F),
    Min(F),
    Max(F),
    /// A grouped field itself; must be one of the `by` fields
    Field(F),
}

/// Condition tree over aggregates of a group
#[derive(Debug, Clone)]
pub enum Having<F> {
    Cond(Aggregated<F>, Condition),
    And(Vec<Having<F>>),
    Or(Vec<Having<F>>),
    Not(Box<Having<F>>),
}

impl<F: ModelField> Having<F> {
    pub fn new(target: Aggregated<F>, condition: Condition) -> Self {
        Having::Cond(target, condition)
    }

    pub fn count_all(condition: Condition) -> Self {
        Having::Cond(Aggregated::CountAll, condition)
    }

    pub fn avg(field: F, condition: Condition) -> Self {
        Having::Cond(Aggregated::Avg(field), condition)
    }

    pub fn sum(field: F, condition: Condition) -> Self {
        Having::Cond(Aggregated::Sum(field), condition)
    }

    pub fn and(items: impl IntoIterator<Item = Having<F>>) -> Self {
        Having::And(items.into_iter().collect())
    }

    pub fn or(items: impl IntoIterator<Item = Having<F>>) -> Self {
        Having::Or(items.into_iter().collect())
    }
}

/// Arguments of `group_by`
#[derive(Debug, Clone)]
pub struct GroupBy<F> {
    pub by: Vec<F>,
    pub filter: Option<Filter<F>>,
    pub having: Option<Having<F>>,
    pub order_by: Vec<OrderBy<F>>,
    pub skip: Option<i64>,
    pub take: Option<i64>,
    pub aggregations: Aggregations<F>,
}

impl<F: ModelField> GroupBy<F> {
    pub fn new(by: impl IntoIterator<Item = F>) -> Self {
        Self {
            by: by.into_iter().collect(),
            filter: None,
            having: None,
            order_by: Vec::new(),
            skip: None,
            take: None,
            aggregations: Aggregations::default(),
        }
    }

    pub fn filter(mut self, filter: Filter<F>) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and_also(filter),
            None => filter,
        });
        self
    }

    pub fn having(mut self, having: Having<F>) -> Self {
        self.having = Some(having);
        self
    }

    pub fn order_by(mut self, order: OrderBy<F>) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    aggregation_builders!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserField;

    #[test]
    fn test_data_set_replaces() {
        let data = Data::new()
            .set(UserField::Name, "a")
            .set(UserField::Email, "a@x.io")
            .set(UserField::Name, "b");
        assert_eq!(data.values.len(), 2);
        assert_eq!(data.get(UserField::Name), Some(&Value::from("b")));
    }

    #[test]
    fn test_reversed_order_flips_nulls() {
        let order = OrderBy::asc(UserField::Role).nulls_last().reversed();
        assert_eq!(order.order, SortOrder::Desc);
        assert_eq!(order.nulls, Some(NullsOrder::First));
        assert!(order.nulls_come_first());
        assert!(!OrderBy::desc(UserField::Role).nulls_come_first());
    }

    #[test]
    fn test_filter_calls_combine() {
        let args = FindMany::new()
            .filter(Filter::eq(UserField::Banned, false))
            .filter(Filter::is_null(UserField::Role));
        assert!(matches!(args.filter, Some(Filter::And(ref items)) if items.len() == 2));
    }

    #[test]
    fn test_update_touches() {
        let update = Update::new().set(UserField::Name, "x").set_null(UserField::Image);
        assert!(update.touches(UserField::Image));
        assert!(!update.touches(UserField::UpdatedAt));
    }
}

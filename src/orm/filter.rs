//! Filter input types for flexible querying
//!
//! These types enable ORM-style filtering with operators like:
//! - Equals, NotEquals
//! - Lt, Lte, Gt, Gte (comparisons)
//! - Contains, StartsWith, EndsWith (string matching)
//! - In, NotIn (list membership)
//! - IsNull, IsNotNull (null checks)
//! - And, Or, Not (composition)
//! - some / every / none / is / is_not (relation filters)
//!
//! Filters are typed by the model's field enum, so a `Filter<UserField>` can
//! only name columns of the `user` table. Values are checked against the column
//! kind when the filter is compiled.

use std::fmt;
use std::sync::Arc;

use super::builder::SqlFragment;
use super::relation::{Quantifier, Relation, RelationFilter};
use super::traits::{ColumnDef, ColumnKind, Model, ModelField, qualified};
use super::value::Value;
use crate::error::{ClientError, Result};

/// Comparison applied to a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Equals; `Equals(Value::Null)` matches NULL
    Equals(Value),
    /// Not equals; `NotEquals(Value::Null)` matches non-NULL
    NotEquals(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    /// Substring match (ASCII case-insensitive, SQLite LIKE)
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    IsNull,
    IsNotNull,
}

/// A compiled predicate over another table (relation filters).
pub trait Predicate: fmt::Debug + Send + Sync {
    fn write_sql(&self, out: &mut SqlFragment) -> Result<()>;
}

/// Where-input tree for a model with field enum `F`.
#[derive(Debug, Clone)]
pub enum Filter<F> {
    Field(F, Condition),
    And(Vec<Filter<F>>),
    Or(Vec<Filter<F>>),
    Not(Box<Filter<F>>),
    Relation(Arc<dyn Predicate>),
}

impl<F: ModelField> Filter<F> {
    pub fn eq(field: F, value: impl Into<Value>) -> Self {
        Filter::Field(field, Condition::Equals(value.into()))
    }

    pub fn ne(field: F, value: impl Into<Value>) -> Self {
        Filter::Field(field, Condition::NotEquals(value.into()))
    }

    pub fn in_list<V: Into<Value>>(field: F, values: impl IntoIterator<Item = V>) -> Self {
        Filter::Field(
            field,
            Condition::In(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn not_in<V: Into<Value>>(field: F, values: impl IntoIterator<Item = V>) -> Self {
        Filter::Field(
            field,
            Condition::NotIn(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn lt(field: F, value: impl Into<Value>) -> Self {
        Filter::Field(field, Condition::Lt(value.into()))
    }

    pub fn lte(field: F, value: impl Into<Value>) -> Self {
        Filter::Field(field, Condition::Lte(value.into()))
    }

    pub fn gt(field: F, value: impl Into<Value>) -> Self {
        Filter::Field(field, Condition::Gt(value.into()))
    }

    pub fn gte(field: F, value: impl Into<Value>) -> Self {
        Filter::Field(field, Condition::Gte(value.into()))
    }

    pub fn contains(field: F, needle: impl Into<String>) -> Self {
        Filter::Field(field, Condition::Contains(needle.into()))
    }

    pub fn starts_with(field: F, prefix: impl Into<String>) -> Self {
        Filter::Field(field, Condition::StartsWith(prefix.into()))
    }

    pub fn ends_with(field: F, suffix: impl Into<String>) -> Self {
        Filter::Field(field, Condition::EndsWith(suffix.into()))
    }

    pub fn is_null(field: F) -> Self {
        Filter::Field(field, Condition::IsNull)
    }

    pub fn is_not_null(field: F) -> Self {
        Filter::Field(field, Condition::IsNotNull)
    }

    /// All filters must match; an empty list matches every row
    pub fn and(filters: impl IntoIterator<Item = Filter<F>>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    /// Any filter must match; an empty list matches no row
    pub fn or(filters: impl IntoIterator<Item = Filter<F>>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter<F>) -> Self {
        Filter::Not(Box::new(filter))
    }

    /// At least one related row matches
    pub fn some<R>(relation: R, filter: Filter<<R::To as Model>::Field>) -> Self
    where
        R: Relation,
        R::From: Model<Field = F>,
    {
        Self::relation(relation, Quantifier::Some, filter)
    }

    /// Every related row matches (vacuously true without related rows)
    pub fn every<R>(relation: R, filter: Filter<<R::To as Model>::Field>) -> Self
    where
        R: Relation,
        R::From: Model<Field = F>,
    {
        Self::relation(relation, Quantifier::Every, filter)
    }

    /// No related row matches
    pub fn none<R>(relation: R, filter: Filter<<R::To as Model>::Field>) -> Self
    where
        R: Relation,
        R::From: Model<Field = F>,
    {
        Self::relation(relation, Quantifier::None, filter)
    }

    /// The related row of a to-one relation exists and matches
    pub fn is<R>(relation: R, filter: Filter<<R::To as Model>::Field>) -> Self
    where
        R: Relation,
        R::From: Model<Field = F>,
    {
        Self::relation(relation, Quantifier::Some, filter)
    }

    /// The related row of a to-one relation is missing or does not match
    pub fn is_not<R>(relation: R, filter: Filter<<R::To as Model>::Field>) -> Self
    where
        R: Relation,
        R::From: Model<Field = F>,
    {
        Self::relation(relation, Quantifier::None, filter)
    }

    fn relation<R>(relation: R, quantifier: Quantifier, filter: Filter<<R::To as Model>::Field>) -> Self
    where
        R: Relation,
        R::From: Model<Field = F>,
    {
        Filter::Relation(Arc::new(RelationFilter {
            relation,
            quantifier,
            filter,
        }))
    }

    /// Combine with another filter using AND
    pub fn and_also(self, other: Filter<F>) -> Self {
        match self {
            Filter::And(mut items) => {
                items.push(other);
                Filter::And(items)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Write this filter as a boolean SQL expression over `table`
    pub(crate) fn write_sql(&self, table: &str, out: &mut SqlFragment) -> Result<()> {
        match self {
            Filter::Field(field, condition) => {
                write_condition(table, field.column(), condition, out)
            }
            Filter::And(items) => write_group(table, items, " AND ", "1 = 1", out),
            Filter::Or(items) => write_group(table, items, " OR ", "1 = 0", out),
            Filter::Not(inner) => {
                out.push("NOT (");
                inner.write_sql(table, out)?;
                out.push(")");
                Ok(())
            }
            Filter::Relation(predicate) => predicate.write_sql(out),
        }
    }
}

fn write_group<F: ModelField>(
    table: &str,
    items: &[Filter<F>],
    separator: &str,
    empty: &str,
    out: &mut SqlFragment,
) -> Result<()> {
    if items.is_empty() {
        out.push(empty);
        return Ok(());
    }
    out.push("(");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(separator);
        }
        item.write_sql(table, out)?;
    }
    out.push(")");
    Ok(())
}

fn write_condition(
    table: &str,
    column: &ColumnDef,
    condition: &Condition,
    out: &mut SqlFragment,
) -> Result<()> {
    write_comparison(
        &qualified(table, column.name),
        column.kind,
        column.field,
        condition,
        out,
    )
}

/// Write `lhs <condition>`, checking operands against `kind`.
///
/// `label` names the field in validation errors. Also used for `having`,
/// where `lhs` is an aggregate expression.
pub(crate) fn write_comparison(
    lhs: &str,
    kind: ColumnKind,
    label: &str,
    condition: &Condition,
    out: &mut SqlFragment,
) -> Result<()> {
    match condition {
        Condition::Equals(Value::Null) | Condition::IsNull => {
            out.push(&format!("{} IS NULL", lhs));
        }
        Condition::NotEquals(Value::Null) | Condition::IsNotNull => {
            out.push(&format!("{} IS NOT NULL", lhs));
        }
        Condition::Equals(value) => {
            let value = checked_value(kind, label, value, "equals")?;
            out.push(&format!("{} = ", lhs));
            out.push_bind(value);
        }
        Condition::NotEquals(value) => {
            let value = checked_value(kind, label, value, "not")?;
            out.push(&format!("{} <> ", lhs));
            out.push_bind(value);
        }
        Condition::In(values) | Condition::NotIn(values) => {
            let negated = matches!(condition, Condition::NotIn(_));
            if values.is_empty() {
                out.push(if negated { "1 = 1" } else { "1 = 0" });
                return Ok(());
            }
            let operator = if negated { "notIn" } else { "in" };
            out.push(&format!("{} {} (", lhs, if negated { "NOT IN" } else { "IN" }));
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    out.push(", ");
                }
                let value = checked_value(kind, label, value, operator)?;
                out.push_bind(value);
            }
            out.push(")");
        }
        Condition::Lt(value) | Condition::Lte(value) | Condition::Gt(value) | Condition::Gte(value) => {
            let (op, operator) = match condition {
                Condition::Lt(_) => ("<", "lt"),
                Condition::Lte(_) => ("<=", "lte"),
                Condition::Gt(_) => (">", "gt"),
                _ => (">=", "gte"),
            };
            let value = checked_value(kind, label, value, operator)?;
            out.push(&format!("{} {} ", lhs, op));
            out.push_bind(value);
        }
        Condition::Contains(needle) | Condition::StartsWith(needle) | Condition::EndsWith(needle) => {
            if !kind.is_textual() {
                return Err(ClientError::Validation(format!(
                    "string filters are not supported on non-string field `{}`",
                    label
                )));
            }
            let escaped = escape_like(needle);
            let pattern = match condition {
                Condition::Contains(_) => format!("%{}%", escaped),
                Condition::StartsWith(_) => format!("{}%", escaped),
                _ => format!("%{}", escaped),
            };
            out.push(&format!("{} LIKE ", lhs));
            out.push_bind(Value::Text(pattern));
            out.push(" ESCAPE '\\'");
        }
    }

    Ok(())
}

/// Validate a non-null operand against a column kind
pub(crate) fn checked_value(
    kind: ColumnKind,
    label: &str,
    value: &Value,
    operator: &str,
) -> Result<Value> {
    if value.is_null() {
        return Err(ClientError::Validation(format!(
            "`{}` on field `{}` does not accept null",
            operator, label
        )));
    }
    if !value.fits(kind, false) {
        return Err(ClientError::Validation(format!(
            "invalid value for `{}` on field `{}`: expected {:?}, got {}",
            operator,
            label,
            kind,
            value.type_name()
        )));
    }
    Ok(value.clone().coerce(kind))
}

/// Escape LIKE wildcards so user input matches literally
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Selector for exactly one row: the primary key or a unique column.
#[derive(Debug, Clone, PartialEq)]
pub struct Unique<F> {
    pub field: F,
    pub value: Value,
}

impl<F: ModelField> Unique<F> {
    pub fn new(field: F, value: impl Into<Value>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }

    /// Check that the field is unique and the value fits it
    pub(crate) fn validate(&self) -> Result<Value> {
        let column = self.field.column();
        if !column.is_unique() {
            return Err(ClientError::Validation(format!(
                "field `{}` is not unique and cannot select a single record",
                column.field
            )));
        }
        checked_value(column.kind, column.field, &self.value, "where")
    }

    /// The equivalent equality filter
    pub fn to_filter(&self) -> Filter<F> {
        Filter::eq(self.field, self.value.clone())
    }
}

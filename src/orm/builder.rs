//! SQL statement builder
//!
//! Compiles delegate arguments into parameterized SQLite statements. Every
//! identifier comes from model metadata and is double-quoted; every value is
//! bound with a positional `?`.

use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

use super::args::{
    Aggregated, Aggregations, Data, FindMany, GroupBy, Having, NullsOrder, OrderBy, SortOrder,
    Update, UpdateOp,
};
use super::filter::{Filter, Unique, checked_value, write_comparison};
use super::traits::{ColumnDef, ColumnKind, DefaultValue, Model, ModelField, qualified};
use super::value::Value;
use crate::error::{ClientError, Result};

/// SQL text with its bound values, in placeholder order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub values: Vec<Value>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            values: Vec::new(),
        }
    }

    pub fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Append a `?` placeholder bound to `value`
    pub fn push_bind(&mut self, value: Value) {
        self.sql.push('?');
        self.values.push(value);
    }

    /// Build a sqlx query with all values bound
    pub fn query(&self) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        self.values
            .iter()
            .fold(sqlx::query(&self.sql), |query, value| value.bind_to_query(query))
    }
}

/// Conflict handling for INSERT
#[derive(Debug, Clone, Copy)]
pub(crate) enum OnConflict<'a, F> {
    Fail,
    /// `INSERT OR IGNORE`
    Ignore,
    /// `ON CONFLICT (field) DO UPDATE`
    Update(F, &'a Update<F>),
}

/// Unquoted-table column list for RETURNING clauses
fn returning_columns<M: Model>() -> String {
    M::COLUMNS
        .iter()
        .map(|c| format!("\"{}\"", c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Turn a unique selector into an equality filter after validating it
pub(crate) fn unique_filter<F: ModelField>(unique: &Unique<F>) -> Result<Filter<F>> {
    let value = unique.validate()?;
    Ok(Filter::eq(unique.field, value))
}

/// `SELECT ... WHERE unique = ? LIMIT 1`
pub(crate) fn find_unique<M: Model>(unique: &Unique<M::Field>) -> Result<SqlFragment> {
    let filter = unique_filter(unique)?;
    let mut out = SqlFragment::new(format!(
        "SELECT {} FROM \"{}\" WHERE ",
        M::select_columns(),
        M::TABLE
    ));
    filter.write_sql(M::TABLE, &mut out)?;
    out.push(" LIMIT 1");
    Ok(out)
}

/// Ordering actually applied: requested keys plus the primary key as
/// tiebreak, reversed when `take` is negative.
pub(crate) fn effective_order<M: Model>(
    order_by: &[OrderBy<M::Field>],
    take: Option<i64>,
) -> Vec<OrderBy<M::Field>> {
    let mut order = order_by.to_vec();
    if !order.iter().any(|o| o.field == M::PRIMARY_KEY) {
        order.push(OrderBy::asc(M::PRIMARY_KEY));
    }
    if take.is_some_and(|t| t < 0) {
        order = order.into_iter().map(OrderBy::reversed).collect();
    }
    order
}

/// Shared body of find/count/aggregate windows
#[derive(Debug)]
pub(crate) struct Window<'a, M: Model> {
    pub filter: Option<&'a Filter<M::Field>>,
    pub order: Vec<OrderBy<M::Field>>,
    /// Row the page starts at, resolved from the cursor selector
    pub cursor: Option<&'a M>,
    pub skip: Option<i64>,
    pub take: Option<i64>,
}

impl<'a, M: Model> Window<'a, M> {
    pub fn new(args: &'a FindMany<M::Field>, cursor: Option<&'a M>) -> Self {
        Self {
            filter: args.filter.as_ref(),
            order: effective_order::<M>(&args.order_by, args.take),
            cursor,
            skip: args.skip,
            take: args.take,
        }
    }

    /// Drop LIMIT/OFFSET (pagination is applied in memory)
    pub fn unpaginated(mut self) -> Self {
        self.skip = None;
        self.take = None;
        self
    }

    fn write_where(&self, out: &mut SqlFragment) -> Result<()> {
        let mut first = true;
        if let Some(filter) = self.filter {
            out.push(" WHERE ");
            filter.write_sql(M::TABLE, out)?;
            first = false;
        }
        if let Some(row) = self.cursor {
            out.push(if first { " WHERE " } else { " AND " });
            write_cursor::<M>(&self.order, row, out);
        }
        Ok(())
    }

    fn write_tail(&self, out: &mut SqlFragment) -> Result<()> {
        write_order_by(M::TABLE, &self.order, out);
        write_limit(self.take, self.skip, out)
    }

    /// `SELECT <columns> FROM t ...`
    pub fn select(&self) -> Result<SqlFragment> {
        let mut out = SqlFragment::new(format!(
            "SELECT {} FROM \"{}\"",
            M::select_columns(),
            M::TABLE
        ));
        self.write_where(&mut out)?;
        self.write_tail(&mut out)?;
        Ok(out)
    }

    /// `SELECT COUNT(*) FROM (window)`
    pub fn count(&self) -> Result<SqlFragment> {
        let mut out = SqlFragment::new(format!("SELECT COUNT(*) FROM (SELECT 1 FROM \"{}\"", M::TABLE));
        self.write_where(&mut out)?;
        self.write_tail(&mut out)?;
        out.push(") AS \"window\"");
        Ok(out)
    }

    /// Aggregates over the window. Returns the statement and the order of its
    /// result columns.
    pub fn aggregate(
        &self,
        aggregations: &Aggregations<M::Field>,
    ) -> Result<(SqlFragment, Vec<Aggregated<M::Field>>)> {
        let slots = aggregation_slots(aggregations)?;
        let exprs: Vec<String> = slots
            .iter()
            .map(|slot| aggregate_expr(slot, |c| format!("\"{}\"", c.name)))
            .collect();

        let inner_columns = M::COLUMNS
            .iter()
            .map(|c| format!("{} AS \"{}\"", qualified(M::TABLE, c.name), c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let mut out = SqlFragment::new(format!(
            "SELECT {} FROM (SELECT {} FROM \"{}\"",
            exprs.join(", "),
            inner_columns,
            M::TABLE
        ));
        self.write_where(&mut out)?;
        self.write_tail(&mut out)?;
        out.push(") AS \"window\"");
        Ok((out, slots))
    }
}

fn write_order_by<F: ModelField>(table: &str, order: &[OrderBy<F>], out: &mut SqlFragment) {
    if order.is_empty() {
        return;
    }
    let keys: Vec<String> = order
        .iter()
        .map(|o| {
            let nulls = match o.nulls {
                Some(NullsOrder::First) => " NULLS FIRST",
                Some(NullsOrder::Last) => " NULLS LAST",
                None => "",
            };
            format!("{} {}{}", qualified(table, o.field.name()), o.order.to_sql(), nulls)
        })
        .collect();
    out.push(" ORDER BY ");
    out.push(&keys.join(", "));
}

fn write_limit(take: Option<i64>, skip: Option<i64>, out: &mut SqlFragment) -> Result<()> {
    if let Some(skip) = skip
        && skip < 0
    {
        return Err(ClientError::Validation(format!(
            "`skip` must be non-negative, got {}",
            skip
        )));
    }

    match (take, skip) {
        (Some(take), skip) => {
            // |i64::MIN| doesn't fit in i64
            let limit = i64::try_from(take.unsigned_abs()).unwrap_or(i64::MAX);
            out.push(" LIMIT ");
            out.push_bind(Value::Int(limit));
            if let Some(skip) = skip {
                out.push(" OFFSET ");
                out.push_bind(Value::Int(skip));
            }
        }
        (None, Some(skip)) => {
            out.push(" LIMIT -1 OFFSET ");
            out.push_bind(Value::Int(skip));
        }
        (None, None) => {}
    }
    Ok(())
}

/// Rows at or after `row` under `order`, compared lexicographically.
///
/// `order` ends with the primary key, so the final equality admits exactly
/// the cursor row itself.
fn write_cursor<M: Model>(order: &[OrderBy<M::Field>], row: &M, out: &mut SqlFragment) {
    let Some((key, rest)) = order.split_first() else {
        out.push("1 = 1");
        return;
    };
    let column = qualified(M::TABLE, key.field.name());
    let value = row.get(key.field);

    out.push("(");
    write_after(&column, key, &value, out);
    out.push(" OR (");
    if value.is_null() {
        out.push(&format!("{} IS NULL", column));
    } else {
        out.push(&format!("{} = ", column));
        out.push_bind(value.clone());
    }
    if !rest.is_empty() {
        out.push(" AND ");
        write_cursor::<M>(rest, row, out);
    }
    out.push("))");
}

/// Rows strictly after `value` under one ordering key
fn write_after<F: ModelField>(column: &str, key: &OrderBy<F>, value: &Value, out: &mut SqlFragment) {
    let nulls_first = key.nulls_come_first();
    if value.is_null() {
        if nulls_first {
            out.push(&format!("{} IS NOT NULL", column));
        } else {
            out.push("1 = 0");
        }
        return;
    }

    let op = match key.order {
        SortOrder::Asc => ">",
        SortOrder::Desc => "<",
    };
    out.push(&format!("({} {} ", column, op));
    out.push_bind(value.clone());
    if !nulls_first {
        out.push(&format!(" OR {} IS NULL", column));
    }
    out.push(")");
}

/// Validate and flatten requested aggregates into result column order
fn aggregation_slots<F: ModelField>(aggregations: &Aggregations<F>) -> Result<Vec<Aggregated<F>>> {
    let mut slots = Vec::new();
    if aggregations.count_all {
        slots.push(Aggregated::CountAll);
    }
    slots.extend(aggregations.count.iter().copied().map(Aggregated::Count));
    for field in &aggregations.avg {
        require_numeric(*field, "_avg")?;
        slots.push(Aggregated::Avg(*field));
    }
    for field in &aggregations.sum {
        require_numeric(*field, "_sum")?;
        slots.push(Aggregated::Sum(*field));
    }
    slots.extend(aggregations.min.iter().copied().map(Aggregated::Min));
    slots.extend(aggregations.max.iter().copied().map(Aggregated::Max));
    Ok(slots)
}

fn require_numeric<F: ModelField>(field: F, operation: &str) -> Result<()> {
    let column = field.column();
    if column.kind.is_numeric() {
        Ok(())
    } else {
        Err(ClientError::Validation(format!(
            "`{}` is only available on numeric fields, `{}` is {:?}",
            operation, column.field, column.kind
        )))
    }
}

/// SQL expression of one aggregate, with `col` rendering a column reference
fn aggregate_expr<F: ModelField>(slot: &Aggregated<F>, col: impl Fn(&ColumnDef) -> String) -> String {
    match slot {
        Aggregated::CountAll => "COUNT(*)".to_string(),
        Aggregated::Count(f) => format!("COUNT({})", col(f.column())),
        Aggregated::Avg(f) => format!("AVG({})", col(f.column())),
        Aggregated::Sum(f) => format!("SUM({})", col(f.column())),
        Aggregated::Min(f) => format!("MIN({})", col(f.column())),
        Aggregated::Max(f) => format!("MAX({})", col(f.column())),
        Aggregated::Field(f) => col(f.column()),
    }
}

/// Kind of the value an aggregate produces
pub(crate) fn aggregate_kind<F: ModelField>(slot: &Aggregated<F>) -> ColumnKind {
    match slot {
        Aggregated::CountAll | Aggregated::Count(_) => ColumnKind::Integer,
        Aggregated::Avg(_) => ColumnKind::Real,
        Aggregated::Sum(f) | Aggregated::Min(f) | Aggregated::Max(f) | Aggregated::Field(f) => {
            f.column().kind
        }
    }
}

/// `SELECT by..., aggregates... FROM t WHERE ... GROUP BY ... HAVING ...`
pub(crate) fn group_by<M: Model>(
    args: &GroupBy<M::Field>,
) -> Result<(SqlFragment, Vec<Aggregated<M::Field>>)> {
    if args.by.is_empty() {
        return Err(ClientError::Validation(
            "`by` must contain at least one field".to_string(),
        ));
    }
    if let Some(order) = args.order_by.iter().find(|o| !args.by.contains(&o.field)) {
        return Err(ClientError::Validation(format!(
            "every field in `order_by` must be in `by`, `{}` is not",
            order.field.column().field
        )));
    }
    if (args.skip.is_some() || args.take.is_some()) && args.order_by.is_empty() {
        return Err(ClientError::Validation(
            "`order_by` is required when using `skip` or `take` in group_by".to_string(),
        ));
    }
    if let Some(take) = args.take
        && take < 0
    {
        return Err(ClientError::Validation(format!(
            "`take` must be non-negative in group_by, got {}",
            take
        )));
    }

    let mut slots: Vec<Aggregated<M::Field>> = args.by.iter().copied().map(Aggregated::Field).collect();
    slots.extend(aggregation_slots(&args.aggregations)?);

    let table_col = |c: &ColumnDef| qualified(M::TABLE, c.name);
    let exprs: Vec<String> = slots.iter().map(|s| aggregate_expr(s, table_col)).collect();
    let group_cols: Vec<String> = args.by.iter().map(|f| qualified(M::TABLE, f.name())).collect();

    let mut out = SqlFragment::new(format!("SELECT {} FROM \"{}\"", exprs.join(", "), M::TABLE));
    if let Some(filter) = &args.filter {
        out.push(" WHERE ");
        filter.write_sql(M::TABLE, &mut out)?;
    }
    out.push(" GROUP BY ");
    out.push(&group_cols.join(", "));
    if let Some(having) = &args.having {
        out.push(" HAVING ");
        write_having::<M>(having, &args.by, &mut out)?;
    }
    write_order_by(M::TABLE, &args.order_by, &mut out);
    write_limit(args.take, args.skip, &mut out)?;

    Ok((out, slots))
}

fn write_having<M: Model>(
    having: &Having<M::Field>,
    by: &[M::Field],
    out: &mut SqlFragment,
) -> Result<()> {
    match having {
        Having::Cond(target, condition) => {
            let label = match target {
                Aggregated::CountAll => "_count._all".to_string(),
                Aggregated::Count(f) => format!("_count.{}", f.column().field),
                Aggregated::Avg(f) => {
                    require_numeric(*f, "_avg")?;
                    format!("_avg.{}", f.column().field)
                }
                Aggregated::Sum(f) => {
                    require_numeric(*f, "_sum")?;
                    format!("_sum.{}", f.column().field)
                }
                Aggregated::Min(f) => format!("_min.{}", f.column().field),
                Aggregated::Max(f) => format!("_max.{}", f.column().field),
                Aggregated::Field(f) => {
                    if !by.contains(f) {
                        return Err(ClientError::Validation(format!(
                            "`having` on field `{}` requires it in `by`",
                            f.column().field
                        )));
                    }
                    f.column().field.to_string()
                }
            };
            let lhs = aggregate_expr(target, |c| qualified(M::TABLE, c.name));
            write_comparison(&lhs, aggregate_kind(target), &label, condition, out)
        }
        Having::And(items) | Having::Or(items) => {
            let (separator, empty) = match having {
                Having::And(_) => (" AND ", "1 = 1"),
                _ => (" OR ", "1 = 0"),
            };
            if items.is_empty() {
                out.push(empty);
                return Ok(());
            }
            out.push("(");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(separator);
                }
                write_having::<M>(item, by, out)?;
            }
            out.push(")");
            Ok(())
        }
        Having::Not(inner) => {
            out.push("NOT (");
            write_having::<M>(inner, by, out)?;
            out.push(")");
            Ok(())
        }
    }
}

/// Resolve the full column/value list of a create: validate supplied
/// values, apply defaults and reject missing required fields.
pub(crate) fn insert_values<M: Model>(data: &Data<M::Field>) -> Result<Vec<(&'static ColumnDef, Value)>> {
    let mut values = Vec::with_capacity(M::COLUMNS.len());
    // one timestamp for every `now` default of the row
    let now = Value::DateTime(chrono::Utc::now());
    for field in <M::Field as ModelField>::all() {
        let column = field.column();
        match data.get(*field) {
            Some(value) => {
                if !value.fits(column.kind, column.nullable) {
                    return Err(invalid_value(M::NAME, column, value));
                }
                values.push((column, value.clone().coerce(column.kind)));
            }
            None => match column.default {
                Some(DefaultValue::Now) => values.push((column, now.clone())),
                Some(default) => values.push((column, default.generate())),
                None if column.nullable => {}
                None => {
                    return Err(ClientError::Validation(format!(
                        "argument `{}` is missing in {} create",
                        column.field,
                        M::NAME
                    )));
                }
            },
        }
    }
    Ok(values)
}

fn invalid_value(model: &str, column: &ColumnDef, value: &Value) -> ClientError {
    if value.is_null() {
        ClientError::Validation(format!(
            "argument `{}` of {} must not be null",
            column.field, model
        ))
    } else {
        ClientError::Validation(format!(
            "invalid value for argument `{}` of {}: expected {:?}, got {}",
            column.field,
            model,
            column.kind,
            value.type_name()
        ))
    }
}

/// `INSERT INTO t (...) VALUES (...)` with optional conflict clause
pub(crate) fn insert<M: Model>(
    data: &Data<M::Field>,
    conflict: OnConflict<'_, M::Field>,
    returning: bool,
) -> Result<SqlFragment> {
    let values = insert_values::<M>(data)?;
    let columns: Vec<String> = values.iter().map(|(c, _)| format!("\"{}\"", c.name)).collect();

    let verb = match conflict {
        OnConflict::Ignore => "INSERT OR IGNORE",
        _ => "INSERT",
    };
    let mut out = SqlFragment::new(format!(
        "{} INTO \"{}\" ({}) VALUES (",
        verb,
        M::TABLE,
        columns.join(", ")
    ));
    for (i, (_, value)) in values.into_iter().enumerate() {
        if i > 0 {
            out.push(", ");
        }
        out.push_bind(value);
    }
    out.push(")");

    if let OnConflict::Update(target, update) = conflict {
        out.push(&format!(" ON CONFLICT (\"{}\") DO UPDATE SET ", target.name()));
        write_assignments::<M>(update, &mut out)?;
    }
    if returning {
        out.push(&format!(" RETURNING {}", returning_columns::<M>()));
    }
    Ok(out)
}

/// `col = ?, n = n + ?, ...`, including automatic `updated_at` columns
fn write_assignments<M: Model>(update: &Update<M::Field>, out: &mut SqlFragment) -> Result<()> {
    let mut first = true;
    let mut separator = |out: &mut SqlFragment| {
        if !first {
            out.push(", ");
        }
        first = false;
    };

    for (field, op) in &update.ops {
        let column = field.column();
        let name = format!("\"{}\"", column.name);
        match op {
            UpdateOp::Set(value) => {
                if !value.fits(column.kind, column.nullable) {
                    return Err(invalid_value(M::NAME, column, value));
                }
                separator(out);
                out.push(&format!("{} = ", name));
                out.push_bind(value.clone().coerce(column.kind));
            }
            UpdateOp::Increment(by)
            | UpdateOp::Decrement(by)
            | UpdateOp::Multiply(by)
            | UpdateOp::Divide(by) => {
                let (operator, label) = match op {
                    UpdateOp::Increment(_) => ("+", "increment"),
                    UpdateOp::Decrement(_) => ("-", "decrement"),
                    UpdateOp::Multiply(_) => ("*", "multiply"),
                    _ => ("/", "divide"),
                };
                require_numeric(*field, label)?;
                let by = checked_value(column.kind, column.field, by, label)?;
                separator(out);
                out.push(&format!("{} = {} {} ", name, name, operator));
                out.push_bind(by);
            }
        }
    }

    for column in M::COLUMNS.iter().filter(|c| c.updated_at) {
        let touched = update.ops.iter().any(|(f, _)| f.column().name == column.name);
        if !touched {
            separator(out);
            out.push(&format!("\"{}\" = ", column.name));
            out.push_bind(Value::DateTime(chrono::Utc::now()));
        }
    }

    if first {
        // No-op assignment so the statement still matches and returns rows
        let pk = M::PRIMARY_KEY.name();
        out.push(&format!("\"{}\" = \"{}\"", pk, pk));
    }
    Ok(())
}

/// `UPDATE t SET ... WHERE filter [RETURNING ...]`
pub(crate) fn update<M: Model>(
    filter: Option<&Filter<M::Field>>,
    update: &Update<M::Field>,
    returning: bool,
) -> Result<SqlFragment> {
    let mut out = SqlFragment::new(format!("UPDATE \"{}\" SET ", M::TABLE));
    write_assignments::<M>(update, &mut out)?;
    if let Some(filter) = filter {
        out.push(" WHERE ");
        filter.write_sql(M::TABLE, &mut out)?;
    }
    if returning {
        out.push(&format!(" RETURNING {}", returning_columns::<M>()));
    }
    Ok(out)
}

/// `DELETE FROM t WHERE filter [RETURNING ...]`
pub(crate) fn delete<M: Model>(filter: Option<&Filter<M::Field>>, returning: bool) -> Result<SqlFragment> {
    let mut out = SqlFragment::new(format!("DELETE FROM \"{}\"", M::TABLE));
    if let Some(filter) = filter {
        out.push(" WHERE ");
        filter.write_sql(M::TABLE, &mut out)?;
    }
    if returning {
        out.push(&format!(" RETURNING {}", returning_columns::<M>()));
    }
    Ok(out)
}

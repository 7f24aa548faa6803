//! Relations between models
//!
//! A relation joins `To.foreign_key = From.local_key`. The same shape covers
//! both directions:
//!
//! - `HasMany` / `HasOne`: local is the parent's key, foreign is the child's
//!   reference column (`user.id` ← `session.user_id`)
//! - `BelongsTo`: local is the reference column, foreign is the target key
//!   (`session.user_id` → `user.id`)
//!
//! Relations are used two ways: loading related rows for a page of records
//! ("include"), and filtering records by their related rows.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use sqlx::SqliteConnection;

use super::builder::SqlFragment;
use super::delegate::QueryLog;
use super::filter::{Filter, Predicate};
use super::traits::{Model, ModelField, qualified};
use crate::error::Result;

/// Maximum bound keys per relation query, below SQLite's variable limit
const RELATION_CHUNK: usize = 900;

/// A relation from `From` to `To`.
pub trait Relation: Copy + fmt::Debug + Send + Sync + 'static {
    type From: Model;
    type To: Model;
    /// What an include yields per parent record
    type Output: Send;

    /// Relation name, for logging
    fn name(&self) -> &'static str;

    /// Join column on `From`
    fn local_key(&self) -> <Self::From as Model>::Field;

    /// Join column on `To`
    fn foreign_key(&self) -> <Self::To as Model>::Field;

    /// Shape the related rows of one parent
    fn collect(&self, related: Vec<Self::To>) -> Self::Output;
}

macro_rules! relation_kind {
    ($(#[$meta:meta])* $kind:ident, |$related:ident| -> $output:ty $body:block) => {
        $(#[$meta])*
        pub struct $kind<From: Model, To: Model> {
            name: &'static str,
            local: From::Field,
            foreign: To::Field,
            _models: PhantomData<fn() -> (From, To)>,
        }

        impl<From: Model, To: Model> $kind<From, To> {
            pub const fn new(name: &'static str, local: From::Field, foreign: To::Field) -> Self {
                Self {
                    name,
                    local,
                    foreign,
                    _models: PhantomData,
                }
            }
        }

        impl<From: Model, To: Model> Clone for $kind<From, To> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<From: Model, To: Model> Copy for $kind<From, To> {}

        impl<From: Model, To: Model> fmt::Debug for $kind<From, To> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($kind))
                    .field("name", &self.name)
                    .field("from", &From::NAME)
                    .field("to", &To::NAME)
                    .finish()
            }
        }

        impl<From: Model, To: Model> Relation for $kind<From, To> {
            type From = From;
            type To = To;
            type Output = $output;

            fn name(&self) -> &'static str {
                self.name
            }

            fn local_key(&self) -> From::Field {
                self.local
            }

            fn foreign_key(&self) -> To::Field {
                self.foreign
            }

            fn collect(&self, $related: Vec<To>) -> $output $body
        }
    };
}

relation_kind!(
    /// One parent, many children
    HasMany,
    |related| -> Vec<To> { related }
);

relation_kind!(
    /// One parent, at most one child
    HasOne,
    |related| -> Option<To> { related.into_iter().next() }
);

relation_kind!(
    /// The record referenced by a foreign key column
    BelongsTo,
    |related| -> Option<To> { related.into_iter().next() }
);

/// Load the related rows for each parent, in parent order.
///
/// Issues one `IN` query per chunk of distinct join keys. Parents with a NULL
/// join key get an empty result.
pub(crate) async fn load<R: Relation>(
    conn: &mut SqliteConnection,
    log: QueryLog,
    relation: &R,
    parents: &[R::From],
) -> Result<Vec<R::Output>> {
    let local = relation.local_key();
    let foreign = relation.foreign_key();

    let mut keys = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for parent in parents {
        let value = parent.get(local);
        if let Some(key) = value.group_key()
            && seen.insert(key)
        {
            keys.push(value);
        }
    }

    let mut grouped: HashMap<String, Vec<R::To>> = HashMap::new();
    let log = log.for_model(<R::To as Model>::NAME);
    for chunk in keys.chunks(RELATION_CHUNK) {
        let mut frag = SqlFragment::new(format!(
            "SELECT {} FROM \"{}\" WHERE {} IN (",
            <R::To as Model>::select_columns(),
            <R::To as Model>::TABLE,
            qualified(<R::To as Model>::TABLE, foreign.name()),
        ));
        for (i, key) in chunk.iter().enumerate() {
            if i > 0 {
                frag.push(", ");
            }
            frag.push_bind(key.clone());
        }
        frag.push(&format!(
            ") ORDER BY {} ASC",
            qualified(
                <R::To as Model>::TABLE,
                <R::To as Model>::PRIMARY_KEY.name()
            )
        ));

        let rows = log.fetch_all(conn, relation.name(), &frag).await?;
        for row in &rows {
            let child = log.decode::<R::To>(row)?;
            if let Some(key) = child.get(foreign).group_key() {
                grouped.entry(key).or_default().push(child);
            }
        }
    }

    Ok(parents
        .iter()
        .map(|parent| {
            let related = parent
                .get(local)
                .group_key()
                .and_then(|key| grouped.get(&key).cloned())
                .unwrap_or_default();
            relation.collect(related)
        })
        .collect())
}

/// How a relation filter quantifies over related rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Some,
    Every,
    None,
}

/// `EXISTS` predicate over the related table
#[derive(Debug)]
pub(crate) struct RelationFilter<R: Relation> {
    pub relation: R,
    pub quantifier: Quantifier,
    pub filter: Filter<<R::To as Model>::Field>,
}

impl<R: Relation> Predicate for RelationFilter<R> {
    fn write_sql(&self, out: &mut SqlFragment) -> Result<()> {
        let to = <R::To as Model>::TABLE;
        let from = <R::From as Model>::TABLE;
        let join = format!(
            "{} = {}",
            qualified(to, self.relation.foreign_key().name()),
            qualified(from, self.relation.local_key().name())
        );

        let prefix = match self.quantifier {
            Quantifier::Some => "EXISTS",
            Quantifier::Every | Quantifier::None => "NOT EXISTS",
        };
        out.push(&format!("{} (SELECT 1 FROM \"{}\" WHERE {} AND ", prefix, to, join));
        if self.quantifier == Quantifier::Every {
            out.push("NOT (");
            self.filter.write_sql(to, out)?;
            out.push(")");
        } else {
            self.filter.write_sql(to, out)?;
        }
        out.push(")");
        Ok(())
    }
}

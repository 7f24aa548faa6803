//! ORM layer
//!
//! Provides the traits implemented by `#[derive(Model)]` and everything the
//! delegates need to turn typed arguments into SQLite statements:
//! - Model metadata (`Model`, `ModelField`, `ColumnDef`)
//! - Dynamic values (`Value`)
//! - Where inputs (`Filter`, `Condition`, `Unique`)
//! - Operation arguments (`FindMany`, `Data`, `Update`, `Aggregate`, `GroupBy`)
//! - Relations (`HasMany`, `HasOne`, `BelongsTo`)
//! - Result payloads (`Record`, `RawRow`, `AggregateResult`, `GroupRow`)
//!
//! ```rust,ignore
//! use authdb::models::{Session, SessionField, User, UserField};
//! use authdb::orm::{Filter, FindMany};
//!
//! // Users with at least one session from curl, sessions included
//! let users = client
//!     .user()
//!     .find_many_with(
//!         FindMany::new().filter(Filter::some(
//!             User::SESSIONS,
//!             Filter::contains(SessionField::UserAgent, "curl"),
//!         )),
//!         User::SESSIONS,
//!     )
//!     .await?;
//! ```

mod aggregate;
mod args;
mod builder;
mod delegate;
mod filter;
mod record;
mod relation;
mod traits;
mod value;

pub use aggregate::{AggregateResult, GroupRow};
pub use args::*;
pub use builder::SqlFragment;
pub use delegate::Delegate;
pub use filter::{Condition, Filter, Predicate, Unique};
pub use record::{RawRow, Record};
pub use relation::{BelongsTo, HasMany, HasOne, Quantifier, Relation};
pub use traits::*;
pub use value::{Value, bool_to_int, datetime_to_str, str_to_datetime};

pub(crate) use delegate::{QueryLog, Target, execute_raw, query_raw};

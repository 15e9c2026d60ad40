//! Typed row identifiers.
//!
//! Every persisted record is addressed by its SQLite row id. Wrapping the raw
//! `i64` keeps a `UserId` from being passed where a `FunctionId` is expected.

use rusqlite::ToSql;
use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Human label for the record kind, used in not-found errors.
            pub const KIND: &'static str = $kind;

            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                self.0.to_sql()
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }
    };
}

row_id!(
    /// Identifies a project.
    ProjectId,
    "project"
);
row_id!(
    /// Identifies a user known to the store.
    UserId,
    "user"
);
row_id!(
    /// Identifies a role in the function registry.
    FunctionId,
    "function"
);
row_id!(
    /// Identifies a milestone.
    MilestoneId,
    "milestone"
);
row_id!(
    /// Identifies a ticket.
    TicketId,
    "ticket"
);
row_id!(
    /// Identifies an audit event.
    EventId,
    "event"
);
row_id!(
    /// Identifies a member within one project. Ordinals are assigned by the
    /// aggregate and a member keeps its id across saves.
    MemberId,
    "member"
);

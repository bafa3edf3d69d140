//! Milestone schema and connection setup.
//!
//! Three tables back the scheduler: `projects` (name and optional start
//! date), `milestones` (user timing inputs plus the derived CPM window
//! columns) and `milestone_dependencies` (ordered edges from a milestone to
//! the milestones it waits on).
//!
//! # Invariants
//! - Connections run with `foreign_keys=ON`, so deleting a milestone drops
//!   its edges in both directions and edges never cross into a missing row.
//! - Schema version lives in `PRAGMA user_version`; the store refuses a
//!   connection that is not at `migrations::latest_version()`.
//! - Dates are stored as ISO `YYYY-MM-DD` text.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// One migration script failed; the whole run was rolled back.
    Migration {
        version: u32,
        source: rusqlite::Error,
    },
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Migration { version, source } => {
                write!(f, "schema migration {version} failed: {source}")
            }
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Migration { source, .. } => Some(source),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

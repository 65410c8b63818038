//! Class order database: connection bootstrap and schema versioning.
//!
//! # Responsibility
//! - Hand out SQLite connections ready for the sequence store.
//! - Keep the `containers` / `sequence_entries` schema at the version this
//!   binary understands.
//!
//! # Invariants
//! - A connection returned from here is fully migrated; the sequence store
//!   re-checks that on construction.
//! - A database written by a newer binary is refused, never downgraded.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

/// Result of opening or migrating a class order database.
pub type DbResult<T> = Result<T, DbError>;

/// Failure while opening or migrating a class order database.
#[derive(Debug)]
pub enum DbError {
    /// SQLite refused to open, configure or migrate the file.
    Sqlite(rusqlite::Error),
    /// `PRAGMA user_version` is past the newest known migration.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "class order database error: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "class order schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        if let Self::Sqlite(err) = self {
            return Some(err);
        }
        None
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

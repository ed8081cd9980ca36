//! TaskVault storage: one SQLite file holding `users` and `tasks`.
//!
//! # Responsibility
//! - Hand out connections that are ready for owner-scoped queries.
//! - Keep the on-disk schema at the version this binary understands.
//!
//! # Invariants
//! - `tasks.owner_id` references `users.id`; deleting a user orphans its
//!   tasks (owner set to NULL) and orphaned rows are unreachable by owner.
//! - A database migrated by a newer binary is refused, never downgraded.
//! - Notes are stored only as cipher envelopes; this layer never decrypts.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use migrations::schema_version;
pub use open::{now_epoch_ms, open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Storage bootstrap failures.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file was migrated past what this build ships.
    SchemaAhead { on_disk: u32, supported: u32 },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
            Self::SchemaAhead { on_disk, supported } => write!(
                f,
                "taskvault schema v{on_disk} on disk, this build understands up to v{supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::SchemaAhead { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

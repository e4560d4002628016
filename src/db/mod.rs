pub mod sqlite;
pub mod repository;
pub mod report_store;

pub use sqlite::*;
pub use repository::*;
pub use report_store::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },
}

/// Failures of the persisted report collection. None of these are expected on a
/// healthy store; callers treat them as fatal rather than dropping data.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Report serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored reports use schema version {found}, newer than supported {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Report store lock poisoned")]
    LockPoisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(e))
    }
}

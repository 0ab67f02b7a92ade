use thiserror::Error;

/// Library error type for catalog and rotation operations.
#[derive(Debug, Error)]
pub enum Error {
    /// None of the configured media roots exists.
    #[error("no configured media root exists: {0}")]
    NoMediaRoots(String),

    /// Underlying SQLite error.
    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A schema migration step failed and was rolled back.
    #[error("migration from schema version {from} failed: {source}")]
    Migration {
        from: u32,
        #[source]
        source: rusqlite::Error,
    },

    /// The database reports a schema version no migration knows about.
    #[error("no migration registered for schema version {0}")]
    UnknownSchemaVersion(u32),
}

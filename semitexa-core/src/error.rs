//! Error kinds for the Semitexa core.
//!
//! Callers are expected to branch on the variant, never on the message text.
//! Expected failures (pool timeouts, bad queries, validation findings) are
//! ordinary `Err` values; panics are reserved for corrupted process state.

use std::time::Duration;

/// Main error type for the Semitexa core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A collector-detected contradiction in the declared schema: invalid
    /// identifier, incompatible source/SQL type pair, string PK with an
    /// implicit strategy, duplicate column, and so on. Fatal for sync.
    #[error("schema validation failed: {0}")]
    Validation(String),

    /// INFORMATION_SCHEMA returned malformed rows, or the server version is
    /// below 8.0.0. Fatal.
    #[error("live schema state unreadable: {0}")]
    SchemaState(String),

    /// The caller demanded transactional DDL on a server that cannot
    /// provide it.
    #[error("server capability missing: {0}")]
    Capability(String),

    /// `pop` on the connection pool timed out. Recoverable by the caller.
    #[error("connection pool exhausted, waited {0:?}")]
    PoolTimeout(Duration),

    /// A statement failed with a connection-reset condition. Raised only
    /// after the stale-connection replacement has been attempted once.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Server-reported constraint violation, surfaced unchanged.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// The query builder received a property that is not a declared relation.
    #[error("unknown relation: {0}")]
    UnknownRelation(String),

    /// The query builder received a property that is not filterable.
    #[error("property is not filterable: {0}")]
    NotFilterable(String),

    /// Invalid operator, page/perPage below 1, or a DELETE with no WHERE.
    #[error("bad query: {0}")]
    BadQuery(String),

    /// Any other driver-level failure.
    #[error("database error: {0}")]
    Database(String),

    /// Filesystem failure while writing the sync audit trail.
    #[error("audit i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify a driver error into the kinds above.
    ///
    /// MySQL error codes 1022/1048/1062/1169/1216/1217/1451/1452/1557/1586
    /// are constraint violations and become [`Error::Integrity`].
    pub fn from_driver(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
                match code.as_str() {
                    "1022" | "1048" | "1062" | "1169" | "1216" | "1217" | "1451" | "1452"
                    | "1557" | "1586" => Error::Integrity(db.message().to_string()),
                    _ => Error::Database(db.message().to_string()),
                }
            }
            sqlx::Error::Io(e) => Error::ConnectionLost(e.to_string()),
            sqlx::Error::PoolTimedOut => Error::PoolTimeout(Duration::ZERO),
            other => Error::Database(other.to_string()),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

use std::fmt;
use sync_engine_repository::{DataStoreError, MediumError};

/// PostgreSQL SQLSTATEs that indicate a dropped or overloaded connection, a
/// server shutdown, or a serialization failure worth replaying.
const TRANSIENT_SQLSTATES: &[&str] = &[
    "08000", "08001", "08003", "08004", "08006", "57P01", "57P02", "57P03", "53300", "40001",
    "40P01",
];

/// Gateway statuses that mean "try again later".
const TRANSIENT_STATUSES: &[u16] = &[429, 502, 503, 504];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

impl ErrorClass {
    pub fn of<E: Transience + ?Sized>(error: &E) -> Self {
        if error.is_transient() {
            ErrorClass::Transient
        } else {
            ErrorClass::Permanent
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Transient => f.write_str("transient"),
            ErrorClass::Permanent => f.write_str("permanent"),
        }
    }
}

/// Errors that know whether retrying them can help.
pub trait Transience {
    fn is_transient(&self) -> bool;
}

impl Transience for DataStoreError {
    fn is_transient(&self) -> bool {
        is_transient(self)
    }
}

impl Transience for MediumError {
    fn is_transient(&self) -> bool {
        match self {
            MediumError::Database(err) => is_transient_sqlx(err),
            MediumError::Unavailable(_) => false,
        }
    }
}

impl Transience for sqlx::Error {
    fn is_transient(&self) -> bool {
        is_transient_sqlx(self)
    }
}

/// Pure classifier for data store failures.
pub fn is_transient(error: &DataStoreError) -> bool {
    match error {
        DataStoreError::Database(err) => is_transient_sqlx(err),
        DataStoreError::Medium(err) => err.is_transient(),
        DataStoreError::Network(_) | DataStoreError::Timeout(_) => true,
        DataStoreError::Status { status, .. } => TRANSIENT_STATUSES.contains(status),
        DataStoreError::Serialization(_)
        | DataStoreError::NotFound { .. }
        | DataStoreError::InvalidInput(_)
        | DataStoreError::VersionConflict { .. }
        | DataStoreError::ImportConflict { .. } => false,
    }
}

pub fn is_transient_sqlx(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map(|code| TRANSIENT_SQLSTATES.iter().any(|transient| code == *transient))
            .unwrap_or(false),
        _ => false,
    }
}

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::model::RecordId;

/// Process exit status for a command that completed.
pub const EXIT_SUCCESS: u8 = 0;
/// Malformed or missing input, caught before the backend is touched.
pub const EXIT_VALIDATION: u8 = 1;
pub const EXIT_NOT_FOUND: u8 = 2;
/// Connection failures and any other backend error.
pub const EXIT_BACKEND: u8 = 3;
pub const EXIT_DUPLICATE_KEY: u8 = 4;
pub const EXIT_TIMEOUT: u8 = 5;
pub const EXIT_PARSE: u8 = 6;
pub const EXIT_IO: u8 = 7;

/// Failure to establish a session with the backend.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("unknown backend kind '{0}' (expected 'production' or 'embedded')")]
    UnknownBackend(String),

    #[error("invalid database name '{0}': use letters, digits, '-' or '_'")]
    InvalidDatabaseName(String),

    #[error("cannot reach store at {location}: {source}")]
    Unreachable {
        location: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("access denied to store at {location}: {source}")]
    AccessDenied {
        location: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to prepare session for {location}: {source}")]
    Setup {
        location: String,
        #[source]
        source: rusqlite::Error,
    },
}

impl ConnectionError {
    /// Classify an error raised while opening `location`.
    pub(crate) fn from_open(location: impl Into<String>, source: rusqlite::Error) -> Self {
        let location = location.into();
        match source.sqlite_error_code() {
            Some(
                ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly
                | ErrorCode::AuthorizationForStatementDenied,
            ) => Self::AccessDenied { location, source },
            _ => Self::Unreachable { location, source },
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("duplicate key: record {id} already exists")]
    DuplicateKey { id: RecordId },

    #[error("not found: record with id {id}")]
    NotFound { id: RecordId },

    #[error("timed out waiting for the database: {0}")]
    Timeout(String),

    #[error("malformed JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The stable process exit status reported for this error.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation { .. } => EXIT_VALIDATION,
            Self::NotFound { .. } => EXIT_NOT_FOUND,
            Self::Connection(_) | Self::Database(_) => EXIT_BACKEND,
            Self::DuplicateKey { .. } => EXIT_DUPLICATE_KEY,
            Self::Timeout(_) => EXIT_TIMEOUT,
            Self::Parse(_) => EXIT_PARSE,
            Self::Io(_) => EXIT_IO,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                Self::Timeout(err.to_string())
            }
            _ => Self::Database(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

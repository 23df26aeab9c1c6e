//! Error types for backup and restore operations.

use crate::filter::FilterError;

/// Error type covering every fatal failure class of the pipelines.
///
/// Per-row problems (arity mismatches, individual insert failures, filter
/// runtime errors) are logged where they occur and never surface here.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database connection failed")]
    Connect(#[source] mysql::Error),

    #[error("failed to acquire consistent snapshot")]
    Snapshot(#[source] mysql::Error),

    #[error("unsupported column type {sql_type:?} for {table}.{column}")]
    UnsupportedType {
        table: String,
        column: String,
        sql_type: String,
    },

    #[error("malformed dump data: {0}")]
    Codec(String),

    #[error("query failed")]
    Query(#[source] mysql::Error),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("sftp error: {message}")]
    Sftp {
        message: String,
        #[source]
        source: Option<ssh2::Error>,
    },

    #[error("i/o error")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn sftp(message: impl Into<String>, source: ssh2::Error) -> Self {
        Error::Sftp {
            message: message.into(),
            source: Some(source),
        }
    }

    pub(crate) fn sftp_msg(message: impl Into<String>) -> Self {
        Error::Sftp {
            message: message.into(),
            source: None,
        }
    }
}

/// Result type alias for backup and restore operations.
pub type Result<T> = std::result::Result<T, Error>;

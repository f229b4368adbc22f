//! Error types for directory and configuration storage

use carma_crypto::CryptoError;
use carma_protocol::{ErrorKind, ProtocolError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PhonebookError>;

#[derive(Error, Debug)]
pub enum PhonebookError {
    #[error("Peer not found: {0}")]
    NotFound(String),

    #[error("Stale phonebook reference: {0}")]
    StaleReference(String),

    #[error("Duplicate phonebook entry: {0}")]
    DuplicateEntry(String),

    #[error("{0}")]
    Config(String),

    #[error("Invalid path \"{path}\": {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Corrupt {what}: {reason}")]
    Corrupt { what: String, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl PhonebookError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PhonebookError::NotFound(_) | PhonebookError::StaleReference(_) => ErrorKind::NotFound,
            PhonebookError::DuplicateEntry(_)
            | PhonebookError::Config(_)
            | PhonebookError::InvalidPath { .. } => ErrorKind::ConfigInvariantViolation,
            PhonebookError::Corrupt { .. } | PhonebookError::Json { .. } => ErrorKind::Corrupt,
            PhonebookError::Io { .. } => ErrorKind::IoFailure,
            PhonebookError::Crypto(e) => e.kind(),
            PhonebookError::Protocol(e) => e.kind(),
        }
    }

    pub(crate) fn io(path: &str, source: std::io::Error) -> Self {
        PhonebookError::Io {
            path: path.to_string(),
            source,
        }
    }

    pub(crate) fn json(path: &str, source: serde_json::Error) -> Self {
        PhonebookError::Json {
            path: path.to_string(),
            source,
        }
    }

    pub(crate) fn corrupt(what: impl Into<String>, reason: impl Into<String>) -> Self {
        PhonebookError::Corrupt {
            what: what.into(),
            reason: reason.into(),
        }
    }
}

//! Error types for wire operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Coarse classification shared by every CARMA crate.
///
/// Callers match on the kind to pick a recovery policy: a corrupt packet is
/// dropped, a configuration error is surfaced, a missing peer may be retried
/// after the directory changes, an I/O failure is handed back to whoever owns
/// the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Corrupt,
    ConfigInvariantViolation,
    IoFailure,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Corrupt => "corrupt",
            ErrorKind::ConfigInvariantViolation => "configuration invariant violation",
            ErrorKind::IoFailure => "I/O failure",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Truncated input: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("unknown packet type: {0}")]
    UnknownPacketType(u64),

    #[error("Expected packet type {expected}, found {found}")]
    UnexpectedPacketType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("unknown role: {0}")]
    UnknownRole(u64),

    #[error("Varint overflows 64 bits")]
    VarintOverflow,

    #[error("Integer of {actual} bytes does not fit in {width} bytes")]
    BigIntTooWide { width: usize, actual: usize },

    #[error("Expected {expected} mix values, found {actual}")]
    MixSizeMismatch { expected: usize, actual: usize },

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("Invalid PSN hash: {0}")]
    InvalidPsnHash(String),

    #[error("Invalid GUID: {0}")]
    InvalidGuid(String),

    #[error("{0} trailing bytes after packet")]
    TrailingBytes(usize),
}

impl ProtocolError {
    /// Every wire error is a corruption signal for the packet being handled.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Corrupt
    }
}

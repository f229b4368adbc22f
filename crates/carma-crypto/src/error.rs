//! Error types for cryptographic operations

use carma_protocol::{ErrorKind, ProtocolError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CryptoError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CryptoError {
    #[error("Failed to initialize libsodium")]
    InitFailed,

    #[error("Invalid {0} key")]
    InvalidKey(&'static str),

    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::InvalidCiphertext(_) | CryptoError::DecryptionFailed => ErrorKind::Corrupt,
            CryptoError::Protocol(e) => e.kind(),
            CryptoError::InitFailed
            | CryptoError::InvalidKey(_)
            | CryptoError::InvalidParameter(_) => ErrorKind::ConfigInvariantViolation,
        }
    }
}

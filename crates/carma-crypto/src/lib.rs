//! CARMA Cryptography Module
//!
//! Composes libsodium's public-key boxes into the two CARMA envelope kinds
//! and derives the hashes used for compact peer identification and bucket
//! assignment.

pub mod envelope;
pub mod error;
pub mod hash;

pub use envelope::{
    anon_ciphertext_size, anon_decrypt, anon_encrypt, auth_ciphertext_size, auth_decrypt,
    auth_encrypt, plaintext_size, KeyPair, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE,
};
pub use error::{CryptoError, Result};
pub use hash::{bucket_of, psn_hash};

/// Initialize libsodium. Safe to call more than once.
pub fn init() -> Result<()> {
    sodiumoxide::init().map_err(|_| CryptoError::InitFailed)
}

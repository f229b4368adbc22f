//! Anonymous and authenticated public-key envelopes
//!
//! Envelope layouts:
//! - Anonymous: tag `0` || sealed box (ephemeral public key, MAC, ciphertext)
//! - Authenticated: tag `1` || 24-byte nonce || MAC || ciphertext
//!
//! Both use X25519 + XSalsa20-Poly1305 from libsodium. The anonymous form
//! hides the sender even from the recipient; the authenticated form proves
//! which directory key sealed the payload.

use sodiumoxide::crypto::{box_, sealedbox};

use crate::error::{CryptoError, Result};

/// Leading byte of an anonymous envelope
pub const ANON_TAG: u8 = 0;

/// Leading byte of an authenticated envelope
pub const AUTH_TAG: u8 = 1;

pub const PUBLIC_KEY_SIZE: usize = box_::PUBLICKEYBYTES;
pub const SECRET_KEY_SIZE: usize = box_::SECRETKEYBYTES;

/// Bytes a sealed box adds to its plaintext
pub const SEAL_OVERHEAD: usize = box_::PUBLICKEYBYTES + box_::MACBYTES;

/// Bytes an authenticated box adds to its plaintext
pub const AUTH_OVERHEAD: usize = box_::NONCEBYTES + box_::MACBYTES;

/// Directory key pair of a node
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub public_key: Vec<u8>,
    pub secret_key: Vec<u8>,
}

impl KeyPair {
    pub fn generate() -> Self {
        let (pk, sk) = box_::gen_keypair();
        KeyPair {
            public_key: pk.0.to_vec(),
            secret_key: sk.0.to_vec(),
        }
    }

    pub fn new(public_key: Vec<u8>, secret_key: Vec<u8>) -> Self {
        KeyPair {
            public_key,
            secret_key,
        }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(&self.public_key))
            .finish_non_exhaustive()
    }
}

fn public_key(bytes: &[u8]) -> Result<box_::PublicKey> {
    box_::PublicKey::from_slice(bytes).ok_or(CryptoError::InvalidKey("public"))
}

fn secret_key(bytes: &[u8]) -> Result<box_::SecretKey> {
    box_::SecretKey::from_slice(bytes).ok_or(CryptoError::InvalidKey("secret"))
}

/// Ciphertext size of an anonymous envelope around `plaintext_size` bytes
pub fn anon_ciphertext_size(plaintext_size: usize) -> usize {
    1 + SEAL_OVERHEAD + plaintext_size
}

/// Ciphertext size of an authenticated envelope around `plaintext_size` bytes
pub fn auth_ciphertext_size(plaintext_size: usize) -> usize {
    1 + AUTH_OVERHEAD + plaintext_size
}

/// Plaintext size of either envelope kind, read from its tag
pub fn plaintext_size(ciphertext: &[u8]) -> Result<usize> {
    let overhead = match ciphertext.first() {
        Some(&ANON_TAG) => 1 + SEAL_OVERHEAD,
        Some(&AUTH_TAG) => 1 + AUTH_OVERHEAD,
        Some(tag) => {
            return Err(CryptoError::InvalidCiphertext(format!(
                "unknown envelope tag {}",
                tag
            )))
        }
        None => return Err(CryptoError::InvalidCiphertext("empty".to_string())),
    };
    ciphertext.len().checked_sub(overhead).ok_or_else(|| {
        CryptoError::InvalidCiphertext(format!(
            "{} bytes is shorter than the {} byte header",
            ciphertext.len(),
            overhead
        ))
    })
}

fn expect_tag(ciphertext: &[u8], tag: u8) -> Result<&[u8]> {
    plaintext_size(ciphertext)?;
    if ciphertext[0] != tag {
        return Err(CryptoError::InvalidCiphertext(format!(
            "expected envelope tag {}, found {}",
            tag, ciphertext[0]
        )));
    }
    Ok(&ciphertext[1..])
}

/// Seal `plaintext` so only the holder of `recipient_pk` can open it
pub fn anon_encrypt(plaintext: &[u8], recipient_pk: &[u8]) -> Result<Vec<u8>> {
    let pk = public_key(recipient_pk)?;
    let mut out = Vec::with_capacity(anon_ciphertext_size(plaintext.len()));
    out.push(ANON_TAG);
    out.extend_from_slice(&sealedbox::seal(plaintext, &pk));
    debug_assert_eq!(out.len(), anon_ciphertext_size(plaintext.len()));
    Ok(out)
}

pub fn anon_decrypt(ciphertext: &[u8], recipient_pk: &[u8], recipient_sk: &[u8]) -> Result<Vec<u8>> {
    let body = expect_tag(ciphertext, ANON_TAG)?;
    let pk = public_key(recipient_pk)?;
    let sk = secret_key(recipient_sk)?;
    sealedbox::open(body, &pk, &sk).map_err(|_| CryptoError::DecryptionFailed)
}

/// Seal `plaintext` for `recipient_pk`, authenticated by the sender's key pair
pub fn auth_encrypt(plaintext: &[u8], sender: &KeyPair, recipient_pk: &[u8]) -> Result<Vec<u8>> {
    let pk = public_key(recipient_pk)?;
    let sk = secret_key(&sender.secret_key)?;
    let nonce = box_::gen_nonce();
    let mut out = Vec::with_capacity(auth_ciphertext_size(plaintext.len()));
    out.push(AUTH_TAG);
    out.extend_from_slice(&nonce.0);
    out.extend_from_slice(&box_::seal(plaintext, &nonce, &pk, &sk));
    debug_assert_eq!(out.len(), auth_ciphertext_size(plaintext.len()));
    Ok(out)
}

/// Open an authenticated envelope, failing unless `sender_pk` sealed it
pub fn auth_decrypt(ciphertext: &[u8], recipient: &KeyPair, sender_pk: &[u8]) -> Result<Vec<u8>> {
    let body = expect_tag(ciphertext, AUTH_TAG)?;
    let pk = public_key(sender_pk)?;
    let sk = secret_key(&recipient.secret_key)?;
    let (nonce_bytes, sealed) = body.split_at(box_::NONCEBYTES);
    let nonce = box_::Nonce::from_slice(nonce_bytes)
        .ok_or_else(|| CryptoError::InvalidCiphertext("bad nonce".to_string()))?;
    box_::open(sealed, &nonce, &pk, &sk).map_err(|_| CryptoError::DecryptionFailed)
}

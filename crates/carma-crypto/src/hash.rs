//! Directory hashes and bucket assignment

use carma_protocol::{NodeCount, Psn, PsnHash, PSN_HASH_SIZE};
use num_bigint::BigUint;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{CryptoError, Result};

/// Salt appended to a PSN before hashing it
pub const PSN_HASH_SALT: &[u8] = b"kestrel";

/// Version-1 directory hash: tag byte, then the first 15 bytes of
/// SHA-256(psn || salt)
pub fn psn_hash(psn: &Psn) -> PsnHash {
    let mut hasher = Sha256::new();
    hasher.update(psn.as_bytes());
    hasher.update(PSN_HASH_SALT);
    let digest = hasher.finalize();
    let mut prefix = [0u8; PSN_HASH_SIZE - 1];
    prefix.copy_from_slice(&digest[..PSN_HASH_SIZE - 1]);
    PsnHash::from_digest(&prefix)
}

/// Bucket of a client or mailbox server within the current epoch
///
/// SHA-512(epoch_nonce || psn), read as an unsigned big-endian integer,
/// reduced modulo the bucket count.
pub fn bucket_of(epoch_nonce: &[u8], psn: &Psn, num_buckets: NodeCount) -> Result<NodeCount> {
    if num_buckets == 0 {
        return Err(CryptoError::InvalidParameter(
            "num_buckets must be positive".to_string(),
        ));
    }
    let mut hasher = Sha512::new();
    hasher.update(epoch_nonce);
    hasher.update(psn.as_bytes());
    let n = BigUint::from_bytes_be(&hasher.finalize());
    let bucket = n % BigUint::from(num_buckets);
    Ok(bucket.iter_u64_digits().next().unwrap_or(0))
}

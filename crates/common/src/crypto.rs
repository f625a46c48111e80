//! Content hashing utilities shared across Strata crates
//!
//! Binary payloads are content-addressed: the repository records a SHA-256
//! hash alongside the size on every document-like artifact's metadata row.

use sha2::{Digest, Sha256};

/// Compute the lowercase hex SHA-256 digest of a byte payload.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

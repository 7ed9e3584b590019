//! Hashing primitives for the ledger
//!
//! All digests are SHA-256, rendered as standard (padded) base64 so they can
//! be concatenated and re-hashed as text when building block hashes and
//! Merkle levels.

use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash text and return the base64-encoded digest
pub fn hash_str(text: &str) -> String {
    STANDARD.encode(hash_bytes(text.as_bytes()))
}

/// Hash the concatenation of several text parts without allocating the joined string
pub fn hash_concat<S: AsRef<str>>(parts: &[S]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
    }
    let digest: [u8; 32] = hasher.finalize().into();
    STANDARD.encode(digest)
}

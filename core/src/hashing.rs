//! Deterministic content hashing
//!
//! Shared by semantic unit IDs (§3) and the semantic cache key (§4.12):
//! both need a cryptographic hash of a canonical string, hex-encoded and
//! truncated to a fixed prefix length.

use sha2::{Digest, Sha256};

use crate::limits::HASH_PREFIX_LEN;

/// Hash `input` with SHA-256 and return the first `HASH_PREFIX_LEN` hex chars.
pub fn hash_prefix(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let hex = format!("{digest:x}");
    hex.chars().take(HASH_PREFIX_LEN).collect()
}

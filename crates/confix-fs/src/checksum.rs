//! SHA-256 checksum utilities
//!
//! Snapshots and document fingerprints share one canonical format,
//! `sha256:<hex>`, so a checksum taken from a file can be compared with one
//! taken from in-memory content.

use sha2::{Digest, Sha256};

use crate::{Error, NormalizedPath, Result};

/// Prefix for all checksums produced by this module
const PREFIX: &str = "sha256:";

/// Compute the checksum of raw bytes.
pub fn compute_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{}{:x}", PREFIX, hasher.finalize())
}

/// Compute the checksum of a file's contents.
pub fn compute_file_checksum(path: &NormalizedPath) -> Result<String> {
    let native = path.to_native();
    let content = std::fs::read(&native).map_err(|e| Error::io(&native, e))?;
    Ok(compute_checksum(&content))
}

/// Check that `content` hashes to `expected`.
pub fn verify(content: &[u8], expected: &str) -> bool {
    compute_checksum(content) == expected
}

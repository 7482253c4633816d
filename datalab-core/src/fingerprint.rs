//! Cache fingerprinting: deterministic identification of fetch queries.
//!
//! - `CacheKey`: readable date-range prefix + 128-bit BLAKE3 digest of the params.
//! - `content_hash`: full BLAKE3 digest of an artifact, stored in cache metadata.
//!
//! The key is the only thing that addresses a cached artifact, so it must be
//! stable across calls, processes and platforms for the same query.

use crate::domain::{DateRange, QueryParams};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex characters kept from the digest (128 bits).
const DIGEST_HEX_LEN: usize = 32;

/// Address of a cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the cache key for a date range and parameter set.
///
/// Format: `{from:%Y-%m-%d}--{to:%Y-%m-%d}--{digest}` where the digest covers
/// [`QueryParams::canonical_string`].
pub fn build_cache_key(range: &DateRange, params: &QueryParams) -> CacheKey {
    let digest = blake3::hash(params.canonical_string().as_bytes());
    let hex = digest.to_hex();
    CacheKey(format!(
        "{}--{}--{}",
        range.from_date().format("%Y-%m-%d"),
        range.to_date().format("%Y-%m-%d"),
        &hex.as_str()[..DIGEST_HEX_LEN],
    ))
}

/// Full BLAKE3 hex digest of artifact bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

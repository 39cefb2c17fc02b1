//! Body checksums for encoded heaps.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 128-bit XXH3 digest of an encoded heap body.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum([u8; 16]);

impl Checksum {
    /// Computes the checksum of `data`.
    pub fn of(data: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_128(data).to_le_bytes())
    }

    /// Returns `true` if `data` hashes to this checksum.
    pub fn verifies(&self, data: &[u8]) -> bool {
        *self == Self::of(data)
    }
}

impl fmt::Display for Checksum {
    /// Big-endian hex, as XXH3 tools print digests.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().rev().try_for_each(|b| write!(f, "{b:02x}"))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({self})")
    }
}

//! Identity and addressing types for shavar lists.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a host key in bytes.
pub const HOST_KEY_LEN: usize = 4;

/// Maximum length of a published prefix in bytes.
pub const MAX_PREFIX_LEN: usize = 32;

/// Length of a full hash in bytes (SHA-256).
pub const FULL_HASH_LEN: usize = 32;

/// A chunk number assigned by the list authority.
///
/// Chunk numbers start at 1; 0 is never published.
pub type ChunkNum = u32;

/// Name of a threat list, e.g. `goog-malware-shavar`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListName(String);

impl ListName {
    /// Create a list name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ListName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for ListName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ListName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListName({})", self.0)
    }
}

/// An inclusive range of chunk numbers, `lo..=hi`.
///
/// `lo <= hi` always holds, including for deserialized values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawChunkRange")]
pub struct ChunkRange {
    lo: ChunkNum,
    hi: ChunkNum,
}

#[derive(Deserialize)]
struct RawChunkRange {
    lo: ChunkNum,
    hi: ChunkNum,
}

impl TryFrom<RawChunkRange> for ChunkRange {
    type Error = String;

    fn try_from(raw: RawChunkRange) -> Result<Self, Self::Error> {
        Self::new(raw.lo, raw.hi)
            .ok_or_else(|| format!("inverted chunk range {}-{}", raw.lo, raw.hi))
    }
}

impl ChunkRange {
    /// Create a range. Returns `None` if `lo > hi`.
    pub fn new(lo: ChunkNum, hi: ChunkNum) -> Option<Self> {
        (lo <= hi).then_some(Self { lo, hi })
    }

    /// A range covering exactly one chunk.
    pub fn single(num: ChunkNum) -> Self {
        Self { lo: num, hi: num }
    }

    /// First chunk number in the range.
    pub fn lo(&self) -> ChunkNum {
        self.lo
    }

    /// Last chunk number in the range (inclusive).
    pub fn hi(&self) -> ChunkNum {
        self.hi
    }

    /// Grow the range by one if `num` directly follows `hi`.
    pub fn try_extend(&mut self, num: ChunkNum) -> bool {
        if self.hi.checked_add(1) == Some(num) {
            self.hi = num;
            true
        } else {
            false
        }
    }

    /// Check whether `num` falls inside the range.
    pub fn contains(&self, num: ChunkNum) -> bool {
        self.lo <= num && num <= self.hi
    }

    /// Number of chunk numbers covered.
    pub fn len(&self) -> u64 {
        u64::from(self.hi - self.lo) + 1
    }

    /// Ranges are never empty; provided for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lo == self.hi {
            write!(f, "{}", self.lo)
        } else {
            write!(f, "{}-{}", self.lo, self.hi)
        }
    }
}

/// A 4-byte grouping key derived from a host name.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostKey([u8; HOST_KEY_LEN]);

impl HostKey {
    /// Create a HostKey from a fixed array.
    pub const fn new(bytes: [u8; HOST_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create a HostKey from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; HOST_KEY_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Get the raw bytes of this HostKey.
    pub fn as_bytes(&self) -> &[u8; HOST_KEY_LEN] {
        &self.0
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostKey({})", hex::encode(self.0))
    }
}

/// A published hash prefix, 0 to 32 bytes long.
///
/// A zero-length prefix only appears as the empty-chunk sentinel.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Prefix(Vec<u8>);

impl Prefix {
    /// Create a Prefix from raw bytes. Returns `None` if longer than 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        (bytes.len() <= MAX_PREFIX_LEN).then(|| Self(bytes.to_vec()))
    }

    /// The empty prefix.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Get the raw bytes of this Prefix.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty-chunk sentinel.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HostKey> for Prefix {
    /// The "bare host key" record: the host key is its own prefix.
    fn from(key: HostKey) -> Self {
        Self(key.0.to_vec())
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prefix({})", hex::encode(&self.0))
    }
}

/// A complete 32-byte hash confirming a match.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FullHash([u8; FULL_HASH_LEN]);

impl FullHash {
    /// Create a FullHash from a fixed array.
    pub const fn new(bytes: [u8; FULL_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Create a FullHash from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; FULL_HASH_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Get the raw bytes of this FullHash.
    pub fn as_bytes(&self) -> &[u8; FULL_HASH_LEN] {
        &self.0
    }
}

impl fmt::Display for FullHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for FullHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FullHash({}..)", &hex::encode(self.0)[..16])
    }
}

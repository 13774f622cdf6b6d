//! Error types for the shavar wire format.

use thiserror::Error;

/// Integrity and grammar violations found while decoding protocol data.
///
/// Any of these aborts the current sync cycle before the store is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Range notation could not be parsed.
    #[error("malformed range: {0:?}")]
    MalformedRange(String),

    /// Chunk body framing did not consume exactly the declared bytes.
    #[error("chunk length mismatch: expected {expected} bytes, consumed {consumed}")]
    ChunkLengthMismatch {
        /// Declared or available length.
        expected: usize,
        /// Offset actually reached (or required) by the decoder.
        consumed: usize,
    },

    /// A list-scoped directive appeared before any `i:` line.
    #[error("{0:?} line received before a list was set")]
    MissingListContext(String),

    /// Redirect chunk header carried a command other than `a` or `s`.
    #[error("unknown chunk command {0:?}")]
    UnknownChunkCommand(String),

    /// Redirect data ended before a header newline was found.
    #[error("truncated chunk header at offset {offset} of {len}")]
    TruncatedHeader {
        /// Offset where the header started.
        offset: usize,
        /// Total length of the redirect body.
        len: usize,
    },

    /// Redirect chunk header fields were missing or non-numeric.
    #[error("malformed chunk header: {0:?}")]
    MalformedHeader(String),

    /// A known top-level directive carried an unparseable value.
    #[error("malformed directive: {0:?}")]
    MalformedDirective(String),

    /// Prefix length other than 4 or 32.
    #[error("unsupported hash length: {0}")]
    UnsupportedHashLength(usize),

    /// Full-hash request built from prefixes of different lengths.
    #[error("prefixes in one full-hash request must share a length")]
    MixedPrefixLengths,

    /// Prefix outside the 0..=32 byte bound.
    #[error("invalid prefix of {0} bytes")]
    InvalidPrefix(usize),
}

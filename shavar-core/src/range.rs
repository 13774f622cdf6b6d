//! Compact range notation for chunk numbers.
//!
//! The client tells the server which chunks it already holds with a
//! comma-separated list of runs: `1-3,5-6,8,10,12`. A run of one chunk is
//! written as the bare number.

use shavar_types::{ChunkNum, ChunkRange, ProtocolError};

/// Encode sorted, distinct chunk numbers as range notation.
///
/// Returns an empty string for empty input.
pub fn encode(nums: &[ChunkNum]) -> String {
    runs(nums)
        .iter()
        .map(ChunkRange::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Group sorted, distinct chunk numbers into maximal consecutive runs.
pub fn runs(nums: &[ChunkNum]) -> Vec<ChunkRange> {
    let mut out: Vec<ChunkRange> = Vec::new();
    for &num in nums {
        if let Some(run) = out.last_mut() {
            if run.try_extend(num) {
                continue;
            }
        }
        out.push(ChunkRange::single(num));
    }
    out
}

/// Decode range notation into `(lo, hi)` pairs, preserving input order.
pub fn decode(s: &str) -> Result<Vec<ChunkRange>, ProtocolError> {
    s.trim().split(',').map(decode_part).collect()
}

fn decode_part(part: &str) -> Result<ChunkRange, ProtocolError> {
    let malformed = || ProtocolError::MalformedRange(part.to_string());
    let part = part.trim();
    if part.is_empty() {
        return Err(malformed());
    }

    match part.split_once('-') {
        None => part.parse().map(ChunkRange::single).map_err(|_| malformed()),
        Some((lo, hi)) => {
            let lo: ChunkNum = lo.parse().map_err(|_| malformed())?;
            let hi: ChunkNum = hi.parse().map_err(|_| malformed())?;
            ChunkRange::new(lo, hi).ok_or_else(malformed)
        }
    }
}

/// Expand ranges back into the individual chunk numbers they cover.
pub fn expand(ranges: &[ChunkRange]) -> Vec<ChunkNum> {
    ranges.iter().flat_map(|r| r.lo()..=r.hi()).collect()
}

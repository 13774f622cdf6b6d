//! Full-hash query codec for the `gethash` endpoint.
//!
//! Request: `<prefix_len>:<total_len>\n` followed by the concatenated prefix
//! bytes. Response: repeated `list:add_chunk:hashdatalen\n<hashdata>` blocks,
//! where `hashdata` is a whole number of 32-byte hashes.

use shavar_types::{ChunkNum, FullHash, ListName, Prefix, ProtocolError, FULL_HASH_LEN};

/// One hash returned by the `gethash` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullHashMatch {
    /// List the hash was published in.
    pub list: ListName,
    /// Add chunk the hash belongs to.
    pub add_chunk: ChunkNum,
    /// The full hash.
    pub hash: FullHash,
}

/// Build a `gethash` request body.
///
/// Every prefix must have the same length.
pub fn encode_request(prefixes: &[Prefix]) -> Result<Vec<u8>, ProtocolError> {
    let prefix_len = prefixes.first().map_or(0, Prefix::len);
    if prefixes.iter().any(|p| p.len() != prefix_len) {
        return Err(ProtocolError::MixedPrefixLengths);
    }

    let total = prefix_len * prefixes.len();
    let mut body = format!("{}:{}\n", prefix_len, total).into_bytes();
    body.reserve(total);
    for prefix in prefixes {
        body.extend_from_slice(prefix.as_bytes());
    }
    Ok(body)
}

/// Parse a `gethash` response body. An empty body means no matches.
pub fn parse_response(raw: &[u8]) -> Result<Vec<FullHashMatch>, ProtocolError> {
    let mut offset = 0;
    let mut out = Vec::new();

    while offset < raw.len() {
        let newline = raw[offset..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|pos| offset + pos)
            .ok_or(ProtocolError::TruncatedHeader {
                offset,
                len: raw.len(),
            })?;

        let header = String::from_utf8_lossy(&raw[offset..newline]);
        let malformed = || ProtocolError::MalformedHeader(header.to_string());
        let parts: Vec<&str> = header.split(':').collect();
        let [list, add_chunk, data_len] = parts.as_slice() else {
            return Err(malformed());
        };
        if list.is_empty() {
            return Err(malformed());
        }
        let add_chunk: ChunkNum = add_chunk.parse().map_err(|_| malformed())?;
        let data_len: usize = data_len.parse().map_err(|_| malformed())?;

        let data_start = newline + 1;
        let length_mismatch = ProtocolError::ChunkLengthMismatch {
            expected: data_len,
            consumed: raw.len() - data_start,
        };
        let data_end = data_start
            .checked_add(data_len)
            .ok_or_else(|| length_mismatch.clone())?;
        let data = raw.get(data_start..data_end).ok_or(length_mismatch)?;
        if data_len % FULL_HASH_LEN != 0 {
            return Err(ProtocolError::ChunkLengthMismatch {
                expected: data_len - data_len % FULL_HASH_LEN,
                consumed: data_len,
            });
        }

        let list = ListName::new(*list);
        for bytes in data.chunks_exact(FULL_HASH_LEN) {
            let hash = FullHash::from_bytes(bytes)
                .ok_or(ProtocolError::InvalidPrefix(bytes.len()))?;
            out.push(FullHashMatch {
                list: list.clone(),
                add_chunk,
                hash,
            });
        }

        offset = data_end;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_header_and_body() {
        let prefixes = vec![
            Prefix::from_bytes(b"abcd").unwrap(),
            Prefix::from_bytes(b"efgh").unwrap(),
        ];
        assert_eq!(encode_request(&prefixes).unwrap(), b"4:8\nabcdefgh".to_vec());
    }

    #[test]
    fn request_rejects_mixed_lengths() {
        let prefixes = vec![
            Prefix::from_bytes(b"abcd").unwrap(),
            Prefix::from_bytes(&[0u8; 32]).unwrap(),
        ];
        assert_eq!(
            encode_request(&prefixes).unwrap_err(),
            ProtocolError::MixedPrefixLengths
        );
    }

    #[test]
    fn response_with_two_blocks() {
        let mut raw = b"goog-malware-shavar:20:64\n".to_vec();
        raw.extend_from_slice(&[1u8; 32]);
        raw.extend_from_slice(&[2u8; 32]);
        raw.extend_from_slice(b"googpub-phish-shavar:30:32\n");
        raw.extend_from_slice(&[3u8; 32]);

        let matches = parse_response(&raw).unwrap();
        assert_eq!(matches.len(), 3);
        assert_eq!(matches[0].list, ListName::from("goog-malware-shavar"));
        assert_eq!(matches[0].add_chunk, 20);
        assert_eq!(matches[1].hash, FullHash::new([2; 32]));
        assert_eq!(matches[2].list, ListName::from("googpub-phish-shavar"));
        assert_eq!(matches[2].add_chunk, 30);
    }

    #[test]
    fn empty_response_has_no_matches() {
        assert!(parse_response(b"").unwrap().is_empty());
    }

    #[test]
    fn response_hash_data_must_be_whole_hashes() {
        let mut raw = b"goog-malware-shavar:20:10\n".to_vec();
        raw.extend_from_slice(b"0123456789");
        assert!(matches!(
            parse_response(&raw),
            Err(ProtocolError::ChunkLengthMismatch { .. })
        ));
    }

    #[test]
    fn response_huge_data_length() {
        assert_eq!(
            parse_response(b"l:1:18446744073709551615\n").unwrap_err(),
            ProtocolError::ChunkLengthMismatch {
                expected: usize::MAX,
                consumed: 0
            }
        );
    }

    #[test]
    fn response_short_data() {
        let mut raw = b"goog-malware-shavar:20:32\n".to_vec();
        raw.extend_from_slice(&[1u8; 16]);
        assert_eq!(
            parse_response(&raw).unwrap_err(),
            ProtocolError::ChunkLengthMismatch {
                expected: 32,
                consumed: 16
            }
        );
    }

    #[test]
    fn response_bad_header() {
        assert!(matches!(
            parse_response(b"goog-malware-shavar:x:32\n"),
            Err(ProtocolError::MalformedHeader(_))
        ));
        assert!(matches!(
            parse_response(b"goog-malware-shavar:1:32"),
            Err(ProtocolError::TruncatedHeader { .. })
        ));
    }
}

//! Binary shavar chunk bodies.
//!
//! An add chunk body is a sequence of host-key groups:
//!
//! ```text
//! +----------+-------+---------------------------+
//! | host key | count | count x prefix (hash_len) |
//! | 4 bytes  | 1 byte|                           |
//! +----------+-------+---------------------------+
//! ```
//!
//! A sub chunk uses the same framing but every record is preceded by the
//! 4-byte big-endian add chunk number it retracts. A count of zero means the
//! host key is itself the prefix; for sub chunks the add chunk number then
//! follows the count directly.
//!
//! The decoder must consume the body exactly. Any overrun or leftover byte is
//! an integrity failure, never a warning.

use shavar_types::{
    AddEntry, ChunkNum, Directive, HostKey, ListName, Prefix, ProtocolError, SubEntry,
    HOST_KEY_LEN,
};

/// Prefix lengths the protocol publishes.
pub const SUPPORTED_HASH_LENS: [usize; 2] = [4, 32];

/// Decode an add chunk body into `AddInsert` directives.
pub fn decode_add_chunk(
    list: &ListName,
    add_chunk: ChunkNum,
    hash_len: usize,
    raw: &[u8],
) -> Result<Vec<Directive>, ProtocolError> {
    check_hash_len(hash_len)?;
    let mut reader = Reader::new(raw);
    let mut out = Vec::new();

    while !reader.is_done() {
        let host_key = reader.host_key()?;
        let count = reader.u8()?;

        if count == 0 {
            out.push(Directive::AddInsert(AddEntry {
                list: list.clone(),
                add_chunk,
                host_key,
                prefix: Prefix::from(host_key),
            }));
            continue;
        }

        for _ in 0..count {
            let prefix = reader.prefix(hash_len)?;
            out.push(Directive::AddInsert(AddEntry {
                list: list.clone(),
                add_chunk,
                host_key,
                prefix,
            }));
        }
    }

    reader.finish()?;
    Ok(out)
}

/// Decode a sub chunk body into `SubInsert` directives.
pub fn decode_sub_chunk(
    list: &ListName,
    sub_chunk: ChunkNum,
    hash_len: usize,
    raw: &[u8],
) -> Result<Vec<Directive>, ProtocolError> {
    check_hash_len(hash_len)?;
    let mut reader = Reader::new(raw);
    let mut out = Vec::new();

    while !reader.is_done() {
        let host_key = reader.host_key()?;
        let count = reader.u8()?;

        if count == 0 {
            let add_chunk = reader.u32_be()?;
            out.push(Directive::SubInsert(SubEntry {
                list: list.clone(),
                add_chunk,
                sub_chunk,
                host_key,
                prefix: Prefix::from(host_key),
            }));
            continue;
        }

        for _ in 0..count {
            let add_chunk = reader.u32_be()?;
            let prefix = reader.prefix(hash_len)?;
            out.push(Directive::SubInsert(SubEntry {
                list: list.clone(),
                add_chunk,
                sub_chunk,
                host_key,
                prefix,
            }));
        }
    }

    reader.finish()?;
    Ok(out)
}

fn check_hash_len(hash_len: usize) -> Result<(), ProtocolError> {
    if SUPPORTED_HASH_LENS.contains(&hash_len) {
        Ok(())
    } else {
        Err(ProtocolError::UnsupportedHashLength(hash_len))
    }
}

/// Bounds-checked cursor over a chunk body.
struct Reader<'a> {
    raw: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(raw: &'a [u8]) -> Self {
        Self { raw, offset: 0 }
    }

    fn is_done(&self) -> bool {
        self.offset >= self.raw.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self.offset + n;
        let bytes = self
            .raw
            .get(self.offset..end)
            .ok_or(ProtocolError::ChunkLengthMismatch {
                expected: self.raw.len(),
                consumed: end,
            })?;
        self.offset = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn u32_be(&mut self) -> Result<u32, ProtocolError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn host_key(&mut self) -> Result<HostKey, ProtocolError> {
        let bytes = self.take(HOST_KEY_LEN)?;
        HostKey::from_bytes(bytes).ok_or(ProtocolError::InvalidPrefix(bytes.len()))
    }

    fn prefix(&mut self, hash_len: usize) -> Result<Prefix, ProtocolError> {
        let bytes = self.take(hash_len)?;
        Prefix::from_bytes(bytes).ok_or(ProtocolError::InvalidPrefix(bytes.len()))
    }

    fn finish(self) -> Result<(), ProtocolError> {
        if self.offset == self.raw.len() {
            Ok(())
        } else {
            Err(ProtocolError::ChunkLengthMismatch {
                expected: self.raw.len(),
                consumed: self.offset,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> ListName {
        ListName::from("goog-malware-shavar")
    }

    fn adds(directives: &[Directive]) -> Vec<&AddEntry> {
        directives
            .iter()
            .map(|d| match d {
                Directive::AddInsert(entry) => entry,
                other => panic!("Expected AddInsert, got {:?}", other),
            })
            .collect()
    }

    fn subs(directives: &[Directive]) -> Vec<&SubEntry> {
        directives
            .iter()
            .map(|d| match d {
                Directive::SubInsert(entry) => entry,
                other => panic!("Expected SubInsert, got {:?}", other),
            })
            .collect()
    }

    #[test]
    fn add_chunk_with_two_prefixes() {
        let mut raw = vec![0xaa, 0xbb, 0xcc, 0xdd, 2];
        raw.extend_from_slice(b"pfx1");
        raw.extend_from_slice(b"pfx2");

        let out = decode_add_chunk(&list(), 17, 4, &raw).unwrap();
        let entries = adds(&out);

        assert_eq!(entries.len(), 2);
        for entry in &entries {
            assert_eq!(entry.host_key, HostKey::new([0xaa, 0xbb, 0xcc, 0xdd]));
            assert_eq!(entry.add_chunk, 17);
        }
        assert_eq!(entries[0].prefix.as_bytes(), b"pfx1");
        assert_eq!(entries[1].prefix.as_bytes(), b"pfx2");
    }

    #[test]
    fn add_chunk_trailing_byte_is_rejected() {
        let mut raw = vec![0xaa, 0xbb, 0xcc, 0xdd, 2];
        raw.extend_from_slice(b"pfx1pfx2");
        raw.push(0);

        let err = decode_add_chunk(&list(), 17, 4, &raw).unwrap_err();
        assert!(matches!(err, ProtocolError::ChunkLengthMismatch { .. }));
    }

    #[test]
    fn add_chunk_bare_host_key() {
        let raw = [1, 2, 3, 4, 0];
        let out = decode_add_chunk(&list(), 5, 32, &raw).unwrap();
        let entries = adds(&out);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].prefix.as_bytes(), &[1, 2, 3, 4]);
    }

    #[test]
    fn add_chunk_multiple_host_groups() {
        let mut raw = vec![1, 1, 1, 1, 0];
        raw.extend_from_slice(&[2, 2, 2, 2, 1]);
        raw.extend_from_slice(&[0x55; 32]);

        let out = decode_add_chunk(&list(), 9, 32, &raw).unwrap();
        let entries = adds(&out);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].host_key, HostKey::new([2, 2, 2, 2]));
        assert_eq!(entries[1].prefix.len(), 32);
    }

    #[test]
    fn add_chunk_truncated_prefix_is_rejected() {
        let raw = [1, 2, 3, 4, 1, 0xff, 0xff];
        let err = decode_add_chunk(&list(), 1, 4, &raw).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::ChunkLengthMismatch {
                expected: 7,
                consumed: 9
            }
        );
    }

    #[test]
    fn sub_chunk_with_records() {
        let mut raw = vec![9, 9, 9, 9, 2];
        raw.extend_from_slice(&100u32.to_be_bytes());
        raw.extend_from_slice(b"abcd");
        raw.extend_from_slice(&101u32.to_be_bytes());
        raw.extend_from_slice(b"efgh");

        let out = decode_sub_chunk(&list(), 40, 4, &raw).unwrap();
        let entries = subs(&out);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].add_chunk, 100);
        assert_eq!(entries[0].sub_chunk, 40);
        assert_eq!(entries[0].prefix.as_bytes(), b"abcd");
        assert_eq!(entries[1].add_chunk, 101);
        assert_eq!(entries[1].prefix.as_bytes(), b"efgh");
    }

    #[test]
    fn sub_chunk_bare_host_key_reads_add_chunk() {
        let mut raw = vec![7, 7, 7, 7, 0];
        raw.extend_from_slice(&16_777_216u32.to_be_bytes());

        let out = decode_sub_chunk(&list(), 2, 4, &raw).unwrap();
        let entries = subs(&out);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].add_chunk, 16_777_216);
        assert_eq!(entries[0].prefix.as_bytes(), &[7, 7, 7, 7]);
    }

    #[test]
    fn sub_chunk_missing_add_number_is_rejected() {
        let raw = [7, 7, 7, 7, 0, 0, 0];
        let err = decode_sub_chunk(&list(), 2, 4, &raw).unwrap_err();
        assert!(matches!(err, ProtocolError::ChunkLengthMismatch { .. }));
    }

    #[test]
    fn unsupported_hash_length() {
        let err = decode_add_chunk(&list(), 1, 8, &[1, 2, 3, 4, 0]).unwrap_err();
        assert_eq!(err, ProtocolError::UnsupportedHashLength(8));
    }
}

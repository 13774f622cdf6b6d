//! Delta response grammar.
//!
//! The downloads endpoint answers with newline-separated `key:value`
//! records. Most records map straight onto a [`Directive`]; `u:` records
//! point at redirect data that must be fetched and parsed with
//! [`parse_redirect_response`]. Fetching is I/O, so this module only reports
//! the redirect as a [`ResponseItem::Redirect`] and leaves the splicing to the
//! caller.

use shavar_types::{ChunkNum, Directive, ListName, ProtocolError};

use crate::chunk::{decode_add_chunk, decode_sub_chunk};
use crate::range;

/// One item of a parsed download response, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseItem {
    /// A directive ready to apply.
    Directive(Directive),
    /// Redirect data to fetch and parse for `list`.
    Redirect {
        /// List context in effect when the `u:` line was read.
        list: ListName,
        /// Normalised URL to fetch.
        url: String,
    },
    /// A line with a keyword this client does not understand.
    Ignored(String),
}

/// Parse the top-level download response.
///
/// Unknown keywords are returned as [`ResponseItem::Ignored`] rather than
/// failing the parse.
pub fn parse_download_response(raw: &[u8]) -> Result<Vec<ResponseItem>, ProtocolError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| ProtocolError::MalformedDirective(format!("non-UTF-8 response: {}", e)))?;

    let mut current: Option<ListName> = None;
    let mut items = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((key, value)) = line.split_once(':') else {
            items.push(ResponseItem::Ignored(line.to_string()));
            continue;
        };

        match key {
            "n" => {
                let seconds = value
                    .trim()
                    .parse()
                    .map_err(|_| ProtocolError::MalformedDirective(line.to_string()))?;
                items.push(ResponseItem::Directive(Directive::SetTimeout { seconds }));
            }
            "e" if value == "pleaserekey" => items.push(ResponseItem::Directive(Directive::Rekey)),
            "r" if value == "pleasereset" => {
                items.push(ResponseItem::Directive(Directive::ResetAll))
            }
            "i" => {
                let name = value.trim();
                if name.is_empty() {
                    return Err(ProtocolError::MalformedDirective(line.to_string()));
                }
                current = Some(ListName::new(name));
            }
            "u" => {
                let list = require_list(&current, key)?;
                items.push(ResponseItem::Redirect {
                    list,
                    url: normalize_redirect_url(value),
                });
            }
            "ad" => {
                let list = require_list(&current, key)?;
                for range in range::decode(value)? {
                    items.push(ResponseItem::Directive(Directive::AddDelete {
                        list: list.clone(),
                        range,
                    }));
                }
            }
            "sd" => {
                let list = require_list(&current, key)?;
                for range in range::decode(value)? {
                    items.push(ResponseItem::Directive(Directive::SubDelete {
                        list: list.clone(),
                        range,
                    }));
                }
            }
            _ => items.push(ResponseItem::Ignored(line.to_string())),
        }
    }

    Ok(items)
}

fn require_list(current: &Option<ListName>, key: &str) -> Result<ListName, ProtocolError> {
    current
        .clone()
        .ok_or_else(|| ProtocolError::MissingListContext(key.to_string()))
}

/// Turn the value of a `u:` line into a fetchable URL.
///
/// Servers send the redirect without a scheme and may append a `,mac`
/// suffix; the suffix is dropped and `http://` is assumed.
pub fn normalize_redirect_url(value: &str) -> String {
    let url = value.trim();
    let url = url.split_once(',').map_or(url, |(u, _)| u);
    if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

/// Parse redirect data: repeated `cmd:chunknum:hashlen:chunklen\n` headers
/// each followed by exactly `chunklen` bytes of chunk body.
pub fn parse_redirect_response(
    list: &ListName,
    raw: &[u8],
) -> Result<Vec<Directive>, ProtocolError> {
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

        let header = ChunkHeader::parse(&raw[offset..newline])?;
        let body_start = newline + 1;
        let length_mismatch = ProtocolError::ChunkLengthMismatch {
            expected: header.chunk_len,
            consumed: raw.len() - body_start,
        };
        let body_end = body_start
            .checked_add(header.chunk_len)
            .ok_or_else(|| length_mismatch.clone())?;
        let body = raw.get(body_start..body_end).ok_or(length_mismatch)?;

        match (header.command, body.is_empty()) {
            (ChunkCommand::Add, true) => out.push(Directive::AddEmpty {
                list: list.clone(),
                add_chunk: header.chunk_num,
            }),
            (ChunkCommand::Sub, true) => out.push(Directive::SubEmpty {
                list: list.clone(),
                sub_chunk: header.chunk_num,
            }),
            (ChunkCommand::Add, false) => {
                out.extend(decode_add_chunk(list, header.chunk_num, header.hash_len, body)?)
            }
            (ChunkCommand::Sub, false) => {
                out.extend(decode_sub_chunk(list, header.chunk_num, header.hash_len, body)?)
            }
        }

        offset = body_end;
    }

    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkCommand {
    Add,
    Sub,
}

#[derive(Debug)]
struct ChunkHeader {
    command: ChunkCommand,
    chunk_num: ChunkNum,
    hash_len: usize,
    chunk_len: usize,
}

impl ChunkHeader {
    fn parse(raw: &[u8]) -> Result<Self, ProtocolError> {
        let text = String::from_utf8_lossy(raw);
        let malformed = || ProtocolError::MalformedHeader(text.to_string());

        let parts: Vec<&str> = text.trim_end_matches('\r').split(':').collect();
        let command = match parts[0] {
            "a" => ChunkCommand::Add,
            "s" => ChunkCommand::Sub,
            other => return Err(ProtocolError::UnknownChunkCommand(other.to_string())),
        };

        let [_, chunk_num, hash_len, chunk_len] = parts.as_slice() else {
            return Err(malformed());
        };

        let chunk_num = chunk_num.parse().map_err(|_| malformed())?;
        let hash_len = hash_len.parse().map_err(|_| malformed())?;
        let chunk_len = chunk_len.parse().map_err(|_| malformed())?;

        Ok(Self {
            command,
            chunk_num,
            hash_len,
            chunk_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shavar_types::{ChunkRange, HostKey};

    fn list() -> ListName {
        ListName::from("goog-malware-shavar")
    }

    fn directives(items: &[ResponseItem]) -> Vec<&Directive> {
        items
            .iter()
            .filter_map(|item| match item {
                ResponseItem::Directive(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn parses_control_lines() {
        let raw = b"n:1200\ne:pleaserekey\nr:pleasereset\n";
        let items = parse_download_response(raw).unwrap();

        assert_eq!(
            directives(&items),
            vec![
                &Directive::SetTimeout { seconds: 1200 },
                &Directive::Rekey,
                &Directive::ResetAll,
            ]
        );
    }

    #[test]
    fn list_scoped_deletes_follow_current_list() {
        let raw = b"i:goog-malware-shavar\nad:1-3,7\ni:googpub-phish-shavar\nsd:5\n";
        let items = parse_download_response(raw).unwrap();
        let ds = directives(&items);

        assert_eq!(ds.len(), 3);
        assert_eq!(
            ds[0],
            &Directive::AddDelete {
                list: list(),
                range: ChunkRange::new(1, 3).unwrap()
            }
        );
        assert_eq!(
            ds[1],
            &Directive::AddDelete {
                list: list(),
                range: ChunkRange::single(7)
            }
        );
        assert_eq!(
            ds[2],
            &Directive::SubDelete {
                list: ListName::from("googpub-phish-shavar"),
                range: ChunkRange::single(5)
            }
        );
    }

    #[test]
    fn redirect_keeps_position_and_list() {
        let raw = b"i:goog-malware-shavar\nu:cache.example.com/first,deadbeef\nad:4\nu:https://cache.example.com/second\n";
        let items = parse_download_response(raw).unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(
            items[0],
            ResponseItem::Redirect {
                list: list(),
                url: "http://cache.example.com/first".into()
            }
        );
        assert!(matches!(items[1], ResponseItem::Directive(Directive::AddDelete { .. })));
        assert_eq!(
            items[2],
            ResponseItem::Redirect {
                list: list(),
                url: "https://cache.example.com/second".into()
            }
        );
    }

    #[test]
    fn unknown_lines_are_skipped() {
        let raw = b"n:60\nx:whatever\nnot a record\ne:somethingelse\n\n";
        let items = parse_download_response(raw).unwrap();

        assert_eq!(directives(&items), vec![&Directive::SetTimeout { seconds: 60 }]);
        assert_eq!(
            items
                .iter()
                .filter(|i| matches!(i, ResponseItem::Ignored(_)))
                .count(),
            3
        );
    }

    #[test]
    fn list_scoped_line_without_list_fails() {
        for raw in [&b"ad:1-2\n"[..], b"sd:3\n", b"u:cache.example.com/x\n"] {
            let err = parse_download_response(raw).unwrap_err();
            assert!(matches!(err, ProtocolError::MissingListContext(_)));
        }
    }

    #[test]
    fn bad_timeout_is_malformed() {
        let err = parse_download_response(b"n:soon\n").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedDirective(_)));
    }

    #[test]
    fn bad_range_propagates() {
        let err = parse_download_response(b"i:goog-malware-shavar\nad:1,,2\n").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedRange(_)));
    }

    #[test]
    fn redirect_add_and_sub_chunks() {
        let mut raw = b"a:5:4:9\n".to_vec();
        raw.extend_from_slice(&[1, 2, 3, 4, 1]);
        raw.extend_from_slice(b"wxyz");
        raw.extend_from_slice(b"s:6:4:9\n");
        raw.extend_from_slice(&[1, 2, 3, 4, 0]);
        raw.extend_from_slice(&5u32.to_be_bytes());

        let ds = parse_redirect_response(&list(), &raw).unwrap();
        assert_eq!(ds.len(), 2);
        match &ds[0] {
            Directive::AddInsert(entry) => {
                assert_eq!(entry.add_chunk, 5);
                assert_eq!(entry.host_key, HostKey::new([1, 2, 3, 4]));
                assert_eq!(entry.prefix.as_bytes(), b"wxyz");
            }
            other => panic!("Expected AddInsert, got {:?}", other),
        }
        match &ds[1] {
            Directive::SubInsert(entry) => {
                assert_eq!(entry.sub_chunk, 6);
                assert_eq!(entry.add_chunk, 5);
            }
            other => panic!("Expected SubInsert, got {:?}", other),
        }
    }

    #[test]
    fn redirect_empty_chunks() {
        let ds = parse_redirect_response(&list(), b"a:10:4:0\ns:11:32:0\n").unwrap();
        assert_eq!(
            ds,
            vec![
                Directive::AddEmpty {
                    list: list(),
                    add_chunk: 10
                },
                Directive::SubEmpty {
                    list: list(),
                    sub_chunk: 11
                },
            ]
        );
    }

    #[test]
    fn redirect_unknown_command() {
        let err = parse_redirect_response(&list(), b"x:1:4:0\n").unwrap_err();
        assert_eq!(err, ProtocolError::UnknownChunkCommand("x".into()));
    }

    #[test]
    fn redirect_missing_newline() {
        let err = parse_redirect_response(&list(), b"a:1:4:0\na:2:4").unwrap_err();
        assert_eq!(err, ProtocolError::TruncatedHeader { offset: 8, len: 13 });
    }

    #[test]
    fn redirect_short_body() {
        let err = parse_redirect_response(&list(), b"a:1:4:9\n\x01\x02").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::ChunkLengthMismatch {
                expected: 9,
                consumed: 2
            }
        );
    }

    #[test]
    fn redirect_unknown_command_wins_over_field_count() {
        let err = parse_redirect_response(&list(), b"z:7
").unwrap_err();
        assert_eq!(err, ProtocolError::UnknownChunkCommand("z".into()));
    }

    #[test]
    fn redirect_huge_chunk_length() {
        let err = parse_redirect_response(&list(), b"a:1:4:18446744073709551615
").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::ChunkLengthMismatch {
                expected: usize::MAX,
                consumed: 0
            }
        );
    }

    #[test]
    fn redirect_malformed_header() {
        let err = parse_redirect_response(&list(), b"a:1:4\n").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedHeader(_)));
        let err = parse_redirect_response(&list(), b"a:one:4:0\n").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedHeader(_)));
    }

    #[test]
    fn redirect_url_normalisation() {
        assert_eq!(
            normalize_redirect_url("safebrowsing-cache.google.com/safebrowsing/rd/abc,mac"),
            "http://safebrowsing-cache.google.com/safebrowsing/rd/abc"
        );
        assert_eq!(normalize_redirect_url("http://host/x"), "http://host/x");
    }
}

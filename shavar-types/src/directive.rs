//! Reconciliation records and the directives that produce them.

use serde::{Deserialize, Serialize};

use crate::{ChunkNum, ChunkRange, FullHash, HostKey, ListName, Prefix};

/// One prefix published under one add chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddEntry {
    /// List the prefix belongs to.
    pub list: ListName,
    /// Add chunk that published it.
    pub add_chunk: ChunkNum,
    /// Host key the prefix is grouped under.
    pub host_key: HostKey,
    /// The prefix bytes.
    pub prefix: Prefix,
}

/// A retraction of the add entry with the same join key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubEntry {
    /// List the retraction belongs to.
    pub list: ListName,
    /// Add chunk whose entry is retracted.
    pub add_chunk: ChunkNum,
    /// Sub chunk carrying the retraction.
    pub sub_chunk: ChunkNum,
    /// Host key of the retracted entry.
    pub host_key: HostKey,
    /// Prefix of the retracted entry.
    pub prefix: Prefix,
}

impl SubEntry {
    /// Whether this retraction cancels the given add entry.
    pub fn retracts(&self, add: &AddEntry) -> bool {
        self.list == add.list
            && self.add_chunk == add.add_chunk
            && self.host_key == add.host_key
            && self.prefix == add.prefix
    }
}

/// How long a full hash stays trusted after it was last confirmed (45 minutes).
pub const FULL_HASH_TTL_SECS: u64 = 45 * 60;

/// A verified full hash, trusted for a limited time after `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FullHashEntry {
    /// List the hash was reported for.
    pub list: ListName,
    /// Add chunk the hash belongs to.
    pub add_chunk: ChunkNum,
    /// The 32-byte hash.
    pub hash: FullHash,
    /// Unix timestamp (seconds) when the hash was last confirmed.
    pub created_at: u64,
}

impl FullHashEntry {
    /// Oldest `created_at` still trusted at `now`.
    pub fn cutoff(now: u64) -> u64 {
        now.saturating_sub(FULL_HASH_TTL_SECS)
    }

    /// Whether the entry is still trusted at `now`.
    pub fn is_fresh(&self, now: u64) -> bool {
        self.created_at > Self::cutoff(now)
    }
}

/// A single reconciliation step decoded from an update response.
///
/// Directives must be applied in the order they were emitted: a later
/// delete may remove rows inserted earlier in the same batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Minimum seconds the server wants before the next poll.
    SetTimeout {
        /// Seconds until the next poll.
        seconds: u64,
    },
    /// Server asked the client to rotate its keys.
    Rekey,
    /// Server asked the client to wipe all local list data.
    ResetAll,
    /// Insert an add entry.
    AddInsert(AddEntry),
    /// Record an add chunk that carries no prefixes.
    AddEmpty {
        /// List the chunk belongs to.
        list: ListName,
        /// The empty add chunk.
        add_chunk: ChunkNum,
    },
    /// Delete add chunks (and everything keyed on them) in a range.
    AddDelete {
        /// List to delete from.
        list: ListName,
        /// Add chunk numbers to delete.
        range: ChunkRange,
    },
    /// Insert a sub entry.
    SubInsert(SubEntry),
    /// Record a sub chunk that carries no retractions.
    SubEmpty {
        /// List the chunk belongs to.
        list: ListName,
        /// The empty sub chunk.
        sub_chunk: ChunkNum,
    },
    /// Delete sub chunks in a range.
    SubDelete {
        /// List to delete from.
        list: ListName,
        /// Sub chunk numbers to delete.
        range: ChunkRange,
    },
}

impl Directive {
    /// Short action name, used in logs.
    pub fn action(&self) -> &'static str {
        match self {
            Self::SetTimeout { .. } => "set_timeout",
            Self::Rekey => "rekey",
            Self::ResetAll => "reset_all",
            Self::AddInsert(_) => "add_insert",
            Self::AddEmpty { .. } => "add_empty",
            Self::AddDelete { .. } => "add_delete",
            Self::SubInsert(_) => "sub_insert",
            Self::SubEmpty { .. } => "sub_empty",
            Self::SubDelete { .. } => "sub_delete",
        }
    }

    /// The list this directive is scoped to, if any.
    pub fn list(&self) -> Option<&ListName> {
        match self {
            Self::SetTimeout { .. } | Self::Rekey | Self::ResetAll => None,
            Self::AddInsert(entry) => Some(&entry.list),
            Self::SubInsert(entry) => Some(&entry.list),
            Self::AddEmpty { list, .. }
            | Self::AddDelete { list, .. }
            | Self::SubEmpty { list, .. }
            | Self::SubDelete { list, .. } => Some(list),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(prefix: &[u8]) -> AddEntry {
        AddEntry {
            list: ListName::from("goog-malware-shavar"),
            add_chunk: 7,
            host_key: HostKey::new([1, 2, 3, 4]),
            prefix: Prefix::from_bytes(prefix).unwrap(),
        }
    }

    #[test]
    fn sub_retracts_matching_add_only() {
        let sub = SubEntry {
            list: ListName::from("goog-malware-shavar"),
            add_chunk: 7,
            sub_chunk: 3,
            host_key: HostKey::new([1, 2, 3, 4]),
            prefix: Prefix::from_bytes(b"abcd").unwrap(),
        };
        assert!(sub.retracts(&add(b"abcd")));
        assert!(!sub.retracts(&add(b"abce")));
    }

    #[test]
    fn full_hash_freshness_window() {
        let entry = FullHashEntry {
            list: ListName::from("goog-malware-shavar"),
            add_chunk: 1,
            hash: crate::FullHash::new([9; 32]),
            created_at: 10_000,
        };
        assert!(entry.is_fresh(10_000 + 10 * 60));
        assert!(!entry.is_fresh(10_000 + 46 * 60));
    }

    #[test]
    fn directive_list_scope() {
        let list = ListName::from("googpub-phish-shavar");
        let d = Directive::AddDelete {
            list: list.clone(),
            range: ChunkRange::single(1),
        };
        assert_eq!(d.list(), Some(&list));
        assert_eq!(d.action(), "add_delete");
        assert_eq!(Directive::Rekey.list(), None);
    }
}

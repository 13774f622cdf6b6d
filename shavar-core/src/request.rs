//! Download request bodies.

use shavar_types::{ChunkNum, ListName};

use crate::range;

/// Chunk inventory for one list, as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListInventory {
    /// The list the inventory belongs to.
    pub list: ListName,
    /// Held add chunk numbers, ascending and distinct.
    pub adds: Vec<ChunkNum>,
    /// Held sub chunk numbers, ascending and distinct.
    pub subs: Vec<ChunkNum>,
}

impl ListInventory {
    /// Create an inventory for `list`.
    pub fn new(list: ListName, adds: Vec<ChunkNum>, subs: Vec<ChunkNum>) -> Self {
        Self { list, adds, subs }
    }
}

/// Format one request line: `<list>;a:<ranges>[:s:<ranges>]\n`.
///
/// Sections for empty inventories are left out. A list with nothing held
/// still produces `<list>;\n` so the server starts sending it.
pub fn format_list_request(inventory: &ListInventory) -> String {
    let mut line = format!("{};", inventory.list);

    if !inventory.adds.is_empty() {
        line.push_str("a:");
        line.push_str(&range::encode(&inventory.adds));
    }
    if !inventory.adds.is_empty() && !inventory.subs.is_empty() {
        line.push(':');
    }
    if !inventory.subs.is_empty() {
        line.push_str("s:");
        line.push_str(&range::encode(&inventory.subs));
    }

    line.push('\n');
    line
}

/// Concatenate the request lines for every list.
///
/// Returns an empty string when `lists` is empty.
pub fn format_download_request(lists: &[ListInventory]) -> String {
    lists.iter().map(format_list_request).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inv(adds: &[ChunkNum], subs: &[ChunkNum]) -> ListInventory {
        ListInventory::new(
            ListName::from("goog-malware-shavar"),
            adds.to_vec(),
            subs.to_vec(),
        )
    }

    #[test]
    fn adds_and_subs() {
        assert_eq!(
            format_list_request(&inv(&[1, 2, 3, 5], &[7, 8])),
            "goog-malware-shavar;a:1-3,5:s:7-8\n"
        );
    }

    #[test]
    fn adds_only() {
        assert_eq!(
            format_list_request(&inv(&[4], &[])),
            "goog-malware-shavar;a:4\n"
        );
    }

    #[test]
    fn subs_only() {
        assert_eq!(
            format_list_request(&inv(&[], &[2, 3])),
            "goog-malware-shavar;s:2-3\n"
        );
    }

    #[test]
    fn nothing_held() {
        assert_eq!(format_list_request(&inv(&[], &[])), "goog-malware-shavar;\n");
    }

    #[test]
    fn multiple_lists_concatenate() {
        let lists = vec![
            inv(&[1], &[]),
            ListInventory::new(ListName::from("googpub-phish-shavar"), vec![], vec![9]),
        ];
        assert_eq!(
            format_download_request(&lists),
            "goog-malware-shavar;a:1\ngoogpub-phish-shavar;s:9\n"
        );
        assert_eq!(format_download_request(&[]), "");
    }
}

//! Radix-tree index backend.

use bytes::Bytes;
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};

use crate::types::Position;
use crate::Result;

use super::{IndexIterator, Indexer};

/// In-memory radix-tree index.
///
/// The trie is not safe for concurrent mutation, so a reader-writer lock
/// serializes access.
pub struct RadixTreeIndex {
    tree: RwLock<Trie<Vec<u8>, Position>>,
}

impl RadixTreeIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(Trie::new()),
        }
    }
}

impl Default for RadixTreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer for RadixTreeIndex {
    fn put(&self, key: Bytes, pos: Position) -> Result<Option<Position>> {
        Ok(self.tree.write().insert(key.to_vec(), pos))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Position>> {
        Ok(self.tree.read().get(&key.to_vec()).copied())
    }

    fn delete(&self, key: &[u8]) -> Result<(Option<Position>, bool)> {
        let old = self.tree.write().remove(&key.to_vec());
        let removed = old.is_some();
        Ok((old, removed))
    }

    fn size(&self) -> Result<usize> {
        Ok(self.tree.read().len())
    }

    fn iterator(&self, reverse: bool) -> Result<IndexIterator> {
        let tree = self.tree.read();
        let mut items: Vec<(Bytes, Position)> = tree
            .iter()
            .map(|(k, v)| (Bytes::copy_from_slice(k), *v))
            .collect();
        // Trie traversal is prefix-ordered; the snapshot contract wants
        // byte-lexicographic order exactly.
        items.sort_by(|(a, _), (b, _)| a.cmp(b));
        if reverse {
            items.reverse();
        }
        Ok(IndexIterator::new(items, reverse))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(file_id: u32, offset: i64) -> Position {
        Position {
            file_id,
            offset,
            size: 10,
        }
    }

    #[test]
    fn test_put_get() {
        let index = RadixTreeIndex::new();

        assert_eq!(index.put(Bytes::from("key"), pos(1, 0)).unwrap(), None);
        assert_eq!(index.get(b"key").unwrap(), Some(pos(1, 0)));
        assert_eq!(index.get(b"missing").unwrap(), None);
    }

    #[test]
    fn test_put_returns_previous() {
        let index = RadixTreeIndex::new();

        index.put(Bytes::from("key"), pos(1, 0)).unwrap();
        let prev = index.put(Bytes::from("key"), pos(3, 128)).unwrap();
        assert_eq!(prev, Some(pos(1, 0)));
        assert_eq!(index.get(b"key").unwrap(), Some(pos(3, 128)));
    }

    #[test]
    fn test_delete() {
        let index = RadixTreeIndex::new();

        index.put(Bytes::from("key"), pos(1, 0)).unwrap();
        let (old, removed) = index.delete(b"key").unwrap();
        assert_eq!(old, Some(pos(1, 0)));
        assert!(removed);

        let (old, removed) = index.delete(b"key").unwrap();
        assert_eq!(old, None);
        assert!(!removed);
    }

    #[test]
    fn test_shared_prefixes() {
        let index = RadixTreeIndex::new();

        index.put(Bytes::from("app"), pos(0, 0)).unwrap();
        index.put(Bytes::from("apple"), pos(0, 10)).unwrap();
        index.put(Bytes::from("application"), pos(0, 20)).unwrap();

        assert_eq!(index.size().unwrap(), 3);
        assert_eq!(index.get(b"app").unwrap(), Some(pos(0, 0)));
        assert_eq!(index.get(b"apple").unwrap(), Some(pos(0, 10)));

        index.delete(b"apple").unwrap();
        assert_eq!(index.get(b"apple").unwrap(), None);
        assert_eq!(index.get(b"app").unwrap(), Some(pos(0, 0)));
        assert_eq!(index.get(b"application").unwrap(), Some(pos(0, 20)));
    }

    #[test]
    fn test_iterator_orders_keys() {
        let index = RadixTreeIndex::new();
        for key in ["bc-2", "ab-1", "cd-1", "bc-1"] {
            index.put(Bytes::from(key), pos(0, 0)).unwrap();
        }

        let mut it = index.iterator(false).unwrap();
        let mut keys = Vec::new();
        while it.valid() {
            keys.push(it.key().clone());
            it.next();
        }
        assert_eq!(keys, vec!["ab-1", "bc-1", "bc-2", "cd-1"]);

        let mut it = index.iterator(true).unwrap();
        it.seek(b"bc-1");
        assert!(it.valid());
        assert_eq!(it.key(), "bc-1");
    }
}

//! Ordered-tree index backend over a standard B-tree map.

use std::collections::BTreeMap;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::types::Position;
use crate::Result;

use super::{IndexIterator, Indexer};

/// In-memory ordered index.
///
/// The map itself is not safe for concurrent mutation, so a reader-writer
/// lock serializes access.
#[derive(Debug, Default)]
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Bytes, Position>>,
}

impl BTreeIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indexer for BTreeIndex {
    fn put(&self, key: Bytes, pos: Position) -> Result<Option<Position>> {
        Ok(self.tree.write().insert(key, pos))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Position>> {
        Ok(self.tree.read().get(key).copied())
    }

    fn delete(&self, key: &[u8]) -> Result<(Option<Position>, bool)> {
        let old = self.tree.write().remove(key);
        let removed = old.is_some();
        Ok((old, removed))
    }

    fn size(&self) -> Result<usize> {
        Ok(self.tree.read().len())
    }

    fn iterator(&self, reverse: bool) -> Result<IndexIterator> {
        let tree = self.tree.read();
        let items: Vec<(Bytes, Position)> = if reverse {
            tree.iter().rev().map(|(k, v)| (k.clone(), *v)).collect()
        } else {
            tree.iter().map(|(k, v)| (k.clone(), *v)).collect()
        };
        Ok(IndexIterator::new(items, reverse))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

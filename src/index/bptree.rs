//! Persistent B+-tree index backend.
//!
//! Positions live in a single-file B+-tree next to the data files, so the
//! index survives restarts and the bootstrap can skip the replay scan. The
//! backing store handles its own concurrency control; no outer lock is
//! needed.

use std::path::Path;

use bytes::Bytes;
use redb::{Database, Durability, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::types::{decode_record_pos, encode_record_pos, Position};
use crate::util::filename::bptree_index_file_path;
use crate::{Error, Result};

use super::{IndexIterator, Indexer};

const INDEX_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("cask-index");

fn backend_err<E: std::fmt::Display>(err: E) -> Error {
    Error::index_backend(err.to_string())
}

/// File-backed B+-tree index.
pub struct BPlusTreeIndex {
    db: Database,
    durability: Durability,
}

impl BPlusTreeIndex {
    /// Open (or create) the index file inside the data directory.
    pub fn open(dir_path: &Path, sync_writes: bool) -> Result<Self> {
        let db = Database::create(bptree_index_file_path(dir_path)).map_err(backend_err)?;

        // Materialize the table so later readers never race its creation.
        let txn = db.begin_write().map_err(backend_err)?;
        txn.open_table(INDEX_TABLE).map_err(backend_err)?;
        txn.commit().map_err(backend_err)?;

        Ok(Self {
            db,
            durability: if sync_writes {
                Durability::Immediate
            } else {
                Durability::Eventual
            },
        })
    }
}

impl Indexer for BPlusTreeIndex {
    fn put(&self, key: Bytes, pos: Position) -> Result<Option<Position>> {
        let mut txn = self.db.begin_write().map_err(backend_err)?;
        txn.set_durability(self.durability);

        let prev = {
            let mut table = txn.open_table(INDEX_TABLE).map_err(backend_err)?;
            let encoded = encode_record_pos(&pos);
            let old = table
                .insert(key.as_ref(), encoded.as_slice())
                .map_err(backend_err)?;
            old.and_then(|guard| decode_record_pos(guard.value()))
        };

        txn.commit().map_err(backend_err)?;
        Ok(prev)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Position>> {
        let txn = self.db.begin_read().map_err(backend_err)?;
        let table = txn.open_table(INDEX_TABLE).map_err(backend_err)?;
        let value = table.get(key).map_err(backend_err)?;
        Ok(value.and_then(|guard| decode_record_pos(guard.value())))
    }

    fn delete(&self, key: &[u8]) -> Result<(Option<Position>, bool)> {
        let mut txn = self.db.begin_write().map_err(backend_err)?;
        txn.set_durability(self.durability);

        let old = {
            let mut table = txn.open_table(INDEX_TABLE).map_err(backend_err)?;
            let old = table.remove(key).map_err(backend_err)?;
            old.and_then(|guard| decode_record_pos(guard.value()))
        };

        txn.commit().map_err(backend_err)?;
        let removed = old.is_some();
        Ok((old, removed))
    }

    fn size(&self) -> Result<usize> {
        let txn = self.db.begin_read().map_err(backend_err)?;
        let table = txn.open_table(INDEX_TABLE).map_err(backend_err)?;
        Ok(table.len().map_err(backend_err)? as usize)
    }

    fn iterator(&self, reverse: bool) -> Result<IndexIterator> {
        let txn = self.db.begin_read().map_err(backend_err)?;
        let table = txn.open_table(INDEX_TABLE).map_err(backend_err)?;

        let mut items = Vec::new();
        for entry in table.iter().map_err(backend_err)? {
            let (key, value) = entry.map_err(backend_err)?;
            if let Some(pos) = decode_record_pos(value.value()) {
                items.push((Bytes::copy_from_slice(key.value()), pos));
            }
        }
        if reverse {
            items.reverse();
        }
        Ok(IndexIterator::new(items, reverse))
    }

    fn close(&self) -> Result<()> {
        // The backing store flushes committed state on drop.
        Ok(())
    }
}

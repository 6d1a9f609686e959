//! Atomic write batches.
//!
//! A batch stages puts and deletes in memory and commits them as one unit:
//! every staged record is appended under the engine lock with a shared
//! sequence number, followed by a terminator record. Replay only publishes a
//! batch whose terminator made it to disk, so a crash mid-commit discards the
//! whole batch.

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::db::Engine;
use crate::options::{IndexType, WriteBatchOptions};
use crate::types::{key_with_seq, LogRecord, Position, RecordType};
use crate::{Error, Result};

/// Reserved user key of the batch terminator record.
pub(crate) const TXN_FIN_KEY: &[u8] = b"txn-fin";

/// A staged set of writes committed atomically.
pub struct WriteBatch<'a> {
    options: WriteBatchOptions,
    engine: &'a Engine,
    /// Staged records by user key; later stages replace earlier ones.
    pending_writes: Mutex<HashMap<Bytes, LogRecord>>,
}

impl Engine {
    /// Create a write batch over this engine.
    pub fn new_write_batch(&self, options: WriteBatchOptions) -> Result<WriteBatch<'_>> {
        // The persistent index skips replay, so batch visibility depends on
        // the sequence counter persisted at the last close.
        if self.options.index_type == IndexType::BPlusTree
            && !self.seq_file_exists
            && !self.is_initial
        {
            return Err(Error::BatchSequenceUnavailable);
        }

        Ok(WriteBatch {
            options,
            engine: self,
            pending_writes: Mutex::new(HashMap::new()),
        })
    }
}

impl WriteBatch<'_> {
    /// Stage a put.
    pub fn put(&self, key: Bytes, value: Bytes) -> Result<()> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        let record = LogRecord::normal(key.clone(), value);
        self.pending_writes.lock().insert(key, record);
        Ok(())
    }

    /// Stage a delete.
    ///
    /// A key the index does not hold stages nothing; any earlier staged
    /// write for it is dropped instead.
    pub fn delete(&self, key: Bytes) -> Result<()> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        let mut pending = self.pending_writes.lock();
        if self.engine.index.get(&key)?.is_none() {
            pending.remove(&key);
            return Ok(());
        }

        let record = LogRecord::deleted(key.clone());
        pending.insert(key, record);
        Ok(())
    }

    /// Number of staged operations.
    pub fn len(&self) -> usize {
        self.pending_writes.lock().len()
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.pending_writes.lock().is_empty()
    }

    /// Commit every staged operation atomically.
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.pending_writes.lock();
        if pending.is_empty() {
            return Ok(());
        }
        if pending.len() > self.options.max_batch_num as usize {
            return Err(Error::ExceedMaxBatchNum {
                count: pending.len(),
                max: self.options.max_batch_num,
            });
        }

        // Hold the engine lock for the whole commit so readers never see a
        // partial batch.
        let mut inner = self.engine.inner.write();

        let seq_no = self.engine.seq_no.fetch_add(1, Ordering::SeqCst) + 1;

        let mut positions: HashMap<Bytes, Position> = HashMap::with_capacity(pending.len());
        for (key, record) in pending.iter() {
            let pos = self.engine.append_log_record(
                &mut inner,
                &LogRecord {
                    key: key_with_seq(key, seq_no),
                    value: record.value.clone(),
                    record_type: record.record_type,
                },
            )?;
            positions.insert(key.clone(), pos);
        }

        // The terminator is what makes the batch durable.
        let finished = LogRecord {
            key: key_with_seq(TXN_FIN_KEY, seq_no),
            value: Bytes::new(),
            record_type: RecordType::TxnFinished,
        };
        self.engine.append_log_record(&mut inner, &finished)?;

        if self.options.sync_writes {
            if let Some(active) = inner.active_file.as_ref() {
                active.sync()?;
            }
        }

        // Publish to the index, still under the engine lock.
        for (key, record) in pending.iter() {
            let old = match record.record_type {
                RecordType::Normal => {
                    let Some(pos) = positions.get(key) else {
                        continue;
                    };
                    self.engine.index.put(key.clone(), *pos)?
                }
                RecordType::Deleted => self.engine.index.delete(key)?.0,
                RecordType::TxnFinished => None,
            };
            if let Some(old) = old {
                self.engine
                    .reclaim_size
                    .fetch_add(old.size as i64, Ordering::SeqCst);
            }
        }

        pending.clear();
        Ok(())
    }
}

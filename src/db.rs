//! Engine - the storage engine proper.
//!
//! The engine owns the active (append-only) data file, the immutable older
//! files, the key-to-position index, the global sequence counter and the
//! directory lock. Writes are serialized by the engine lock; reads take the
//! shared side so they never observe torn state during rotation, batch
//! commit or merge swap-in.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use bytes::Bytes;
use fs2::FileExt;
use parking_lot::RwLock;

use crate::data_file::DataFile;
use crate::index::{new_indexer, Indexer};
use crate::io::IoType;
use crate::options::{IndexType, Options};
use crate::types::{
    encode_log_record, key_with_seq, parse_record_key, LogRecord, Position, RecordType,
    TransactionRecord, NON_TRANSACTION_SEQ_NO,
};
use crate::util::filename::{
    copy_dir, delete_file, dir_size, lock_file_path, merge_finished_file_path, parse_data_file_id,
    seq_no_file_path, DATA_FILE_SUFFIX, LOCK_FILE_NAME,
};
use crate::{Error, Result};

/// Key under which the sequence counter is persisted at close.
pub(crate) const SEQ_NO_KEY: &[u8] = b"seq.no";

/// Engine statistics.
#[derive(Debug, Clone)]
pub struct Stat {
    /// Number of live keys in the index.
    pub key_num: usize,
    /// Number of open data files (older plus active).
    pub data_file_num: usize,
    /// Bytes occupied by records a merge could reclaim.
    pub reclaimable_size: i64,
    /// Bytes the data directory occupies on disk.
    pub disk_size: u64,
}

/// File state guarded by the engine lock.
pub(crate) struct EngineInner {
    /// The unique file currently accepting appends; absent until the first
    /// write on a fresh directory.
    pub(crate) active_file: Option<DataFile>,
    /// Immutable previously-active files by id.
    pub(crate) older_files: HashMap<u32, DataFile>,
    /// Bytes appended since the last sync, for the bytes-per-sync policy.
    bytes_write: u64,
}

/// A Bitcask-style append-only storage engine.
pub struct Engine {
    pub(crate) options: Options,
    pub(crate) inner: RwLock<EngineInner>,
    pub(crate) index: Box<dyn Indexer>,
    /// Global sequence counter; batches reserve the next value at commit.
    pub(crate) seq_no: AtomicU64,
    /// Set while a merge runs.
    pub(crate) is_merging: AtomicBool,
    /// Whether a seq-no file was found at open (B+-tree bootstrap).
    pub(crate) seq_file_exists: bool,
    /// Whether this open initialized the data directory.
    pub(crate) is_initial: bool,
    /// Bytes known to be stale; drives the merge ratio check.
    pub(crate) reclaim_size: AtomicI64,
    lock_file: File,
}

impl Engine {
    /// Open an engine over the configured data directory, reconstructing the
    /// index from the on-disk state.
    pub fn open(options: Options) -> Result<Engine> {
        options.validate()?;

        let mut is_initial = false;
        if !options.dir_path.exists() {
            is_initial = true;
            fs::create_dir_all(&options.dir_path)?;
        }

        // One engine instance per directory, enforced across processes.
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(lock_file_path(&options.dir_path))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| Error::DatabaseInUse)?;

        if Self::dir_is_empty(&options.dir_path)? {
            is_initial = true;
        }

        let index = new_indexer(options.index_type, &options.dir_path, options.sync_writes)?;

        let mut engine = Engine {
            inner: RwLock::new(EngineInner {
                active_file: None,
                older_files: HashMap::new(),
                bytes_write: 0,
            }),
            index,
            seq_no: AtomicU64::new(NON_TRANSACTION_SEQ_NO),
            is_merging: AtomicBool::new(false),
            seq_file_exists: false,
            is_initial,
            reclaim_size: AtomicI64::new(0),
            lock_file,
            options,
        };

        // A completed merge left its output in the sibling directory; swap
        // it in before anything reads the live files.
        engine.absorb_merge_dir()?;

        let file_ids = engine.load_data_files()?;

        if engine.options.index_type != IndexType::BPlusTree {
            engine.load_index_from_hint_file()?;
            engine.load_index_from_data_files(&file_ids)?;
            if engine.options.mmap_at_startup {
                engine.reset_io_type()?;
            }
        } else {
            // The persisted index already holds every key; only the counter
            // and the append offset need recovering.
            engine.load_seq_no()?;
            let mut inner = engine.inner.write();
            if let Some(active) = inner.active_file.as_mut() {
                active.write_off = active.file_size()?;
            }
        }

        Ok(engine)
    }

    /// Store `value` under `key`.
    pub fn put(&self, key: Bytes, value: Bytes) -> Result<()> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        let record = LogRecord::normal(key_with_seq(&key, NON_TRANSACTION_SEQ_NO), value);
        let pos = self.append_log_record_with_lock(&record)?;

        if let Some(old) = self.index.put(key, pos)? {
            self.reclaim_size.fetch_add(old.size as i64, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Remove `key`, appending a tombstone.
    pub fn delete(&self, key: Bytes) -> Result<()> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        if self.index.get(&key)?.is_none() {
            return Err(Error::KeyNotFound);
        }

        let record = LogRecord::deleted(key_with_seq(&key, NON_TRANSACTION_SEQ_NO));
        let pos = self.append_log_record_with_lock(&record)?;
        // The tombstone is garbage the moment it lands.
        self.reclaim_size.fetch_add(pos.size as i64, Ordering::SeqCst);

        let (old, removed) = self.index.delete(&key)?;
        if !removed {
            return Err(Error::IndexUpdateFailed);
        }
        if let Some(old) = old {
            self.reclaim_size.fetch_add(old.size as i64, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Fetch the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Bytes> {
        let inner = self.inner.read();

        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        let pos = self.index.get(key)?.ok_or(Error::KeyNotFound)?;
        self.read_value_at(&inner, &pos)
    }

    /// Collect every key in index order.
    pub fn list_keys(&self) -> Result<Vec<Bytes>> {
        let mut iter = self.index.iterator(false)?;
        let mut keys = Vec::with_capacity(self.index.size()?);
        while iter.valid() {
            keys.push(iter.key().clone());
            iter.next();
        }
        Ok(keys)
    }

    /// Visit every key-value pair in key order until `f` returns false.
    pub fn fold<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], Bytes) -> bool,
    {
        let inner = self.inner.read();
        let mut iter = self.index.iterator(false)?;
        while iter.valid() {
            let value = self.read_value_at(&inner, &iter.value())?;
            if !f(iter.key(), value) {
                break;
            }
            iter.next();
        }
        Ok(())
    }

    /// Engine statistics.
    pub fn stat(&self) -> Result<Stat> {
        let inner = self.inner.read();

        let mut data_file_num = inner.older_files.len();
        if inner.active_file.is_some() {
            data_file_num += 1;
        }
        let disk_size = dir_size(&self.options.dir_path)?;

        Ok(Stat {
            key_num: self.index.size()?,
            data_file_num,
            reclaimable_size: self.reclaim_size.load(Ordering::SeqCst),
            disk_size,
        })
    }

    /// Copy the data directory into `dir`, excluding the lock sentinel.
    pub fn backup(&self, dir: impl AsRef<Path>) -> Result<()> {
        let _inner = self.inner.write();
        copy_dir(&self.options.dir_path, dir.as_ref(), &[LOCK_FILE_NAME])?;
        Ok(())
    }

    /// Flush the active file to stable storage.
    pub fn sync(&self) -> Result<()> {
        let inner = self.inner.write();
        match inner.active_file.as_ref() {
            Some(active) => active.sync(),
            None => Ok(()),
        }
    }

    /// Close the engine: persist the sequence counter, close the index and
    /// every data file, release the directory lock.
    pub fn close(&self) -> Result<()> {
        let result = self.close_files();
        // The lock is released even when closing failed part-way.
        let _ = FileExt::unlock(&self.lock_file);
        result
    }

    fn close_files(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.active_file.is_none() {
            return Ok(());
        }

        self.index.close()?;

        // Replace any previous counter record with a fresh one.
        delete_file(&seq_no_file_path(&self.options.dir_path))?;
        let mut seq_file = DataFile::seq_no_file(&self.options.dir_path)?;
        let record = LogRecord::normal(
            Bytes::from_static(SEQ_NO_KEY),
            Bytes::from(self.seq_no.load(Ordering::SeqCst).to_string()),
        );
        let (encoded, _) = encode_log_record(&record);
        seq_file.write(&encoded)?;
        seq_file.sync()?;

        if let Some(active) = inner.active_file.take() {
            active.sync()?;
        }
        inner.older_files.clear();
        Ok(())
    }

    /// Resolve a position into the record's value.
    pub(crate) fn read_value_at(&self, inner: &EngineInner, pos: &Position) -> Result<Bytes> {
        let data_file = match inner.active_file.as_ref() {
            Some(active) if active.file_id == pos.file_id => active,
            _ => inner
                .older_files
                .get(&pos.file_id)
                .ok_or(Error::DataFileNotFound(pos.file_id))?,
        };

        let (record, _) = data_file.read_record(pos.offset)?.ok_or_else(|| {
            Error::corrupted(format!(
                "record missing at {}:{}",
                pos.file_id, pos.offset
            ))
        })?;

        if record.record_type == RecordType::Deleted {
            return Err(Error::KeyNotFound);
        }
        Ok(record.value)
    }

    pub(crate) fn append_log_record_with_lock(&self, record: &LogRecord) -> Result<Position> {
        let mut inner = self.inner.write();
        self.append_log_record(&mut inner, record)
    }

    /// Append one encoded record to the active file. Must run under the
    /// engine write lock.
    pub(crate) fn append_log_record(
        &self,
        inner: &mut EngineInner,
        record: &LogRecord,
    ) -> Result<Position> {
        let dir_path = &self.options.dir_path;

        if inner.active_file.is_none() {
            inner.active_file = Some(DataFile::open(dir_path, 0, IoType::StandardFile)?);
        }

        let (encoded, size) = encode_log_record(record);

        // Rotate when this append would cross the size ceiling.
        let must_rotate = inner
            .active_file
            .as_ref()
            .is_some_and(|active| active.write_off + size as i64 > self.options.data_file_size);
        if must_rotate {
            if let Some(active) = inner.active_file.as_ref() {
                active.sync()?;
            }
            if let Some(prev) = inner.active_file.take() {
                let next_id = prev.file_id + 1;
                inner.older_files.insert(prev.file_id, prev);
                inner.active_file = Some(DataFile::open(dir_path, next_id, IoType::StandardFile)?);
            }
        }

        let (file_id, write_off) = {
            let active = match inner.active_file.as_mut() {
                Some(active) => active,
                None => return Err(Error::corrupted("active data file missing")),
            };
            let write_off = active.write_off;
            active.write(&encoded)?;
            (active.file_id, write_off)
        };

        inner.bytes_write += size;
        let need_sync = self.options.sync_writes
            || (self.options.bytes_per_sync > 0
                && inner.bytes_write >= self.options.bytes_per_sync);
        if need_sync {
            if let Some(active) = inner.active_file.as_ref() {
                active.sync()?;
            }
            inner.bytes_write = 0;
        }

        Ok(Position {
            file_id,
            offset: write_off,
            size: size as u32,
        })
    }

    /// True when the directory holds nothing besides the lock sentinel.
    fn dir_is_empty(dir_path: &Path) -> Result<bool> {
        for entry in fs::read_dir(dir_path)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy() != LOCK_FILE_NAME {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Scan the directory for data files and open them, oldest first; the
    /// highest id becomes the active file. Returns the sorted id list.
    fn load_data_files(&self) -> Result<Vec<u32>> {
        let mut file_ids = Vec::new();
        for entry in fs::read_dir(&self.options.dir_path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(DATA_FILE_SUFFIX) {
                let file_id = parse_data_file_id(&name).ok_or_else(|| {
                    Error::corrupted(format!("unexpected data file name {}", name))
                })?;
                file_ids.push(file_id);
            }
        }
        file_ids.sort_unstable();

        // Mmap only speeds up the replay scan, which the persistent index
        // skips entirely.
        let io_type = if self.options.mmap_at_startup
            && self.options.index_type != IndexType::BPlusTree
        {
            IoType::MemoryMap
        } else {
            IoType::StandardFile
        };

        let mut inner = self.inner.write();
        for (i, &file_id) in file_ids.iter().enumerate() {
            let data_file = DataFile::open(&self.options.dir_path, file_id, io_type)?;
            if i == file_ids.len() - 1 {
                inner.active_file = Some(data_file);
            } else {
                inner.older_files.insert(file_id, data_file);
            }
        }

        Ok(file_ids)
    }

    /// Replay data files in id order, rebuilding the index. Transactional
    /// records are buffered per sequence number and committed only when the
    /// matching terminator shows up; an unterminated buffer is dropped.
    fn load_index_from_data_files(&self, file_ids: &[u32]) -> Result<()> {
        if file_ids.is_empty() {
            return Ok(());
        }

        // Files below the merge watermark were already indexed via the hint.
        let mut has_merge = false;
        let mut non_merge_file_id = 0;
        if merge_finished_file_path(&self.options.dir_path).exists() {
            non_merge_file_id = self.read_non_merge_file_id(&self.options.dir_path)?;
            has_merge = true;
        }

        let mut txn_records: HashMap<u64, Vec<TransactionRecord>> = HashMap::new();
        let mut current_seq_no = NON_TRANSACTION_SEQ_NO;

        let mut inner = self.inner.write();
        let inner = &mut *inner;
        for (i, &file_id) in file_ids.iter().enumerate() {
            if has_merge && file_id < non_merge_file_id {
                continue;
            }

            let data_file = match inner.active_file.as_ref() {
                Some(active) if active.file_id == file_id => active,
                _ => inner
                    .older_files
                    .get(&file_id)
                    .ok_or(Error::DataFileNotFound(file_id))?,
            };

            let mut offset: i64 = 0;
            while let Some((record, size)) = data_file.read_record(offset)? {
                let pos = Position {
                    file_id,
                    offset,
                    size: size as u32,
                };

                let (real_key, seq_no) = parse_record_key(&record.key)
                    .ok_or_else(|| Error::corrupted("record key missing sequence prefix"))?;

                if seq_no == NON_TRANSACTION_SEQ_NO {
                    self.update_index_on_replay(real_key, record.record_type, pos)?;
                } else if record.record_type == RecordType::TxnFinished {
                    // The batch is complete; publish its buffered records.
                    if let Some(buffered) = txn_records.remove(&seq_no) {
                        for txn_record in buffered {
                            self.update_index_on_replay(
                                txn_record.record.key,
                                txn_record.record.record_type,
                                txn_record.pos,
                            )?;
                        }
                    }
                } else {
                    txn_records.entry(seq_no).or_default().push(TransactionRecord {
                        record: LogRecord {
                            key: real_key,
                            value: record.value,
                            record_type: record.record_type,
                        },
                        pos,
                    });
                }

                if seq_no > current_seq_no {
                    current_seq_no = seq_no;
                }
                offset += size as i64;
            }

            // The last file keeps accepting appends; the replay end is where
            // the next write lands.
            if i == file_ids.len() - 1 {
                if let Some(active) = inner.active_file.as_mut() {
                    active.write_off = offset;
                }
            }
        }

        self.seq_no.store(current_seq_no, Ordering::SeqCst);
        Ok(())
    }

    fn update_index_on_replay(
        &self,
        key: Bytes,
        record_type: RecordType,
        pos: Position,
    ) -> Result<()> {
        let old = if record_type == RecordType::Deleted {
            // The tombstone's own bytes are garbage too.
            self.reclaim_size.fetch_add(pos.size as i64, Ordering::SeqCst);
            self.index.delete(&key)?.0
        } else {
            self.index.put(key, pos)?
        };

        if let Some(old) = old {
            self.reclaim_size.fetch_add(old.size as i64, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Read the persisted sequence counter (B+-tree bootstrap only).
    fn load_seq_no(&mut self) -> Result<()> {
        if !seq_no_file_path(&self.options.dir_path).exists() {
            return Ok(());
        }

        let seq_file = DataFile::seq_no_file(&self.options.dir_path)?;
        let Some((record, _)) = seq_file.read_record(0)? else {
            return Ok(());
        };

        let seq_no = std::str::from_utf8(&record.value)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::corrupted("unreadable seq-no record"))?;
        self.seq_no.store(seq_no, Ordering::SeqCst);
        self.seq_file_exists = true;
        Ok(())
    }

    /// Reopen every data file under standard IO once replay is done.
    fn reset_io_type(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(active) = inner.active_file.as_mut() {
            active.set_io_manager(&self.options.dir_path, IoType::StandardFile)?;
        }
        for data_file in inner.older_files.values_mut() {
            data_file.set_io_manager(&self.options.dir_path, IoType::StandardFile)?;
        }
        Ok(())
    }
}

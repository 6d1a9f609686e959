//! Compaction: rewrite live records into a fresh file set.
//!
//! Merge walks every immutable file, keeps only the records the index still
//! points at, and appends them through a scratch engine rooted at a sibling
//! `_merge` directory. A hint file mapping keys to their new positions is
//! emitted alongside, and a `merge-finished` marker commits the output. The
//! swap itself happens at the next open: a marker-less merge directory is a
//! failed run and gets discarded.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;

use crate::data_file::DataFile;
use crate::db::Engine;
use crate::io::IoType;
use crate::options::IndexType;
use crate::types::{
    decode_record_pos, encode_log_record, key_with_seq, parse_record_key, LogRecord,
    NON_TRANSACTION_SEQ_NO,
};
use crate::util::filename::{
    available_disk_space, data_file_path, delete_file, dir_size, hint_file_path, merge_dir_path,
    BPTREE_INDEX_FILE_NAME, LOCK_FILE_NAME, MERGE_FINISHED_FILE_NAME, SEQ_NO_FILE_NAME,
};
use crate::{Error, Result};

/// Key of the single record inside the merge-finished marker.
const MERGE_FINISHED_KEY: &[u8] = b"merge.finished";

/// Clears the in-flight flag on every exit path out of a merge.
struct MergeFlagGuard<'a>(&'a AtomicBool);

impl Drop for MergeFlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Engine {
    /// Reclaim space occupied by stale records.
    ///
    /// Returns [`Error::MergeInProgress`] when a merge is already running,
    /// [`Error::MergeRatioUnreached`] when too little is reclaimable, and
    /// [`Error::InsufficientDiskSpace`] when the rewritten file set would not
    /// fit next to the existing one.
    pub fn merge(&self) -> Result<()> {
        let (_guard, non_merge_file_id, merge_file_ids) = {
            let mut inner = self.inner.write();
            if inner.active_file.is_none() {
                return Ok(());
            }

            if self.is_merging.load(Ordering::SeqCst) {
                return Err(Error::MergeInProgress);
            }

            let total_size = dir_size(&self.options.dir_path)?;
            let reclaim = self.reclaim_size.load(Ordering::SeqCst);
            let ratio = reclaim as f32 / total_size as f32;
            if ratio < self.options.data_file_merge_ratio {
                return Err(Error::MergeRatioUnreached {
                    actual: ratio,
                    required: self.options.data_file_merge_ratio,
                });
            }

            let needed = total_size.saturating_sub(reclaim.max(0) as u64);
            let available = available_disk_space(&self.options.dir_path)?;
            if needed >= available {
                return Err(Error::InsufficientDiskSpace { needed, available });
            }

            self.is_merging.store(true, Ordering::SeqCst);
            let guard = MergeFlagGuard(&self.is_merging);

            // Seal the active file and open a new one; everything below the
            // new id takes part in the merge.
            if let Some(active) = inner.active_file.as_ref() {
                active.sync()?;
            }
            if let Some(prev) = inner.active_file.take() {
                let next_id = prev.file_id + 1;
                inner.older_files.insert(prev.file_id, prev);
                inner.active_file =
                    Some(DataFile::open(&self.options.dir_path, next_id, IoType::StandardFile)?);
            }
            let non_merge_file_id = match inner.active_file.as_ref() {
                Some(active) => active.file_id,
                None => return Err(Error::corrupted("active data file missing")),
            };

            let mut ids: Vec<u32> = inner.older_files.keys().copied().collect();
            ids.sort_unstable();

            (guard, non_merge_file_id, ids)
        };

        // The engine lock is released; reads and writes proceed against the
        // new active file while the immutable snapshot is rewritten.
        let merge_path = merge_dir_path(&self.options.dir_path);
        if merge_path.exists() {
            fs::remove_dir_all(&merge_path)?;
        }
        fs::create_dir_all(&merge_path)?;

        let mut merge_options = self.options.clone();
        merge_options.dir_path = merge_path.clone();
        merge_options.sync_writes = false;
        // The scratch engine's index is never read, and its backing file must
        // not shadow the live bptree-index when the output is absorbed.
        merge_options.index_type = IndexType::BTree;
        let merge_engine = Engine::open(merge_options)?;

        let mut hint_file = DataFile::hint_file(&merge_path)?;

        for &file_id in &merge_file_ids {
            let data_file = DataFile::open(&self.options.dir_path, file_id, IoType::StandardFile)?;
            let mut offset: i64 = 0;
            while let Some((record, size)) = data_file.read_record(offset)? {
                let (real_key, _) = parse_record_key(&record.key)
                    .ok_or_else(|| Error::corrupted("record key missing sequence prefix"))?;

                // Live iff the index still points exactly here.
                if let Some(pos) = self.index.get(&real_key)? {
                    if pos.file_id == file_id && pos.offset == offset {
                        let rewritten = LogRecord {
                            key: key_with_seq(&real_key, NON_TRANSACTION_SEQ_NO),
                            value: record.value,
                            record_type: record.record_type,
                        };
                        let new_pos = merge_engine.append_log_record_with_lock(&rewritten)?;
                        hint_file.write_hint_record(real_key, &new_pos)?;
                    }
                }
                offset += size as i64;
            }
        }

        hint_file.sync()?;
        merge_engine.sync()?;

        // The marker commits the merge; without it the directory is garbage.
        let mut finished_file = DataFile::merge_finished_file(&merge_path)?;
        let record = LogRecord::normal(
            Bytes::from_static(MERGE_FINISHED_KEY),
            Bytes::from(non_merge_file_id.to_string()),
        );
        let (encoded, _) = encode_log_record(&record);
        finished_file.write(&encoded)?;
        finished_file.sync()?;

        Ok(())
    }

    /// Absorb a completed merge directory at open time; a partial one is
    /// discarded wholesale.
    pub(crate) fn absorb_merge_dir(&self) -> Result<()> {
        let merge_path = merge_dir_path(&self.options.dir_path);
        if !merge_path.exists() {
            return Ok(());
        }

        let result = self.absorb_merge_files(&merge_path);
        let _ = fs::remove_dir_all(&merge_path);
        result
    }

    fn absorb_merge_files(&self, merge_path: &Path) -> Result<()> {
        let mut merge_finished = false;
        let mut merge_file_names: Vec<String> = Vec::new();
        for entry in fs::read_dir(merge_path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == MERGE_FINISHED_FILE_NAME {
                merge_finished = true;
            } else if name == SEQ_NO_FILE_NAME
                || name == LOCK_FILE_NAME
                || name == BPTREE_INDEX_FILE_NAME
            {
                // The scratch engine's own bookkeeping stays behind.
                continue;
            }
            merge_file_names.push(name);
        }

        if !merge_finished {
            return Ok(());
        }

        let non_merge_file_id = self.read_non_merge_file_id(merge_path)?;

        // Files below the watermark are fully superseded by the merge output.
        for file_id in 0..non_merge_file_id {
            delete_file(&data_file_path(&self.options.dir_path, file_id))?;
        }
        for name in merge_file_names {
            fs::rename(merge_path.join(&name), self.options.dir_path.join(&name))?;
        }
        Ok(())
    }

    /// Read the first file id that did not participate in the merge.
    pub(crate) fn read_non_merge_file_id(&self, dir_path: &Path) -> Result<u32> {
        let merge_finished_file = DataFile::merge_finished_file(dir_path)?;
        let (record, _) = merge_finished_file
            .read_record(0)?
            .ok_or_else(|| Error::corrupted("empty merge-finished file"))?;

        std::str::from_utf8(&record.value)
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| Error::corrupted("unreadable merge-finished record"))
    }

    /// Populate the index from the hint file, if one exists.
    pub(crate) fn load_index_from_hint_file(&self) -> Result<()> {
        if !hint_file_path(&self.options.dir_path).exists() {
            return Ok(());
        }

        let hint_file = DataFile::hint_file(&self.options.dir_path)?;
        let mut offset: i64 = 0;
        while let Some((record, size)) = hint_file.read_record(offset)? {
            let pos = decode_record_pos(&record.value)
                .ok_or_else(|| Error::corrupted("unreadable hint record"))?;
            self.index.put(record.key, pos)?;
            offset += size as i64;
        }
        Ok(())
    }
}

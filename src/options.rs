//! Configuration options for caskdb.

use std::path::PathBuf;

use crate::{Error, Result};

/// Default rotation threshold for the active data file (256MB).
pub const DEFAULT_DATA_FILE_SIZE: i64 = 256 * 1024 * 1024;

/// Default reclaimable fraction required before a merge may run.
pub const DEFAULT_MERGE_RATIO: f32 = 0.5;

/// Default maximum number of operations in a single write batch.
pub const DEFAULT_MAX_BATCH_NUM: u32 = 10_000;

/// In-memory index backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexType {
    /// Ordered tree kept purely in memory.
    #[default]
    BTree,
    /// Radix tree kept purely in memory.
    RadixTree,
    /// B+-tree persisted to its own file; survives restarts and skips replay.
    BPlusTree,
}

/// Engine configuration options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Data directory holding the log segments and ancillary files.
    pub dir_path: PathBuf,

    /// Active file rotation threshold in bytes.
    pub data_file_size: i64,

    /// Sync after every append.
    pub sync_writes: bool,

    /// Sync once this many bytes have accumulated since the last sync
    /// (0 disables the threshold).
    pub bytes_per_sync: u64,

    /// Index backend.
    pub index_type: IndexType,

    /// Use memory-mapped reads while replaying data files at startup.
    pub mmap_at_startup: bool,

    /// Minimum reclaimable fraction of the directory before merge runs.
    pub data_file_merge_ratio: f32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dir_path: std::env::temp_dir().join("caskdb"),
            data_file_size: DEFAULT_DATA_FILE_SIZE,
            sync_writes: false,
            bytes_per_sync: 0,
            index_type: IndexType::default(),
            mmap_at_startup: true,
            data_file_merge_ratio: DEFAULT_MERGE_RATIO,
        }
    }
}

impl Options {
    /// Create new options rooted at the given data directory.
    pub fn new(dir_path: impl Into<PathBuf>) -> Self {
        Self {
            dir_path: dir_path.into(),
            ..Self::default()
        }
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(Error::InvalidConfiguration(
                "database dir path is empty".into(),
            ));
        }
        if self.data_file_size <= 0 {
            return Err(Error::InvalidConfiguration(
                "data file size must be greater than 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.data_file_merge_ratio) {
            return Err(Error::InvalidConfiguration(
                "merge ratio must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }
}

/// Options for engine iterators.
#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    /// Only visit keys carrying this byte prefix (empty visits everything).
    pub prefix: Vec<u8>,

    /// Iterate in descending key order.
    pub reverse: bool,
}

/// Options for atomic write batches.
#[derive(Debug, Clone)]
pub struct WriteBatchOptions {
    /// Maximum number of staged operations in one batch.
    pub max_batch_num: u32,

    /// Sync the active file once the batch has been appended.
    pub sync_writes: bool,
}

impl Default for WriteBatchOptions {
    fn default() -> Self {
        Self {
            max_batch_num: DEFAULT_MAX_BATCH_NUM,
            sync_writes: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = Options::default();
        assert_eq!(opts.data_file_size, DEFAULT_DATA_FILE_SIZE);
        assert!(!opts.sync_writes);
        assert_eq!(opts.bytes_per_sync, 0);
        assert_eq!(opts.index_type, IndexType::BTree);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_empty_dir() {
        let mut opts = Options::default();
        opts.dir_path = PathBuf::new();
        assert!(matches!(
            opts.validate(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validation_rejects_bad_file_size() {
        let mut opts = Options::default();
        opts.data_file_size = 0;
        assert!(opts.validate().is_err());

        opts.data_file_size = -1;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_merge_ratio() {
        let mut opts = Options::default();
        opts.data_file_merge_ratio = 1.5;
        assert!(opts.validate().is_err());

        opts.data_file_merge_ratio = -0.1;
        assert!(opts.validate().is_err());

        opts.data_file_merge_ratio = 0.0;
        assert!(opts.validate().is_ok());
        opts.data_file_merge_ratio = 1.0;
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_default_batch_options() {
        let opts = WriteBatchOptions::default();
        assert_eq!(opts.max_batch_num, DEFAULT_MAX_BATCH_NUM);
        assert!(opts.sync_writes);
    }
}

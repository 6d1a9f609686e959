//! Standard file IO backend.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::Result;

/// Append-only file handle with positional reads.
#[derive(Debug)]
pub struct FileIo {
    file: File,
}

impl FileIo {
    /// Open the file at `path`, creating it if absent.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        Ok(Self { file })
    }

    /// Read up to `buf.len()` bytes starting at `offset`.
    pub fn read(&self, buf: &mut [u8], offset: i64) -> Result<usize> {
        let n = self.file.read_at(buf, offset as u64)?;
        Ok(n)
    }

    /// Append `buf` to the end of the file.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut file = &self.file;
        file.write_all(buf)?;
        Ok(buf.len())
    }

    /// Flush file contents and metadata to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Current file size in bytes.
    pub fn size(&self) -> Result<i64> {
        Ok(self.file.metadata()?.len() as i64)
    }
}

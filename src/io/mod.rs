//! File IO management for data files.
//!
//! Two variants sit behind [`IoManager`]: buffered-free standard file IO for
//! normal operation, and a read-only memory map used to speed up the replay
//! scan at startup. The bootstrap reopens every data file under standard IO
//! before the engine accepts writes, so the mmap variant never sees a write.

pub mod file;
pub mod mmap;

pub use file::FileIo;
pub use mmap::MmapIo;

use std::path::Path;

use crate::Result;

/// Which IO backend to open a file with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoType {
    /// Standard file IO: positional reads, appends, fsync.
    StandardFile,
    /// Read-only memory map; replay-time reads only.
    MemoryMap,
}

/// Polymorphic file handle over the two IO backends.
#[derive(Debug)]
pub enum IoManager {
    StandardFile(FileIo),
    ReadOnlyMmap(MmapIo),
}

impl IoManager {
    /// Open (creating if absent) the file at `path` with the given backend.
    pub fn open(path: &Path, io_type: IoType) -> Result<Self> {
        match io_type {
            IoType::StandardFile => Ok(IoManager::StandardFile(FileIo::open(path)?)),
            IoType::MemoryMap => Ok(IoManager::ReadOnlyMmap(MmapIo::open(path)?)),
        }
    }

    /// Read up to `buf.len()` bytes at `offset`; returns the count read.
    pub fn read(&self, buf: &mut [u8], offset: i64) -> Result<usize> {
        match self {
            IoManager::StandardFile(io) => io.read(buf, offset),
            IoManager::ReadOnlyMmap(io) => io.read(buf, offset),
        }
    }

    /// Append `buf` to the end of the file; returns the count written.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        match self {
            IoManager::StandardFile(io) => io.write(buf),
            // Mmap handles exist only during replay, which never writes;
            // the bootstrap swaps them for standard IO first.
            IoManager::ReadOnlyMmap(_) => unreachable!("write through a read-only mmap"),
        }
    }

    /// Flush kernel buffers to stable storage.
    pub fn sync(&self) -> Result<()> {
        match self {
            IoManager::StandardFile(io) => io.sync(),
            IoManager::ReadOnlyMmap(_) => unreachable!("sync through a read-only mmap"),
        }
    }

    /// Current file size in bytes.
    pub fn size(&self) -> Result<i64> {
        match self {
            IoManager::StandardFile(io) => io.size(),
            IoManager::ReadOnlyMmap(io) => io.size(),
        }
    }
}

//! Read-only memory-mapped IO backend, used to accelerate startup replay.

use std::fs::OpenOptions;
use std::path::Path;

use memmap2::Mmap;

use crate::Result;

/// Read-only memory map over a data file.
///
/// A zero-length file cannot be mapped, so the mapping is absent until the
/// file has content; reads against an empty file simply return zero bytes.
#[derive(Debug)]
pub struct MmapIo {
    map: Option<Mmap>,
    len: u64,
}

impl MmapIo {
    /// Map the file at `path` read-only, creating it if absent.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let len = file.metadata()?.len();

        // Safety: replay holds the only handles to these files and never
        // writes through them, so the mapping cannot observe mutation.
        let map = if len == 0 {
            None
        } else {
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self { map, len })
    }

    /// Copy up to `buf.len()` bytes starting at `offset` out of the map.
    pub fn read(&self, buf: &mut [u8], offset: i64) -> Result<usize> {
        let Some(map) = &self.map else {
            return Ok(0);
        };

        let offset = offset as usize;
        if offset >= map.len() {
            return Ok(0);
        }

        let n = buf.len().min(map.len() - offset);
        buf[..n].copy_from_slice(&map[offset..offset + n]);
        Ok(n)
    }

    /// Size of the mapped file in bytes.
    pub fn size(&self) -> Result<i64> {
        Ok(self.len as i64)
    }
}

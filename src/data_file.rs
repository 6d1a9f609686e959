//! Data files: append-only log segments and the ancillary record files.
//!
//! A [`DataFile`] pairs an IO handle with the file's id and a monotonically
//! advancing write offset. The same record format backs the log segments, the
//! hint file, the merge-finished marker and the seq-no file, so they all open
//! through this type.

use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::io::{IoManager, IoType};
use crate::types::{
    decode_record_header, encode_log_record, encode_record_pos, LogRecord, Position, RecordType,
    MAX_RECORD_HEADER_SIZE,
};
use crate::util::crc::crc32_multi;
use crate::util::filename::{
    data_file_path, hint_file_path, merge_finished_file_path, seq_no_file_path,
};
use crate::{Error, Result};

/// One on-disk file written in the log record format.
#[derive(Debug)]
pub struct DataFile {
    /// File id; 0 for the ancillary files.
    pub file_id: u32,
    /// Offset the next append lands at.
    pub write_off: i64,
    io: IoManager,
}

impl DataFile {
    /// Open the data file with the given id inside `dir_path`.
    pub fn open(dir_path: &Path, file_id: u32, io_type: IoType) -> Result<Self> {
        Self::new(data_file_path(dir_path, file_id), file_id, io_type)
    }

    /// Open the hint file inside `dir_path`.
    pub fn hint_file(dir_path: &Path) -> Result<Self> {
        Self::new(hint_file_path(dir_path), 0, IoType::StandardFile)
    }

    /// Open the merge-finished marker file inside `dir_path`.
    pub fn merge_finished_file(dir_path: &Path) -> Result<Self> {
        Self::new(merge_finished_file_path(dir_path), 0, IoType::StandardFile)
    }

    /// Open the sequence-number file inside `dir_path`.
    pub fn seq_no_file(dir_path: &Path) -> Result<Self> {
        Self::new(seq_no_file_path(dir_path), 0, IoType::StandardFile)
    }

    fn new(path: PathBuf, file_id: u32, io_type: IoType) -> Result<Self> {
        Ok(Self {
            file_id,
            write_off: 0,
            io: IoManager::open(&path, io_type)?,
        })
    }

    /// Read one record at `offset`.
    ///
    /// Returns the decoded record and its encoded length, `Ok(None)` at the
    /// end of the file (including a truncated tail shorter than the header
    /// promises), or [`Error::InvalidCrc`] when the stored checksum does not
    /// match the bytes.
    pub fn read_record(&self, offset: i64) -> Result<Option<(LogRecord, u64)>> {
        let file_size = self.io.size()?;
        if offset >= file_size {
            return Ok(None);
        }

        // Clamp the header read to what the file still holds.
        let mut header_bytes = MAX_RECORD_HEADER_SIZE as i64;
        if offset + header_bytes > file_size {
            header_bytes = file_size - offset;
        }

        let mut header_buf = vec![0u8; header_bytes as usize];
        let n = self.io.read(&mut header_buf, offset)?;

        let Some((header, header_size)) = decode_record_header(&header_buf[..n]) else {
            return Ok(None);
        };
        if header.is_eof_sentinel() {
            return Ok(None);
        }

        let key_size = header.key_size as i64;
        let value_size = header.value_size as i64;
        let record_size = header_size as i64 + key_size + value_size;
        if offset + record_size > file_size {
            // A crash tore the tail off this record; callers drop it.
            return Ok(None);
        }

        let mut kv = Bytes::new();
        if key_size > 0 || value_size > 0 {
            let mut kv_buf = vec![0u8; (key_size + value_size) as usize];
            self.io.read(&mut kv_buf, offset + header_size as i64)?;
            kv = Bytes::from(kv_buf);
        }
        let value = kv.split_off(key_size as usize);
        let key = kv;

        let crc = crc32_multi(&[&header_buf[4..header_size], &key[..], &value[..]]);
        if crc != header.crc {
            return Err(Error::InvalidCrc {
                expected: header.crc,
                actual: crc,
            });
        }

        let record_type = RecordType::from_byte(header.record_type).ok_or_else(|| {
            Error::corrupted(format!("unknown record type byte {}", header.record_type))
        })?;

        Ok(Some((
            LogRecord {
                key,
                value,
                record_type,
            },
            record_size as u64,
        )))
    }

    /// Append encoded bytes and advance the write offset.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let n = self.io.write(buf)?;
        self.write_off += n as i64;
        Ok(())
    }

    /// Append a hint record mapping `key` to an encoded position.
    pub fn write_hint_record(&mut self, key: Bytes, pos: &Position) -> Result<()> {
        let record = LogRecord::normal(key, encode_record_pos(pos).into());
        let (encoded, _) = encode_log_record(&record);
        self.write(&encoded)
    }

    /// Flush this file to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.io.sync()
    }

    /// Current size of the backing file.
    pub fn file_size(&self) -> Result<i64> {
        self.io.size()
    }

    /// Swap the IO backend, reopening the backing file.
    pub fn set_io_manager(&mut self, dir_path: &Path, io_type: IoType) -> Result<()> {
        self.io = IoManager::open(&data_file_path(dir_path, self.file_id), io_type)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::decode_record_pos;
    use std::fs;
    use tempfile::tempdir;

    fn write_record(file: &mut DataFile, key: &str, value: &str) -> u64 {
        let record = LogRecord::normal(Bytes::from(key.to_string()), Bytes::from(value.to_string()));
        let (encoded, size) = encode_log_record(&record);
        file.write(&encoded).unwrap();
        size
    }

    #[test]
    fn test_write_advances_offset() {
        let dir = tempdir().unwrap();
        let mut file = DataFile::open(dir.path(), 0, IoType::StandardFile).unwrap();
        assert_eq!(file.write_off, 0);

        let size = write_record(&mut file, "key", "value");
        assert_eq!(file.write_off, size as i64);

        let size2 = write_record(&mut file, "key2", "value2");
        assert_eq!(file.write_off, (size + size2) as i64);
    }

    #[test]
    fn test_read_record_roundtrip() {
        let dir = tempdir().unwrap();
        let mut file = DataFile::open(dir.path(), 1, IoType::StandardFile).unwrap();

        let s1 = write_record(&mut file, "alpha", "one");
        let s2 = write_record(&mut file, "beta", "two");

        let (rec, size) = file.read_record(0).unwrap().unwrap();
        assert_eq!(rec.key, Bytes::from("alpha"));
        assert_eq!(rec.value, Bytes::from("one"));
        assert_eq!(rec.record_type, RecordType::Normal);
        assert_eq!(size, s1);

        let (rec, size) = file.read_record(s1 as i64).unwrap().unwrap();
        assert_eq!(rec.key, Bytes::from("beta"));
        assert_eq!(size, s2);

        // Past the last record is a clean end of file.
        assert!(file.read_record((s1 + s2) as i64).unwrap().is_none());
    }

    #[test]
    fn test_read_record_empty_file() {
        let dir = tempdir().unwrap();
        let file = DataFile::open(dir.path(), 0, IoType::StandardFile).unwrap();
        assert!(file.read_record(0).unwrap().is_none());
    }

    #[test]
    fn test_read_record_detects_corruption() {
        let dir = tempdir().unwrap();
        let mut file = DataFile::open(dir.path(), 0, IoType::StandardFile).unwrap();
        write_record(&mut file, "key", "value");

        // Flip one byte of the value in place.
        let path = data_file_path(dir.path(), 0);
        let mut raw = fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        fs::write(&path, raw).unwrap();

        let reopened = DataFile::open(dir.path(), 0, IoType::StandardFile).unwrap();
        assert!(matches!(
            reopened.read_record(0),
            Err(Error::InvalidCrc { .. })
        ));
    }

    #[test]
    fn test_read_record_truncated_tail() {
        let dir = tempdir().unwrap();
        let mut file = DataFile::open(dir.path(), 0, IoType::StandardFile).unwrap();
        let s1 = write_record(&mut file, "intact", "value");
        write_record(&mut file, "torn", "truncated-value");

        let path = data_file_path(dir.path(), 0);
        let raw = fs::read(&path).unwrap();
        fs::write(&path, &raw[..raw.len() - 4]).unwrap();

        let reopened = DataFile::open(dir.path(), 0, IoType::StandardFile).unwrap();
        // First record survives, the torn one reads as end of file.
        assert!(reopened.read_record(0).unwrap().is_some());
        assert!(reopened.read_record(s1 as i64).unwrap().is_none());
    }

    #[test]
    fn test_hint_record_roundtrip() {
        let dir = tempdir().unwrap();
        let mut hint = DataFile::hint_file(dir.path()).unwrap();

        let pos = Position {
            file_id: 3,
            offset: 512,
            size: 29,
        };
        hint.write_hint_record(Bytes::from("user-key"), &pos).unwrap();

        let (rec, _) = hint.read_record(0).unwrap().unwrap();
        assert_eq!(rec.key, Bytes::from("user-key"));
        assert_eq!(decode_record_pos(&rec.value), Some(pos));
    }

    #[test]
    fn test_read_record_through_mmap() {
        let dir = tempdir().unwrap();
        let mut file = DataFile::open(dir.path(), 0, IoType::StandardFile).unwrap();
        let s1 = write_record(&mut file, "a", "1");
        write_record(&mut file, "b", "2");
        file.sync().unwrap();
        drop(file);

        let mapped = DataFile::open(dir.path(), 0, IoType::MemoryMap).unwrap();
        let (rec, _) = mapped.read_record(0).unwrap().unwrap();
        assert_eq!(rec.key, Bytes::from("a"));
        let (rec, _) = mapped.read_record(s1 as i64).unwrap().unwrap();
        assert_eq!(rec.key, Bytes::from("b"));
    }
}

//! Core record types and the on-disk codec.
//!
//! Every write becomes a log record laid out as:
//!
//! ```text
//! +-------+------+------------+--------------+-----+-------+
//! | CRC32 | Type | key size   | value size   | Key | Value |
//! +-------+------+------------+--------------+-----+-------+
//!   4B LE   1B     varint 1-5   varint 1-5     KS     VS
//! ```
//!
//! The CRC covers everything after the CRC field itself. Key and value sizes
//! are zigzag varints. The stored key carries an unsigned-varint sequence
//! number prefix: 0 for plain writes, a shared nonzero value for the records
//! of one committed batch.

use bytes::{BufMut, Bytes, BytesMut};

use crate::util::coding::{
    decode_uvarint64, decode_varint64, encode_uvarint64, encode_varint64, uvarint_length,
    MAX_VARINT32_LEN, MAX_VARINT64_LEN,
};
use crate::util::crc::crc32_multi;

/// Maximum encoded header length: CRC + type + two 32-bit varints.
pub const MAX_RECORD_HEADER_SIZE: usize = 4 + 1 + MAX_VARINT32_LEN * 2;

/// Sequence number carried by records outside any batch.
pub const NON_TRANSACTION_SEQ_NO: u64 = 0;

/// Record type tag stored after the CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Live key-value record.
    Normal = 0,
    /// Deletion tombstone.
    Deleted = 1,
    /// Terminator committing the batch that shares its sequence number.
    TxnFinished = 2,
}

impl RecordType {
    /// Create from the raw on-disk byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(RecordType::Normal),
            1 => Some(RecordType::Deleted),
            2 => Some(RecordType::TxnFinished),
            _ => None,
        }
    }

    /// Convert to the on-disk byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// A single log record as written to (or decoded from) a data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Sequence-prefixed key bytes.
    pub key: Bytes,
    /// Value bytes (empty for tombstones and terminators).
    pub value: Bytes,
    /// Record type tag.
    pub record_type: RecordType,
}

impl LogRecord {
    /// Build a normal record.
    pub fn normal(key: Bytes, value: Bytes) -> Self {
        Self {
            key,
            value,
            record_type: RecordType::Normal,
        }
    }

    /// Build a deletion tombstone (empty value).
    pub fn deleted(key: Bytes) -> Self {
        Self {
            key,
            value: Bytes::new(),
            record_type: RecordType::Deleted,
        }
    }
}

/// Decoded header of a log record.
///
/// `record_type` is the raw on-disk byte; it is only validated once the CRC
/// over the full record has been verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub crc: u32,
    pub record_type: u8,
    pub key_size: u32,
    pub value_size: u32,
}

impl RecordHeader {
    /// An all-zero header marks the zero-filled tail of a file.
    pub fn is_eof_sentinel(&self) -> bool {
        self.crc == 0 && self.key_size == 0 && self.value_size == 0
    }
}

/// Location of a record's bytes on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Data file id.
    pub file_id: u32,
    /// Byte offset of the record within the file.
    pub offset: i64,
    /// Encoded length of the whole record.
    pub size: u32,
}

/// A transactional record buffered during replay until its terminator shows up.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub record: LogRecord,
    pub pos: Position,
}

/// Encode a log record into its on-disk form.
///
/// Returns the encoded buffer and its total length.
pub fn encode_log_record(record: &LogRecord) -> (Vec<u8>, u64) {
    // CRC slot stays zero until the suffix has been assembled.
    let mut header = [0u8; MAX_RECORD_HEADER_SIZE];
    header[4] = record.record_type.to_byte();
    let mut index = 5;
    index += encode_varint64(&mut header[index..], record.key.len() as i64);
    index += encode_varint64(&mut header[index..], record.value.len() as i64);

    let size = index + record.key.len() + record.value.len();
    let mut buf = Vec::with_capacity(size);
    buf.extend_from_slice(&header[..index]);
    buf.extend_from_slice(&record.key);
    buf.extend_from_slice(&record.value);

    let crc = crc32_multi(&[&buf[4..]]);
    buf[..4].copy_from_slice(&crc.to_le_bytes());

    (buf, size as u64)
}

/// Decode a record header from the front of `buf`.
///
/// Returns the header and its encoded length, or `None` when too few bytes
/// remain to hold one. Callers must treat [`RecordHeader::is_eof_sentinel`]
/// headers as end-of-file.
pub fn decode_record_header(buf: &[u8]) -> Option<(RecordHeader, usize)> {
    if buf.len() <= 4 {
        return None;
    }

    let crc = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let record_type = buf[4];

    let mut index = 5;
    let (key_size, n) = decode_varint64(&buf[index..])?;
    index += n;
    let (value_size, n) = decode_varint64(&buf[index..])?;
    index += n;

    if key_size < 0 || value_size < 0 {
        return None;
    }

    Some((
        RecordHeader {
            crc,
            record_type,
            key_size: key_size as u32,
            value_size: value_size as u32,
        },
        index,
    ))
}

/// Encode a position as three zigzag varints: file id, offset, size.
pub fn encode_record_pos(pos: &Position) -> Vec<u8> {
    let mut buf = [0u8; MAX_VARINT32_LEN * 2 + MAX_VARINT64_LEN];
    let mut index = 0;
    index += encode_varint64(&mut buf[index..], pos.file_id as i64);
    index += encode_varint64(&mut buf[index..], pos.offset);
    index += encode_varint64(&mut buf[index..], pos.size as i64);
    buf[..index].to_vec()
}

/// Decode a position from its varint triple.
pub fn decode_record_pos(buf: &[u8]) -> Option<Position> {
    let mut index = 0;
    let (file_id, n) = decode_varint64(&buf[index..])?;
    index += n;
    let (offset, n) = decode_varint64(&buf[index..])?;
    index += n;
    let (size, _) = decode_varint64(&buf[index..])?;

    Some(Position {
        file_id: file_id as u32,
        offset,
        size: size as u32,
    })
}

/// Prefix a user key with an unsigned-varint sequence number.
pub fn key_with_seq(key: &[u8], seq_no: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(uvarint_length(seq_no) + key.len());

    let mut seq = [0u8; MAX_VARINT64_LEN];
    let n = encode_uvarint64(&mut seq, seq_no);
    buf.put_slice(&seq[..n]);
    buf.put_slice(key);
    buf.freeze()
}

/// Split a stored key into the user key and its sequence number.
pub fn parse_record_key(key: &[u8]) -> Option<(Bytes, u64)> {
    let (seq_no, n) = decode_uvarint64(key)?;
    Some((Bytes::copy_from_slice(&key[n..]), seq_no))
}

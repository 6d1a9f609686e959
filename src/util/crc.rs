//! CRC32 checksum utilities.

use crc32fast::Hasher;

/// Compute the CRC32 checksum of the given data.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Compute the CRC32 checksum of multiple data slices.
pub fn crc32_multi(slices: &[&[u8]]) -> u32 {
    let mut hasher = Hasher::new();
    for slice in slices {
        hasher.update(slice);
    }
    hasher.finalize()
}

/// Verify that data matches the expected CRC.
pub fn verify_crc(data: &[u8], expected: u32) -> bool {
    crc32(data) == expected
}

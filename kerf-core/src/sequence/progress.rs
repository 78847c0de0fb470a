//! Persisted batch progress record
//!
//! Serialized to flash with postcard. The CRC covers magic, version and
//! payload so a torn or foreign record is caught after decoding.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Magic number identifying a progress record ("KERF")
pub const PROGRESS_MAGIC: u32 = 0x4B45_5246;

/// Current record layout version
pub const PROGRESS_VERSION: u8 = 1;

/// Largest postcard encoding of a record (varint u32 is at most 5 bytes)
pub const MAX_PROGRESS_RECORD_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProgressRecord {
    pub magic: u32,
    pub version: u8,
    /// Number of cuts completed from the start of the position list
    pub last_completed: u32,
    pub crc: u32,
}

impl ProgressRecord {
    pub fn new(last_completed: u32) -> Self {
        let mut record = Self {
            magic: PROGRESS_MAGIC,
            version: PROGRESS_VERSION,
            last_completed,
            crc: 0,
        };
        record.crc = record.calculate_crc();
        record
    }

    /// CRC32 over magic, version and payload
    pub fn calculate_crc(&self) -> u32 {
        let mut crc: u32 = 0xFFFF_FFFF;
        crc = crc32_update(crc, &self.magic.to_le_bytes());
        crc = crc32_update(crc, &[self.version]);
        crc = crc32_update(crc, &self.last_completed.to_le_bytes());
        !crc
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PROGRESS_MAGIC
            && self.version == PROGRESS_VERSION
            && self.crc == self.calculate_crc()
    }
}

/// CRC32 update (IEEE 802.3 polynomial, reflected)
fn crc32_update(crc: u32, data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc = crc;

    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_valid() {
        let record = ProgressRecord::new(17);
        assert!(record.is_valid());
        assert_eq!(record.magic, PROGRESS_MAGIC);
        assert_eq!(record.version, PROGRESS_VERSION);
    }

    #[test]
    fn test_crc_matches_reference() {
        // Standard check value for "123456789"
        assert_eq!(!crc32_update(0xFFFF_FFFF, b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_changed_payload_fails_crc() {
        let mut record = ProgressRecord::new(42);
        record.last_completed = 43;
        assert!(!record.is_valid());
    }

    #[test]
    fn test_foreign_version_is_invalid() {
        let mut record = ProgressRecord::new(3);
        record.version = 9;
        record.crc = record.calculate_crc();
        assert!(!record.is_valid());
    }
}

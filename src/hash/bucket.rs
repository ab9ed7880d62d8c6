//! Hash bucket and its fixed-layout codec
//!
//! One bucket per slot of the bucket file, little-endian:
//!
//! | field       | bytes               |
//! |-------------|---------------------|
//! | key_count   | 2 (u16)             |
//! | reserved    | 6                   |
//! | overflow_id | 8 (i64, -1 = none)  |
//! | entries     | fanout x (key 8, record_slot 8) |

use crate::Key;
use crate::store::Slot;

/// Absent overflow link.
pub const NO_BUCKET: Slot = -1;

/// Fixed bytes before the entry array.
pub const BUCKET_HEADER_SIZE: usize = 16;

/// Byte size of one encoded bucket for a given fanout.
pub fn bucket_size(fanout: usize) -> usize {
    BUCKET_HEADER_SIZE + fanout * 16
}

/// Invert [`bucket_size`]: the fanout whose buckets fill `record_size`
/// exactly.
pub fn fanout_for_record_size(record_size: usize) -> Option<usize> {
    let payload = record_size.checked_sub(BUCKET_HEADER_SIZE)?;
    if payload % 16 != 0 || payload == 0 {
        return None;
    }
    Some(payload / 16)
}

/// A single bucket: up to `fanout` entries plus an overflow link.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub entries: Vec<(Key, Slot)>,
    pub overflow: Slot,
}

impl Bucket {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            overflow: NO_BUCKET,
        }
    }

    pub fn is_full(&self, fanout: usize) -> bool {
        self.entries.len() >= fanout
    }

    /// Record slot of the first entry matching `key`, if any.
    pub fn find(&self, key: Key) -> Option<Slot> {
        self.entries
            .iter()
            .find(|&&(k, _)| k == key)
            .map(|&(_, slot)| slot)
    }

    /// Encode into a buffer of exactly `record_size` bytes.
    pub fn encode(&self, record_size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; record_size];
        buf[0..2].copy_from_slice(&(self.entries.len() as u16).to_le_bytes());
        buf[8..16].copy_from_slice(&self.overflow.to_le_bytes());

        let mut offset = BUCKET_HEADER_SIZE;
        for &(key, slot) in &self.entries {
            buf[offset..offset + 8].copy_from_slice(&key.to_le_bytes());
            buf[offset + 8..offset + 16].copy_from_slice(&slot.to_le_bytes());
            offset += 16;
        }
        buf
    }

    /// Decode a bucket. A zero-filled page (a home bucket that was never
    /// written, in a file extended past it) must read as empty, so an
    /// empty bucket never trusts its overflow field: chains only grow off
    /// full buckets.
    pub fn decode(buf: &[u8]) -> Self {
        let key_count = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        if key_count == 0 {
            return Self::new();
        }

        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buf[8..16]);
        let overflow = i64::from_le_bytes(bytes);

        let mut entries = Vec::with_capacity(key_count);
        let mut offset = BUCKET_HEADER_SIZE;
        for _ in 0..key_count {
            bytes.copy_from_slice(&buf[offset..offset + 8]);
            let key = i64::from_le_bytes(bytes);
            bytes.copy_from_slice(&buf[offset + 8..offset + 16]);
            let slot = i64::from_le_bytes(bytes);
            entries.push((key, slot));
            offset += 16;
        }

        Self { entries, overflow }
    }
}

impl Default for Bucket {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_size_round_trips_fanout() {
        for fanout in 1..40 {
            assert_eq!(fanout_for_record_size(bucket_size(fanout)), Some(fanout));
        }
        assert_eq!(fanout_for_record_size(BUCKET_HEADER_SIZE), None);
        assert_eq!(fanout_for_record_size(bucket_size(4) + 1), None);
    }

    #[test]
    fn test_bucket_codec() {
        let size = bucket_size(4);
        let mut bucket = Bucket::new();
        bucket.entries = vec![(10, 100), (-3, 200)];
        bucket.overflow = 17;

        let decoded = Bucket::decode(&bucket.encode(size));
        assert_eq!(decoded, bucket);
    }

    #[test]
    fn test_zero_page_reads_as_empty() {
        let buf = vec![0u8; bucket_size(4)];
        let bucket = Bucket::decode(&buf);
        assert!(bucket.entries.is_empty());
        assert_eq!(bucket.overflow, NO_BUCKET);
    }

    #[test]
    fn test_find_first_match() {
        let mut bucket = Bucket::new();
        bucket.entries = vec![(5, 50), (7, 70), (5, 51)];
        assert_eq!(bucket.find(5), Some(50));
        assert_eq!(bucket.find(7), Some(70));
        assert_eq!(bucket.find(9), None);
    }
}

//! Static chained-bucket hash index
//!
//! A fixed number of home buckets (`depth`) occupy slots `0..depth` of the
//! bucket file; overflow buckets are appended after them and linked through
//! `overflow_id`. The bucket count never changes after construction: an
//! overlong chain is accepted degradation, not an error, and no rehashing
//! ever happens.

mod bucket;
mod error;

pub use bucket::{Bucket, NO_BUCKET, bucket_size, fanout_for_record_size};
pub use error::{HashError, HashResult};

use crate::Key;
use crate::store::{SharedSlotFile, Slot};

/// Outcome of a point lookup, with the number of buckets examined.
#[derive(Debug, Clone, Copy)]
pub struct HashLookup {
    pub slot: Option<Slot>,
    pub reads: usize,
}

/// Static hash index over a bucket file, addressing records in a separate
/// record file by slot number only.
pub struct StaticHash {
    buckets: SharedSlotFile,
    records: SharedSlotFile,
    depth: usize,
    fanout: usize,
    bucket_bytes: usize,
}

impl StaticHash {
    /// Open an index with `depth` home buckets. The fanout is derived from
    /// the bucket store's record size. Only handles are stored; home
    /// buckets materialize lazily on first insert. A fresh bucket file is
    /// extended to cover the home region so overflow appends always land
    /// past it.
    pub fn open(
        buckets: SharedSlotFile,
        records: SharedSlotFile,
        depth: usize,
    ) -> HashResult<Self> {
        let (bucket_bytes, empty) = {
            let file = buckets.lock().unwrap();
            (file.record_size(), file.is_empty())
        };
        let fanout = fanout_for_record_size(bucket_bytes)
            .ok_or(HashError::InvalidGeometry { depth, fanout: 0 })?;
        if depth == 0 {
            return Err(HashError::InvalidGeometry { depth, fanout });
        }

        if empty {
            buckets.lock().unwrap().reserve(depth as Slot)?;
        }

        Ok(Self {
            buckets,
            records,
            depth,
            fanout,
            bucket_bytes,
        })
    }

    /// Number of home buckets.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Entries per bucket.
    pub fn fanout(&self) -> usize {
        self.fanout
    }

    /// Record file this index addresses into. The engine itself never
    /// touches record payloads; the handle is held for the caller.
    pub fn record_store(&self) -> &SharedSlotFile {
        &self.records
    }

    /// Home address of `key`. Euclidean so negative keys still land in
    /// `0..depth`.
    pub fn hash(&self, key: Key) -> Slot {
        key.rem_euclid(self.depth as i64)
    }

    /// Insert `(key, record_slot)` at the tail of the key's chain,
    /// appending and linking a fresh overflow bucket when the tail is
    /// full.
    pub fn insert(&mut self, slot: Slot, key: Key) -> HashResult<()> {
        let mut reads = 0;
        let mut addr = self.hash(key);
        let mut tail = self.read_home(addr, &mut reads)?;
        while tail.overflow != NO_BUCKET {
            addr = tail.overflow;
            tail = self.read_chained(addr, &mut reads)?;
        }

        if tail.is_full(self.fanout) {
            let mut fresh = Bucket::new();
            fresh.entries.push((key, slot));
            let new_addr = self
                .buckets
                .lock()
                .unwrap()
                .append(&fresh.encode(self.bucket_bytes))?;
            tail.overflow = new_addr;
            self.write_bucket(addr, &tail)?;
        } else {
            tail.entries.push((key, slot));
            self.write_bucket(addr, &tail)?;
        }
        Ok(())
    }

    /// First record slot matching `key`, walking the chain from the home
    /// bucket; `reads` is the number of buckets examined.
    pub fn search(&self, key: Key) -> HashResult<HashLookup> {
        let mut reads = 0;
        let mut addr = self.hash(key);
        let mut bucket = self.read_home(addr, &mut reads)?;
        loop {
            if let Some(slot) = bucket.find(key) {
                return Ok(HashLookup {
                    slot: Some(slot),
                    reads,
                });
            }
            if bucket.overflow == NO_BUCKET {
                return Ok(HashLookup { slot: None, reads });
            }
            addr = bucket.overflow;
            bucket = self.read_chained(addr, &mut reads)?;
        }
    }

    /// Every record slot matching `key`, in chain order.
    pub fn search_all(&self, key: Key) -> HashResult<Vec<Slot>> {
        let mut reads = 0;
        let mut out = Vec::new();
        let mut bucket = self.read_home(self.hash(key), &mut reads)?;
        loop {
            for &(k, slot) in &bucket.entries {
                if k == key {
                    out.push(slot);
                }
            }
            if bucket.overflow == NO_BUCKET {
                return Ok(out);
            }
            let addr = bucket.overflow;
            bucket = self.read_chained(addr, &mut reads)?;
        }
    }

    /// Record slots for every key in `low..=high`, probing one candidate
    /// key at a time via the integer successor. Only meaningful for dense
    /// key domains; the walk is bounded by `high`, so sparse domains cost
    /// wasted probes rather than unbounded loops.
    pub fn search_range(&self, low: Key, high: Key) -> HashResult<Vec<Slot>> {
        let mut out = Vec::new();
        if low > high {
            return Ok(out);
        }

        let mut key = low;
        loop {
            out.extend(self.search_all(key)?);
            if key == high {
                break;
            }
            key = match next_value(key) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(out)
    }

    // ---- bucket IO ----

    /// Home buckets are lazily created: a slot that reads as missing (or
    /// zero-filled) is an empty bucket, not corruption.
    fn read_home(&self, addr: Slot, reads: &mut usize) -> HashResult<Bucket> {
        let mut buf = vec![0u8; self.bucket_bytes];
        let found = self.buckets.lock().unwrap().retrieve_record(addr, &mut buf)?;
        *reads += 1;
        if !found {
            return Ok(Bucket::new());
        }
        Ok(Bucket::decode(&buf))
    }

    /// Overflow links must resolve; a missing chained bucket means the
    /// index file is out of sync.
    fn read_chained(&self, addr: Slot, reads: &mut usize) -> HashResult<Bucket> {
        let mut buf = vec![0u8; self.bucket_bytes];
        let found = self.buckets.lock().unwrap().retrieve_record(addr, &mut buf)?;
        if !found {
            return Err(HashError::CorruptBucket(addr));
        }
        *reads += 1;
        Ok(Bucket::decode(&buf))
    }

    fn write_bucket(&self, addr: Slot, bucket: &Bucket) -> HashResult<()> {
        let buf = bucket.encode(self.bucket_bytes);
        self.buckets.lock().unwrap().write_record(addr, &buf)?;
        Ok(())
    }
}

/// Successor policy for range probing: the next key after `key` in the
/// dense integer domain.
fn next_value(key: Key) -> Option<Key> {
    key.checked_add(1)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::store::{SharedSlotFile, SlotFile, share};

    use super::*;

    fn open_index(dir: &TempDir, depth: usize, fanout: usize) -> StaticHash {
        let buckets = share(
            SlotFile::open(dir.path().join("buckets.idx"), bucket_size(fanout)).unwrap(),
        );
        let records: SharedSlotFile =
            share(SlotFile::open(dir.path().join("data.bin"), 64).unwrap());
        StaticHash::open(buckets, records, depth).unwrap()
    }

    #[test]
    fn test_insert_then_search_hundred_keys() {
        let dir = TempDir::new().unwrap();
        let mut index = open_index(&dir, 10, 4);

        for key in 0..100 {
            index.insert(key * 10, key).unwrap();
        }
        for key in 0..100 {
            let lookup = index.search(key).unwrap();
            assert_eq!(lookup.slot, Some(key * 10));
            assert!(lookup.reads >= 1);
        }
        assert!(index.search(100).unwrap().slot.is_none());
    }

    #[test]
    fn test_overflow_chains_past_fanout() {
        let dir = TempDir::new().unwrap();
        let mut index = open_index(&dir, 4, 2);

        // Twelve keys in the same home bucket: chain of six buckets.
        for i in 0..12 {
            index.insert(i, i * 4).unwrap();
        }

        for i in 0..12 {
            assert_eq!(index.search(i * 4).unwrap().slot, Some(i));
        }
        let deep = index.search(11 * 4).unwrap();
        assert_eq!(deep.reads, 6);
    }

    #[test]
    fn test_lazy_home_buckets() {
        let dir = TempDir::new().unwrap();
        let mut index = open_index(&dir, 8, 4);

        // Writing home 5 first leaves homes 0..5 zero-filled; they must
        // still read as empty.
        index.insert(1, 5).unwrap();
        assert!(index.search(0).unwrap().slot.is_none());
        assert!(index.search(3).unwrap().slot.is_none());
        assert_eq!(index.search(5).unwrap().slot, Some(1));
    }

    #[test]
    fn test_overflow_appends_after_home_region() {
        let dir = TempDir::new().unwrap();
        let mut index = open_index(&dir, 8, 1);

        // Fill home 2, force one overflow bucket.
        index.insert(10, 2).unwrap();
        index.insert(11, 10).unwrap();

        // The overflow bucket may not shadow an unwritten home slot.
        assert!(index.search(3).unwrap().slot.is_none());
        assert_eq!(index.search(2).unwrap().slot, Some(10));
        assert_eq!(index.search(10).unwrap().slot, Some(11));
    }

    #[test]
    fn test_duplicate_keys() {
        let dir = TempDir::new().unwrap();
        let mut index = open_index(&dir, 4, 2);

        index.insert(100, 7).unwrap();
        index.insert(101, 7).unwrap();
        index.insert(102, 7).unwrap();

        // First match wins for point lookups.
        assert_eq!(index.search(7).unwrap().slot, Some(100));
        assert_eq!(index.search_all(7).unwrap(), vec![100, 101, 102]);
    }

    #[test]
    fn test_search_range_dense_domain() {
        let dir = TempDir::new().unwrap();
        let mut index = open_index(&dir, 10, 4);

        for key in 0..50 {
            index.insert(key * 2, key).unwrap();
        }

        let mut slots = index.search_range(10, 14).unwrap();
        slots.sort_unstable();
        assert_eq!(slots, vec![20, 22, 24, 26, 28]);

        assert!(index.search_range(50, 60).unwrap().is_empty());
        assert!(index.search_range(10, 5).unwrap().is_empty());
    }

    #[test]
    fn test_negative_keys_hash_to_valid_home() {
        let dir = TempDir::new().unwrap();
        let mut index = open_index(&dir, 10, 4);

        index.insert(1, -3).unwrap();
        index.insert(2, -13).unwrap();

        assert_eq!(index.hash(-3), 7);
        assert_eq!(index.search(-3).unwrap().slot, Some(1));
        assert_eq!(index.search(-13).unwrap().slot, Some(2));
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = TempDir::new().unwrap();

        {
            let mut index = open_index(&dir, 10, 2);
            for key in 0..40 {
                index.insert(key + 1000, key).unwrap();
            }
        }

        let index = open_index(&dir, 10, 2);
        for key in 0..40 {
            assert_eq!(index.search(key).unwrap().slot, Some(key + 1000));
        }
    }

    #[test]
    fn test_rejects_zero_depth() {
        let dir = TempDir::new().unwrap();
        let buckets = share(
            SlotFile::open(dir.path().join("buckets.idx"), bucket_size(2)).unwrap(),
        );
        let records = share(SlotFile::open(dir.path().join("data.bin"), 64).unwrap());
        assert!(StaticHash::open(buckets, records, 0).is_err());
    }
}

//! Database manager: fixed-width record file plus one index engine
//!
//! Owns a data file of [`FixedRecord`] payloads and either a B+ tree or a
//! static hash index mapping keys to record slots. Inserts index first and
//! write the payload second; a slot the index points at is at worst a zero
//! page, never a torn payload.

mod record;

pub use record::FixedRecord;

use std::path::Path;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::Key;
use crate::btree::{BPlusTree, TreeError, node_size};
use crate::hash::{HashError, StaticHash, bucket_size};
use crate::store::{SharedSlotFile, Slot, SlotFile, StoreError, share};

/// Tree order used for new index files.
pub const DEFAULT_ORDER: usize = 128;

/// Home bucket count for new hash index files.
pub const DEFAULT_DEPTH: usize = 512;

/// Entries per hash bucket for new index files.
pub const DEFAULT_FANOUT: usize = 20;

const DATA_FILE: &str = "data.bin";
const TREE_FILE: &str = "tree.idx";
const BUCKET_FILE: &str = "buckets.idx";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Tree index error: {0}")]
    Tree(#[from] TreeError),

    #[error("Hash index error: {0}")]
    Hash(#[from] HashError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Index points at slot {0} but the data file has no record there")]
    MissingRecord(Slot),
}

pub type DbResult<T> = Result<T, DbError>;

/// Which index engine backs the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    BTree,
    Hash,
}

/// A record fetched by key, with the number of index pages the lookup
/// touched.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<R> {
    pub record: R,
    pub index_reads: usize,
}

enum DbIndex {
    Tree(BPlusTree),
    Hash(StaticHash),
}

/// Fixed-record database over a directory of slot files.
pub struct Database<R: FixedRecord> {
    data: SharedSlotFile,
    index: DbIndex,
    _marker: std::marker::PhantomData<R>,
}

impl<R: FixedRecord> Database<R> {
    /// Open (or create) a database under `dir` with the given index
    /// engine. The data file is `data.bin`; the index file is `tree.idx`
    /// or `buckets.idx` depending on `kind`.
    pub fn open(dir: impl AsRef<Path>, kind: IndexKind) -> DbResult<Self> {
        let dir = dir.as_ref();
        let data = share(SlotFile::open(dir.join(DATA_FILE), R::SIZE)?);

        let index = match kind {
            IndexKind::BTree => {
                let store = share(SlotFile::open(
                    dir.join(TREE_FILE),
                    node_size(DEFAULT_ORDER),
                )?);
                DbIndex::Tree(BPlusTree::open(store)?)
            }
            IndexKind::Hash => {
                let buckets = share(SlotFile::open(
                    dir.join(BUCKET_FILE),
                    bucket_size(DEFAULT_FANOUT),
                )?);
                DbIndex::Hash(StaticHash::open(buckets, data.clone(), DEFAULT_DEPTH)?)
            }
        };

        Ok(Self {
            data,
            index,
            _marker: std::marker::PhantomData,
        })
    }

    /// Number of records in the data file.
    pub fn len(&self) -> DbResult<usize> {
        Ok(self.data.lock().unwrap().record_count()? as usize)
    }

    pub fn is_empty(&self) -> DbResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Append `record` and index it under its own key. Duplicate keys are
    /// accepted. Returns the slot the payload landed in.
    pub fn insert(&mut self, record: &R) -> DbResult<Slot> {
        let slot = self.data.lock().unwrap().record_count()?;
        match &mut self.index {
            DbIndex::Tree(tree) => tree.insert(record.key(), slot)?,
            DbIndex::Hash(hash) => hash.insert(slot, record.key())?,
        }

        let mut buf = vec![0u8; R::SIZE];
        record.encode(&mut buf);
        self.data.lock().unwrap().write_record(slot, &buf)?;
        Ok(slot)
    }

    /// Insert only if no record with this key exists yet. Returns whether
    /// the record was stored.
    pub fn insert_unique(&mut self, record: &R) -> DbResult<bool> {
        let present = match &self.index {
            DbIndex::Tree(tree) => tree.contains(record.key())?,
            DbIndex::Hash(hash) => hash.search(record.key())?.slot.is_some(),
        };
        if present {
            return Ok(false);
        }
        self.insert(record)?;
        Ok(true)
    }

    /// Look up the first record with `key`.
    pub fn get(&self, key: Key) -> DbResult<Option<Fetched<R>>> {
        let (slot, index_reads) = match &self.index {
            DbIndex::Tree(tree) => {
                let lookup = tree.find(key)?;
                (lookup.entry.map(|e| e.slot), lookup.reads)
            }
            DbIndex::Hash(hash) => {
                let lookup = hash.search(key)?;
                (lookup.slot, lookup.reads)
            }
        };

        match slot {
            Some(slot) => Ok(Some(Fetched {
                record: self.read_record(slot)?,
                index_reads,
            })),
            None => Ok(None),
        }
    }

    /// All records with `low <= key <= high`. Ordered by key under the
    /// tree engine; the hash engine probes keys one at a time, so the
    /// range is only practical over dense integer domains.
    pub fn range(&self, low: Key, high: Key) -> DbResult<Vec<R>> {
        let slots = match &self.index {
            DbIndex::Tree(tree) => tree.range_search(low, high)?,
            DbIndex::Hash(hash) => hash.search_range(low, high)?,
        };

        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            out.push(self.read_record(slot)?);
        }
        Ok(out)
    }

    /// Bulk-load records from a headered CSV file, one insert per row.
    /// Returns the number of records loaded.
    pub fn load_csv(&mut self, path: impl AsRef<Path>) -> DbResult<usize>
    where
        R: DeserializeOwned,
    {
        let mut reader = csv::Reader::from_path(path)?;
        let mut loaded = 0;
        for row in reader.deserialize() {
            let record: R = row?;
            self.insert(&record)?;
            loaded += 1;
        }
        Ok(loaded)
    }

    fn read_record(&self, slot: Slot) -> DbResult<R> {
        let mut buf = vec![0u8; R::SIZE];
        if !self.data.lock().unwrap().retrieve_record(slot, &mut buf)? {
            return Err(DbError::MissingRecord(slot));
        }
        Ok(R::decode(&buf))
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use tempfile::TempDir;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Reading {
        id: i64,
        value: i64,
    }

    impl FixedRecord for Reading {
        const SIZE: usize = 16;

        fn key(&self) -> Key {
            self.id
        }

        fn encode(&self, buf: &mut [u8]) {
            buf[0..8].copy_from_slice(&self.id.to_le_bytes());
            buf[8..16].copy_from_slice(&self.value.to_le_bytes());
        }

        fn decode(buf: &[u8]) -> Self {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[0..8]);
            let id = i64::from_le_bytes(bytes);
            bytes.copy_from_slice(&buf[8..16]);
            let value = i64::from_le_bytes(bytes);
            Self { id, value }
        }
    }

    fn reading(id: i64) -> Reading {
        Reading { id, value: id * 100 }
    }

    #[test]
    fn test_insert_and_get_both_engines() {
        for kind in [IndexKind::BTree, IndexKind::Hash] {
            let dir = TempDir::new().unwrap();
            let mut db: Database<Reading> = Database::open(dir.path(), kind).unwrap();

            for id in 0..50 {
                db.insert(&reading((id * 17) % 50)).unwrap();
            }
            assert_eq!(db.len().unwrap(), 50);

            for id in 0..50 {
                let fetched = db.get(id).unwrap().unwrap();
                assert_eq!(fetched.record, reading(id));
                assert!(fetched.index_reads >= 1);
            }
            assert!(db.get(50).unwrap().is_none());
        }
    }

    #[test]
    fn test_insert_unique_rejects_duplicates() {
        for kind in [IndexKind::BTree, IndexKind::Hash] {
            let dir = TempDir::new().unwrap();
            let mut db: Database<Reading> = Database::open(dir.path(), kind).unwrap();

            assert!(db.insert_unique(&reading(7)).unwrap());
            assert!(!db.insert_unique(&reading(7)).unwrap());
            assert_eq!(db.len().unwrap(), 1);
            assert_eq!(db.get(7).unwrap().unwrap().record, reading(7));
        }
    }

    #[test]
    fn test_range_both_engines() {
        for kind in [IndexKind::BTree, IndexKind::Hash] {
            let dir = TempDir::new().unwrap();
            let mut db: Database<Reading> = Database::open(dir.path(), kind).unwrap();

            for id in 0..30 {
                db.insert(&reading(id)).unwrap();
            }

            let mut ids: Vec<i64> = db.range(10, 14).unwrap().iter().map(|r| r.id).collect();
            ids.sort_unstable();
            assert_eq!(ids, vec![10, 11, 12, 13, 14]);
            assert!(db.range(100, 200).unwrap().is_empty());
        }
    }

    #[test]
    fn test_tree_range_is_ordered() {
        let dir = TempDir::new().unwrap();
        let mut db: Database<Reading> = Database::open(dir.path(), IndexKind::BTree).unwrap();

        for id in [9, 3, 7, 1, 5] {
            db.insert(&reading(id)).unwrap();
        }
        let ids: Vec<i64> = db.range(0, 10).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_load_csv() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("readings.csv");
        std::fs::write(&csv_path, "id,value\n1,100\n2,200\n3,300\n").unwrap();

        let mut db: Database<Reading> =
            Database::open(dir.path().join("db"), IndexKind::BTree).unwrap();
        assert_eq!(db.load_csv(&csv_path).unwrap(), 3);
        assert_eq!(db.len().unwrap(), 3);
        assert_eq!(db.get(2).unwrap().unwrap().record, reading(2));
    }

    #[test]
    fn test_persistence_across_reopen() {
        for kind in [IndexKind::BTree, IndexKind::Hash] {
            let dir = TempDir::new().unwrap();
            {
                let mut db: Database<Reading> = Database::open(dir.path(), kind).unwrap();
                for id in 0..20 {
                    db.insert(&reading(id)).unwrap();
                }
            }

            let db: Database<Reading> = Database::open(dir.path(), kind).unwrap();
            assert_eq!(db.len().unwrap(), 20);
            for id in 0..20 {
                assert_eq!(db.get(id).unwrap().unwrap().record, reading(id));
            }
        }
    }
}

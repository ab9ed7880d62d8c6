use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use lru::LruCache;

use super::error::{StoreError, StoreResult};
use super::{SLOT_CACHE_SIZE, Slot};

/// Flat file of fixed-size records addressed by slot number.
///
/// Slot `n` occupies bytes `n * record_size .. (n + 1) * record_size`.
/// Reads are served from a write-through LRU cache when possible; `size()`
/// always consults file metadata, so cached slots never hide the true
/// length of the file.
pub struct SlotFile {
    file: File,
    path: PathBuf,
    record_size: usize,
    fresh: bool,
    cache: LruCache<Slot, Vec<u8>>,
}

impl SlotFile {
    /// Open the file at `path`, creating it (and its parent directories)
    /// if absent.
    pub fn open<P: AsRef<Path>>(path: P, record_size: usize) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let fresh = file.metadata()?.len() == 0;

        Ok(Self {
            file,
            path,
            record_size,
            fresh,
            cache: LruCache::new(NonZeroUsize::new(SLOT_CACHE_SIZE).unwrap()),
        })
    }

    /// Size of one record in bytes.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Path this file was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True iff the file was zero-length when opened.
    pub fn is_empty(&self) -> bool {
        self.fresh
    }

    /// Current byte length of the file.
    pub fn size(&self) -> StoreResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Number of whole records currently in the file.
    pub fn record_count(&self) -> StoreResult<Slot> {
        Ok((self.size()? / self.record_size as u64) as Slot)
    }

    /// Write one record at `slot`, extending the file if needed.
    pub fn write_record(&mut self, slot: Slot, bytes: &[u8]) -> StoreResult<()> {
        self.check_len(bytes.len())?;
        if slot < 0 {
            return Err(StoreError::InvalidSlot(slot));
        }

        let offset = slot as u64 * self.record_size as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;

        self.cache.put(slot, bytes.to_vec());
        Ok(())
    }

    /// Read one record at `slot` into `buf`.
    ///
    /// Returns `false` if nothing was read (slot beyond the current file
    /// length). A short read at end-of-file zero-fills the tail of `buf`.
    pub fn retrieve_record(&mut self, slot: Slot, buf: &mut [u8]) -> StoreResult<bool> {
        self.check_len(buf.len())?;
        if slot < 0 {
            return Ok(false);
        }

        if let Some(cached) = self.cache.get(&slot) {
            buf.copy_from_slice(cached);
            return Ok(true);
        }

        let offset = slot as u64 * self.record_size as u64;
        self.file.seek(SeekFrom::Start(offset))?;

        let mut total = 0;
        while total < self.record_size {
            let n = self.file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        if total == 0 {
            return Ok(false);
        }
        buf[total..].fill(0);

        self.cache.put(slot, buf.to_vec());
        Ok(true)
    }

    /// Append one record at end-of-file, returning its slot number.
    pub fn append(&mut self, bytes: &[u8]) -> StoreResult<Slot> {
        self.check_len(bytes.len())?;
        let slot = self.record_count()?;
        self.write_record(slot, bytes)?;
        Ok(slot)
    }

    /// Extend the file so it holds at least `n` records (zero-filled).
    /// Slots already beyond `n` are left untouched.
    pub fn reserve(&mut self, n: Slot) -> StoreResult<()> {
        if n < 0 {
            return Err(StoreError::InvalidSlot(n));
        }
        let want = n as u64 * self.record_size as u64;
        if self.size()? < want {
            self.file.set_len(want)?;
        }
        Ok(())
    }

    /// Flush OS buffers to disk.
    pub fn sync(&mut self) -> StoreResult<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn check_len(&self, len: usize) -> StoreResult<()> {
        if len != self.record_size {
            return Err(StoreError::RecordSizeMismatch {
                expected: self.record_size,
                actual: len,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SIZE: usize = 32;

    fn record(fill: u8) -> Vec<u8> {
        vec![fill; SIZE]
    }

    #[test]
    fn test_write_then_retrieve() {
        let dir = TempDir::new().unwrap();
        let mut store = SlotFile::open(dir.path().join("t.bin"), SIZE).unwrap();

        store.write_record(0, &record(1)).unwrap();
        store.write_record(3, &record(4)).unwrap();

        let mut buf = vec![0u8; SIZE];
        assert!(store.retrieve_record(0, &mut buf).unwrap());
        assert_eq!(buf, record(1));
        assert!(store.retrieve_record(3, &mut buf).unwrap());
        assert_eq!(buf, record(4));

        // Slots between written ones read as zeros, not as missing.
        assert!(store.retrieve_record(1, &mut buf).unwrap());
        assert_eq!(buf, record(0));
    }

    #[test]
    fn test_retrieve_past_end() {
        let dir = TempDir::new().unwrap();
        let mut store = SlotFile::open(dir.path().join("t.bin"), SIZE).unwrap();
        store.write_record(0, &record(7)).unwrap();

        let mut buf = vec![0u8; SIZE];
        assert!(!store.retrieve_record(1, &mut buf).unwrap());
        assert!(!store.retrieve_record(100, &mut buf).unwrap());
        assert!(!store.retrieve_record(-1, &mut buf).unwrap());
    }

    #[test]
    fn test_append_assigns_next_slot() {
        let dir = TempDir::new().unwrap();
        let mut store = SlotFile::open(dir.path().join("t.bin"), SIZE).unwrap();

        assert_eq!(store.append(&record(1)).unwrap(), 0);
        assert_eq!(store.append(&record(2)).unwrap(), 1);
        store.write_record(5, &record(6)).unwrap();
        assert_eq!(store.append(&record(7)).unwrap(), 6);
        assert_eq!(store.record_count().unwrap(), 7);
    }

    #[test]
    fn test_reserve_moves_append_point() {
        let dir = TempDir::new().unwrap();
        let mut store = SlotFile::open(dir.path().join("t.bin"), SIZE).unwrap();

        store.reserve(10).unwrap();
        assert_eq!(store.record_count().unwrap(), 10);
        assert_eq!(store.append(&record(9)).unwrap(), 10);

        // Reserving less than the current length is a no-op.
        store.reserve(3).unwrap();
        assert_eq!(store.record_count().unwrap(), 11);
    }

    #[test]
    fn test_is_empty_reflects_open_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.bin");

        {
            let mut store = SlotFile::open(&path, SIZE).unwrap();
            assert!(store.is_empty());
            store.write_record(0, &record(1)).unwrap();
        }

        let store = SlotFile::open(&path, SIZE).unwrap();
        assert!(!store.is_empty());
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.bin");

        {
            let mut store = SlotFile::open(&path, SIZE).unwrap();
            for i in 0..20 {
                store.write_record(i, &record(i as u8)).unwrap();
            }
            store.sync().unwrap();
        }

        let mut store = SlotFile::open(&path, SIZE).unwrap();
        let mut buf = vec![0u8; SIZE];
        for i in 0..20 {
            assert!(store.retrieve_record(i, &mut buf).unwrap());
            assert_eq!(buf, record(i as u8));
        }
    }

    #[test]
    fn test_record_size_mismatch() {
        let dir = TempDir::new().unwrap();
        let mut store = SlotFile::open(dir.path().join("t.bin"), SIZE).unwrap();

        let result = store.write_record(0, &[0u8; SIZE - 1]);
        assert!(matches!(
            result,
            Err(StoreError::RecordSizeMismatch { .. })
        ));

        let mut small = vec![0u8; SIZE + 1];
        let result = store.retrieve_record(0, &mut small);
        assert!(matches!(
            result,
            Err(StoreError::RecordSizeMismatch { .. })
        ));
    }
}

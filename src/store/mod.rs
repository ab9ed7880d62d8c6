//! Slot-addressed record storage
//!
//! A [`SlotFile`] is a flat file of fixed-size records addressed by slot
//! number. Both index engines and the record payload store are built on it;
//! index entries refer to records purely through slot numbers.

mod error;
mod slot_file;

pub use error::{StoreError, StoreResult};
pub use slot_file::SlotFile;

use std::sync::{Arc, Mutex};

/// Positional address of a fixed-size record within a flat file.
pub type Slot = i64;

/// Shared handle to a slot file. Engines and iterators hold clones of this;
/// a single call stack is the only reader and writer.
pub type SharedSlotFile = Arc<Mutex<SlotFile>>;

/// Number of slots kept in each file's write-through cache.
pub const SLOT_CACHE_SIZE: usize = 4096;

/// Wrap a slot file for sharing between an engine and its iterators.
pub fn share(file: SlotFile) -> SharedSlotFile {
    Arc::new(Mutex::new(file))
}

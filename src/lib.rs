//! Slot-addressed disk index kernel
//!
//! A record store of fixed-size slots ([`store`]), two disk-resident index
//! engines over it (a B+ tree in [`btree`], a static chained-bucket hash in
//! [`hash`]), and a small fixed-record database manager ([`db`]) tying a
//! data file to one engine.

pub mod btree;
pub mod db;
pub mod hash;
pub mod store;

pub use btree::{BPlusTree, TreeError, TreeIter, TreeResult};
pub use db::{Database, DbError, DbResult, FixedRecord, IndexKind};
pub use hash::{HashError, HashResult, StaticHash};
pub use store::{SharedSlotFile, Slot, SlotFile, StoreError, StoreResult, share};

/// Index key type shared by both engines.
pub type Key = i64;

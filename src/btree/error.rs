use thiserror::Error;

use crate::store::StoreError;

use super::node::NodeId;

pub type TreeResult<T> = Result<T, TreeError>;

/// Errors that can occur during B+ tree operations
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Corrupt index: node {0} could not be read")]
    CorruptNode(NodeId),

    #[error("Invalid order: {0} (must be >= 3)")]
    InvalidOrder(usize),

    #[error("Record size {0} does not hold a whole node")]
    BadNodeSize(usize),

    #[error("Invalid magic number in index header")]
    InvalidMagic,

    #[error("Unsupported index version: {0}")]
    UnsupportedVersion(u32),

    #[error("Header order {stored} does not match file geometry (order {derived})")]
    OrderMismatch { stored: usize, derived: usize },

    #[error("Cannot dereference the null cursor")]
    NullCursor,
}

use thiserror::Error;

use crate::store::{Slot, StoreError};

pub type HashResult<T> = Result<T, HashError>;

/// Errors that can occur during static hash index operations
#[derive(Debug, Error)]
pub enum HashError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Corrupt index: bucket {0} could not be read")]
    CorruptBucket(Slot),

    #[error("Invalid geometry: depth {depth}, fanout {fanout}")]
    InvalidGeometry { depth: usize, fanout: usize },
}

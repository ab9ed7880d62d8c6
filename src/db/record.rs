use crate::Key;

/// A fixed-width record payload the database can file and index.
///
/// `SIZE` is the exact on-disk byte width; `encode` must fill a buffer of
/// that size and `decode` must accept one. The key is carried inside the
/// payload, so a record read back from disk re-derives its own index entry.
pub trait FixedRecord: Sized {
    const SIZE: usize;

    /// Index key of this record.
    fn key(&self) -> Key;

    /// Write the payload into `buf`, which is exactly `SIZE` bytes.
    fn encode(&self, buf: &mut [u8]);

    /// Read a payload back from `buf`, which is exactly `SIZE` bytes.
    fn decode(buf: &[u8]) -> Self;
}

//! Error types for plustree.

use thiserror::Error;

use super::PageId;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
/// This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in plustree.
///
/// A duplicate insert and a missed lookup are ordinary outcomes and are
/// reported through `Ok(false)` / `Ok(None)`, never through this type.
/// Everything here is fatal for the operation that raised it.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the backing file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page lies beyond the end of the store.
    #[error("{0} not found")]
    PageNotFound(PageId),

    /// Key buffer length differs from the store's `key_bytes`.
    #[error("key length mismatch: expected {expected} bytes, got {actual}")]
    KeyLength { expected: usize, actual: usize },

    /// Data buffer length differs from the store's `data_bytes`.
    #[error("data length mismatch: expected {expected} bytes, got {actual}")]
    DataLength { expected: usize, actual: usize },

    /// Geometry cannot describe a usable store.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A persisted header disagrees with the geometry the caller expected.
    #[error("geometry mismatch on {field}: expected {expected}, found {found}")]
    GeometryMismatch {
        field: &'static str,
        expected: u64,
        found: u64,
    },

    /// File header is missing, truncated, or not ours.
    #[error("corrupt file header: {0}")]
    CorruptHeader(String),

    /// A page decoded to something structurally impossible.
    #[error("corrupt {page}: {reason}")]
    CorruptPage { page: PageId, reason: String },

    /// Stored CRC32 does not match page contents.
    #[error("checksum mismatch on {0}")]
    ChecksumMismatch(PageId),

    /// The allocation table has no free page left.
    #[error("store is full ({capacity} pages)")]
    StoreFull { capacity: u32 },

    /// Location/mode/options combination that cannot be honoured.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A structural tree or allocation invariant does not hold.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),
}

impl Error {
    pub(crate) fn corrupt(page: PageId, reason: impl Into<String>) -> Self {
        Error::CorruptPage {
            page,
            reason: reason.into(),
        }
    }
}

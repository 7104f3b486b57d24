//! Page allocation bookkeeping.
//!
//! - [`PageAllocationTable`] - free/used bitmap over logical pages
//! - [`PatLayout`] - compact (single page) or chained (multi-page) encoding

mod pat;

pub use pat::{PageAllocationTable, PatLayout};

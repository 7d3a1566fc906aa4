//! Tar wire-format constants, definitions, and block-level codecs.
//!
//! An archive is a sequence of 512-byte blocks. Each member is a header
//! block followed by its body rounded up to a whole number of blocks, and
//! the archive ends with two all-zero blocks.

pub mod entry_type;
pub mod field;
pub mod header;
pub mod pax;

pub use entry_type::EntryType;
pub use header::{Header, HeaderVariant};
pub use pax::Pax;

/// Size of a tar block in bytes.
pub const BLOCK_SIZE: usize = 512;

/// The end-of-archive marker: two zero blocks.
pub const EOF_MARKER: [u8; 2 * BLOCK_SIZE] = [0u8; 2 * BLOCK_SIZE];

/// Default limit for the body of a meta entry (PAX or GNU long name).
pub const DEFAULT_MAX_META_ENTRY_SIZE: u64 = 1024 * 1024;

/// Rounds `size` up to the next block boundary.
#[inline]
pub const fn padded_size(size: u64) -> u64 {
    size.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64
}

//! Hard link detection while packing.
//!
//! A regular file with more than one link is archived with its body the
//! first time it is seen; later names of the same `device:inode` become
//! `Link` entries pointing at that first path.
//!
//! # Example
//!
//! ```rust,ignore
//! use tarstream::hardlink::LinkCache;
//!
//! let mut cache = LinkCache::new();
//! if let Some(first) = cache.lookup(&stat, &cwd) {
//!     // emit a Link entry whose linkpath is `first` relative to `cwd`
//! } else {
//!     // once the header for `absolute` is written
//!     cache.record(&stat, &absolute);
//! }
//! ```

mod tracker;

pub use tracker::LinkCache;

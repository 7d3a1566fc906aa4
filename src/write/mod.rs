//! Archive creation.
//!
//! Filesystem paths are packed through [`Packer`] (sans-IO) or [`Pack`]
//! (blocking). Members of existing archives can be copied in with
//! [`Pack::add_entry`] or [`concat`].
//!
//! # Example
//!
//! ```rust,no_run
//! use tarstream::codec::Compression;
//! use tarstream::write::{Pack, PackOptions};
//!
//! # fn main() -> tarstream::Result<()> {
//! let out = std::fs::File::create("backup.tgz")?;
//! let options = PackOptions::new()
//!     .cwd("/home/me")
//!     .compression(Compression::Gzip(6));
//! let mut pack = Pack::new(out, options)?;
//! pack.add("projects")?;
//! pack.add(".profile")?;
//! pack.finish()?;
//! # Ok(())
//! # }
//! ```

mod entry;
pub(crate) mod options;
mod pack;
mod tar_entry;

pub use entry::{EntryRequest, EntryResponse, WriteEntry, mode_fix, perform, prefix_path};
pub use options::{DEFAULT_JOBS, DEFAULT_MAX_READ_SIZE, PackCaches, PackOptions};
pub use pack::{JobId, Pack, PackRequest, PackResponse, Packer, concat, execute};
pub use tar_entry::WriteEntryTar;

//! Archive extraction.
//!
//! [`Unpack`] consumes parser events and recreates entries below an
//! extraction root. Member paths are untrusted: leading components are
//! stripped as configured, `..` and overly deep paths are refused,
//! absolute roots are removed, and parent directories are never created
//! through symbolic links. All of this can be relaxed with
//! [`UnpackOptions::preserve_paths`].
//!
//! Recoverable problems are reported as warnings and the entry is skipped;
//! with [`UnpackOptions::strict`] the first one aborts extraction. Files
//! written before an error stay on disk.
//!
//! # Example
//!
//! ```rust,no_run
//! use tarstream::extract::{UnpackOptions, unpack};
//!
//! # fn main() -> tarstream::Result<()> {
//! let file = std::fs::File::open("release.tar.gz")?;
//! let result = unpack(file, UnpackOptions::new("out").strip(1))?;
//! for warning in &result.warnings {
//!     eprintln!("{warning}");
//! }
//! # Ok(())
//! # }
//! ```

mod dirs;
mod options;
mod unpack;

pub use dirs::DirCache;
pub use options::{DEFAULT_UMASK, UnpackOptions};
pub use unpack::{Unpack, UnpackResult, unpack};

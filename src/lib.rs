//! # tarstream
//!
//! A streaming implementation of POSIX tar (USTAR, PAX, GNU) in pure Rust.
//!
//! Archives are processed block by block without buffering whole members.
//! The core types are sans-IO state machines: the [`Parser`](read::Parser)
//! turns pushed bytes into events, the [`Packer`](write::Packer) turns
//! filesystem answers into archive bytes, and [`Unpack`](extract::Unpack)
//! turns parser events into filesystem operations. Blocking and Tokio
//! drivers sit on top of the same cores.
//!
//! ## Quick Start
//!
//! ### Listing an Archive
//!
//! ```rust,no_run
//! use tarstream::read::{ParseOptions, list};
//!
//! fn main() -> tarstream::Result<()> {
//!     let file = std::fs::File::open("archive.tar.gz")?;
//!     for entry in list(file, ParseOptions::for_path("archive.tar.gz"))? {
//!         println!("{} {} bytes", entry.path, entry.size);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Creating an Archive
//!
//! ```rust,no_run
//! use tarstream::write::{Pack, PackOptions};
//!
//! fn main() -> tarstream::Result<()> {
//!     let out = std::fs::File::create("project.tar")?;
//!     let mut pack = Pack::new(out, PackOptions::new().portable(true))?;
//!     pack.add("src")?;
//!     pack.add("Cargo.toml")?;
//!     pack.finish()?;
//!     Ok(())
//! }
//! ```
//!
//! ### Extracting an Archive
//!
//! ```rust,no_run
//! use tarstream::extract::{UnpackOptions, unpack};
//!
//! fn main() -> tarstream::Result<()> {
//!     let file = std::fs::File::open("project.tar")?;
//!     let result = unpack(file, UnpackOptions::new("./output"))?;
//!     println!("extracted {} entries", result.entries_extracted);
//!     Ok(())
//! }
//! ```
//!
//! ## Warnings and Strict Mode
//!
//! Damaged headers, unsafe paths and filesystem failures are reported as
//! [`Warning`]s and the affected entry is skipped. Enabling `strict` on
//! any options struct turns the first warning into [`Error::Warning`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `gzip` | Yes | Gzip detection and compression via `flate2` |
//! | `brotli` | Yes | Brotli support |
//! | `zstd` | Yes | Zstandard support |
//! | `async` | No | Tokio drivers in [`async_io`] |
//!
//! With a codec feature disabled its magic bytes are still recognised and
//! reported as [`Error::UnsupportedFeature`].
//!
//! ## Async API
//!
//! ```rust,ignore
//! use tarstream::async_io::unpack_async;
//! use tarstream::extract::UnpackOptions;
//!
//! #[tokio::main]
//! async fn main() -> tarstream::Result<()> {
//!     let file = tokio::fs::File::open("project.tar").await?;
//!     unpack_async(file, UnpackOptions::new("./output")).await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Chunk size used by the blocking and async readers.
pub(crate) const READ_BUFFER_SIZE: usize = 64 * 1024;

pub mod codec;
pub mod error;
pub mod extract;
pub mod format;
pub mod fs;
pub mod hardlink;
pub mod ownership;
pub mod read;
pub mod safety;
pub mod timestamp;
pub mod warning;
pub mod write;

#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
pub mod async_io;

pub use error::{Error, Result};
pub use timestamp::Timestamp;
pub use warning::{WarnHandler, Warning, WarningCode};

pub use extract::{Unpack, UnpackOptions, UnpackResult, unpack};
pub use format::{EntryType, Header, Pax};
pub use read::{ParseEvent, ParseOptions, Parser, ReadEntry, TarReader, list};
pub use write::{Pack, PackOptions, Packer, concat};

#[cfg(feature = "async")]
pub use async_io::{AsyncPack, AsyncTarReader, AsyncUnpack, unpack_async};

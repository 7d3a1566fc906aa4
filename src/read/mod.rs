//! Archive reading: the streaming parser and its drivers.
//!
//! [`Parser`] turns a byte stream into [`ParseEvent`]s. [`TarReader`] drives
//! it from any [`std::io::Read`]; [`list`] collects entry metadata.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::fs::File;
//! use tarstream::read::{ParseOptions, TarReader};
//!
//! let file = File::open("archive.tgz")?;
//! let mut reader = TarReader::with_options(file, ParseOptions::for_path("archive.tgz"));
//! while let Some((entry, body)) = reader.next_entry()? {
//!     println!("{} ({} bytes)", entry.path, body.len());
//! }
//! # Ok::<(), tarstream::Error>(())
//! ```

mod entry;
mod options;
mod parser;
mod reader;

pub use crate::codec::Decompression;
pub use entry::ReadEntry;
pub use options::{Filter, FilterTarget, ParseOptions};
pub use parser::{ParseEvent, Parser};
pub use reader::{TarReader, list};

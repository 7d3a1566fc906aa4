//! Error types for tar archive operations.
//!
//! This module provides the [`Error`] enum which represents every fatal
//! failure mode of the parser, packer and extractor, along with a convenient
//! [`Result<T>`] type alias.
//!
//! Most problems found inside an archive are *not* fatal. They are reported
//! as [`Warning`]s and the offending entry is skipped. In strict mode every
//! warning is promoted to [`Error::Warning`] instead.
//!
//! # Example
//!
//! ```rust
//! use tarstream::Error;
//!
//! fn describe(error: &Error) -> &'static str {
//!     match error {
//!         Error::Io(_) => "file error",
//!         Error::InvalidFormat(_) | Error::CorruptHeader { .. } => "not a tar archive",
//!         Error::PathTraversal { .. } => "unsafe path in archive",
//!         Error::Warning(_) => "strict mode rejected the archive",
//!         _ => "other error",
//!     }
//! }
//! ```

use std::io;
use std::path::PathBuf;

use crate::warning::Warning;

/// The main error type for tar operations.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io], [`Filesystem`][Self::Filesystem] | Reading input, stat/open/mkdir failures |
/// | Format | [`InvalidFormat`][Self::InvalidFormat], [`CorruptHeader`][Self::CorruptHeader], [`Truncated`][Self::Truncated] | Invalid archive data |
/// | Security | [`PathTraversal`][Self::PathTraversal] | Unsafe entry paths |
/// | Resources | [`ResourceLimitExceeded`][Self::ResourceLimitExceeded] | Safety limits |
/// | Strict mode | [`Warning`][Self::Warning] | A warning promoted to an error |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading input or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input is not a tar archive, or uses a layout that cannot be decoded.
    #[error("Invalid tar format: {0}")]
    InvalidFormat(String),

    /// A header block could not be decoded.
    ///
    /// The offset is the position of the block in the decompressed archive.
    #[error("Corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// The byte offset of the header block.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// The input ended in the middle of an entry.
    #[error("Truncated input (needed {needed} more bytes, only {available} available)")]
    Truncated {
        /// Bytes still required to complete the entry.
        needed: u64,
        /// Bytes that were buffered when the input ended.
        available: u64,
    },

    /// An entry path tried to escape the extraction root.
    #[error("Path traversal detected: {path}")]
    PathTraversal {
        /// The offending path as stored in the archive.
        path: String,
    },

    /// A configured resource limit was exceeded.
    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    /// A filesystem operation failed.
    ///
    /// Carries the originating syscall name and path, mirroring POSIX
    /// error reports such as `ENOENT: lstat 'missing.txt'`.
    #[error("{syscall} '{}': {source}", path.display())]
    Filesystem {
        /// The failing operation (`lstat`, `open`, `mkdir`, ...).
        syscall: &'static str,
        /// The path the operation was applied to.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A warning promoted to an error because strict mode is enabled.
    #[error("{0}")]
    Warning(Warning),

    /// A feature required by the archive is not available in this build.
    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature {
        /// The name of the unsupported feature.
        feature: &'static str,
    },

    /// The compressed input could not be decoded.
    #[error("Decompression failed: {0}")]
    Decompression(String),

    /// The API was used out of order (for example, writing after `end()`).
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
}

impl Error {
    /// Builds a [`Error::Filesystem`] from an I/O error.
    pub fn filesystem(syscall: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            syscall,
            path: path.into(),
            source,
        }
    }

    /// Returns true if this error was raised by a path-safety check.
    pub fn is_security_error(&self) -> bool {
        match self {
            Self::PathTraversal { .. } => true,
            Self::Warning(w) => w.is_security_related(),
            _ => false,
        }
    }

    /// Returns true if the archive bytes themselves are malformed.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat(_)
                | Self::CorruptHeader { .. }
                | Self::Truncated { .. }
                | Self::Decompression(_)
        )
    }

    /// Returns true if the operation could be retried or the entry skipped.
    ///
    /// Strict-mode promotions and filesystem failures affect a single entry;
    /// format errors and API misuse do not recover.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Warning(_) | Self::Filesystem { .. } | Self::ResourceLimitExceeded(_)
        )
    }
}

/// A specialized Result type for tar operations.
pub type Result<T> = std::result::Result<T, Error>;

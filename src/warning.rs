//! Recoverable diagnostics.
//!
//! Problems found inside an archive (bad checksums, unsafe paths, failed
//! `utimes` calls, ...) are reported as [`Warning`]s. By default the
//! offending entry is skipped and processing continues. With `strict`
//! enabled, the first warning aborts the operation as [`Error::Warning`].

use std::fmt;
use std::sync::Arc;

use crate::{Error, Result};

/// Classification of a [`Warning`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum WarningCode {
    /// The header or its metadata is invalid (checksum, missing path, ...).
    EntryInvalid,
    /// The entry could not be processed (unsafe path, filesystem failure).
    EntryError,
    /// Informational: the entry was processed after a safe correction.
    EntryInfo,
    /// The entry type is not supported by this operation.
    EntryUnsupported,
    /// The input is not recognisable as a tar archive.
    BadArchive,
    /// The input ended prematurely.
    Abort,
}

impl WarningCode {
    /// Returns the conventional tar diagnostic code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntryInvalid => "TAR_ENTRY_INVALID",
            Self::EntryError => "TAR_ENTRY_ERROR",
            Self::EntryInfo => "TAR_ENTRY_INFO",
            Self::EntryUnsupported => "TAR_ENTRY_UNSUPPORTED",
            Self::BadArchive => "TAR_BAD_ARCHIVE",
            Self::Abort => "TAR_ABORT",
        }
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recoverable problem reported while reading, packing or extracting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Classification.
    pub code: WarningCode,
    /// Human-readable message, e.g. `"checksum failure"`.
    pub message: String,
    /// Entry path the warning refers to, if any.
    pub path: Option<String>,
    /// Failing syscall for filesystem problems.
    pub syscall: Option<&'static str>,
}

impl Warning {
    /// Creates a warning without a path.
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
            syscall: None,
        }
    }

    /// Attaches the entry path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attaches the failing syscall.
    pub fn with_syscall(mut self, syscall: &'static str) -> Self {
        self.syscall = Some(syscall);
        self
    }

    /// Builds an [`WarningCode::EntryError`] warning from a filesystem failure.
    pub fn from_io(syscall: &'static str, path: impl Into<String>, err: &std::io::Error) -> Self {
        Self::new(WarningCode::EntryError, err.to_string())
            .with_path(path)
            .with_syscall(syscall)
    }

    /// Returns true for path-safety diagnostics.
    pub fn is_security_related(&self) -> bool {
        self.code == WarningCode::EntryError
            && (self.message.contains("..")
                || self.message.contains("escaped")
                || self.message.contains("symbolic link"))
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(syscall) = self.syscall {
            write!(f, " ({syscall})")?;
        }
        if let Some(path) = &self.path {
            write!(f, " [{path}]")?;
        }
        Ok(())
    }
}

/// Callback receiving non-fatal warnings.
pub type WarnHandler = Arc<dyn Fn(&Warning) + Send + Sync>;

/// Routes warnings to a handler, the log, or (strict) an error.
#[derive(Clone, Default)]
pub(crate) struct Diagnostics {
    strict: bool,
    handler: Option<WarnHandler>,
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("strict", &self.strict)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

impl Diagnostics {
    pub(crate) fn new(strict: bool, handler: Option<WarnHandler>) -> Self {
        Self { strict, handler }
    }

    /// Reports a warning, or returns it as an error in strict mode.
    pub(crate) fn warn(&self, warning: Warning) -> Result<()> {
        if self.strict {
            return Err(Error::Warning(warning));
        }
        match &self.handler {
            Some(handler) => handler(&warning),
            None => log::warn!("{warning}"),
        }
        Ok(())
    }
}

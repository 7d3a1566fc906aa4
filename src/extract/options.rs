//! Extraction options.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::codec::Decompression;
use crate::format::DEFAULT_MAX_META_ENTRY_SIZE;
use crate::read::{Filter, FilterTarget, ParseOptions};
use crate::safety::DEFAULT_MAX_DEPTH;
use crate::warning::{Diagnostics, WarnHandler, Warning};

/// Default umask applied to extracted modes.
pub const DEFAULT_UMASK: u32 = 0o022;

/// Options for [`Unpack`](crate::extract::Unpack).
///
/// # Example
///
/// ```rust
/// use tarstream::extract::UnpackOptions;
///
/// let options = UnpackOptions::new("/tmp/out").strip(1).keep(true);
/// assert_eq!(options.fmode, 0o644);
/// assert_eq!(options.dmode, 0o755);
/// ```
#[derive(Clone)]
pub struct UnpackOptions {
    /// Extraction root.
    pub cwd: PathBuf,
    /// Promote every warning to a fatal error.
    pub strict: bool,
    /// Receives non-fatal warnings; they are logged when unset.
    pub on_warn: Option<WarnHandler>,
    /// Entries rejected by the filter are skipped.
    pub filter: Option<Filter>,
    /// Allow `..`, absolute paths and extraction through symlinks.
    pub preserve_paths: bool,
    /// Always unlink an existing file before creating the new one.
    pub unlink: bool,
    /// Never overwrite existing files.
    pub keep: bool,
    /// Keep existing files that are newer than the entry.
    pub newer: bool,
    /// Number of leading path components to drop.
    pub strip: usize,
    /// Entries with more path components are skipped.
    pub max_depth: usize,
    /// Do not restore modification times.
    pub no_mtime: bool,
    /// Restore the archived uid/gid.
    pub preserve_owner: bool,
    /// Do not chmod after creation; the process umask applies.
    pub no_chmod: bool,
    /// Mask removed from archived modes.
    pub umask: u32,
    /// Mode for files whose header carries none.
    pub fmode: u32,
    /// Mode for created parent directories and directories without a mode.
    pub dmode: u32,
    /// Bodies of PAX / long-name entries above this size are ignored.
    pub max_meta_entry_size: u64,
    /// Compression detection policy.
    pub decompression: Decompression,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        Self {
            cwd: PathBuf::from("."),
            strict: false,
            on_warn: None,
            filter: None,
            preserve_paths: false,
            unlink: false,
            keep: false,
            newer: false,
            strip: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            no_mtime: false,
            preserve_owner: false,
            no_chmod: false,
            umask: DEFAULT_UMASK,
            fmode: 0o666 & !DEFAULT_UMASK,
            dmode: 0o777 & !DEFAULT_UMASK,
            max_meta_entry_size: DEFAULT_MAX_META_ENTRY_SIZE,
            decompression: Decompression::Auto,
        }
    }
}

impl fmt::Debug for UnpackOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnpackOptions")
            .field("cwd", &self.cwd)
            .field("strict", &self.strict)
            .field("filter", &self.filter.is_some())
            .field("preserve_paths", &self.preserve_paths)
            .field("unlink", &self.unlink)
            .field("keep", &self.keep)
            .field("newer", &self.newer)
            .field("strip", &self.strip)
            .field("max_depth", &self.max_depth)
            .field("no_mtime", &self.no_mtime)
            .field("preserve_owner", &self.preserve_owner)
            .field("no_chmod", &self.no_chmod)
            .field("umask", &format_args!("{:o}", self.umask))
            .field("decompression", &self.decompression)
            .finish_non_exhaustive()
    }
}

impl UnpackOptions {
    /// Creates default options extracting into `cwd`.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            ..Self::default()
        }
    }

    /// Sets strict mode.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Sets the warning handler.
    pub fn on_warn<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Warning) + Send + Sync + 'static,
    {
        self.on_warn = Some(Arc::new(handler));
        self
    }

    /// Sets the entry filter.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str, FilterTarget<'_>) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Allows unsafe paths.
    pub fn preserve_paths(mut self, preserve_paths: bool) -> Self {
        self.preserve_paths = preserve_paths;
        self
    }

    /// Unlinks before creating.
    pub fn unlink(mut self, unlink: bool) -> Self {
        self.unlink = unlink;
        self
    }

    /// Never overwrites.
    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    /// Keeps newer files.
    pub fn newer(mut self, newer: bool) -> Self {
        self.newer = newer;
        self
    }

    /// Drops leading path components.
    pub fn strip(mut self, strip: usize) -> Self {
        self.strip = strip;
        self
    }

    /// Sets the depth limit.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Skips restoring mtimes.
    pub fn no_mtime(mut self, no_mtime: bool) -> Self {
        self.no_mtime = no_mtime;
        self
    }

    /// Restores ownership.
    pub fn preserve_owner(mut self, preserve_owner: bool) -> Self {
        self.preserve_owner = preserve_owner;
        self
    }

    /// Skips chmod.
    pub fn no_chmod(mut self, no_chmod: bool) -> Self {
        self.no_chmod = no_chmod;
        self
    }

    /// Sets the umask and derives the default file and directory modes.
    pub fn umask(mut self, umask: u32) -> Self {
        self.umask = umask & 0o777;
        self.fmode = 0o666 & !self.umask;
        self.dmode = 0o777 & !self.umask;
        self
    }

    /// Sets the meta entry size limit.
    pub fn max_meta_entry_size(mut self, size: u64) -> Self {
        self.max_meta_entry_size = size;
        self
    }

    /// Sets the compression policy.
    pub fn decompression(mut self, decompression: Decompression) -> Self {
        self.decompression = decompression;
        self
    }

    pub(crate) fn parse_options(&self) -> ParseOptions {
        ParseOptions::new()
            .strict(self.strict)
            .max_meta_entry_size(self.max_meta_entry_size)
            .filter_arc(self.filter.clone())
            .decompression(self.decompression)
    }

    pub(crate) fn diagnostics(&self) -> Diagnostics {
        Diagnostics::new(self.strict, self.on_warn.clone())
    }
}

//! Pack options and shared caches.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::Timestamp;
use crate::codec::Compression;
use crate::fs::FileStat;
use crate::hardlink::LinkCache;
use crate::read::{Filter, FilterTarget};
use crate::warning::{Diagnostics, WarnHandler, Warning};

/// Default number of concurrent stat/readdir requests.
pub const DEFAULT_JOBS: usize = 4;

/// Default upper bound for a single file read.
pub const DEFAULT_MAX_READ_SIZE: usize = 16 * 1024 * 1024;

/// Options for [`Packer`](crate::write::Packer) and its drivers.
///
/// # Example
///
/// ```rust
/// use tarstream::codec::Compression;
/// use tarstream::write::PackOptions;
///
/// let options = PackOptions::new()
///     .cwd("/srv/data")
///     .portable(true)
///     .compression(Compression::Gzip(6));
/// assert_eq!(options.jobs, 4);
/// ```
#[derive(Clone)]
pub struct PackOptions {
    /// Directory that added paths are relative to.
    pub cwd: PathBuf,
    /// Promote every warning to a fatal error.
    pub strict: bool,
    /// Receives non-fatal warnings; they are logged when unset.
    pub on_warn: Option<WarnHandler>,
    /// Omit owner ids/names, atime/ctime and dev/ino/nlink, normalise modes
    /// and drop directory mtimes for reproducible output.
    pub portable: bool,
    /// Prefix prepended to every archive path.
    pub prefix: Option<String>,
    /// Fixed mtime written for every entry.
    pub mtime: Option<Timestamp>,
    /// Omit mtimes entirely.
    pub no_mtime: bool,
    /// Never emit PAX headers; overlong fields are truncated.
    pub no_pax: bool,
    /// Archive what symlinks point at instead of the links.
    pub follow: bool,
    /// Do not descend into directories.
    pub no_dir_recurse: bool,
    /// Maximum number of outstanding stat/readdir requests.
    pub jobs: usize,
    /// Maximum bytes requested per file read.
    pub max_read_size: usize,
    /// Paths rejected by the filter are skipped.
    pub filter: Option<Filter>,
    /// Output compression.
    pub compression: Compression,
    /// Keep absolute paths instead of stripping their root.
    pub preserve_paths: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            cwd: PathBuf::from("."),
            strict: false,
            on_warn: None,
            portable: false,
            prefix: None,
            mtime: None,
            no_mtime: false,
            no_pax: false,
            follow: false,
            no_dir_recurse: false,
            jobs: DEFAULT_JOBS,
            max_read_size: DEFAULT_MAX_READ_SIZE,
            filter: None,
            compression: Compression::None,
            preserve_paths: false,
        }
    }
}

impl fmt::Debug for PackOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackOptions")
            .field("cwd", &self.cwd)
            .field("strict", &self.strict)
            .field("portable", &self.portable)
            .field("prefix", &self.prefix)
            .field("mtime", &self.mtime)
            .field("no_mtime", &self.no_mtime)
            .field("no_pax", &self.no_pax)
            .field("follow", &self.follow)
            .field("no_dir_recurse", &self.no_dir_recurse)
            .field("jobs", &self.jobs)
            .field("max_read_size", &self.max_read_size)
            .field("filter", &self.filter.is_some())
            .field("compression", &self.compression)
            .field("preserve_paths", &self.preserve_paths)
            .finish_non_exhaustive()
    }
}

impl PackOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the working directory.
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
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

    /// Enables portable output.
    pub fn portable(mut self, portable: bool) -> Self {
        self.portable = portable;
        self
    }

    /// Sets the path prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets a fixed mtime.
    pub fn mtime(mut self, mtime: Timestamp) -> Self {
        self.mtime = Some(mtime);
        self
    }

    /// Omits mtimes.
    pub fn no_mtime(mut self, no_mtime: bool) -> Self {
        self.no_mtime = no_mtime;
        self
    }

    /// Disables PAX headers.
    pub fn no_pax(mut self, no_pax: bool) -> Self {
        self.no_pax = no_pax;
        self
    }

    /// Follows symlinks.
    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    /// Disables directory recursion.
    pub fn no_dir_recurse(mut self, no_dir_recurse: bool) -> Self {
        self.no_dir_recurse = no_dir_recurse;
        self
    }

    /// Sets the concurrency bound (at least 1).
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Sets the maximum read size (at least one block).
    pub fn max_read_size(mut self, size: usize) -> Self {
        self.max_read_size = size.max(crate::format::BLOCK_SIZE);
        self
    }

    /// Sets the path filter.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str, FilterTarget<'_>) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Sets output compression.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Keeps absolute paths.
    pub fn preserve_paths(mut self, preserve_paths: bool) -> Self {
        self.preserve_paths = preserve_paths;
        self
    }

    pub(crate) fn diagnostics(&self) -> Diagnostics {
        Diagnostics::new(self.strict, self.on_warn.clone())
    }

    pub(crate) fn accepts(&self, path: &str, target: FilterTarget<'_>) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(path, target))
    }
}

/// Caches owned by a pack and optionally carried over to the next one.
///
/// Keys are absolute paths (the pack's `cwd` joined with the added path).
#[derive(Debug, Clone, Default)]
pub struct PackCaches {
    /// Stat results.
    pub stat: HashMap<PathBuf, FileStat>,
    /// Sorted directory listings.
    pub readdir: HashMap<PathBuf, Vec<String>>,
    /// Hard link targets.
    pub links: LinkCache,
}

impl PackCaches {
    /// Creates empty caches.
    pub fn new() -> Self {
        Self::default()
    }
}

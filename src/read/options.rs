//! Parsing options and entry filters.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::codec::Decompression;
use crate::format::DEFAULT_MAX_META_ENTRY_SIZE;
use crate::fs::FileStat;
use crate::read::ReadEntry;

/// What a [`Filter`] is asked about.
#[derive(Debug, Clone, Copy)]
pub enum FilterTarget<'a> {
    /// A filesystem path about to be packed.
    Stat(&'a FileStat),
    /// An archive member about to be surfaced, re-packed or extracted.
    Entry(&'a ReadEntry),
}

/// Predicate deciding whether a path is processed; `false` skips it.
pub type Filter = Arc<dyn Fn(&str, FilterTarget<'_>) -> bool + Send + Sync>;

/// Options for [`Parser`](crate::read::Parser) and the readers built on it.
///
/// # Example
///
/// ```rust
/// use tarstream::read::ParseOptions;
///
/// let options = ParseOptions::new()
///     .strict(true)
///     .max_meta_entry_size(64 * 1024)
///     .filter(|path, _| !path.ends_with(".tmp"));
/// assert!(options.strict);
/// ```
#[derive(Clone)]
pub struct ParseOptions {
    /// Promote every warning to a fatal error.
    pub strict: bool,
    /// Bodies of PAX / long-name entries above this size are ignored.
    pub max_meta_entry_size: u64,
    /// Entries rejected by the filter are consumed but not surfaced.
    pub filter: Option<Filter>,
    /// Compression detection policy.
    pub decompression: Decompression,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict: false,
            max_meta_entry_size: DEFAULT_MAX_META_ENTRY_SIZE,
            filter: None,
            decompression: Decompression::Auto,
        }
    }
}

impl fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseOptions")
            .field("strict", &self.strict)
            .field("max_meta_entry_size", &self.max_meta_entry_size)
            .field("filter", &self.filter.is_some())
            .field("decompression", &self.decompression)
            .finish()
    }
}

impl ParseOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options with a decompression hint taken from a file name.
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        Self::default().decompression(Decompression::from_path(path))
    }

    /// Sets strict mode.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Sets the meta entry size limit.
    pub fn max_meta_entry_size(mut self, size: u64) -> Self {
        self.max_meta_entry_size = size;
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

    /// Sets a shared entry filter.
    pub fn filter_arc(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the decompression policy.
    pub fn decompression(mut self, decompression: Decompression) -> Self {
        self.decompression = decompression;
        self
    }
}

//! Directory creation with a per-extraction cache.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use crate::fs::Filesystem;
use crate::{Warning, WarningCode};

/// Directories known to exist, keyed by absolute path.
///
/// Owned by one [`Unpack`](crate::extract::Unpack); pass it to the next one
/// to skip re-checking directories created earlier.
#[derive(Debug, Clone, Default)]
pub struct DirCache {
    made: HashSet<PathBuf>,
}

impl DirCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `dir` is known to exist.
    pub fn contains(&self, dir: &Path) -> bool {
        self.made.contains(dir)
    }

    /// Records `dir` as existing.
    pub fn insert(&mut self, dir: impl Into<PathBuf>) {
        self.made.insert(dir.into());
    }

    /// Forgets `path` and everything below it.
    ///
    /// Called before a non-directory replaces whatever was at `path`.
    pub fn prune(&mut self, path: &Path) {
        self.made.retain(|dir| !dir.starts_with(path));
    }

    /// Number of cached directories.
    pub fn len(&self) -> usize {
        self.made.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.made.is_empty()
    }
}

/// Why a directory chain could not be created.
#[derive(Debug)]
pub(crate) enum MkdirError {
    /// A component is a symbolic link.
    ThroughSymlink(PathBuf),
    /// The OS refused.
    Io { path: PathBuf, source: io::Error },
}

impl MkdirError {
    pub(crate) fn into_warning(self, entry_path: &str) -> Warning {
        match self {
            Self::ThroughSymlink(link) => Warning::new(
                WarningCode::EntryError,
                "Cannot extract through symbolic link",
            )
            .with_path(format!("{entry_path} ({})", link.display()))
            .with_syscall("mkdir"),
            Self::Io { path, source } => {
                Warning::from_io("mkdir", path.to_string_lossy(), &source)
            }
        }
    }
}

pub(crate) struct MkdirOptions<'a> {
    pub(crate) cwd: &'a Path,
    pub(crate) mode: u32,
    pub(crate) unlink: bool,
    pub(crate) preserve_paths: bool,
}

/// Creates `dir` and any missing parents below `cwd`.
pub(crate) fn make_dir(
    fs: &dyn Filesystem,
    cache: &mut DirCache,
    dir: &Path,
    options: &MkdirOptions<'_>,
) -> Result<(), MkdirError> {
    if cache.contains(dir) {
        return Ok(());
    }
    let mut chain: Vec<&Path> = dir
        .ancestors()
        .take_while(|p| *p != options.cwd && !p.as_os_str().is_empty())
        .collect();
    chain.reverse();

    for part in chain {
        if cache.contains(part) {
            continue;
        }
        match fs.mkdir(part, options.mode) {
            Ok(()) => {}
            Err(err) => settle_existing(fs, part, err, options)?,
        }
        cache.insert(part);
    }
    Ok(())
}

fn settle_existing(
    fs: &dyn Filesystem,
    part: &Path,
    err: io::Error,
    options: &MkdirOptions<'_>,
) -> Result<(), MkdirError> {
    let io_error = |source| MkdirError::Io {
        path: part.to_path_buf(),
        source,
    };
    let stat = fs.lstat(part).map_err(|_| io_error(err))?;
    if stat.is_dir() {
        return Ok(());
    }
    if stat.is_symlink() {
        if !options.preserve_paths {
            return Err(MkdirError::ThroughSymlink(part.to_path_buf()));
        }
        if fs.stat(part).is_ok_and(|target| target.is_dir()) {
            return Ok(());
        }
    }
    if options.unlink {
        fs.unlink(part).map_err(io_error)?;
        return fs.mkdir(part, options.mode).map_err(io_error);
    }
    Err(io_error(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "file exists and is not a directory",
    )))
}

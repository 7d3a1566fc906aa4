//! Unix file ownership carried through archives.
//!
//! Tar headers record a numeric uid/gid and optional user/group names.
//! [`Ownership`] bundles them so packing can capture them from a
//! [`FileStat`] and extraction can restore them through a [`Filesystem`].
//!
//! # Note
//!
//! Names are carried verbatim; they are never resolved against the local
//! user database. Restoring ownership uses the numeric ids and normally
//! requires elevated privileges.
//!
//! # Example
//!
//! ```rust
//! use tarstream::ownership::Ownership;
//!
//! let owner = Ownership::from_ids(1000, 1000).with_names("user", "users");
//! assert!(owner.is_present());
//! ```

use std::io;
use std::path::Path;

use crate::fs::{FileStat, Filesystem};
use crate::read::ReadEntry;

/// Owner and group of an archive member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ownership {
    /// User id.
    pub uid: Option<u64>,
    /// Group id.
    pub gid: Option<u64>,
    /// User name.
    pub uname: Option<String>,
    /// Group name.
    pub gname: Option<String>,
}

impl Ownership {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates ownership from numeric ids.
    pub fn from_ids(uid: u64, gid: u64) -> Self {
        Self {
            uid: Some(uid),
            gid: Some(gid),
            ..Self::default()
        }
    }

    /// Adds user and group names.
    pub fn with_names(mut self, uname: impl Into<String>, gname: impl Into<String>) -> Self {
        self.uname = Some(uname.into());
        self.gname = Some(gname.into());
        self
    }

    /// Captures the ids of a stat result.
    pub fn from_stat(stat: &FileStat) -> Self {
        Self::from_ids(stat.uid, stat.gid)
    }

    /// Takes the owner fields of a parsed entry.
    pub fn from_entry(entry: &ReadEntry) -> Self {
        Self {
            uid: entry.uid,
            gid: entry.gid,
            uname: entry.uname.clone(),
            gname: entry.gname.clone(),
        }
    }

    /// Returns true if any ownership information is present.
    pub fn is_present(&self) -> bool {
        self.uid.is_some() || self.gid.is_some() || self.uname.is_some() || self.gname.is_some()
    }

    /// Applies the numeric ids to `path` without following symlinks.
    ///
    /// Does nothing when neither id is known.
    pub fn apply(&self, fs: &dyn Filesystem, path: &Path) -> io::Result<()> {
        if self.uid.is_none() && self.gid.is_none() {
            return Ok(());
        }
        fs.chown(path, self.uid, self.gid)
    }
}

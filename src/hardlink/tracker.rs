//! Device/inode cache used to emit hard links while packing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::fs::FileStat;

/// Platform-independent file identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FileId {
    device: u64,
    inode: u64,
}

impl FileId {
    fn of(stat: &FileStat) -> Self {
        Self {
            device: stat.dev,
            inode: stat.ino,
        }
    }
}

/// Maps `device:inode` to the absolute path of the first packed occurrence.
///
/// Only files with more than one link are tracked. The cache can be shared
/// between packs through [`PackCaches`](crate::write::PackCaches).
#[derive(Debug, Clone, Default)]
pub struct LinkCache {
    seen_files: HashMap<FileId, PathBuf>,
}

impl LinkCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an already packed name for the file described by `stat`.
    ///
    /// Returns the first occurrence's absolute path if it lies under `cwd`.
    /// Files with a single link never match.
    pub fn lookup(&self, stat: &FileStat, cwd: &Path) -> Option<PathBuf> {
        if stat.nlink <= 1 {
            return None;
        }
        self.seen_files
            .get(&FileId::of(stat))
            .filter(|first| first.starts_with(cwd))
            .cloned()
    }

    /// Records `absolute` as the occurrence later names link to.
    ///
    /// Call once its header is in the archive. Files with a single link are
    /// never recorded.
    pub fn record(&mut self, stat: &FileStat, absolute: &Path) {
        if stat.nlink > 1 {
            self.seen_files.insert(FileId::of(stat), absolute.to_path_buf());
        }
    }

    /// Returns the recorded path for `device:inode`.
    pub fn get(&self, device: u64, inode: u64) -> Option<&Path> {
        self.seen_files
            .get(&FileId { device, inode })
            .map(PathBuf::as_path)
    }

    /// Returns the number of tracked files.
    pub fn len(&self) -> usize {
        self.seen_files.len()
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.seen_files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Timestamp;
    use crate::fs::FileKind;

    fn stat(ino: u64, nlink: u64) -> FileStat {
        FileStat {
            kind: FileKind::File,
            mode: 0o644,
            uid: 0,
            gid: 0,
            size: 1,
            mtime: Timestamp::default(),
            atime: Timestamp::default(),
            ctime: Timestamp::default(),
            dev: 7,
            ino,
            nlink,
        }
    }

    #[test]
    fn test_single_link_untracked() {
        let mut cache = LinkCache::new();
        cache.record(&stat(1, 1), Path::new("/r/a"));
        assert!(cache.is_empty());
        assert!(cache.lookup(&stat(1, 1), Path::new("/r")).is_none());
    }

    #[test]
    fn test_second_occurrence_links_to_first() {
        let mut cache = LinkCache::new();
        let cwd = Path::new("/r");
        assert!(cache.lookup(&stat(1, 2), cwd).is_none());
        cache.record(&stat(1, 2), Path::new("/r/a"));
        assert_eq!(cache.lookup(&stat(1, 2), cwd), Some(PathBuf::from("/r/a")));
        assert_eq!(cache.get(7, 1), Some(Path::new("/r/a")));
    }

    #[test]
    fn test_target_outside_root_is_replaced() {
        let mut cache = LinkCache::new();
        cache.record(&stat(1, 2), Path::new("/elsewhere/a"));
        assert!(cache.lookup(&stat(1, 2), Path::new("/r")).is_none());
        cache.record(&stat(1, 2), Path::new("/r/b"));
        assert_eq!(cache.get(7, 1), Some(Path::new("/r/b")));
    }
}

//! Filesystem capability used by packing and extraction.
//!
//! Pack and Unpack never call `std::fs` directly; they go through a
//! [`Filesystem`] so the I/O boundary can be replaced (for sandboxing,
//! in-memory tests or remote stores). [`OsFilesystem`] is the default,
//! backed by the host filesystem.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::Timestamp;

/// Kind of a filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Character device.
    CharDevice,
    /// Block device.
    BlockDevice,
    /// Named pipe.
    Fifo,
    /// Socket or anything else.
    Other,
}

/// The subset of `stat(2)` the archive code relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Object kind.
    pub kind: FileKind,
    /// Permission bits (`st_mode & 0o7777`).
    pub mode: u32,
    /// Owner user id.
    pub uid: u64,
    /// Owner group id.
    pub gid: u64,
    /// Size in bytes.
    pub size: u64,
    /// Modification time.
    pub mtime: Timestamp,
    /// Access time.
    pub atime: Timestamp,
    /// Status change time.
    pub ctime: Timestamp,
    /// Device id.
    pub dev: u64,
    /// Inode number.
    pub ino: u64,
    /// Hard link count.
    pub nlink: u64,
}

impl FileStat {
    /// Returns true for directories.
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// Returns true for regular files.
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    /// Returns true for symbolic links.
    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }
}

/// Filesystem operations needed by [`Pack`](crate::write::Pack) and
/// [`Unpack`](crate::extract::Unpack).
///
/// Directory listings return entry names only, lossily converted to UTF-8.
pub trait Filesystem: Send + Sync + fmt::Debug {
    /// Stats `path` without following a final symlink.
    fn lstat(&self, path: &Path) -> io::Result<FileStat>;
    /// Stats `path`, following symlinks.
    fn stat(&self, path: &Path) -> io::Result<FileStat>;
    /// Reads a symlink target.
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;
    /// Lists the names in a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>>;
    /// Opens a file for reading.
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;
    /// Creates (or truncates) a file for writing with the given mode.
    fn create(&self, path: &Path, mode: u32) -> io::Result<Box<dyn Write + Send>>;
    /// Creates a single directory.
    fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()>;
    /// Creates a symlink at `path` pointing at `target`.
    fn symlink(&self, target: &Path, path: &Path) -> io::Result<()>;
    /// Creates a hard link at `path` to the existing `target`.
    fn hard_link(&self, target: &Path, path: &Path) -> io::Result<()>;
    /// Removes a non-directory.
    fn unlink(&self, path: &Path) -> io::Result<()>;
    /// Removes an empty directory.
    fn rmdir(&self, path: &Path) -> io::Result<()>;
    /// Sets access and modification times without following symlinks.
    fn set_times(&self, path: &Path, atime: Timestamp, mtime: Timestamp) -> io::Result<()>;
    /// Changes ownership without following symlinks.
    fn chown(&self, path: &Path, uid: Option<u64>, gid: Option<u64>) -> io::Result<()>;
    /// Changes permission bits.
    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;
}

/// [`Filesystem`] backed by the host OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn lstat(&self, path: &Path) -> io::Result<FileStat> {
        fs::symlink_metadata(path).map(|m| stat_from_metadata(&m))
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        fs::metadata(path).map(|m| stat_from_metadata(&m))
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect()
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(path)?))
    }

    fn create(&self, path: &Path, mode: u32) -> io::Result<Box<dyn Write + Send>> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;
        Ok(Box::new(options.open(path)?))
    }

    fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;
        builder.create(path)
    }

    #[cfg(unix)]
    fn symlink(&self, target: &Path, path: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, path)
    }

    #[cfg(not(unix))]
    fn symlink(&self, _target: &Path, _path: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "symbolic links are not supported on this platform",
        ))
    }

    fn hard_link(&self, target: &Path, path: &Path) -> io::Result<()> {
        fs::hard_link(target, path)
    }

    fn unlink(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn rmdir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn set_times(&self, path: &Path, atime: Timestamp, mtime: Timestamp) -> io::Result<()> {
        filetime::set_symlink_file_times(path, atime.to_file_time(), mtime.to_file_time())
    }

    #[cfg(unix)]
    fn chown(&self, path: &Path, uid: Option<u64>, gid: Option<u64>) -> io::Result<()> {
        let uid = uid.map(u32::try_from).transpose().map_err(invalid_id)?;
        let gid = gid.map(u32::try_from).transpose().map_err(invalid_id)?;
        std::os::unix::fs::lchown(path, uid, gid)
    }

    #[cfg(not(unix))]
    fn chown(&self, _path: &Path, _uid: Option<u64>, _gid: Option<u64>) -> io::Result<()> {
        Ok(())
    }

    #[cfg(unix)]
    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }

    #[cfg(not(unix))]
    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut permissions = fs::metadata(path)?.permissions();
        permissions.set_readonly(mode & 0o222 == 0);
        fs::set_permissions(path, permissions)
    }
}

#[cfg(unix)]
fn invalid_id(err: std::num::TryFromIntError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, err)
}

#[cfg(unix)]
fn stat_from_metadata(meta: &fs::Metadata) -> FileStat {
    use std::os::unix::fs::{FileTypeExt, MetadataExt};

    let ft = meta.file_type();
    let kind = if ft.is_symlink() {
        FileKind::Symlink
    } else if ft.is_dir() {
        FileKind::Directory
    } else if ft.is_file() {
        FileKind::File
    } else if ft.is_char_device() {
        FileKind::CharDevice
    } else if ft.is_block_device() {
        FileKind::BlockDevice
    } else if ft.is_fifo() {
        FileKind::Fifo
    } else {
        FileKind::Other
    };
    let time = |secs: i64, nanos: i64| {
        Timestamp::from_unix_secs_nanos(secs, nanos as u32)
            .unwrap_or(Timestamp::from_unix_secs(secs))
    };
    FileStat {
        kind,
        mode: meta.mode() & 0o7777,
        uid: u64::from(meta.uid()),
        gid: u64::from(meta.gid()),
        size: meta.size(),
        mtime: time(meta.mtime(), meta.mtime_nsec()),
        atime: time(meta.atime(), meta.atime_nsec()),
        ctime: time(meta.ctime(), meta.ctime_nsec()),
        dev: meta.dev(),
        ino: meta.ino(),
        nlink: meta.nlink(),
    }
}

#[cfg(not(unix))]
fn stat_from_metadata(meta: &fs::Metadata) -> FileStat {
    let ft = meta.file_type();
    let kind = if ft.is_symlink() {
        FileKind::Symlink
    } else if ft.is_dir() {
        FileKind::Directory
    } else if ft.is_file() {
        FileKind::File
    } else {
        FileKind::Other
    };
    let mode = match (kind, meta.permissions().readonly()) {
        (FileKind::Directory, _) => 0o755,
        (_, true) => 0o444,
        (_, false) => 0o644,
    };
    let time = |t: io::Result<std::time::SystemTime>| {
        t.map(Timestamp::from_system_time).unwrap_or_default()
    };
    FileStat {
        kind,
        mode,
        uid: 0,
        gid: 0,
        size: meta.len(),
        mtime: time(meta.modified()),
        atime: time(meta.accessed()),
        ctime: time(meta.modified()),
        dev: 0,
        ino: 0,
        nlink: 1,
    }
}

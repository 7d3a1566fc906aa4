//! Hard links are packed once and restored as links.

#![cfg(unix)]

mod common;

use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use common::{archive, file, link, pack};
use tarstream::format::EntryType;
use tarstream::read::{ParseOptions, list};
use tarstream::fs::{FileStat, Filesystem, OsFilesystem};
use tarstream::write::{Pack, PackCaches, PackOptions, Packer, execute};
use tarstream::{Timestamp, UnpackOptions, unpack};

fn linked_pair() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a"), b"hi").unwrap();
    fs::hard_link(dir.path().join("a"), dir.path().join("b")).unwrap();
    dir
}

#[test]
fn test_second_name_becomes_link_entry() {
    let src = linked_pair();
    let data = pack(src.path(), &["a", "b"], PackOptions::new());
    // two headers, one body block, end marker
    assert_eq!(data.len(), 512 + 512 + 512 + 1024);

    let entries = list(&data[..], ParseOptions::new()).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].path, "a");
    assert_eq!(entries[0].entry_type, EntryType::File);
    assert_eq!(entries[0].size, 2);
    assert_eq!(entries[1].path, "b");
    assert_eq!(entries[1].entry_type, EntryType::Link);
    assert_eq!(entries[1].linkpath.as_deref(), Some("a"));
    assert_eq!(entries[1].size, 0);

    let dst = tempfile::tempdir().unwrap();
    let result = unpack(&data[..], UnpackOptions::new(dst.path())).unwrap();
    assert!(result.is_ok());
    let a = fs::metadata(dst.path().join("a")).unwrap();
    let b = fs::metadata(dst.path().join("b")).unwrap();
    assert_eq!((a.dev(), a.ino()), (b.dev(), b.ino()));
    assert_eq!(a.nlink(), 2);
    assert_eq!(fs::read(dst.path().join("b")).unwrap(), b"hi");
}

#[test]
fn test_link_cache_spans_packs() {
    let src = linked_pair();
    let options = || PackOptions::new().cwd(src.path());
    let fs = OsFilesystem;
    let mut file = None;

    let mut first = Packer::new(options()).unwrap();
    first.add("a").unwrap();
    first.end().unwrap();
    while let Some(request) = first.poll_request() {
        first.complete(execute(&fs, request, &mut file)).unwrap();
    }
    let caches: PackCaches = first.into_caches();

    let mut second = Packer::with_caches(options(), caches).unwrap();
    second.add("b").unwrap();
    second.end().unwrap();
    let mut out = second.take_output();
    while let Some(request) = second.poll_request() {
        second.complete(execute(&fs, request, &mut file)).unwrap();
        out.extend(second.take_output());
    }
    let entries = list(&out[..], ParseOptions::new()).unwrap();
    assert_eq!(entries[0].entry_type, EntryType::Link);
    assert_eq!(entries[0].linkpath.as_deref(), Some("a"));
}

#[test]
fn test_link_to_missing_target_is_reported() {
    let data = archive(&[link("orphan", EntryType::Link, "nowhere")]);
    let dst = tempfile::tempdir().unwrap();
    let result = unpack(&data[..], UnpackOptions::new(dst.path())).unwrap();
    assert_eq!(result.entries_failed, 1);
    assert_eq!(result.warnings[0].syscall, Some("link"));
    assert!(!dst.path().join("orphan").exists());
}

#[test]
fn test_link_replaces_existing_file() {
    let data = archive(&[file("target", b"data"), link("alias", EntryType::Link, "target")]);
    let dst = tempfile::tempdir().unwrap();
    fs::write(dst.path().join("alias"), b"stale").unwrap();
    unpack(&data[..], UnpackOptions::new(dst.path())).unwrap();
    assert_eq!(fs::read(dst.path().join("alias")).unwrap(), b"data");
    assert_eq!(fs::metadata(dst.path().join("target")).unwrap().nlink(), 2);
}

/// Local filesystem whose `open` fails for one file name.
#[derive(Debug)]
struct DenyOpen(&'static str);

impl Filesystem for DenyOpen {
    fn lstat(&self, path: &Path) -> io::Result<FileStat> {
        OsFilesystem.lstat(path)
    }
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        OsFilesystem.stat(path)
    }
    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        OsFilesystem.read_link(path)
    }
    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        OsFilesystem.read_dir(path)
    }
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        if path.file_name().is_some_and(|name| name == self.0) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        }
        OsFilesystem.open(path)
    }
    fn create(&self, path: &Path, mode: u32) -> io::Result<Box<dyn Write + Send>> {
        OsFilesystem.create(path, mode)
    }
    fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()> {
        OsFilesystem.mkdir(path, mode)
    }
    fn symlink(&self, target: &Path, path: &Path) -> io::Result<()> {
        OsFilesystem.symlink(target, path)
    }
    fn hard_link(&self, target: &Path, path: &Path) -> io::Result<()> {
        OsFilesystem.hard_link(target, path)
    }
    fn unlink(&self, path: &Path) -> io::Result<()> {
        OsFilesystem.unlink(path)
    }
    fn rmdir(&self, path: &Path) -> io::Result<()> {
        OsFilesystem.rmdir(path)
    }
    fn set_times(&self, path: &Path, atime: Timestamp, mtime: Timestamp) -> io::Result<()> {
        OsFilesystem.set_times(path, atime, mtime)
    }
    fn chown(&self, path: &Path, uid: Option<u64>, gid: Option<u64>) -> io::Result<()> {
        OsFilesystem.chown(path, uid, gid)
    }
    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        OsFilesystem.chmod(path, mode)
    }
}

#[test]
fn test_unreadable_first_name_is_not_linked_to() {
    let src = linked_pair();
    let warnings = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&warnings);
    let options = PackOptions::new()
        .cwd(src.path())
        .on_warn(move |w| sink.lock().unwrap().push(w.syscall));
    let mut pack = Pack::with_filesystem(Vec::new(), options, Arc::new(DenyOpen("a"))).unwrap();
    pack.add("a").unwrap();
    pack.add("b").unwrap();
    let data = pack.finish().unwrap();

    assert_eq!(*warnings.lock().unwrap(), [Some("open")]);
    let entries = list(&data[..], ParseOptions::new()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "b");
    assert_eq!(entries[0].entry_type, EntryType::File);
    assert_eq!(entries[0].linkpath, None);
    assert_eq!(entries[0].size, 2);
}

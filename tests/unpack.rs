//! Extraction safety and overwrite policy.

mod common;

use std::fs;
use std::sync::{Arc, Mutex};

use common::{archive, dir, file, header, link, member_from};
use tarstream::extract::{DirCache, Unpack};
use tarstream::format::EntryType;
use tarstream::{Error, UnpackOptions, WarningCode, unpack};

/// An extraction root nested two levels inside a scratch directory.
fn nested_root() -> (tempfile::TempDir, std::path::PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("a/b");
    fs::create_dir_all(&root).unwrap();
    (tmp, root)
}

#[test]
fn test_traversal_to_etc_passwd_is_refused() {
    let (tmp, root) = nested_root();
    let data = archive(&[file("../../etc/passwd", b"root::0:0::/:/bin/sh\n"), file("ok", b"fine")]);
    let result = unpack(&data[..], UnpackOptions::new(&root)).unwrap();

    assert_eq!(result.entries_extracted, 1);
    assert_eq!(result.entries_skipped, 1);
    let warning = &result.warnings[0];
    assert_eq!(warning.code, WarningCode::EntryError);
    assert_eq!(warning.message, "path contains '..'");
    assert_eq!(warning.path.as_deref(), Some("../../etc/passwd"));
    assert!(warning.is_security_related());
    assert!(!tmp.path().join("etc").exists());
    assert_eq!(fs::read(root.join("ok")).unwrap(), b"fine");
}

#[test]
fn test_traversal_allowed_with_preserve_paths() {
    let (tmp, root) = nested_root();
    let data = archive(&[file("../sibling.txt", b"up")]);
    let result = unpack(&data[..], UnpackOptions::new(&root).preserve_paths(true)).unwrap();
    assert!(result.is_ok());
    assert_eq!(fs::read(tmp.path().join("a/sibling.txt")).unwrap(), b"up");
}

#[test]
fn test_hardlink_target_outside_is_refused() {
    let (_tmp, root) = nested_root();
    let data = archive(&[link("inside", EntryType::Link, "../../secret")]);
    let result = unpack(&data[..], UnpackOptions::new(&root)).unwrap();
    assert_eq!(result.warnings[0].message, "linkpath contains '..'");
    assert!(!root.join("inside").exists());
}

#[test]
fn test_absolute_paths_are_relativized() {
    let (_tmp, root) = nested_root();
    let data = archive(&[file("/etc/motd", b"hello"), link("/alias", EntryType::Link, "/etc/motd")]);
    let result = unpack(&data[..], UnpackOptions::new(&root)).unwrap();

    let messages: Vec<_> = result.warnings.iter().map(|w| w.message.as_str()).collect();
    assert_eq!(
        messages,
        [
            "stripping / from absolute path",
            "stripping / from absolute path",
            "stripping / from absolute linkpath",
        ]
    );
    assert!(result.warnings.iter().all(|w| w.code == WarningCode::EntryInfo));
    assert_eq!(result.entries_extracted, 2);
    assert_eq!(fs::read(root.join("etc/motd")).unwrap(), b"hello");
    assert_eq!(fs::read(root.join("alias")).unwrap(), b"hello");
}

#[test]
fn test_strict_stops_at_first_warning() {
    let (_tmp, root) = nested_root();
    let data = archive(&[file("first", b"1"), file("../bad", b"2"), file("third", b"3")]);
    let err = unpack(&data[..], UnpackOptions::new(&root).strict(true)).unwrap_err();
    assert!(matches!(err, Error::Warning(ref w) if w.message == "path contains '..'"));
    assert!(root.join("first").exists());
    assert!(!root.join("third").exists());
}

#[test]
fn test_warnings_reach_handler() {
    let (_tmp, root) = nested_root();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let options = UnpackOptions::new(&root).on_warn(move |w| sink.lock().unwrap().push(w.message.clone()));
    let data = archive(&[file("../x", b""), member_from(header("pipe", EntryType::Fifo, 0), b"")]);
    unpack(&data[..], options).unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        ["path contains '..'", "unsupported entry type: FIFO"]
    );
}

#[test]
fn test_filter_skips_entries() {
    let (_tmp, root) = nested_root();
    let data = archive(&[dir("docs/"), file("docs/a.md", b"a"), file("bin/tool", b"t")]);
    let options = UnpackOptions::new(&root).filter(|path, _| path.starts_with("docs"));
    let result = unpack(&data[..], options).unwrap();
    assert_eq!(result.entries_extracted, 2);
    assert_eq!(result.entries_skipped, 1);
    assert!(!root.join("bin").exists());
}

#[test]
fn test_newer_keeps_recent_files() {
    let (_tmp, root) = nested_root();
    fs::write(root.join("config"), b"local edit").unwrap();
    let data = archive(&[file("config", b"from archive")]);

    let result = unpack(&data[..], UnpackOptions::new(&root).newer(true)).unwrap();
    assert_eq!(result.entries_skipped, 1);
    assert_eq!(fs::read(root.join("config")).unwrap(), b"local edit");

    unpack(&data[..], UnpackOptions::new(&root)).unwrap();
    assert_eq!(fs::read(root.join("config")).unwrap(), b"from archive");
}

#[cfg(unix)]
#[test]
fn test_hard_linked_file_is_not_written_through() {
    let (_tmp, root) = nested_root();
    fs::write(root.join("f"), b"shared").unwrap();
    fs::hard_link(root.join("f"), root.join("g")).unwrap();
    let data = archive(&[file("f", b"replaced")]);
    unpack(&data[..], UnpackOptions::new(&root)).unwrap();
    assert_eq!(fs::read(root.join("f")).unwrap(), b"replaced");
    assert_eq!(fs::read(root.join("g")).unwrap(), b"shared");
}

#[cfg(unix)]
#[test]
fn test_umask_applies_to_modes() {
    use std::os::unix::fs::PermissionsExt;

    let (_tmp, root) = nested_root();
    let mut h = header("open", EntryType::File, 1);
    h.mode = Some(0o777);
    let data = archive(&[member_from(h, b"x")]);
    unpack(&data[..], UnpackOptions::new(&root).umask(0o027)).unwrap();
    let mode = fs::metadata(root.join("open")).unwrap().permissions().mode() & 0o7777;
    assert_eq!(mode, 0o750);
}

#[test]
fn test_chunked_writes_and_shared_dir_cache() {
    let (_tmp, root) = nested_root();
    let data = archive(&[dir("d/"), file("d/one", &[1u8; 900]), file("d/two", &[2u8; 100])]);

    let mut unpack = Unpack::new(UnpackOptions::new(&root)).unwrap();
    for chunk in data.chunks(97) {
        unpack.write(chunk).unwrap();
    }
    unpack.end().unwrap();
    assert!(unpack.is_closed());
    assert_eq!(unpack.pending(), 0);
    assert!(unpack.dir_cache().contains(&root.join("d")));

    let cache: DirCache = unpack.dir_cache().clone();
    let result = unpack.finish().unwrap();
    assert_eq!(result.entries_extracted, 3);
    assert_eq!(result.bytes_written, 1000);

    let again = Unpack::new(UnpackOptions::new(&root)).unwrap().with_dir_cache(cache);
    assert!(again.dir_cache().contains(&root.join("d")));
    assert_eq!(fs::read(root.join("d/one")).unwrap(), vec![1u8; 900]);
}

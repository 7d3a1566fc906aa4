//! Streaming extraction onto a filesystem.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::extract::UnpackOptions;
use crate::extract::dirs::{DirCache, MkdirError, MkdirOptions, make_dir};
use crate::format::EntryType;
use crate::fs::{FileStat, Filesystem, OsFilesystem};
use crate::ownership::Ownership;
use crate::read::{ParseEvent, Parser, ReadEntry};
use crate::safety::{
    has_parent_traversal, is_within, path_depth, resolve_lexically, strip_absolute_path,
    strip_components,
};
use crate::warning::Diagnostics;
use crate::{Error, READ_BUFFER_SIZE, Result, Timestamp, Warning, WarningCode};

/// Summary of an extraction.
#[derive(Debug, Clone, Default)]
pub struct UnpackResult {
    /// Entries written to the filesystem.
    pub entries_extracted: usize,
    /// Entries skipped by filters, safety checks, `keep`/`newer` or
    /// unsupported types.
    pub entries_skipped: usize,
    /// Entries whose filesystem operation failed.
    pub entries_failed: usize,
    /// File content bytes written.
    pub bytes_written: u64,
    /// Every warning reported, in order.
    pub warnings: Vec<Warning>,
}

impl UnpackResult {
    /// Returns true if no entry failed.
    pub fn is_ok(&self) -> bool {
        self.entries_failed == 0
    }
}

enum Sink {
    None,
    Discard,
    File {
        entry: Box<ReadEntry>,
        path: PathBuf,
        writer: Option<Box<dyn Write + Send>>,
    },
}

/// Push-style extractor.
///
/// Archive bytes go in through [`write`](Self::write); entries are checked
/// and written as soon as their headers and bodies arrive. The extractor is
/// closed once input has ended and no filesystem operation is pending.
///
/// # Example
///
/// ```rust,no_run
/// use tarstream::extract::{Unpack, UnpackOptions};
///
/// # fn main() -> tarstream::Result<()> {
/// let bytes = std::fs::read("site.tar")?;
/// let mut unpack = Unpack::new(UnpackOptions::new("/srv/site"))?;
/// for chunk in bytes.chunks(8192) {
///     unpack.write(chunk)?;
/// }
/// let result = unpack.finish()?;
/// println!("{} entries", result.entries_extracted);
/// # Ok(())
/// # }
/// ```
pub struct Unpack {
    parser: Parser,
    options: UnpackOptions,
    cwd: PathBuf,
    fs: Arc<dyn Filesystem>,
    diagnostics: Diagnostics,
    dirs: DirCache,
    sink: Sink,
    pending: usize,
    ended: bool,
    closed: bool,
    cwd_checked: bool,
    result: UnpackResult,
}

impl std::fmt::Debug for Unpack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unpack")
            .field("cwd", &self.cwd)
            .field("pending", &self.pending)
            .field("ended", &self.ended)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Unpack {
    /// Creates an extractor writing to the local filesystem.
    pub fn new(options: UnpackOptions) -> Result<Self> {
        Self::with_filesystem(options, Arc::new(OsFilesystem))
    }

    /// Creates an extractor over a custom filesystem.
    pub fn with_filesystem(options: UnpackOptions, fs: Arc<dyn Filesystem>) -> Result<Self> {
        let cwd = std::path::absolute(&options.cwd)?;
        Ok(Self {
            parser: Parser::new(options.parse_options()),
            diagnostics: options.diagnostics(),
            options,
            cwd,
            fs,
            dirs: DirCache::new(),
            sink: Sink::None,
            pending: 0,
            ended: false,
            closed: false,
            cwd_checked: false,
            result: UnpackResult::default(),
        })
    }

    /// Reuses a directory cache from an earlier extraction.
    pub fn with_dir_cache(mut self, dirs: DirCache) -> Self {
        self.dirs = dirs;
        self
    }

    /// The directory cache.
    pub fn dir_cache(&self) -> &DirCache {
        &self.dirs
    }

    /// Feeds archive bytes.
    pub fn write(&mut self, chunk: &[u8]) -> Result<()> {
        if self.ended {
            return Err(Error::InvalidState("write after end"));
        }
        self.parser.write(chunk)?;
        self.drain()
    }

    /// Signals the end of input.
    pub fn end(&mut self) -> Result<()> {
        if self.ended {
            return Ok(());
        }
        self.parser.end()?;
        self.drain()?;
        self.ended = true;
        self.maybe_close();
        Ok(())
    }

    /// Ends input if needed and returns the summary.
    pub fn finish(mut self) -> Result<UnpackResult> {
        self.end()?;
        Ok(self.result)
    }

    /// Returns true once input has ended and nothing is pending.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Filesystem operations not yet completed.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// The summary so far.
    pub fn result(&self) -> &UnpackResult {
        &self.result
    }

    /// The absolute extraction root.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    fn drain(&mut self) -> Result<()> {
        while let Some(event) = self.parser.next_event() {
            self.handle(event)?;
        }
        Ok(())
    }

    fn handle(&mut self, event: ParseEvent) -> Result<()> {
        match event {
            ParseEvent::Entry(entry) => self.on_entry(entry),
            ParseEvent::Data(data) => self.on_data(&data),
            ParseEvent::EntryEnd => self.on_entry_end(),
            ParseEvent::Ignored(entry) => {
                if !entry.meta {
                    self.result.entries_skipped += 1;
                }
                Ok(())
            }
            ParseEvent::Warning(warning) => self.warn(warning),
            ParseEvent::Meta { entry_type, .. } => {
                log::trace!("applied {entry_type} header");
                Ok(())
            }
            ParseEvent::Eof | ParseEvent::End => Ok(()),
        }
    }

    fn warn(&mut self, warning: Warning) -> Result<()> {
        self.result.warnings.push(warning.clone());
        self.diagnostics.warn(warning)
    }

    fn pend(&mut self) {
        self.pending += 1;
    }

    fn unpend(&mut self) {
        self.pending = self.pending.saturating_sub(1);
        self.maybe_close();
    }

    fn maybe_close(&mut self) {
        if self.ended && self.pending == 0 && !self.closed {
            self.closed = true;
            log::debug!(
                "extraction into {} closed: {} extracted, {} skipped",
                self.cwd.display(),
                self.result.entries_extracted,
                self.result.entries_skipped
            );
        }
    }

    fn skip(&mut self) {
        self.sink = Sink::Discard;
        self.result.entries_skipped += 1;
    }

    fn fail(&mut self, warning: Warning) -> Result<()> {
        self.sink = Sink::Discard;
        self.result.entries_failed += 1;
        self.unpend();
        self.warn(warning)
    }

    fn on_entry(&mut self, mut entry: ReadEntry) -> Result<()> {
        let Some(absolute) = self.check_path(&mut entry)? else {
            self.skip();
            return Ok(());
        };
        match entry.entry_type {
            EntryType::Directory | EntryType::GnuDumpDir => {
                entry.mode = entry.mode.map(|m| m | 0o700);
            }
            EntryType::File
            | EntryType::OldFile
            | EntryType::ContiguousFile
            | EntryType::Link
            | EntryType::SymbolicLink => {}
            other => {
                self.skip();
                return self.warn(
                    Warning::new(
                        WarningCode::EntryUnsupported,
                        format!("unsupported entry type: {other}"),
                    )
                    .with_path(entry.path.clone()),
                );
            }
        }
        self.check_fs(entry, absolute)
    }

    /// Applies strip, depth and traversal rules; `None` skips the entry.
    fn check_path(&mut self, entry: &mut ReadEntry) -> Result<Option<PathBuf>> {
        let strip = self.options.strip;
        if strip > 0 {
            let Some(path) = strip_components(&entry.path, strip) else {
                return Ok(None);
            };
            entry.path = path;
            if entry.entry_type == EntryType::Link {
                if let Some(linkpath) = &entry.linkpath {
                    let Some(stripped) = strip_components(linkpath, strip) else {
                        return Ok(None);
                    };
                    entry.linkpath = Some(stripped);
                }
            }
        }

        if path_depth(&entry.path) > self.options.max_depth {
            self.warn(
                Warning::new(WarningCode::EntryError, "path excessively deep")
                    .with_path(entry.path.clone()),
            )?;
            return Ok(None);
        }

        if !self.options.preserve_paths {
            if !self.sanitize(&mut entry.path, "path")? {
                return Ok(None);
            }
            if entry.entry_type == EntryType::Link {
                if let Some(mut linkpath) = entry.linkpath.take() {
                    let ok = self.sanitize(&mut linkpath, "linkpath")?;
                    entry.linkpath = Some(linkpath);
                    if !ok {
                        return Ok(None);
                    }
                }
            }
        }

        let absolute = resolve_lexically(&self.cwd, &entry.path);
        if !self.options.preserve_paths && !is_within(&self.cwd, &absolute) {
            self.warn(
                Warning::new(WarningCode::EntryError, "path escaped extraction target")
                    .with_path(entry.path.clone()),
            )?;
            return Ok(None);
        }
        if absolute == self.cwd
            && !matches!(
                entry.entry_type,
                EntryType::Directory | EntryType::GnuDumpDir
            )
        {
            return Ok(None);
        }
        Ok(Some(absolute))
    }

    /// Rejects `..` and strips absolute roots from `value`.
    fn sanitize(&mut self, value: &mut String, field: &str) -> Result<bool> {
        if has_parent_traversal(value) {
            self.warn(
                Warning::new(WarningCode::EntryError, format!("{field} contains '..'"))
                    .with_path(value.clone()),
            )?;
            return Ok(false);
        }
        let (root, rest) = strip_absolute_path(value);
        if !root.is_empty() {
            let rest = rest.to_string();
            self.warn(
                Warning::new(
                    WarningCode::EntryInfo,
                    format!("stripping {root} from absolute {field}"),
                )
                .with_path(value.clone()),
            )?;
            *value = rest;
        }
        Ok(true)
    }

    fn check_fs(&mut self, entry: ReadEntry, absolute: PathBuf) -> Result<()> {
        self.pend();
        let is_dir = matches!(
            entry.entry_type,
            EntryType::Directory | EntryType::GnuDumpDir
        );
        if !is_dir {
            self.dirs.prune(&absolute);
        }

        if !self.cwd_checked {
            let stat = self
                .fs
                .stat(&self.cwd)
                .map_err(|e| Error::filesystem("stat", &self.cwd, e))?;
            if !stat.is_dir() {
                return Err(Error::filesystem(
                    "stat",
                    &self.cwd,
                    io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
                ));
            }
            self.dirs.insert(self.cwd.clone());
            self.cwd_checked = true;
        }

        if let Some(parent) = absolute.parent() {
            if parent != self.cwd && absolute != self.cwd {
                let parent = parent.to_path_buf();
                if let Err(err) = self.make_dir(&parent, self.options.dmode) {
                    return self.fail(err.into_warning(&entry.path));
                }
            }
        }

        let existing = match self.fs.lstat(&absolute) {
            Ok(stat) => Some(stat),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                return self.fail(Warning::from_io("lstat", absolute.to_string_lossy(), &err));
            }
        };
        let Some(existing) = existing else {
            return self.make_fs(entry, absolute);
        };

        if self.options.keep || (self.options.newer && is_newer(&existing, &entry)) {
            log::debug!("keeping existing {}", absolute.display());
            self.skip();
            self.unpend();
            return Ok(());
        }
        if entry.entry_type.is_file()
            && !self.options.unlink
            && existing.is_file()
            && existing.nlink <= 1
        {
            return self.make_fs(entry, absolute);
        }
        if existing.is_dir() {
            if is_dir {
                return self.make_fs(entry, absolute);
            }
            if absolute != self.cwd {
                if let Err(err) = self.fs.rmdir(&absolute) {
                    return self.fail(Warning::from_io("rmdir", absolute.to_string_lossy(), &err));
                }
            }
            return self.make_fs(entry, absolute);
        }
        if let Err(err) = self.fs.unlink(&absolute) {
            return self.fail(Warning::from_io("unlink", absolute.to_string_lossy(), &err));
        }
        self.make_fs(entry, absolute)
    }

    fn make_dir(&mut self, dir: &Path, mode: u32) -> std::result::Result<(), MkdirError> {
        let options = MkdirOptions {
            cwd: &self.cwd,
            mode,
            unlink: self.options.unlink,
            preserve_paths: self.options.preserve_paths,
        };
        make_dir(self.fs.as_ref(), &mut self.dirs, dir, &options)
    }

    fn make_fs(&mut self, entry: ReadEntry, absolute: PathBuf) -> Result<()> {
        match entry.entry_type {
            EntryType::Directory | EntryType::GnuDumpDir => {
                let mode = entry.mode.unwrap_or(self.options.dmode);
                if let Err(err) = self.make_dir(&absolute, mode) {
                    return self.fail(err.into_warning(&entry.path));
                }
                self.apply_metadata(&entry, &absolute);
                self.sink = Sink::Discard;
                self.result.entries_extracted += 1;
                self.unpend();
                Ok(())
            }
            EntryType::Link => {
                let Some(linkpath) = entry.linkpath.as_deref() else {
                    return self.fail(
                        Warning::new(WarningCode::EntryInvalid, "linkpath required")
                            .with_path(entry.path.clone()),
                    );
                };
                let target = resolve_lexically(&self.cwd, linkpath);
                self.link(&entry, "link", self.fs.hard_link(&target, &absolute))
            }
            EntryType::SymbolicLink => {
                let Some(linkpath) = entry.linkpath.as_deref() else {
                    return self.fail(
                        Warning::new(WarningCode::EntryInvalid, "linkpath required")
                            .with_path(entry.path.clone()),
                    );
                };
                let target = PathBuf::from(linkpath);
                self.link(&entry, "symlink", self.fs.symlink(&target, &absolute))
            }
            _ => {
                let mode = entry
                    .mode
                    .map(|m| m & 0o7777)
                    .unwrap_or(self.options.fmode);
                match self.fs.create(&absolute, mode) {
                    Ok(writer) => {
                        log::debug!("extracting {}", entry.path);
                        self.sink = Sink::File {
                            entry: Box::new(entry),
                            path: absolute,
                            writer: Some(writer),
                        };
                        Ok(())
                    }
                    Err(err) => self.fail(Warning::from_io("open", absolute.to_string_lossy(), &err)),
                }
            }
        }
    }

    fn link(&mut self, entry: &ReadEntry, syscall: &'static str, outcome: io::Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => {
                self.sink = Sink::Discard;
                self.result.entries_extracted += 1;
                self.unpend();
                Ok(())
            }
            Err(err) => self.fail(Warning::from_io(syscall, entry.path.clone(), &err)),
        }
    }

    fn on_data(&mut self, data: &[u8]) -> Result<()> {
        let Sink::File {
            writer: Some(writer),
            path,
            ..
        } = &mut self.sink
        else {
            return Ok(());
        };
        match writer.write_all(data) {
            Ok(()) => {
                self.result.bytes_written += data.len() as u64;
                Ok(())
            }
            Err(err) => {
                let warning = Warning::from_io("write", path.to_string_lossy(), &err);
                if let Sink::File { writer, .. } = &mut self.sink {
                    writer.take();
                }
                self.warn(warning)
            }
        }
    }

    fn on_entry_end(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.sink, Sink::None) {
            Sink::File {
                entry,
                path,
                writer,
            } => {
                let Some(mut writer) = writer else {
                    self.result.entries_failed += 1;
                    self.unpend();
                    return Ok(());
                };
                let flushed = writer.flush();
                drop(writer);
                if let Err(err) = flushed {
                    return self.fail(Warning::from_io("close", path.to_string_lossy(), &err));
                }
                self.apply_metadata(&entry, &path);
                self.result.entries_extracted += 1;
                self.unpend();
                Ok(())
            }
            Sink::None | Sink::Discard => Ok(()),
        }
    }

    /// Restores mode, times and ownership. Failures are logged only.
    fn apply_metadata(&self, entry: &ReadEntry, path: &Path) {
        if !self.options.no_chmod {
            if let Some(mode) = entry.mode {
                if let Err(err) = self.fs.chmod(path, mode & 0o7777 & !self.options.umask) {
                    log::warn!("chmod {}: {err}", path.display());
                }
            }
        }
        if !self.options.no_mtime {
            if let Some(mtime) = entry.mtime {
                let atime = entry.atime.unwrap_or_else(Timestamp::now);
                if let Err(err) = self.fs.set_times(path, atime, mtime) {
                    log::warn!("utimes {}: {err}", path.display());
                }
            }
        }
        if self.options.preserve_owner {
            if let Err(err) = Ownership::from_entry(entry).apply(self.fs.as_ref(), path) {
                log::warn!("chown {}: {err}", path.display());
            }
        }
    }
}

fn is_newer(existing: &FileStat, entry: &ReadEntry) -> bool {
    entry.mtime.is_some_and(|mtime| existing.mtime > mtime)
}

/// Extracts the archive in `reader` with blocking I/O.
pub fn unpack<R: Read>(mut reader: R, options: UnpackOptions) -> Result<UnpackResult> {
    let mut unpack = Unpack::new(options)?;
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        unpack.write(&buf[..n])?;
    }
    unpack.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{EOF_MARKER, Header, padded_size};
    use std::fs;

    fn member(path: &str, entry_type: EntryType, body: &[u8], linkpath: Option<&str>) -> Vec<u8> {
        let mut header = Header {
            path: path.into(),
            mode: Some(if entry_type == EntryType::Directory { 0o755 } else { 0o644 }),
            size: body.len() as u64,
            mtime: Some(Timestamp::from_unix_secs(1_500_000_000)),
            entry_type,
            linkpath: linkpath.map(String::from),
            ..Header::default()
        };
        let (block, _) = header.to_block();
        let mut out = block.to_vec();
        out.extend_from_slice(body);
        out.resize(512 + padded_size(body.len() as u64) as usize, 0);
        out
    }

    fn archive(members: &[Vec<u8>]) -> Vec<u8> {
        let mut out: Vec<u8> = members.concat();
        out.extend_from_slice(&EOF_MARKER);
        out
    }

    #[test]
    fn test_extracts_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let data = archive(&[
            member("d/", EntryType::Directory, b"", None),
            member("d/f.txt", EntryType::File, b"hello", None),
            member("d/hard", EntryType::Link, b"", Some("d/f.txt")),
            member("e/nested/g", EntryType::File, b"g", None),
        ]);
        let result = unpack(&data[..], UnpackOptions::new(tmp.path())).unwrap();
        assert_eq!(result.entries_extracted, 4);
        assert_eq!(result.bytes_written, 6);
        assert_eq!(fs::read(tmp.path().join("d/f.txt")).unwrap(), b"hello");
        assert_eq!(fs::read(tmp.path().join("d/hard")).unwrap(), b"hello");
        assert_eq!(fs::read(tmp.path().join("e/nested/g")).unwrap(), b"g");
        let mtime = fs::metadata(tmp.path().join("d/f.txt")).unwrap().modified().unwrap();
        assert_eq!(Timestamp::from_system_time(mtime), Timestamp::from_unix_secs(1_500_000_000));
    }

    #[test]
    fn test_parent_traversal_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir(&root).unwrap();
        let data = archive(&[member("../../etc/passwd", EntryType::File, b"x", None)]);
        let result = unpack(&data[..], UnpackOptions::new(&root)).unwrap();
        assert_eq!(result.entries_extracted, 0);
        assert_eq!(result.entries_skipped, 1);
        assert_eq!(result.warnings[0].message, "path contains '..'");
        assert!(!tmp.path().join("etc").exists());
    }

    #[test]
    fn test_absolute_path_is_stripped() {
        let tmp = tempfile::tempdir().unwrap();
        let data = archive(&[member("/abs.txt", EntryType::File, b"a", None)]);
        let result = unpack(&data[..], UnpackOptions::new(tmp.path())).unwrap();
        assert_eq!(result.warnings[0].code, WarningCode::EntryInfo);
        assert_eq!(result.warnings[0].message, "stripping / from absolute path");
        assert!(tmp.path().join("abs.txt").is_file());
    }

    #[test]
    fn test_strict_mode_aborts() {
        let tmp = tempfile::tempdir().unwrap();
        let data = archive(&[member("../x", EntryType::File, b"x", None)]);
        let err = unpack(&data[..], UnpackOptions::new(tmp.path()).strict(true)).unwrap_err();
        assert!(matches!(err, Error::Warning(_)));
    }

    #[test]
    fn test_strip_and_depth() {
        let tmp = tempfile::tempdir().unwrap();
        let data = archive(&[
            member("top/", EntryType::Directory, b"", None),
            member("top/a/b.txt", EntryType::File, b"b", None),
        ]);
        let result = unpack(&data[..], UnpackOptions::new(tmp.path()).strip(1)).unwrap();
        assert_eq!(result.entries_skipped, 1);
        assert!(tmp.path().join("a/b.txt").is_file());

        let deep = tempfile::tempdir().unwrap();
        let result = unpack(&data[..], UnpackOptions::new(deep.path()).max_depth(2)).unwrap();
        assert_eq!(result.warnings[0].message, "path excessively deep");
        assert!(!deep.path().join("top/a").exists());
    }

    #[test]
    fn test_keep_existing() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("f"), b"old").unwrap();
        let data = archive(&[member("f", EntryType::File, b"new", None)]);
        unpack(&data[..], UnpackOptions::new(tmp.path()).keep(true)).unwrap();
        assert_eq!(fs::read(tmp.path().join("f")).unwrap(), b"old");
        unpack(&data[..], UnpackOptions::new(tmp.path())).unwrap();
        assert_eq!(fs::read(tmp.path().join("f")).unwrap(), b"new");
    }

    #[test]
    fn test_file_replaces_directory() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("x")).unwrap();
        let data = archive(&[member("x", EntryType::File, b"now a file", None)]);
        unpack(&data[..], UnpackOptions::new(tmp.path())).unwrap();
        assert_eq!(fs::read(tmp.path().join("x")).unwrap(), b"now a file");
    }

    #[test]
    fn test_unsupported_and_root_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let data = archive(&[
            member("fifo", EntryType::Fifo, b"", None),
            member("./", EntryType::Directory, b"", None),
            member(".", EntryType::File, b"", None),
        ]);
        let result = unpack(&data[..], UnpackOptions::new(tmp.path())).unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].code, WarningCode::EntryUnsupported);
        assert_eq!(result.entries_extracted, 1);
        assert_eq!(result.entries_skipped, 2);
    }

    #[test]
    fn test_missing_cwd_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let data = archive(&[member("f", EntryType::File, b"x", None)]);
        let err = unpack(&data[..], UnpackOptions::new(tmp.path().join("missing"))).unwrap_err();
        assert!(matches!(err, Error::Filesystem { syscall: "stat", .. }));
    }

    #[test]
    fn test_pending_gates_close() {
        let tmp = tempfile::tempdir().unwrap();
        let data = archive(&[member("f", EntryType::File, &[7u8; 1000], None)]);
        let mut unpack = Unpack::new(UnpackOptions::new(tmp.path())).unwrap();
        unpack.write(&data[..700]).unwrap();
        assert_eq!(unpack.pending(), 1);
        assert!(!unpack.is_closed());
        unpack.write(&data[700..]).unwrap();
        assert_eq!(unpack.pending(), 0);
        unpack.end().unwrap();
        assert!(unpack.is_closed());
        assert!(matches!(unpack.write(b"x"), Err(Error::InvalidState(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_is_not_followed_for_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let data = archive(&[
            member("link", EntryType::SymbolicLink, b"", Some(outside.path().to_str().unwrap())),
            member("link/evil", EntryType::File, b"x", None),
        ]);
        let result = unpack(&data[..], UnpackOptions::new(tmp.path())).unwrap();
        assert!(fs::symlink_metadata(tmp.path().join("link")).unwrap().file_type().is_symlink());
        assert!(!outside.path().join("evil").exists());
        assert_eq!(result.warnings[0].message, "Cannot extract through symbolic link");
        assert_eq!(result.entries_failed, 1);
    }
}

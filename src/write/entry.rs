//! Archive members built from filesystem objects.
//!
//! [`WriteEntry`] is a sans-IO state machine: it asks for filesystem work
//! through [`WriteEntry::request`] and is fed the outcome through
//! [`WriteEntry::respond`]. [`perform`] executes a request against a
//! [`Filesystem`], so blocking and async drivers share one implementation.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::format::{EntryType, Header, Pax, padded_size};
use crate::fs::{FileKind, FileStat, Filesystem};
use crate::hardlink::LinkCache;
use crate::safety::strip_absolute_path;
use crate::warning::Diagnostics;
use crate::write::PackOptions;
use crate::{Result, Timestamp, Warning, WarningCode};

/// Filesystem work a [`WriteEntry`] is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRequest {
    /// Read the symlink target.
    ReadLink,
    /// Open the file for reading.
    Open,
    /// Read up to `len` bytes from the open file.
    Read {
        /// Maximum number of bytes wanted.
        len: usize,
    },
    /// Close the open file.
    Close,
}

/// Outcome of an [`EntryRequest`].
#[derive(Debug)]
pub enum EntryResponse {
    /// Symlink target.
    ReadLink(io::Result<PathBuf>),
    /// Open result.
    Open(io::Result<()>),
    /// Bytes read; empty at end of file.
    Read(io::Result<Vec<u8>>),
    /// The file was closed.
    Close,
}

/// Executes `request` for the object at `absolute`.
///
/// `file` holds the handle between `Open` and `Close`.
pub fn perform(
    fs: &dyn Filesystem,
    absolute: &Path,
    request: EntryRequest,
    file: &mut Option<Box<dyn Read + Send>>,
) -> EntryResponse {
    match request {
        EntryRequest::ReadLink => EntryResponse::ReadLink(fs.read_link(absolute)),
        EntryRequest::Open => EntryResponse::Open(fs.open(absolute).map(|f| {
            *file = Some(f);
        })),
        EntryRequest::Read { len } => {
            let Some(reader) = file.as_mut() else {
                return EntryResponse::Read(Err(io::Error::other("file is not open")));
            };
            let mut buf = vec![0u8; len];
            loop {
                match reader.read(&mut buf) {
                    Ok(n) => {
                        buf.truncate(n);
                        return EntryResponse::Read(Ok(buf));
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return EntryResponse::Read(Err(e)),
                }
            }
        }
        EntryRequest::Close => {
            file.take();
            EntryResponse::Close
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadLink,
    Open,
    Read,
    Close,
    Done,
}

/// Settings a [`WriteEntry`] copies out of [`PackOptions`].
#[derive(Debug, Clone)]
pub(crate) struct EntrySettings {
    pub(crate) portable: bool,
    pub(crate) no_pax: bool,
    pub(crate) no_mtime: bool,
    pub(crate) mtime: Option<Timestamp>,
    pub(crate) prefix: Option<String>,
    pub(crate) preserve_paths: bool,
    pub(crate) max_read_size: usize,
}

impl From<&PackOptions> for EntrySettings {
    fn from(options: &PackOptions) -> Self {
        Self {
            portable: options.portable,
            no_pax: options.no_pax,
            no_mtime: options.no_mtime,
            mtime: options.mtime,
            prefix: options.prefix.clone(),
            preserve_paths: options.preserve_paths,
            max_read_size: options.max_read_size,
        }
    }
}

/// An archive member sourced from the filesystem.
#[derive(Debug)]
pub struct WriteEntry {
    path: String,
    absolute: PathBuf,
    stat: FileStat,
    entry_type: EntryType,
    linkpath: Option<String>,
    header: Option<Header>,
    settings: EntrySettings,
    diagnostics: Diagnostics,
    state: State,
    remain: u64,
    block_remain: u64,
    output: Vec<u8>,
}

impl WriteEntry {
    /// Prepares an entry for `path` (relative to `cwd`) from its stat result.
    ///
    /// Directories, hard links to already packed files and empty files are
    /// complete right away; symlinks and non-empty files wait for I/O.
    /// Unsupported object kinds are reported and produce no output.
    pub fn new(
        path: &str,
        stat: FileStat,
        cwd: &Path,
        options: &PackOptions,
        links: &mut LinkCache,
    ) -> Result<Self> {
        Self::with_settings(path, stat, cwd, options.into(), options.diagnostics(), links)
    }

    pub(crate) fn with_settings(
        path: &str,
        mut stat: FileStat,
        cwd: &Path,
        settings: EntrySettings,
        diagnostics: Diagnostics,
        links: &mut LinkCache,
    ) -> Result<Self> {
        let absolute = cwd.join(path);
        let mut archive_path = path.replace('\\', "/");
        let mut stripped_root = String::new();
        if !settings.preserve_paths {
            let (root, rest) = strip_absolute_path(&archive_path);
            if !root.is_empty() {
                stripped_root = root;
                archive_path = rest.to_string();
            }
        }
        if archive_path.is_empty() {
            archive_path = "./".to_string();
        }
        if !stat.is_file() {
            stat.size = 0;
        }

        let mut entry = Self {
            path: archive_path,
            absolute,
            stat,
            entry_type: EntryType::File,
            linkpath: None,
            header: None,
            settings,
            diagnostics,
            state: State::Done,
            remain: 0,
            block_remain: 0,
            output: Vec::new(),
        };
        if !stripped_root.is_empty() {
            entry.diagnostics.warn(
                Warning::new(
                    WarningCode::EntryInfo,
                    format!("stripping {stripped_root} from absolute path"),
                )
                .with_path(format!("{stripped_root}{}", entry.path)),
            )?;
        }

        match entry.stat.kind {
            FileKind::Directory => {
                entry.entry_type = EntryType::Directory;
                if !entry.path.ends_with('/') {
                    entry.path.push('/');
                }
                entry.emit_header();
            }
            FileKind::Symlink => {
                entry.entry_type = EntryType::SymbolicLink;
                entry.state = State::ReadLink;
            }
            FileKind::File => {
                if let Some(first) = links.lookup(&entry.stat, cwd) {
                    entry.entry_type = EntryType::Link;
                    entry.linkpath = Some(relative_to(&first, cwd));
                    entry.stat.size = 0;
                    entry.emit_header();
                } else if entry.stat.size == 0 {
                    entry.emit_header();
                    entry.record_link(links);
                } else {
                    entry.state = State::Open;
                }
            }
            kind => {
                entry.diagnostics.warn(
                    Warning::new(
                        WarningCode::EntryUnsupported,
                        format!("unsupported entry type: {kind:?}"),
                    )
                    .with_path(entry.path.clone()),
                )?;
            }
        }
        Ok(entry)
    }

    /// The pending request, if any.
    pub fn request(&self) -> Option<EntryRequest> {
        match self.state {
            State::ReadLink => Some(EntryRequest::ReadLink),
            State::Open => Some(EntryRequest::Open),
            State::Read => Some(EntryRequest::Read {
                len: self.block_remain.min(self.settings.max_read_size as u64) as usize,
            }),
            State::Close => Some(EntryRequest::Close),
            State::Done => None,
        }
    }

    /// Feeds the outcome of the pending request.
    ///
    /// I/O failures become entry-level warnings (errors in strict mode).
    /// A failure after the header was written pads the body with zeros so
    /// the archive stays well formed.
    pub fn respond(&mut self, response: EntryResponse) -> Result<()> {
        match (self.state, response) {
            (State::ReadLink, EntryResponse::ReadLink(result)) => match result {
                Ok(target) => {
                    self.linkpath = Some(target.to_string_lossy().replace('\\', "/"));
                    self.emit_header();
                    self.state = State::Done;
                    Ok(())
                }
                Err(err) => {
                    self.state = State::Done;
                    self.warn_io("readlink", &err)
                }
            },
            (State::Open, EntryResponse::Open(result)) => match result {
                Ok(()) => {
                    self.emit_header();
                    self.remain = self.stat.size;
                    self.block_remain = padded_size(self.stat.size);
                    self.state = State::Read;
                    Ok(())
                }
                Err(err) => {
                    self.state = State::Done;
                    self.warn_io("open", &err)
                }
            },
            (State::Read, EntryResponse::Read(result)) => match result {
                Ok(data) => self.on_read(&data),
                Err(err) => {
                    self.pad_body();
                    self.warn_io("read", &err)
                }
            },
            (_, EntryResponse::Close) => {
                self.state = State::Done;
                Ok(())
            }
            _ => Err(crate::Error::InvalidState("unexpected entry response")),
        }
    }

    fn on_read(&mut self, data: &[u8]) -> Result<()> {
        let n = data.len() as u64;
        if n == 0 && self.remain > 0 {
            self.pad_body();
            return self.warn_eof("encountered unexpected EOF");
        }
        if n > self.remain {
            self.pad_body();
            return self.warn_eof("did not encounter expected EOF");
        }
        self.output.extend_from_slice(data);
        self.remain -= n;
        self.block_remain -= n;
        if self.remain == 0 {
            self.pad_body();
        }
        Ok(())
    }

    fn pad_body(&mut self) {
        self.output
            .resize(self.output.len() + self.block_remain as usize, 0);
        self.block_remain = 0;
        self.remain = 0;
        self.state = State::Close;
    }

    fn warn_io(&self, syscall: &'static str, err: &io::Error) -> Result<()> {
        self.diagnostics.warn(Warning::from_io(
            syscall,
            self.absolute.to_string_lossy(),
            err,
        ))
    }

    fn warn_eof(&self, message: &str) -> Result<()> {
        self.diagnostics.warn(
            Warning::new(WarningCode::EntryError, message)
                .with_path(self.absolute.to_string_lossy())
                .with_syscall("read"),
        )
    }

    fn emit_header(&mut self) {
        let settings = &self.settings;
        let portable = settings.portable;
        let no_mtime = settings.no_mtime || (portable && self.entry_type == EntryType::Directory);
        let path = prefix_path(&self.path, settings.prefix.as_deref());
        let linkpath = match (&self.linkpath, self.entry_type) {
            (Some(link), EntryType::Link) => Some(prefix_path(link, settings.prefix.as_deref())),
            (link, _) => link.clone(),
        };
        let mtime = if no_mtime {
            None
        } else {
            Some(settings.mtime.unwrap_or(self.stat.mtime))
        };
        let mut header = Header {
            path,
            mode: Some(mode_fix(
                self.stat.mode,
                self.entry_type == EntryType::Directory,
                portable,
            )),
            uid: (!portable).then_some(self.stat.uid),
            gid: (!portable).then_some(self.stat.gid),
            size: self.stat.size,
            mtime,
            entry_type: self.entry_type,
            linkpath,
            atime: (!portable).then_some(self.stat.atime),
            ctime: (!portable).then_some(self.stat.ctime),
            ..Header::default()
        };
        let (block, needs_pax) = header.to_block();
        if needs_pax && !settings.no_pax {
            let mut pax = pax_for(&header, mtime);
            if !portable {
                pax.dev = Some(self.stat.dev);
                pax.ino = Some(self.stat.ino);
                pax.nlink = Some(self.stat.nlink);
            }
            self.output.extend_from_slice(&pax.encode());
        }
        self.output.extend_from_slice(&block);
        log::debug!("packing {} ({})", header.path, header.entry_type);
        self.header = Some(header);
    }

    /// Registers this file as the target for later names of the same inode.
    ///
    /// Does nothing until the header has been written, so a file that failed
    /// to open is never linked to.
    pub fn record_link(&self, links: &mut LinkCache) {
        if self.entry_type == EntryType::File && self.header.is_some() {
            links.record(&self.stat, &self.absolute);
        }
    }

    /// Drains the bytes produced so far.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Returns true once no more requests or output will follow.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Archive path (without prefix).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Filesystem path being archived.
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    /// Member type.
    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// Link target for links.
    pub fn linkpath(&self) -> Option<&str> {
        self.linkpath.as_deref()
    }

    /// The stat result the entry was built from.
    pub fn stat(&self) -> &FileStat {
        &self.stat
    }

    /// The header, once emitted.
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }
}

/// PAX records mirroring `header`, with the precise `mtime`.
pub(crate) fn pax_for(header: &Header, mtime: Option<Timestamp>) -> Pax {
    Pax {
        atime: header.atime,
        ctime: header.ctime,
        mtime,
        gid: header.gid,
        uid: header.uid,
        uname: header.uname.clone(),
        gname: header.gname.clone(),
        path: Some(header.path.clone()),
        linkpath: header.linkpath.clone(),
        size: Some(header.size),
        ..Pax::new(false)
    }
}

/// Normalises permission bits for archiving.
///
/// Keeps `0o7777`; portable mode forces owner read/write and clears
/// group/other write; directories gain execute where read is set.
pub fn mode_fix(mode: u32, is_dir: bool, portable: bool) -> u32 {
    let mut mode = mode & 0o7777;
    if portable {
        mode = (mode | 0o600) & !0o022;
    }
    if is_dir {
        if mode & 0o400 != 0 {
            mode |= 0o100;
        }
        if mode & 0o040 != 0 {
            mode |= 0o010;
        }
        if mode & 0o004 != 0 {
            mode |= 0o001;
        }
    }
    mode
}

/// Prepends `prefix` to an archive path, dropping a leading `./`.
pub fn prefix_path(path: &str, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => {
            let path = path
                .strip_prefix("./")
                .or_else(|| (path == ".").then_some(""))
                .unwrap_or(path);
            format!("{}/{path}", prefix.trim_end_matches('/'))
        }
        _ => path.to_string(),
    }
}

fn relative_to(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(kind: FileKind, size: u64, nlink: u64) -> FileStat {
        FileStat {
            kind,
            mode: 0o644,
            uid: 1000,
            gid: 100,
            size,
            mtime: Timestamp::from_unix_secs(1_700_000_000),
            atime: Timestamp::from_unix_secs(1_700_000_001),
            ctime: Timestamp::from_unix_secs(1_700_000_002),
            dev: 1,
            ino: 42,
            nlink,
        }
    }

    fn run(entry: &mut WriteEntry, body: &[u8]) -> Vec<u8> {
        let mut offset = 0;
        let mut out = entry.take_output();
        while let Some(request) = entry.request() {
            let response = match request {
                EntryRequest::Open => EntryResponse::Open(Ok(())),
                EntryRequest::ReadLink => EntryResponse::ReadLink(Ok(PathBuf::from("target"))),
                EntryRequest::Read { len } => {
                    let end = (offset + len).min(body.len());
                    let chunk = body[offset..end].to_vec();
                    offset = end;
                    EntryResponse::Read(Ok(chunk))
                }
                EntryRequest::Close => EntryResponse::Close,
            };
            entry.respond(response).unwrap();
            out.extend(entry.take_output());
        }
        out
    }

    #[test]
    fn test_mode_fix() {
        assert_eq!(mode_fix(0o100644, false, false), 0o644);
        assert_eq!(mode_fix(0o640, true, false), 0o750);
        assert_eq!(mode_fix(0o466, false, true), 0o644);
        assert_eq!(mode_fix(0o400, true, true), 0o700);
    }

    #[test]
    fn test_prefix_path() {
        assert_eq!(prefix_path("./a", Some("pkg/")), "pkg/a");
        assert_eq!(prefix_path("b/c", Some("pkg")), "pkg/b/c");
        assert_eq!(prefix_path("b", None), "b");
    }

    #[test]
    fn test_file_body_is_padded() {
        let mut links = LinkCache::new();
        let options = PackOptions::default().max_read_size(512);
        let mut entry =
            WriteEntry::new("f.txt", stat(FileKind::File, 700, 1), Path::new("/r"), &options, &mut links)
                .unwrap();
        assert_eq!(entry.request(), Some(EntryRequest::Open));
        let body = vec![b'x'; 700];
        let out = run(&mut entry, &body);
        // xstar header (atime/ctime) + 1024 body bytes
        assert_eq!(out.len(), 512 + 1024);
        assert_eq!(&out[512..1212], &body[..]);
        assert!(out[1212..].iter().all(|&b| b == 0));
        let header = Header::decode(&out[..512]).unwrap();
        assert!(header.cksum_valid);
        assert_eq!(header.size, 700);
        assert_eq!(header.uid, Some(1000));
    }

    #[test]
    fn test_short_read_warns_and_pads() {
        let mut links = LinkCache::new();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let options = PackOptions::default().on_warn(move |w| sink.lock().unwrap().push(w.message.clone()));
        let mut entry =
            WriteEntry::new("f", stat(FileKind::File, 100, 1), Path::new("/r"), &options, &mut links)
                .unwrap();
        let out = run(&mut entry, &[1u8; 10]);
        assert_eq!(out.len(), 1024);
        assert_eq!(*seen.lock().unwrap(), vec!["encountered unexpected EOF".to_string()]);
    }

    #[test]
    fn test_second_hard_link_becomes_link_entry() {
        let mut links = LinkCache::new();
        let options = PackOptions::default().portable(true);
        let cwd = Path::new("/r");
        let mut first = WriteEntry::new("a", stat(FileKind::File, 2, 2), cwd, &options, &mut links).unwrap();
        assert_eq!(first.request(), Some(EntryRequest::Open));
        first.record_link(&mut links);
        assert!(links.is_empty());
        run(&mut first, b"hi");
        first.record_link(&mut links);

        let mut second = WriteEntry::new("b", stat(FileKind::File, 2, 2), cwd, &options, &mut links).unwrap();
        assert!(second.is_done());
        assert_eq!(second.entry_type(), EntryType::Link);
        assert_eq!(second.linkpath(), Some("a"));
        let out = second.take_output();
        assert_eq!(out.len(), 512);
        let header = Header::decode(&out).unwrap();
        assert_eq!(header.size, 0);
        assert_eq!(header.linkpath.as_deref(), Some("a"));
        assert_eq!(header.uid, None);
    }

    #[test]
    fn test_failed_open_is_not_a_link_target() {
        let mut links = LinkCache::new();
        let options = PackOptions::default().on_warn(|_| {});
        let cwd = Path::new("/r");
        let mut first = WriteEntry::new("a", stat(FileKind::File, 2, 2), cwd, &options, &mut links).unwrap();
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        first.respond(EntryResponse::Open(Err(denied))).unwrap();
        first.record_link(&mut links);
        assert!(first.is_done());
        assert!(first.take_output().is_empty());
        assert!(links.is_empty());

        let second = WriteEntry::new("b", stat(FileKind::File, 2, 2), cwd, &options, &mut links).unwrap();
        assert_eq!(second.entry_type(), EntryType::File);
        assert_eq!(second.request(), Some(EntryRequest::Open));
    }

    #[test]
    fn test_directory_and_absolute_path() {
        let mut links = LinkCache::new();
        let options = PackOptions::default().portable(true);
        let mut entry =
            WriteEntry::new("/abs/dir", stat(FileKind::Directory, 4096, 2), Path::new("/"), &options, &mut links)
                .unwrap();
        assert!(entry.is_done());
        let header = Header::decode(&entry.take_output()).unwrap();
        assert_eq!(header.path, "abs/dir/");
        assert_eq!(header.size, 0);
        assert_eq!(header.mtime, None);
        assert_eq!(header.mode, Some(0o755));
    }

    #[test]
    fn test_long_path_emits_pax() {
        let mut links = LinkCache::new();
        let name = format!("{}/file", "d".repeat(200));
        let options = PackOptions::default();
        let mut entry =
            WriteEntry::new(&name, stat(FileKind::File, 0, 1), Path::new("/r"), &options, &mut links).unwrap();
        let out = entry.take_output();
        assert_eq!(out.len(), 512 * 3);
        let pax_header = Header::decode(&out[..512]).unwrap();
        assert_eq!(pax_header.entry_type, EntryType::ExtendedHeader);
        let pax = Pax::parse(&out[512..512 + pax_header.size as usize], None, false);
        assert_eq!(pax.path.as_deref(), Some(name.as_str()));
        assert_eq!(pax.ino, Some(42));

        let mut no_pax = WriteEntry::new(
            &name,
            stat(FileKind::File, 0, 1),
            Path::new("/r"),
            &PackOptions::default().no_pax(true),
            &mut links,
        )
        .unwrap();
        assert_eq!(no_pax.take_output().len(), 512);
    }

    #[test]
    fn test_symlink_reads_target() {
        let mut links = LinkCache::new();
        let mut entry = WriteEntry::new(
            "ln",
            stat(FileKind::Symlink, 6, 1),
            Path::new("/r"),
            &PackOptions::default(),
            &mut links,
        )
        .unwrap();
        let out = run(&mut entry, b"");
        let header = Header::decode(&out).unwrap();
        assert_eq!(header.entry_type, EntryType::SymbolicLink);
        assert_eq!(header.linkpath.as_deref(), Some("target"));
        assert_eq!(header.size, 0);
    }
}

//! Archive creation.
//!
//! [`Packer`] owns the job queue and never touches the filesystem itself.
//! It hands out [`PackRequest`]s, is fed [`PackResponse`]s and produces
//! archive bytes in queue order. Stat and readdir lookups for queued jobs
//! may run ahead of the head, bounded by [`PackOptions::jobs`]; entry
//! headers and bodies are only produced for the job at the head, so the
//! output order matches insertion order and hard links always refer to a
//! member written earlier.
//!
//! [`Pack`] drives a packer with blocking I/O.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::codec::{self, Transform};
use crate::format::EOF_MARKER;
use crate::fs::{FileStat, Filesystem, OsFilesystem};
use crate::read::{FilterTarget, ParseOptions, ReadEntry, TarReader};
use crate::warning::Diagnostics;
use crate::write::entry::{self, EntryRequest, EntryResponse, EntrySettings, WriteEntry};
use crate::write::tar_entry::WriteEntryTar;
use crate::write::{PackCaches, PackOptions};
use crate::{Error, Result, Warning};

/// Identifies a queued job.
pub type JobId = u64;

/// Filesystem work requested by a [`Packer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackRequest {
    /// Stat `path`, following symlinks when `follow` is set.
    Stat {
        /// Requesting job.
        job: JobId,
        /// Absolute path.
        path: PathBuf,
        /// Use `stat` instead of `lstat`.
        follow: bool,
    },
    /// List the directory at `path`.
    ReadDir {
        /// Requesting job.
        job: JobId,
        /// Absolute path.
        path: PathBuf,
    },
    /// Entry-level I/O for the job at the head of the queue.
    Entry {
        /// Requesting job.
        job: JobId,
        /// Absolute path.
        path: PathBuf,
        /// The entry's request.
        request: EntryRequest,
    },
}

/// Outcome of a [`PackRequest`].
#[derive(Debug)]
pub enum PackResponse {
    /// Stat result.
    Stat {
        /// Requesting job.
        job: JobId,
        /// The stat result.
        result: io::Result<FileStat>,
    },
    /// Directory listing.
    ReadDir {
        /// Requesting job.
        job: JobId,
        /// Child names.
        result: io::Result<Vec<String>>,
    },
    /// Entry-level response.
    Entry {
        /// Requesting job.
        job: JobId,
        /// The entry's response.
        response: EntryResponse,
    },
}

/// Executes a request against `fs`.
///
/// `file` is the open-file slot for entry reads; only the head job reads,
/// so a single slot is enough.
pub fn execute(
    fs: &dyn Filesystem,
    request: PackRequest,
    file: &mut Option<Box<dyn Read + Send>>,
) -> PackResponse {
    match request {
        PackRequest::Stat { job, path, follow } => PackResponse::Stat {
            job,
            result: if follow { fs.stat(&path) } else { fs.lstat(&path) },
        },
        PackRequest::ReadDir { job, path } => PackResponse::ReadDir {
            job,
            result: fs.read_dir(&path),
        },
        PackRequest::Entry { job, path, request } => PackResponse::Entry {
            job,
            response: entry::perform(fs, &path, request, file),
        },
    }
}

#[derive(Debug)]
enum JobEntry {
    Fs(WriteEntry),
    Tar(WriteEntryTar),
}

#[derive(Debug)]
struct PackJob {
    path: String,
    absolute: PathBuf,
    stat: Option<FileStat>,
    readdir: Option<Vec<String>>,
    entry: Option<JobEntry>,
    pending: bool,
    ignore: bool,
    piped: bool,
}

impl PackJob {
    fn new(path: String, absolute: PathBuf) -> Self {
        Self {
            path,
            absolute,
            stat: None,
            readdir: None,
            entry: None,
            pending: false,
            ignore: false,
            piped: false,
        }
    }

    fn wants_readdir(&self, no_dir_recurse: bool) -> bool {
        !no_dir_recurse
            && self.readdir.is_none()
            && self.stat.as_ref().is_some_and(FileStat::is_dir)
    }
}

/// Sans-IO archive writer.
///
/// # Example
///
/// ```rust,no_run
/// use tarstream::fs::OsFilesystem;
/// use tarstream::write::{PackOptions, Packer, execute};
///
/// # fn main() -> tarstream::Result<()> {
/// let mut packer = Packer::new(PackOptions::new().cwd("/srv"))?;
/// packer.add("site")?;
/// packer.end()?;
/// let fs = OsFilesystem;
/// let mut file = None;
/// let mut archive = Vec::new();
/// while let Some(request) = packer.poll_request() {
///     packer.complete(execute(&fs, request, &mut file))?;
///     archive.extend(packer.take_output());
/// }
/// assert!(packer.is_finished());
/// # Ok(())
/// # }
/// ```
pub struct Packer {
    options: PackOptions,
    settings: EntrySettings,
    diagnostics: Diagnostics,
    cwd: PathBuf,
    caches: PackCaches,
    jobs: HashMap<JobId, PackJob>,
    queue: VecDeque<JobId>,
    next_id: JobId,
    requests: VecDeque<PackRequest>,
    processing: usize,
    entry_in_flight: bool,
    encoder: Option<Box<dyn Transform>>,
    output: Vec<u8>,
    ended: bool,
    finished: bool,
}

impl std::fmt::Debug for Packer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packer")
            .field("cwd", &self.cwd)
            .field("queued", &self.queue.len())
            .field("processing", &self.processing)
            .field("ended", &self.ended)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Packer {
    /// Creates a packer with fresh caches.
    pub fn new(options: PackOptions) -> Result<Self> {
        Self::with_caches(options, PackCaches::new())
    }

    /// Creates a packer reusing caches from an earlier pack.
    pub fn with_caches(options: PackOptions, caches: PackCaches) -> Result<Self> {
        let cwd = std::path::absolute(&options.cwd)?;
        let encoder = codec::encoder(options.compression)?;
        Ok(Self {
            settings: EntrySettings::from(&options),
            diagnostics: options.diagnostics(),
            options,
            cwd,
            caches,
            jobs: HashMap::new(),
            queue: VecDeque::new(),
            next_id: 0,
            requests: VecDeque::new(),
            processing: 0,
            entry_in_flight: false,
            encoder,
            output: Vec::new(),
            ended: false,
            finished: false,
        })
    }

    /// Returns the caches for reuse.
    pub fn into_caches(self) -> PackCaches {
        self.caches
    }

    /// The absolute working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Queues a filesystem path (relative to `cwd`), recursing into
    /// directories.
    pub fn add(&mut self, path: &str) -> Result<()> {
        if self.ended {
            return Err(Error::InvalidState("add after end"));
        }
        log::debug!("queueing {path}");
        let absolute = self.cwd.join(path);
        self.push_job(PackJob::new(path.to_string(), absolute));
        self.process()
    }

    /// Queues a member read from another archive with its logical body.
    pub fn add_entry(&mut self, read_entry: &ReadEntry, body: &[u8]) -> Result<()> {
        if self.ended {
            return Err(Error::InvalidState("add after end"));
        }
        if !self
            .options
            .accepts(&read_entry.path, FilterTarget::Entry(read_entry))
        {
            return Ok(());
        }
        let mut tar =
            WriteEntryTar::with_settings(read_entry, self.settings.clone(), &self.diagnostics)?;
        let logical = body.len().min(read_entry.size as usize);
        tar.write(&body[..logical])?;
        tar.end();
        let mut job = PackJob::new(read_entry.path.clone(), self.cwd.join(&read_entry.path));
        job.entry = Some(JobEntry::Tar(tar));
        job.piped = true;
        self.push_job(job);
        self.process()
    }

    /// Declares that nothing more will be added.
    pub fn end(&mut self) -> Result<()> {
        self.ended = true;
        self.process()
    }

    /// Takes the next request to execute.
    pub fn poll_request(&mut self) -> Option<PackRequest> {
        self.requests.pop_front()
    }

    /// Feeds back the outcome of a request.
    pub fn complete(&mut self, response: PackResponse) -> Result<()> {
        match response {
            PackResponse::Stat { job, result } => {
                self.processing = self.processing.saturating_sub(1);
                self.on_stat(job, result)?;
            }
            PackResponse::ReadDir { job, result } => {
                self.processing = self.processing.saturating_sub(1);
                self.on_readdir(job, result)?;
            }
            PackResponse::Entry { job, response } => {
                self.entry_in_flight = false;
                if let Some(PackJob {
                    entry: Some(JobEntry::Fs(entry)),
                    ..
                }) = self.jobs.get_mut(&job)
                {
                    let opened = matches!(response, EntryResponse::Open(Ok(())));
                    entry.respond(response)?;
                    if opened {
                        entry.record_link(&mut self.caches.links);
                    }
                }
            }
        }
        self.process()
    }

    /// Drains the archive bytes produced so far.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Returns true once the end-of-archive marker has been written.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns true when requests are waiting to be polled.
    pub fn has_requests(&self) -> bool {
        !self.requests.is_empty()
    }

    fn push_job(&mut self, job: PackJob) {
        let id = self.next_id;
        self.next_id += 1;
        self.jobs.insert(id, job);
        self.queue.push_back(id);
    }

    fn on_stat(&mut self, id: JobId, result: io::Result<FileStat>) -> Result<()> {
        let syscall = if self.options.follow { "stat" } else { "lstat" };
        let Some(job) = self.jobs.get_mut(&id) else {
            return Ok(());
        };
        job.pending = false;
        match result {
            Ok(stat) => {
                self.caches.stat.insert(job.absolute.clone(), stat.clone());
                if self
                    .options
                    .filter
                    .as_ref()
                    .is_some_and(|filter| !filter(&job.path, FilterTarget::Stat(&stat)))
                {
                    job.ignore = true;
                }
                job.stat = Some(stat);
                Ok(())
            }
            Err(err) => {
                job.ignore = true;
                let warning = Warning::from_io(syscall, job.absolute.to_string_lossy(), &err);
                self.diagnostics.warn(warning)
            }
        }
    }

    fn on_readdir(&mut self, id: JobId, result: io::Result<Vec<String>>) -> Result<()> {
        let Some(job) = self.jobs.get_mut(&id) else {
            return Ok(());
        };
        job.pending = false;
        match result {
            Ok(mut names) => {
                names.sort();
                self.caches.readdir.insert(job.absolute.clone(), names.clone());
                job.readdir = Some(names);
                Ok(())
            }
            Err(err) => {
                job.readdir = Some(Vec::new());
                let warning = Warning::from_io("scandir", job.absolute.to_string_lossy(), &err);
                self.diagnostics.warn(warning)
            }
        }
    }

    fn process(&mut self) -> Result<()> {
        loop {
            self.schedule();
            if !self.advance_head()? {
                break;
            }
        }
        if self.ended && self.queue.is_empty() && !self.finished {
            self.emit(&EOF_MARKER)?;
            if let Some(encoder) = self.encoder.as_mut() {
                let tail = encoder.finish()?;
                self.output.extend_from_slice(&tail);
            }
            self.finished = true;
            log::debug!("pack finished");
        }
        Ok(())
    }

    /// Issues stat/readdir requests for queued jobs up to the job bound.
    fn schedule(&mut self) {
        let no_dir_recurse = self.options.no_dir_recurse;
        for id in &self.queue {
            if self.processing >= self.options.jobs {
                break;
            }
            let Some(job) = self.jobs.get_mut(id) else {
                continue;
            };
            if job.ignore || job.pending || job.entry.is_some() {
                continue;
            }
            if job.stat.is_none() {
                if let Some(stat) = self.caches.stat.get(&job.absolute) {
                    job.stat = Some(stat.clone());
                } else {
                    job.pending = true;
                    self.processing += 1;
                    self.requests.push_back(PackRequest::Stat {
                        job: *id,
                        path: job.absolute.clone(),
                        follow: self.options.follow,
                    });
                    continue;
                }
            }
            if job.wants_readdir(no_dir_recurse) {
                if let Some(names) = self.caches.readdir.get(&job.absolute) {
                    job.readdir = Some(names.clone());
                } else {
                    job.pending = true;
                    self.processing += 1;
                    self.requests.push_back(PackRequest::ReadDir {
                        job: *id,
                        path: job.absolute.clone(),
                    });
                }
            }
        }
    }

    /// Moves the head job forward. Returns true if anything changed.
    fn advance_head(&mut self) -> Result<bool> {
        let Some(&id) = self.queue.front() else {
            return Ok(false);
        };
        let no_dir_recurse = self.options.no_dir_recurse;
        let Some(job) = self.jobs.get_mut(&id) else {
            self.queue.pop_front();
            return Ok(true);
        };
        if job.ignore {
            self.jobs.remove(&id);
            self.queue.pop_front();
            return Ok(true);
        }
        if job.entry.is_none() {
            let Some(stat) = job.stat.clone() else {
                return Ok(false);
            };
            if job.pending || job.wants_readdir(no_dir_recurse) {
                return Ok(false);
            }
            let entry = WriteEntry::with_settings(
                &job.path,
                stat,
                &self.cwd,
                self.settings.clone(),
                self.diagnostics.clone(),
                &mut self.caches.links,
            )?;
            job.entry = Some(JobEntry::Fs(entry));
        }

        let mut children = Vec::new();
        if !job.piped {
            job.piped = true;
            if let Some(names) = job.readdir.take() {
                let base = if job.path == "./" {
                    String::new()
                } else {
                    format!("{}/", job.path.trim_end_matches('/'))
                };
                children = names.into_iter().map(|name| format!("{base}{name}")).collect();
            }
        }

        let (bytes, done, request) = match job.entry.as_mut() {
            Some(JobEntry::Fs(entry)) => (entry.take_output(), entry.is_done(), entry.request()),
            Some(JobEntry::Tar(tar)) => (tar.take_output(), tar.is_done(), None),
            None => (Vec::new(), true, None),
        };
        let absolute = job.absolute.clone();
        let mut progressed = !bytes.is_empty() || !children.is_empty();

        for child in children {
            let child_absolute = self.cwd.join(&child);
            self.push_job(PackJob::new(child, child_absolute));
        }
        self.emit(&bytes)?;

        if done {
            self.jobs.remove(&id);
            self.queue.pop_front();
            progressed = true;
        } else if !self.entry_in_flight {
            if let Some(request) = request {
                log::trace!("{request:?} {}", absolute.display());
                self.entry_in_flight = true;
                self.requests.push_back(PackRequest::Entry {
                    job: id,
                    path: absolute,
                    request,
                });
            }
        }
        Ok(progressed)
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        match self.encoder.as_mut() {
            Some(encoder) => {
                let encoded = encoder.write(bytes)?;
                self.output.extend_from_slice(&encoded);
            }
            None => self.output.extend_from_slice(bytes),
        }
        Ok(())
    }
}

/// Blocking archive writer.
///
/// # Example
///
/// ```rust,no_run
/// use tarstream::write::{Pack, PackOptions};
///
/// # fn main() -> tarstream::Result<()> {
/// let out = std::fs::File::create("site.tar")?;
/// let mut pack = Pack::new(out, PackOptions::new().cwd("/srv").portable(true))?;
/// pack.add("site")?;
/// pack.finish()?;
/// # Ok(())
/// # }
/// ```
pub struct Pack<W: Write> {
    packer: Packer,
    fs: Arc<dyn Filesystem>,
    writer: W,
    file: Option<Box<dyn Read + Send>>,
}

impl<W: Write> Pack<W> {
    /// Creates a pack over the local filesystem.
    pub fn new(writer: W, options: PackOptions) -> Result<Self> {
        Self::with_filesystem(writer, options, Arc::new(OsFilesystem))
    }

    /// Creates a pack over a custom filesystem.
    pub fn with_filesystem(
        writer: W,
        options: PackOptions,
        fs: Arc<dyn Filesystem>,
    ) -> Result<Self> {
        Ok(Self {
            packer: Packer::new(options)?,
            fs,
            writer,
            file: None,
        })
    }

    /// Adds a path and everything below it.
    pub fn add(&mut self, path: &str) -> Result<()> {
        self.packer.add(path)?;
        self.drive()
    }

    /// Adds a member read from another archive.
    pub fn add_entry(&mut self, entry: &ReadEntry, body: &[u8]) -> Result<()> {
        self.packer.add_entry(entry, body)?;
        self.drive()
    }

    /// Writes the end-of-archive marker and returns the writer.
    pub fn finish(mut self) -> Result<W> {
        self.packer.end()?;
        self.drive()?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    /// Gives access to the underlying packer.
    pub fn packer(&self) -> &Packer {
        &self.packer
    }

    fn drive(&mut self) -> Result<()> {
        loop {
            let output = self.packer.take_output();
            if !output.is_empty() {
                self.writer.write_all(&output)?;
            }
            let Some(request) = self.packer.poll_request() else {
                return Ok(());
            };
            let response = execute(self.fs.as_ref(), request, &mut self.file);
            self.packer.complete(response)?;
        }
    }
}

/// Appends every member of the archive in `reader` to `pack`.
///
/// Returns the number of members copied.
pub fn concat<W: Write, R: Read>(
    pack: &mut Pack<W>,
    reader: R,
    options: ParseOptions,
) -> Result<usize> {
    let mut tar = TarReader::with_options(reader, options);
    let mut count = 0;
    while let Some((entry, body)) = tar.next_entry()? {
        pack.add_entry(&entry, &body)?;
        count += 1;
    }
    Ok(count)
}

//! Tokio drivers for reading, packing and extracting.
//!
//! These wrap the same sans-IO cores as the blocking API. Filesystem work
//! runs on the blocking thread pool; the parser itself never blocks.
//!
//! # Example
//!
//! ```rust,no_run
//! use tarstream::async_io::{AsyncPack, AsyncTarReader};
//! use tarstream::read::ParseEvent;
//! use tarstream::write::PackOptions;
//!
//! #[tokio::main]
//! async fn main() -> tarstream::Result<()> {
//!     let out = tokio::fs::File::create("site.tar").await?;
//!     let mut pack = AsyncPack::new(out, PackOptions::new().cwd("/srv"))?;
//!     pack.add("site")?;
//!     pack.finish().await?;
//!
//!     let file = tokio::fs::File::open("site.tar").await?;
//!     let mut reader = AsyncTarReader::new(file);
//!     while let Some(event) = reader.next_event().await? {
//!         if let ParseEvent::Entry(entry) = event {
//!             println!("{}", entry.path);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::io::{self, Read};
use std::sync::Arc;

use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::extract::{Unpack, UnpackOptions, UnpackResult};
use crate::fs::{Filesystem, OsFilesystem};
use crate::read::{ParseEvent, ParseOptions, Parser, ReadEntry};
use crate::write::{PackOptions, PackRequest, PackResponse, Packer, execute};
use crate::{Error, READ_BUFFER_SIZE, Result};

/// Chunks buffered between [`AsyncUnpack::write`] and the extraction worker.
const UNPACK_CHANNEL_CAPACITY: usize = 16;

type OpenFile = Option<Box<dyn Read + Send>>;

fn join_error(err: tokio::task::JoinError) -> Error {
    Error::Io(io::Error::other(err))
}

/// Event reader over a Tokio byte source.
pub struct AsyncTarReader<R> {
    reader: R,
    parser: Parser,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> AsyncTarReader<R> {
    /// Creates a reader with default options.
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, ParseOptions::default())
    }

    /// Creates a reader with explicit options.
    pub fn with_options(reader: R, options: ParseOptions) -> Self {
        Self {
            reader,
            parser: Parser::new(options),
            buf: vec![0u8; READ_BUFFER_SIZE],
        }
    }

    /// Returns the next event, reading more input as needed.
    pub async fn next_event(&mut self) -> Result<Option<ParseEvent>> {
        loop {
            if self.parser.is_paused() {
                return Ok(None);
            }
            if let Some(event) = self.parser.next_event() {
                return Ok(Some(event));
            }
            if self.parser.is_done() {
                return Ok(None);
            }
            let n = match self.reader.read(&mut self.buf).await {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                self.parser.end()?;
            } else {
                self.parser.write(&self.buf[..n])?;
            }
        }
    }

    /// Reads the next surfaced entry with its whole body.
    pub async fn next_entry(&mut self) -> Result<Option<(ReadEntry, Vec<u8>)>> {
        let mut current: Option<(ReadEntry, Vec<u8>)> = None;
        while let Some(event) = self.next_event().await? {
            match event {
                ParseEvent::Entry(entry) => current = Some((entry, Vec::new())),
                ParseEvent::Data(data) => {
                    if let Some((_, body)) = current.as_mut() {
                        body.extend_from_slice(&data);
                    }
                }
                ParseEvent::EntryEnd if current.is_some() => return Ok(current),
                ParseEvent::Warning(warning) => log::warn!("{warning}"),
                _ => {}
            }
        }
        Ok(None)
    }

    /// Returns the underlying parser.
    pub fn parser_mut(&mut self) -> &mut Parser {
        &mut self.parser
    }

    /// Turns the reader into a stream of events that ends after the first
    /// error.
    pub fn into_stream(self) -> impl Stream<Item = Result<ParseEvent>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut reader = state?;
            match reader.next_event().await {
                Ok(Some(event)) => Some((Ok(event), Some(reader))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }
}

/// Archive writer running filesystem requests on the blocking pool.
///
/// Up to [`PackOptions::jobs`] stat/readdir requests run concurrently;
/// file reads for the entry being written run one at a time.
pub struct AsyncPack<W> {
    packer: Packer,
    fs: Arc<dyn Filesystem>,
    writer: W,
    file: OpenFile,
    tasks: JoinSet<(PackResponse, Option<OpenFile>)>,
}

impl<W: AsyncWrite + Unpin> AsyncPack<W> {
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
            tasks: JoinSet::new(),
        })
    }

    /// Queues a path; its filesystem work starts in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add(&mut self, path: &str) -> Result<()> {
        self.packer.add(path)?;
        self.spawn_requests();
        Ok(())
    }

    /// Queues a member read from another archive.
    pub fn add_entry(&mut self, entry: &ReadEntry, body: &[u8]) -> Result<()> {
        self.packer.add_entry(entry, body)?;
        self.spawn_requests();
        Ok(())
    }

    /// Waits for all queued work, writes the end-of-archive marker and
    /// returns the writer.
    pub async fn finish(mut self) -> Result<W> {
        self.packer.end()?;
        self.spawn_requests();
        loop {
            let output = self.packer.take_output();
            if !output.is_empty() {
                self.writer.write_all(&output).await?;
            }
            let Some(joined) = self.tasks.join_next().await else {
                break;
            };
            let (response, file) = joined.map_err(join_error)?;
            if let Some(file) = file {
                self.file = file;
            }
            self.packer.complete(response)?;
            self.spawn_requests();
        }
        let output = self.packer.take_output();
        self.writer.write_all(&output).await?;
        self.writer.flush().await?;
        Ok(self.writer)
    }

    fn spawn_requests(&mut self) {
        while let Some(request) = self.packer.poll_request() {
            let fs = Arc::clone(&self.fs);
            match request {
                PackRequest::Entry { .. } => {
                    let mut file = self.file.take();
                    self.tasks.spawn_blocking(move || {
                        let response = execute(fs.as_ref(), request, &mut file);
                        (response, Some(file))
                    });
                }
                _ => {
                    self.tasks.spawn_blocking(move || {
                        let response = execute(fs.as_ref(), request, &mut None);
                        (response, None)
                    });
                }
            }
        }
    }
}

/// Extractor fed from async code.
///
/// Chunks are handed to a blocking worker through a bounded channel, so a
/// slow filesystem applies backpressure to [`write`](Self::write).
pub struct AsyncUnpack {
    sender: mpsc::Sender<Vec<u8>>,
    worker: JoinHandle<Result<UnpackResult>>,
}

impl AsyncUnpack {
    /// Starts an extraction worker. Must be called within a Tokio runtime.
    pub fn new(options: UnpackOptions) -> Result<Self> {
        Self::from_unpack(Unpack::new(options)?)
    }

    /// Starts a worker around a configured [`Unpack`].
    pub fn from_unpack(mut unpack: Unpack) -> Result<Self> {
        let (sender, mut receiver) = mpsc::channel::<Vec<u8>>(UNPACK_CHANNEL_CAPACITY);
        let worker = tokio::task::spawn_blocking(move || {
            while let Some(chunk) = receiver.blocking_recv() {
                unpack.write(&chunk)?;
            }
            unpack.finish()
        });
        Ok(Self { sender, worker })
    }

    /// Queues archive bytes.
    ///
    /// Fails when the worker has stopped; [`finish`](Self::finish) then
    /// returns the cause.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.sender
            .send(chunk.to_vec())
            .await
            .map_err(|_| Error::InvalidState("extraction worker stopped"))
    }

    /// Ends input and waits for the worker.
    pub async fn finish(self) -> Result<UnpackResult> {
        drop(self.sender);
        self.worker.await.map_err(join_error)?
    }
}

/// Extracts the archive read from `reader`.
pub async fn unpack_async<R: AsyncRead + Unpin>(
    mut reader: R,
    options: UnpackOptions,
) -> Result<UnpackResult> {
    let mut unpack = AsyncUnpack::new(options)?;
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if unpack.write(&buf[..n]).await.is_err() {
            break;
        }
    }
    unpack.finish().await
}

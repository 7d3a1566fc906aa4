//! Streaming tar parser.
//!
//! [`Parser`] is a push-style reducer: feed it arbitrary chunks with
//! [`Parser::write`], call [`Parser::end`] when the input is exhausted and
//! drain the resulting [`ParseEvent`]s. The event sequence does not depend on
//! how the input was chunked (apart from how body bytes are split across
//! [`ParseEvent::Data`] events), so the same parser backs the blocking
//! [`TarReader`](crate::read::TarReader) and the async reader.
//!
//! Compressed input is detected on the first bytes and decoded before it
//! reaches the block state machine (see [`Decompression`]).

use std::collections::VecDeque;
use std::fmt;

use crate::codec::{self, Codec, Decompression, Sniff, Transform};
use crate::format::{BLOCK_SIZE, EntryType, Header, Pax};
use crate::read::{FilterTarget, ParseOptions, ReadEntry};
use crate::{Error, Result, Warning, WarningCode};

/// Something the parser observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// A member was found; its body follows as `Data` until `EntryEnd`.
    Entry(ReadEntry),
    /// Body bytes of the current member.
    Data(Vec<u8>),
    /// The current member's body is complete.
    EntryEnd,
    /// A member was skipped (filtered, unsupported, invalid or oversized).
    Ignored(ReadEntry),
    /// A PAX or GNU long-name body was applied.
    Meta {
        /// The meta entry type.
        entry_type: EntryType,
        /// Its raw body.
        body: Vec<u8>,
    },
    /// A recoverable problem.
    Warning(Warning),
    /// The end-of-archive marker was read; later input is ignored.
    Eof,
    /// Parsing is finished; no more events follow.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Begin,
    Header,
    Ignore,
    Body,
    Meta,
}

enum Input {
    Sniffing(Vec<u8>),
    Plain,
    Decoding(Box<dyn Transform>),
}

enum Detected {
    Plain,
    Compressed(Codec),
}

/// Push-style tar parser.
///
/// # Example
///
/// ```rust
/// use tarstream::read::{ParseEvent, ParseOptions, Parser};
///
/// let mut parser = Parser::new(ParseOptions::default());
/// parser.write(&[0u8; 1024]).unwrap();
/// parser.end().unwrap();
/// let events: Vec<_> = parser.drain_events().collect();
/// assert_eq!(events, vec![ParseEvent::Eof, ParseEvent::End]);
/// ```
pub struct Parser {
    options: ParseOptions,
    state: State,
    input: Input,
    buffer: Vec<u8>,
    current: Option<ReadEntry>,
    meta: Vec<u8>,
    extended: Option<Pax>,
    global_extended: Option<Pax>,
    saw_valid_entry: Option<bool>,
    saw_null_block: bool,
    saw_eof: bool,
    position: u64,
    events: VecDeque<ParseEvent>,
    paused: bool,
    ended: bool,
    aborted: bool,
    done: bool,
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("state", &self.state)
            .field("position", &self.position)
            .field("queued", &self.events.len())
            .field("ended", &self.ended)
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(ParseOptions::default())
    }
}

impl Parser {
    /// Creates a parser.
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            state: State::Begin,
            input: Input::Sniffing(Vec::new()),
            buffer: Vec::with_capacity(BLOCK_SIZE),
            current: None,
            meta: Vec::new(),
            extended: None,
            global_extended: None,
            saw_valid_entry: None,
            saw_null_block: false,
            saw_eof: false,
            position: 0,
            events: VecDeque::new(),
            paused: false,
            ended: false,
            aborted: false,
            done: false,
        }
    }

    /// Feeds a chunk of (possibly compressed) archive bytes.
    ///
    /// Returns whether the consumer is keeping up: `false` means events are
    /// queued or the parser is paused, and the caller should drain events
    /// before writing more. In strict mode the first warning is returned as
    /// an error and the parser is aborted.
    pub fn write(&mut self, chunk: &[u8]) -> Result<bool> {
        if self.aborted {
            return Err(Error::InvalidState("parser was aborted"));
        }
        if self.ended {
            return Err(Error::InvalidState("write after end"));
        }
        let result = self.feed(chunk);
        self.check(result)?;
        Ok(self.is_ready())
    }

    /// Signals end of input.
    ///
    /// Flushes the decompressor, reports truncation and unrecognised input,
    /// and queues [`ParseEvent::End`]. Calling it twice is a no-op.
    pub fn end(&mut self) -> Result<()> {
        if self.aborted {
            return Err(Error::InvalidState("parser was aborted"));
        }
        if self.ended {
            return Ok(());
        }
        self.ended = true;
        let result = self.finish_input();
        self.check(result)
    }

    /// Pops the next event, unless paused.
    pub fn next_event(&mut self) -> Option<ParseEvent> {
        if self.paused {
            return None;
        }
        self.events.pop_front()
    }

    /// Drains all queued events, ignoring the pause flag.
    pub fn drain_events(&mut self) -> impl Iterator<Item = ParseEvent> + '_ {
        self.events.drain(..)
    }

    /// Stops handing out events until [`Parser::resume`].
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resumes handing out events.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Returns true while paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Returns true when no events are queued and the parser is not paused.
    pub fn is_ready(&self) -> bool {
        !self.paused && self.events.is_empty()
    }

    /// Returns true once [`ParseEvent::End`] has been queued.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Returns true after a fatal error.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Number of decoded archive bytes consumed.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn check(&mut self, result: Result<()>) -> Result<()> {
        if result.is_err() {
            self.aborted = true;
        }
        result
    }

    fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        match self.input {
            Input::Plain => return self.consume(chunk),
            Input::Decoding(ref mut transform) => {
                let out = transform.write(chunk).map_err(decompression_error)?;
                return self.consume(&out);
            }
            Input::Sniffing(ref mut head) => head.extend_from_slice(chunk),
        }
        self.detect()
    }

    fn finish_input(&mut self) -> Result<()> {
        self.detect()?;
        if let Input::Decoding(transform) = &mut self.input {
            let out = transform.finish().map_err(decompression_error)?;
            self.consume(&out)?;
        }
        self.maybe_end()
    }

    /// Decides how to read the input once enough of it has been buffered.
    fn detect(&mut self) -> Result<()> {
        let Input::Sniffing(head) = &self.input else {
            return Ok(());
        };
        let ended = self.ended;
        let detected = match self.options.decompression {
            Decompression::None => Some(Detected::Plain),
            Decompression::Gzip => Some(Detected::Compressed(Codec::Gzip)),
            Decompression::Brotli => Some(Detected::Compressed(Codec::Brotli)),
            Decompression::Zstd => Some(Detected::Compressed(Codec::Zstd)),
            Decompression::Auto => match codec::sniff(head, ended) {
                Sniff::Compressed(codec) => Some(Detected::Compressed(codec)),
                Sniff::Plain => Some(Detected::Plain),
                Sniff::NeedMore => None,
            },
            Decompression::MaybeBrotli => match codec::sniff(head, ended) {
                Sniff::Compressed(codec) => Some(Detected::Compressed(codec)),
                Sniff::NeedMore => None,
                Sniff::Plain if head.len() >= BLOCK_SIZE => {
                    if looks_like_tar(&head[..BLOCK_SIZE]) {
                        Some(Detected::Plain)
                    } else {
                        Some(Detected::Compressed(Codec::Brotli))
                    }
                }
                Sniff::Plain if ended && head.is_empty() => Some(Detected::Plain),
                Sniff::Plain if ended => Some(Detected::Compressed(Codec::Brotli)),
                Sniff::Plain => None,
            },
        };
        let Some(detected) = detected else {
            return Ok(());
        };

        let head = match std::mem::replace(&mut self.input, Input::Plain) {
            Input::Sniffing(head) => head,
            _ => Vec::new(),
        };
        if let Detected::Compressed(codec) = detected {
            log::debug!("detected {} compressed archive", codec.name());
            self.input = Input::Decoding(codec::decoder(codec)?);
        }
        self.feed(&head)
    }

    /// Runs decoded bytes through the block state machine.
    fn consume(&mut self, data: &[u8]) -> Result<()> {
        let mut pos = 0;
        while pos < data.len() && !self.saw_eof {
            match self.state {
                State::Begin | State::Header => {
                    if self.buffer.is_empty() && data.len() - pos >= BLOCK_SIZE {
                        let block = &data[pos..pos + BLOCK_SIZE];
                        pos += BLOCK_SIZE;
                        self.position += BLOCK_SIZE as u64;
                        self.consume_header(block)?;
                    } else {
                        let take = (BLOCK_SIZE - self.buffer.len()).min(data.len() - pos);
                        self.buffer.extend_from_slice(&data[pos..pos + take]);
                        pos += take;
                        self.position += take as u64;
                        if self.buffer.len() == BLOCK_SIZE {
                            let block = std::mem::take(&mut self.buffer);
                            self.consume_header(&block)?;
                        }
                    }
                }
                State::Body | State::Meta | State::Ignore => {
                    let entry = self
                        .current
                        .as_mut()
                        .ok_or(Error::InvalidState("no entry for body bytes"))?;
                    let take = (data.len() - pos).min(entry.block_remain() as usize);
                    // meta entries are ignored for output, so keep their raw body here
                    let logical = take.min(usize::try_from(entry.remain()).unwrap_or(usize::MAX));
                    let out = entry.write(&data[pos..pos + take])?;
                    match self.state {
                        State::Body if !out.is_empty() => {
                            self.events.push_back(ParseEvent::Data(out.to_vec()));
                        }
                        State::Meta => self.meta.extend_from_slice(&data[pos..pos + logical]),
                        _ => {}
                    }
                    let complete = entry.is_complete();
                    pos += take;
                    self.position += take as u64;
                    if complete {
                        self.finish_entry();
                    }
                }
            }
        }
        Ok(())
    }

    fn consume_header(&mut self, block: &[u8]) -> Result<()> {
        let offset = self.position - BLOCK_SIZE as u64;
        let header = match Header::decode(block) {
            Ok(header) => header,
            Err(err) => {
                return self.warn(Warning::new(
                    WarningCode::EntryInvalid,
                    format!("invalid header at offset {offset}: {err}"),
                ));
            }
        };

        if header.null_block {
            if self.saw_null_block {
                log::trace!("end-of-archive marker at offset {offset}");
                self.saw_eof = true;
                self.state = State::Header;
                self.events.push_back(ParseEvent::Eof);
            } else {
                self.saw_null_block = true;
            }
            return Ok(());
        }
        self.saw_null_block = false;
        self.saw_valid_entry.get_or_insert(false);

        if !header.cksum_valid {
            return self.warn(
                Warning::new(WarningCode::EntryInvalid, "checksum failure").with_path(header.path),
            );
        }

        self.state = State::Header;
        let meta = header.entry_type.is_meta();
        let mut entry = if meta {
            ReadEntry::new(header, None, None)
        } else {
            ReadEntry::new(header, self.extended.take(), self.global_extended.clone())
        };

        if let Some(problem) = validate(&entry) {
            self.warn(Warning::new(WarningCode::EntryInvalid, problem).with_path(entry.path.clone()))?;
            entry.invalid = true;
            entry.ignore = true;
        } else if entry.block_remain() == 0 {
            self.saw_valid_entry = Some(true);
        }

        if meta && !entry.invalid {
            if entry.size > self.options.max_meta_entry_size {
                log::debug!(
                    "ignoring {} entry of {} bytes at offset {offset}",
                    entry.entry_type,
                    entry.size
                );
                entry.ignore = true;
                self.events.push_back(ParseEvent::Ignored(entry.clone()));
                self.state = State::Ignore;
            } else if entry.size > 0 {
                self.meta.clear();
                self.state = State::Meta;
            }
        } else {
            if !entry.ignore {
                if let Some(filter) = &self.options.filter {
                    entry.ignore = !filter(&entry.path, FilterTarget::Entry(&entry));
                }
            }
            if entry.ignore {
                self.events.push_back(ParseEvent::Ignored(entry.clone()));
                self.state = State::Ignore;
            } else {
                log::debug!("entry {} ({}, {} bytes)", entry.path, entry.entry_type, entry.size);
                self.events.push_back(ParseEvent::Entry(entry.clone()));
                if entry.block_remain() > 0 {
                    self.state = State::Body;
                } else {
                    self.events.push_back(ParseEvent::EntryEnd);
                }
            }
        }

        if entry.block_remain() == 0 {
            self.state = State::Header;
        } else if self.state != State::Header {
            self.current = Some(entry);
        }
        Ok(())
    }

    fn finish_entry(&mut self) {
        let Some(entry) = self.current.take() else {
            return;
        };
        if !entry.invalid {
            self.saw_valid_entry = Some(true);
        }
        match self.state {
            State::Body => {
                log::trace!("end of entry {}", entry.path);
                self.events.push_back(ParseEvent::EntryEnd);
            }
            State::Meta => self.apply_meta(&entry),
            _ => {}
        }
        self.state = State::Header;
    }

    fn apply_meta(&mut self, entry: &ReadEntry) {
        let body = std::mem::take(&mut self.meta);
        match entry.entry_type {
            EntryType::ExtendedHeader | EntryType::OldExtendedHeader => {
                self.extended = Some(Pax::parse(&body, self.extended.as_ref(), false));
            }
            EntryType::GlobalExtendedHeader => {
                self.global_extended = Some(Pax::parse(&body, self.global_extended.as_ref(), true));
            }
            EntryType::NextFileHasLongPath | EntryType::OldGnuLongPath => {
                self.extended.get_or_insert_with(|| Pax::new(false)).path = Some(until_nul(&body));
            }
            EntryType::NextFileHasLongLinkpath => {
                self.extended.get_or_insert_with(|| Pax::new(false)).linkpath =
                    Some(until_nul(&body));
            }
            _ => {}
        }
        self.events.push_back(ParseEvent::Meta {
            entry_type: entry.entry_type,
            body,
        });
    }

    fn maybe_end(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        if let Some(entry) = self.current.take() {
            self.warn(
                Warning::new(
                    WarningCode::BadArchive,
                    truncated_message(entry.block_remain(), 0),
                )
                .with_path(entry.path.clone()),
            )?;
            if self.state == State::Body {
                self.events.push_back(ParseEvent::EntryEnd);
            }
            if !entry.invalid {
                self.saw_valid_entry = Some(true);
            }
            self.state = State::Header;
        } else if self.state == State::Header && !self.saw_eof && !self.buffer.is_empty() {
            let have = self.buffer.len();
            self.buffer.clear();
            self.warn(Warning::new(
                WarningCode::BadArchive,
                truncated_message((BLOCK_SIZE - have) as u64, have),
            ))?;
        }

        if self.state == State::Begin || self.saw_valid_entry == Some(false) {
            self.warn(Warning::new(
                WarningCode::BadArchive,
                "Unrecognized archive format",
            ))?;
        }
        self.done = true;
        self.events.push_back(ParseEvent::End);
        Ok(())
    }

    fn warn(&mut self, warning: Warning) -> Result<()> {
        if self.options.strict {
            return Err(Error::Warning(warning));
        }
        log::trace!("{warning}");
        self.events.push_back(ParseEvent::Warning(warning));
        Ok(())
    }
}

fn validate(entry: &ReadEntry) -> Option<&'static str> {
    if entry.path.is_empty() {
        Some("path is required")
    } else if entry.entry_type.requires_linkpath() && entry.linkpath.is_none() {
        Some("linkpath required")
    } else if !entry.entry_type.requires_linkpath() && !entry.meta && entry.linkpath.is_some() {
        Some("linkpath forbidden")
    } else {
        None
    }
}

fn looks_like_tar(block: &[u8]) -> bool {
    Header::decode(block).is_ok_and(|h| h.null_block || h.cksum_valid)
}

fn until_nul(body: &[u8]) -> String {
    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    String::from_utf8_lossy(&body[..end]).into_owned()
}

fn truncated_message(needed: u64, available: usize) -> String {
    Error::Truncated {
        needed,
        available: available as u64,
    }
    .to_string()
}

fn decompression_error(err: std::io::Error) -> Error {
    Error::Decompression(err.to_string())
}

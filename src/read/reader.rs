//! Blocking driver for [`Parser`].

use std::io::{self, Read};

use crate::read::{ParseEvent, ParseOptions, Parser, ReadEntry};
use crate::{READ_BUFFER_SIZE, Result};

/// Pulls bytes from a [`Read`] source through a [`Parser`].
///
/// Implements `Iterator<Item = Result<ParseEvent>>`; the iterator ends after
/// [`ParseEvent::End`].
///
/// # Example
///
/// ```rust
/// use std::io::Cursor;
/// use tarstream::read::{ParseEvent, TarReader};
///
/// let reader = TarReader::new(Cursor::new(vec![0u8; 1024]));
/// let events: Vec<ParseEvent> = reader.collect::<tarstream::Result<_>>().unwrap();
/// assert_eq!(events.last(), Some(&ParseEvent::End));
/// ```
#[derive(Debug)]
pub struct TarReader<R> {
    reader: R,
    parser: Parser,
    buf: Vec<u8>,
}

impl<R: Read> TarReader<R> {
    /// Creates a reader with default options.
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, ParseOptions::default())
    }

    /// Creates a reader with the given options.
    pub fn with_options(reader: R, options: ParseOptions) -> Self {
        Self {
            reader,
            parser: Parser::new(options),
            buf: vec![0u8; READ_BUFFER_SIZE],
        }
    }

    /// Returns the next event, reading more input as needed.
    ///
    /// Returns `Ok(None)` once parsing has finished, or while the parser is
    /// paused.
    pub fn next_event(&mut self) -> Result<Option<ParseEvent>> {
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
            let n = match self.reader.read(&mut self.buf) {
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

    /// Reads the next surfaced entry together with its whole body.
    ///
    /// Warnings are logged and skipped.
    pub fn next_entry(&mut self) -> Result<Option<(ReadEntry, Vec<u8>)>> {
        let mut current: Option<(ReadEntry, Vec<u8>)> = None;
        while let Some(event) = self.next_event()? {
            match event {
                ParseEvent::Entry(entry) => current = Some((entry, Vec::new())),
                ParseEvent::Data(data) => {
                    if let Some((_, body)) = current.as_mut() {
                        body.extend_from_slice(&data);
                    }
                }
                ParseEvent::EntryEnd => {
                    if current.is_some() {
                        return Ok(current);
                    }
                }
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

    /// Consumes the reader, returning the source.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> Iterator for TarReader<R> {
    type Item = Result<ParseEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

/// Lists the non-meta entries of an archive without keeping bodies.
pub fn list<R: Read>(reader: R, options: ParseOptions) -> Result<Vec<ReadEntry>> {
    let mut entries = Vec::new();
    for event in TarReader::with_options(reader, options) {
        match event? {
            ParseEvent::Entry(entry) => entries.push(entry),
            ParseEvent::Warning(warning) => log::warn!("{warning}"),
            _ => {}
        }
    }
    Ok(entries)
}

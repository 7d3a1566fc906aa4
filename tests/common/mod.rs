//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::path::Path;

use tarstream::format::{EOF_MARKER, EntryType, Header, Pax, padded_size};
use tarstream::read::{ParseEvent, ParseOptions, Parser};
use tarstream::write::{Pack, PackOptions};
use tarstream::{ReadEntry, Timestamp};

/// Mtime stamped on every synthetic member.
pub const MTIME: i64 = 1_600_000_000;

/// Builds a header for a synthetic member.
pub fn header(path: &str, entry_type: EntryType, size: u64) -> Header {
    Header {
        path: path.to_string(),
        mode: Some(if entry_type == EntryType::Directory {
            0o755
        } else {
            0o644
        }),
        uid: Some(1000),
        gid: Some(1000),
        size,
        mtime: Some(Timestamp::from_unix_secs(MTIME)),
        entry_type,
        ..Header::default()
    }
}

/// Encodes one member: header block plus padded body.
pub fn member_from(mut header: Header, body: &[u8]) -> Vec<u8> {
    let (block, _) = header.to_block();
    let mut out = block.to_vec();
    out.extend_from_slice(body);
    out.resize(512 + padded_size(body.len() as u64) as usize, 0);
    out
}

/// Encodes a regular file member.
pub fn file(path: &str, body: &[u8]) -> Vec<u8> {
    member_from(header(path, EntryType::File, body.len() as u64), body)
}

/// Encodes a directory member.
pub fn dir(path: &str) -> Vec<u8> {
    member_from(header(path, EntryType::Directory, 0), b"")
}

/// Encodes a link member of the given type.
pub fn link(path: &str, entry_type: EntryType, target: &str) -> Vec<u8> {
    let mut h = header(path, entry_type, 0);
    h.linkpath = Some(target.to_string());
    member_from(h, b"")
}

/// Encodes a member preceded by a local PAX header.
pub fn with_pax(pax: &Pax, member: Vec<u8>) -> Vec<u8> {
    let mut out = pax.encode();
    out.extend(member);
    out
}

/// Encodes a member preceded by a GNU long-name entry carrying `path`.
pub fn with_long_name(path: &str, member: Vec<u8>) -> Vec<u8> {
    let mut body = path.as_bytes().to_vec();
    body.push(0);
    let mut out = member_from(
        header("././@LongLink", EntryType::NextFileHasLongPath, body.len() as u64),
        &body,
    );
    out.extend(member);
    out
}

/// Concatenates members and appends the end-of-archive marker.
pub fn archive(members: &[Vec<u8>]) -> Vec<u8> {
    let mut out = members.concat();
    out.extend_from_slice(&EOF_MARKER);
    out
}

/// Feeds `data` to a fresh parser in the given chunk sizes (cycled) and
/// returns every event, with consecutive data events merged.
pub fn events_chunked(data: &[u8], options: ParseOptions, sizes: &[usize]) -> Vec<ParseEvent> {
    let mut parser = Parser::new(options);
    let mut events = Vec::new();
    let mut offset = 0;
    let mut i = 0;
    while offset < data.len() {
        let size = sizes[i % sizes.len()].max(1);
        let end = (offset + size).min(data.len());
        parser.write(&data[offset..end]).unwrap();
        events.extend(parser.drain_events());
        offset = end;
        i += 1;
    }
    parser.end().unwrap();
    events.extend(parser.drain_events());
    merge_data(events)
}

/// Parses `data` in one call.
pub fn events(data: &[u8]) -> Vec<ParseEvent> {
    events_chunked(data, ParseOptions::new(), &[data.len().max(1)])
}

fn merge_data(events: Vec<ParseEvent>) -> Vec<ParseEvent> {
    let mut out: Vec<ParseEvent> = Vec::with_capacity(events.len());
    for event in events {
        if let (ParseEvent::Data(next), Some(ParseEvent::Data(prev))) = (&event, out.last_mut()) {
            prev.extend_from_slice(next);
            continue;
        }
        out.push(event);
    }
    out
}

/// Surfaced entries of the event list.
pub fn entries(events: &[ParseEvent]) -> Vec<&ReadEntry> {
    events
        .iter()
        .filter_map(|e| match e {
            ParseEvent::Entry(entry) => Some(entry),
            _ => None,
        })
        .collect()
}

/// Warning messages of the event list.
pub fn warnings(events: &[ParseEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ParseEvent::Warning(w) => Some(w.message.clone()),
            _ => None,
        })
        .collect()
}

/// Packs `paths` relative to `cwd` into memory.
pub fn pack(cwd: &Path, paths: &[&str], options: PackOptions) -> Vec<u8> {
    let mut pack = Pack::new(Vec::new(), options.cwd(cwd)).unwrap();
    for path in paths {
        pack.add(path).unwrap();
    }
    pack.finish().unwrap()
}

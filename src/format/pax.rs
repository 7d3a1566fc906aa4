//! PAX extended header codec.
//!
//! A PAX body is a sequence of records of the form
//! `"<len> <key>=<value>\n"`, where `<len>` is the decimal byte length of the
//! whole record *including its own digits*. Records override the fixed-width
//! header fields of the member that follows (or, for global headers, of every
//! following member).

use std::collections::BTreeMap;

use crate::format::entry_type::EntryType;
use crate::format::header::Header;
use crate::format::{BLOCK_SIZE, padded_size};
use crate::Timestamp;

/// A set of PAX key/value overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pax {
    /// Access time.
    pub atime: Option<Timestamp>,
    /// Status change time.
    pub ctime: Option<Timestamp>,
    /// Modification time.
    pub mtime: Option<Timestamp>,
    /// Character set of the following member's data.
    pub charset: Option<String>,
    /// Free-form comment.
    pub comment: Option<String>,
    /// Owner group id.
    pub gid: Option<u64>,
    /// Owner user id.
    pub uid: Option<u64>,
    /// Owner group name.
    pub gname: Option<String>,
    /// Owner user name.
    pub uname: Option<String>,
    /// Link target.
    pub linkpath: Option<String>,
    /// Member path.
    pub path: Option<String>,
    /// Body size.
    pub size: Option<u64>,
    /// Device number of the original file (`SCHILY.dev`).
    pub dev: Option<u64>,
    /// Inode number of the original file (`SCHILY.ino`).
    pub ino: Option<u64>,
    /// Link count of the original file (`SCHILY.nlink`).
    pub nlink: Option<u64>,
    /// Keys without a dedicated field, preserved verbatim.
    pub extra: BTreeMap<String, String>,
    /// Whether these records apply archive-wide.
    pub global: bool,
}

impl Pax {
    /// Creates an empty override set.
    pub fn new(global: bool) -> Self {
        Self {
            global,
            ..Self::default()
        }
    }

    /// Parses a PAX body, layering its records over `existing`.
    ///
    /// Records with a length prefix that does not match their actual length
    /// are skipped. Values may contain newlines since records are delimited
    /// by their declared length.
    pub fn parse(body: &[u8], existing: Option<&Pax>, global: bool) -> Self {
        let mut pax = existing.cloned().unwrap_or_default();
        pax.global = global;

        let mut pos = 0;
        while pos < body.len() {
            let rest = &body[pos..];
            if rest[0] == 0 {
                break;
            }
            match parse_record(rest) {
                Some((len, key, value)) => {
                    pax.set(&key, &value);
                    pos += len;
                }
                None => match rest.iter().position(|&b| b == b'\n') {
                    Some(nl) => {
                        log::debug!("skipping malformed pax record at offset {pos}");
                        pos += nl + 1;
                    }
                    None => break,
                },
            }
        }
        pax
    }

    /// Assigns one record, coercing typed keys.
    pub fn set(&mut self, key: &str, value: &str) {
        match key {
            "atime" => self.atime = Timestamp::parse_pax(value),
            "ctime" => self.ctime = Timestamp::parse_pax(value),
            "mtime" => self.mtime = Timestamp::parse_pax(value),
            "charset" => self.charset = Some(value.to_string()),
            "comment" => self.comment = Some(value.to_string()),
            "gid" => self.gid = parse_number(key, value),
            "uid" => self.uid = parse_number(key, value),
            "gname" => self.gname = Some(value.to_string()),
            "uname" => self.uname = Some(value.to_string()),
            "linkpath" => self.linkpath = Some(value.to_string()),
            "path" => self.path = Some(value.to_string()),
            "size" => self.size = parse_number(key, value),
            "SCHILY.dev" => self.dev = parse_number(key, value),
            "SCHILY.ino" => self.ino = parse_number(key, value),
            "SCHILY.nlink" => self.nlink = parse_number(key, value),
            _ => {
                self.extra.insert(key.to_string(), value.to_string());
            }
        }
    }

    /// Returns true if no record would be written.
    pub fn is_empty(&self) -> bool {
        self.encode_body().is_empty()
    }

    /// Encodes the records as a PAX body.
    pub fn encode_body(&self) -> String {
        let mut body = String::new();
        let mut push = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                body.push_str(&record(key, &value));
            }
        };
        push("path", self.path.clone());
        push("ctime", self.ctime.map(|t| t.to_pax_string()));
        push("atime", self.atime.map(|t| t.to_pax_string()));
        push("SCHILY.dev", self.dev.map(|v| v.to_string()));
        push("SCHILY.ino", self.ino.map(|v| v.to_string()));
        push("SCHILY.nlink", self.nlink.map(|v| v.to_string()));
        push("charset", self.charset.clone());
        push("comment", self.comment.clone());
        push("gid", self.gid.map(|v| v.to_string()));
        push("gname", self.gname.clone());
        push("linkpath", self.linkpath.clone());
        push("mtime", self.mtime.map(|t| t.to_pax_string()));
        push("size", self.size.map(|v| v.to_string()));
        push("uid", self.uid.map(|v| v.to_string()));
        push("uname", self.uname.clone());
        for (key, value) in &self.extra {
            push(key, Some(value.clone()));
        }
        body
    }

    /// Encodes a complete extended-header member: header block plus body
    /// padded to a block boundary. Returns an empty vector when there is
    /// nothing to encode.
    pub fn encode(&self) -> Vec<u8> {
        let body = self.encode_body();
        if body.is_empty() {
            return Vec::new();
        }
        let base = self.path.as_deref().map(basename).unwrap_or("");
        let mut name = format!("PaxHeader/{base}");
        if name.len() > 99 {
            let mut end = 99;
            while !name.is_char_boundary(end) {
                end -= 1;
            }
            name.truncate(end);
        }
        let mut header = Header {
            path: name,
            mode: Some(0o644),
            uid: self.uid,
            gid: self.gid,
            size: body.len() as u64,
            mtime: self.mtime.map(|t| t.truncated()),
            entry_type: if self.global {
                EntryType::GlobalExtendedHeader
            } else {
                EntryType::ExtendedHeader
            },
            uname: self.uname.clone(),
            gname: self.gname.clone(),
            devmajor: Some(0),
            devminor: Some(0),
            atime: self.atime.map(|t| t.truncated()),
            ctime: self.ctime.map(|t| t.truncated()),
            ..Header::default()
        };
        let (block, _) = header.to_block();

        let mut out = Vec::with_capacity(BLOCK_SIZE + padded_size(body.len() as u64) as usize);
        out.extend_from_slice(&block);
        out.extend_from_slice(body.as_bytes());
        out.resize(BLOCK_SIZE + padded_size(body.len() as u64) as usize, 0);
        out
    }
}

/// Formats one record with its self-inclusive length prefix.
///
/// Adding the length digits can push the total into the next power of ten,
/// so the digit count is grown until it is stable.
pub fn record(key: &str, value: &str) -> String {
    let body = format!(" {key}={value}\n");
    let base = body.len();
    let mut digits = base.to_string().len();
    while (base + digits).to_string().len() > digits {
        digits += 1;
    }
    format!("{}{body}", base + digits)
}

fn parse_record(rest: &[u8]) -> Option<(usize, String, String)> {
    let space = rest.iter().take(20).position(|&b| b == b' ')?;
    let len: usize = std::str::from_utf8(&rest[..space]).ok()?.parse().ok()?;
    if len <= space + 1 || len > rest.len() || rest[len - 1] != b'\n' {
        return None;
    }
    let kv = &rest[space + 1..len - 1];
    let eq = kv.iter().position(|&b| b == b'=')?;
    if eq == 0 {
        return None;
    }
    let key = String::from_utf8_lossy(&kv[..eq]).into_owned();
    let value = String::from_utf8_lossy(&kv[eq + 1..]).into_owned();
    Some((len, key, value))
}

fn parse_number(key: &str, value: &str) -> Option<u64> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        log::debug!("ignoring non-numeric pax {key}={value:?}");
    }
    parsed
}

fn basename(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_length_includes_itself() {
        let r = record("path", "café");
        assert_eq!(r, "14 path=café\n");
        assert_eq!(r.len(), 14);
    }

    #[test]
    fn test_record_length_digit_rollover() {
        // " k=" + value + "\n" is 98 bytes: two digits would give 100, so three are needed.
        let value = "v".repeat(94);
        let r = record("k", &value);
        assert!(r.starts_with("101 "));
        assert_eq!(r.len(), 101);

        let value = "v".repeat(93);
        let r = record("k", &value);
        assert!(r.starts_with("99 "));
        assert_eq!(r.len(), 99);
    }

    #[test]
    fn test_parse_typed_and_vendor_keys() {
        let body = [
            record("path", "a/very/long/name"),
            record("size", "123456789012"),
            record("mtime", "1700000000.5"),
            record("SCHILY.dev", "42"),
            record("SCHILY.xattr.user.tag", "blue"),
        ]
        .concat();
        let pax = Pax::parse(body.as_bytes(), None, false);
        assert_eq!(pax.path.as_deref(), Some("a/very/long/name"));
        assert_eq!(pax.size, Some(123_456_789_012));
        assert_eq!(pax.mtime.unwrap().subsec_nanos(), 500_000_000);
        assert_eq!(pax.dev, Some(42));
        assert_eq!(pax.extra.get("SCHILY.xattr.user.tag").map(String::as_str), Some("blue"));
    }

    #[test]
    fn test_unprefixed_inode_keys_are_vendor_keys() {
        let body = [record("dev", "1"), record("ino", "2"), record("SCHILY.nlink", "3")].concat();
        let pax = Pax::parse(body.as_bytes(), None, false);
        assert_eq!(pax.dev, None);
        assert_eq!(pax.ino, None);
        assert_eq!(pax.nlink, Some(3));
        assert_eq!(pax.extra.get("dev").map(String::as_str), Some("1"));
        assert_eq!(pax.extra.get("ino").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_value_with_newline_and_equals() {
        let body = record("comment", "a=b\nc");
        let pax = Pax::parse(body.as_bytes(), None, false);
        assert_eq!(pax.comment.as_deref(), Some("a=b\nc"));
    }

    #[test]
    fn test_malformed_record_skipped() {
        let body = format!("99 path=wrong\n{}", record("uid", "7"));
        let pax = Pax::parse(body.as_bytes(), None, false);
        assert_eq!(pax.path, None);
        assert_eq!(pax.uid, Some(7));
    }

    #[test]
    fn test_parse_merges_over_existing() {
        let first = Pax::parse(record("uname", "alice").as_bytes(), None, false);
        let merged = Pax::parse(record("uid", "5").as_bytes(), Some(&first), true);
        assert_eq!(merged.uname.as_deref(), Some("alice"));
        assert_eq!(merged.uid, Some(5));
        assert!(merged.global);
    }

    #[test]
    fn test_encode_roundtrip() {
        let mut pax = Pax::new(false);
        pax.path = Some("dir/ünïcödé.txt".into());
        pax.nlink = Some(2);
        pax.mtime = Timestamp::from_unix_secs_nanos(1_700_000_000, 250_000_000);
        pax.extra.insert("LIBARCHIVE.creationtime".into(), "1".into());

        let bytes = pax.encode();
        assert_eq!(bytes.len() % BLOCK_SIZE, 0);
        let header = Header::decode(&bytes[..BLOCK_SIZE]).unwrap();
        assert!(header.cksum_valid);
        assert_eq!(header.entry_type, EntryType::ExtendedHeader);
        assert!(header.path.starts_with("PaxHeader/"));

        let body = &bytes[BLOCK_SIZE..BLOCK_SIZE + header.size as usize];
        assert!(std::str::from_utf8(body).unwrap().contains("SCHILY.nlink=2"));
        let parsed = Pax::parse(body, None, false);
        assert_eq!(parsed, pax);
    }

    #[test]
    fn test_empty_encodes_nothing() {
        assert!(Pax::new(true).encode().is_empty());
        assert!(Pax::new(true).is_empty());
    }
}

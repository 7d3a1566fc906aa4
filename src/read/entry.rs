//! Archive members as decoded by the parser.

use std::collections::BTreeMap;

use unicode_normalization::UnicodeNormalization;

use crate::format::{EntryType, Header, Pax, padded_size};
use crate::{Error, Result, Timestamp};

/// One decoded archive member.
///
/// Logical fields start from the header and are then overridden by the
/// pending global PAX records (except `path`) and finally by the per-entry
/// PAX records. The body is fed through [`ReadEntry::write`], which keeps
/// the `remain` / `block_remain` accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadEntry {
    /// The raw header.
    pub header: Header,
    /// Per-entry PAX records merged into this entry.
    pub extended: Option<Pax>,
    /// Global PAX records in effect for this entry.
    pub global_extended: Option<Pax>,
    /// Member type.
    pub entry_type: EntryType,
    /// This is a PAX or GNU long-name entry.
    pub meta: bool,
    /// The body is consumed without being surfaced.
    pub ignore: bool,
    /// The header failed validation.
    pub invalid: bool,
    /// Member path.
    pub path: String,
    /// Permission bits (`mode & 0o7777`).
    pub mode: Option<u32>,
    /// Owner user id.
    pub uid: Option<u64>,
    /// Owner group id.
    pub gid: Option<u64>,
    /// Owner user name.
    pub uname: Option<String>,
    /// Owner group name.
    pub gname: Option<String>,
    /// Body size in bytes.
    pub size: u64,
    /// Modification time.
    pub mtime: Option<Timestamp>,
    /// Access time.
    pub atime: Option<Timestamp>,
    /// Status change time.
    pub ctime: Option<Timestamp>,
    /// Link target.
    pub linkpath: Option<String>,
    /// Device number of the original file.
    pub dev: Option<u64>,
    /// Inode number of the original file.
    pub ino: Option<u64>,
    /// Link count of the original file.
    pub nlink: Option<u64>,
    /// Device major number.
    pub devmajor: Option<u64>,
    /// Device minor number.
    pub devminor: Option<u64>,
    /// PAX charset.
    pub charset: Option<String>,
    /// PAX comment.
    pub comment: Option<String>,
    /// PAX records without a dedicated field.
    pub extra: BTreeMap<String, String>,
    remain: u64,
    block_remain: u64,
    start_block_size: u64,
}

impl ReadEntry {
    /// Builds an entry from a header and the PAX state in effect.
    pub fn new(header: Header, extended: Option<Pax>, global_extended: Option<Pax>) -> Self {
        let entry_type = header.entry_type;
        let meta = entry_type.is_meta();
        let mut entry = Self {
            entry_type,
            meta,
            ignore: meta || !entry_type.is_supported(),
            invalid: false,
            path: header.path.clone(),
            mode: header.mode.map(|m| m & 0o7777),
            uid: header.uid,
            gid: header.gid,
            uname: header.uname.clone(),
            gname: header.gname.clone(),
            size: header.size,
            mtime: header.mtime,
            atime: header.atime,
            ctime: header.ctime,
            linkpath: header.linkpath.clone(),
            dev: None,
            ino: None,
            nlink: None,
            devmajor: header.devmajor,
            devminor: header.devminor,
            charset: None,
            comment: None,
            extra: BTreeMap::new(),
            header,
            extended: None,
            global_extended: None,
            remain: 0,
            block_remain: 0,
            start_block_size: 0,
        };
        if let Some(global) = &global_extended {
            entry.apply_pax(global, true);
        }
        if let Some(local) = &extended {
            entry.apply_pax(local, false);
        }
        entry.extended = extended;
        entry.global_extended = global_extended;

        if entry.entry_type == EntryType::Directory {
            entry.size = 0;
        }
        entry.remain = entry.size;
        entry.start_block_size = padded_size(entry.size);
        entry.block_remain = entry.start_block_size;
        entry
    }

    fn apply_pax(&mut self, pax: &Pax, global: bool) {
        if !global {
            if let Some(path) = &pax.path {
                self.path = path.nfc().collect();
            }
        }
        if let Some(linkpath) = &pax.linkpath {
            self.linkpath = Some(linkpath.nfc().collect());
        }
        macro_rules! take {
            ($($field:ident),*) => {
                $(if pax.$field.is_some() {
                    self.$field = pax.$field.clone();
                })*
            };
        }
        take!(uid, gid, uname, gname, mtime, atime, ctime, dev, ino, nlink, charset, comment);
        if let Some(size) = pax.size {
            self.size = size;
        }
        self.extra
            .extend(pax.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Accounts for `data` arriving for this entry's body.
    ///
    /// Returns the part of `data` that is logical content; block padding
    /// and everything written to an ignored entry is swallowed. Writing more
    /// than the remaining padded size is an error.
    pub fn write<'a>(&mut self, data: &'a [u8]) -> Result<&'a [u8]> {
        let len = data.len() as u64;
        if len > self.block_remain {
            return Err(Error::ResourceLimitExceeded(
                "writing more to entry than is appropriate".into(),
            ));
        }
        let remain = self.remain;
        self.remain = remain.saturating_sub(len);
        self.block_remain -= len;
        if self.ignore {
            return Ok(&[]);
        }
        Ok(&data[..remain.min(len) as usize])
    }

    /// Logical bytes still expected.
    pub fn remain(&self) -> u64 {
        self.remain
    }

    /// Padded bytes still expected.
    pub fn block_remain(&self) -> u64 {
        self.block_remain
    }

    /// Padded body size at creation.
    pub fn start_block_size(&self) -> u64 {
        self.start_block_size
    }

    /// Returns true once the whole padded body has been written.
    pub fn is_complete(&self) -> bool {
        self.block_remain == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(path: &str, size: u64, entry_type: EntryType) -> Header {
        Header {
            path: path.into(),
            mode: Some(0o100644),
            size,
            entry_type,
            ..Header::default()
        }
    }

    #[test]
    fn test_write_forwards_only_logical_bytes() {
        let mut entry = ReadEntry::new(header("a", 3, EntryType::File), None, None);
        assert_eq!(entry.mode, Some(0o644));
        assert_eq!(entry.block_remain(), 512);
        let data = [7u8; 512];
        assert_eq!(entry.write(&data[..2]).unwrap(), &[7, 7]);
        assert_eq!(entry.write(&data[..10]).unwrap(), &[7]);
        assert_eq!(entry.remain(), 0);
        assert_eq!(entry.block_remain(), 500);
        assert!(entry.write(&data[..501]).is_err());
        assert!(entry.write(&data[..500]).unwrap().is_empty());
        assert!(entry.is_complete());
    }

    #[test]
    fn test_ignored_entry_swallows_data() {
        let mut entry = ReadEntry::new(header("s", 10, EntryType::SparseFile), None, None);
        assert!(entry.ignore);
        assert!(entry.write(&[1u8; 10]).unwrap().is_empty());
        assert_eq!(entry.remain(), 0);
    }

    #[test]
    fn test_pax_precedence() {
        let mut global = Pax::new(true);
        global.path = Some("global/ignored".into());
        global.uname = Some("global-user".into());
        global.uid = Some(1);
        let mut local = Pax::new(false);
        local.uid = Some(2);
        local.size = Some(1000);

        let entry = ReadEntry::new(header("short", 0, EntryType::File), Some(local), Some(global));
        assert_eq!(entry.path, "short");
        assert_eq!(entry.uname.as_deref(), Some("global-user"));
        assert_eq!(entry.uid, Some(2));
        assert_eq!(entry.size, 1000);
        assert_eq!(entry.block_remain(), 1024);
    }

    #[test]
    fn test_pax_path_is_nfc_normalized() {
        let mut local = Pax::new(false);
        local.path = Some("cafe\u{301}".into());
        let entry = ReadEntry::new(header("x", 0, EntryType::File), Some(local), None);
        assert_eq!(entry.path, "caf\u{e9}");
    }

    #[test]
    fn test_directory_size_forced_to_zero() {
        let mut local = Pax::new(false);
        local.size = Some(4096);
        let entry = ReadEntry::new(header("d/", 0, EntryType::Directory), Some(local), None);
        assert_eq!(entry.size, 0);
        assert!(entry.is_complete());
    }
}

//! Header block codec.
//!
//! A header is one 512-byte block. Four layouts are recognised on decode:
//!
//! | Variant | Magic | Extra fields |
//! |---------|-------|--------------|
//! | Basic | none | path, mode, ids, size, mtime, type, linkpath |
//! | USTAR | `"ustar\0"` + `"00"` | uname, gname, devices, 155-byte prefix |
//! | XSTAR | `"ustar\0"`, byte 475 is NUL | 130-byte prefix, atime, ctime |
//! | GNU | `"ustar "` + `" \0"` | uname, gname, devices, atime, ctime |
//!
//! Encoding always produces USTAR, or XSTAR when atime/ctime are set.

use crate::format::BLOCK_SIZE;
use crate::format::entry_type::EntryType;
use crate::format::field::{NumericField, TextField};
use crate::{Error, Result, Timestamp};

const PATH: TextField = TextField::new(0, 100);
const MODE: NumericField = NumericField::new(100, 8);
const UID: NumericField = NumericField::new(108, 8);
const GID: NumericField = NumericField::new(116, 8);
const SIZE: NumericField = NumericField::new(124, 12);
const MTIME: NumericField = NumericField::new(136, 12);
const CKSUM: NumericField = NumericField::new(148, 8);
const TYPEFLAG: usize = 156;
const LINKPATH: TextField = TextField::new(157, 100);
const MAGIC: std::ops::Range<usize> = 257..263;
const VERSION: std::ops::Range<usize> = 263..265;
const UNAME: TextField = TextField::new(265, 32);
const GNAME: TextField = TextField::new(297, 32);
const DEVMAJOR: NumericField = NumericField::new(329, 8);
const DEVMINOR: NumericField = NumericField::new(337, 8);
const PREFIX: TextField = TextField::new(345, 155);
const XSTAR_PREFIX: TextField = TextField::new(345, 130);
const XSTAR_TERMINATOR: usize = 475;
const XSTAR_ATIME: NumericField = NumericField::new(476, 12);
const XSTAR_CTIME: NumericField = NumericField::new(488, 12);
const GNU_ATIME: NumericField = NumericField::new(345, 12);
const GNU_CTIME: NumericField = NumericField::new(357, 12);

const USTAR_MAGIC: &[u8] = b"ustar\0";
const USTAR_VERSION: &[u8] = b"00";
const GNU_MAGIC: &[u8] = b"ustar ";
const GNU_VERSION: &[u8] = b" \0";

/// Checksum of a block whose checksum field is still blank.
const BLANK_CHECKSUM: u32 = 8 * b' ' as u32;

/// Field layout of a decoded header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderVariant {
    /// Pre-POSIX layout without the USTAR magic.
    Basic,
    /// POSIX.1-1988 USTAR.
    #[default]
    Ustar,
    /// USTAR with atime/ctime stored after a 130-byte prefix.
    Xstar,
    /// Old GNU layout (`"ustar  \0"`).
    Gnu,
}

/// The decoded view of one header block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Member path, with the USTAR prefix already joined.
    pub path: String,
    /// Permission bits (and file-type bits from some writers).
    pub mode: Option<u32>,
    /// Owner user id.
    pub uid: Option<u64>,
    /// Owner group id.
    pub gid: Option<u64>,
    /// Body size in bytes.
    pub size: u64,
    /// Modification time (whole seconds).
    pub mtime: Option<Timestamp>,
    /// Member type.
    pub entry_type: EntryType,
    /// Link target for hard and symbolic links.
    pub linkpath: Option<String>,
    /// Owner user name.
    pub uname: Option<String>,
    /// Owner group name.
    pub gname: Option<String>,
    /// Device major number.
    pub devmajor: Option<u64>,
    /// Device minor number.
    pub devminor: Option<u64>,
    /// Access time (XSTAR and GNU layouts only).
    pub atime: Option<Timestamp>,
    /// Status change time (XSTAR and GNU layouts only).
    pub ctime: Option<Timestamp>,
    /// Stored checksum.
    pub cksum: Option<u32>,
    /// Whether the stored checksum matched the block.
    pub cksum_valid: bool,
    /// The block was all zeros (end-of-archive marker).
    pub null_block: bool,
    /// Layout the block was decoded from or encoded to.
    pub variant: HeaderVariant,
    /// Result of the last [`Header::encode`]: some field did not fit.
    pub needs_pax: bool,
}

impl Header {
    /// Decodes a header block.
    ///
    /// Fails only when a numeric field cannot be represented (for example a
    /// negative size). A checksum mismatch is reported through
    /// [`Header::cksum_valid`] and left to the caller.
    pub fn decode(block: &[u8]) -> Result<Self> {
        if block.len() < BLOCK_SIZE {
            return Err(Error::InvalidFormat(format!(
                "need {BLOCK_SIZE} bytes for header, got {}",
                block.len()
            )));
        }
        let block = &block[..BLOCK_SIZE];
        if block.iter().all(|&b| b == 0) {
            return Ok(Self {
                null_block: true,
                ..Self::default()
            });
        }

        let mut header = Self {
            path: PATH.read(block),
            mode: read_u32(MODE, block, "mode")?,
            uid: read_u64(UID, block, "uid")?,
            gid: read_u64(GID, block, "gid")?,
            size: read_u64(SIZE, block, "size")?.unwrap_or(0),
            mtime: read_time(MTIME, block)?,
            entry_type: EntryType::from_code(block[TYPEFLAG]),
            linkpath: non_empty(LINKPATH.read(block)),
            variant: HeaderVariant::Basic,
            ..Self::default()
        };
        header.cksum = read_u32(CKSUM, block, "checksum")?;

        let magic = &block[MAGIC];
        let version = &block[VERSION];
        if magic == USTAR_MAGIC {
            header.read_owner_fields(block)?;
            let prefix = if block[XSTAR_TERMINATOR] != 0 {
                header.variant = HeaderVariant::Ustar;
                PREFIX.read(block)
            } else {
                header.atime = read_time(XSTAR_ATIME, block)?;
                header.ctime = read_time(XSTAR_CTIME, block)?;
                header.variant = if header.atime.is_some() || header.ctime.is_some() {
                    HeaderVariant::Xstar
                } else {
                    HeaderVariant::Ustar
                };
                XSTAR_PREFIX.read(block)
            };
            if !prefix.is_empty() {
                header.path = format!("{prefix}/{}", header.path);
            }
        } else if magic == GNU_MAGIC && version == GNU_VERSION {
            header.read_owner_fields(block)?;
            header.atime = read_time(GNU_ATIME, block)?;
            header.ctime = read_time(GNU_CTIME, block)?;
            header.variant = HeaderVariant::Gnu;
        }

        let (unsigned, signed) = checksum(block);
        header.cksum_valid = match header.cksum {
            Some(stored) => stored == unsigned || i64::from(stored) == signed,
            None => false,
        };

        // Old archives mark directories with a trailing slash only.
        if header.entry_type == EntryType::File && header.path.ends_with('/') {
            header.entry_type = EntryType::Directory;
        }
        if header.entry_type == EntryType::Directory {
            header.size = 0;
        }
        Ok(header)
    }

    fn read_owner_fields(&mut self, block: &[u8]) -> Result<()> {
        self.uname = non_empty(UNAME.read(block));
        self.gname = non_empty(GNAME.read(block));
        self.devmajor = read_u64(DEVMAJOR, block, "devmajor")?;
        self.devminor = read_u64(DEVMINOR, block, "devminor")?;
        Ok(())
    }

    /// Encodes the header into the first 512 bytes of `block`.
    ///
    /// Returns `true` if a PAX extended header is needed to represent the
    /// entry faithfully. The checksum is computed and written last.
    pub fn encode(&mut self, block: &mut [u8]) -> Result<bool> {
        if block.len() < BLOCK_SIZE {
            return Err(Error::InvalidState("need 512 bytes for header"));
        }
        let block = &mut block[..BLOCK_SIZE];
        block.fill(0);

        let xstar = self.atime.is_some() || self.ctime.is_some();
        let prefix_size = if xstar {
            XSTAR_PREFIX.width()
        } else {
            PREFIX.width()
        };
        let (name, prefix, mut needs_pax) = split_path(&self.path, prefix_size);

        needs_pax |= PATH.write(name, block);
        needs_pax |= MODE.write_opt(self.mode.map(i64::from), block);
        needs_pax |= UID.write_opt(self.uid.map(saturate), block);
        needs_pax |= GID.write_opt(self.gid.map(saturate), block);
        needs_pax |= SIZE.write(saturate(self.size), block);
        needs_pax |= MTIME.write_opt(self.mtime.map(|t| t.as_unix_secs()), block);
        block[TYPEFLAG] = self.entry_type.code();
        needs_pax |= LINKPATH.write_opt(self.linkpath.as_deref(), block);
        block[MAGIC].copy_from_slice(USTAR_MAGIC);
        block[VERSION].copy_from_slice(USTAR_VERSION);
        needs_pax |= UNAME.write_opt(self.uname.as_deref(), block);
        needs_pax |= GNAME.write_opt(self.gname.as_deref(), block);
        needs_pax |= DEVMAJOR.write_opt(self.devmajor.map(saturate), block);
        needs_pax |= DEVMINOR.write_opt(self.devminor.map(saturate), block);
        if xstar {
            needs_pax |= XSTAR_PREFIX.write(prefix, block);
            needs_pax |= XSTAR_ATIME.write_opt(self.atime.map(|t| t.as_unix_secs()), block);
            needs_pax |= XSTAR_CTIME.write_opt(self.ctime.map(|t| t.as_unix_secs()), block);
            self.variant = HeaderVariant::Xstar;
        } else {
            needs_pax |= PREFIX.write(prefix, block);
            self.variant = HeaderVariant::Ustar;
        }

        let (sum, _) = checksum(block);
        let digits = format!("{sum:06o}\0 ");
        block[CKSUM_RANGE].copy_from_slice(digits.as_bytes());

        self.cksum = Some(sum);
        self.cksum_valid = true;
        self.null_block = false;
        self.needs_pax = needs_pax;
        Ok(needs_pax)
    }

    /// Encodes into a fresh block, returning it with the PAX flag.
    pub fn to_block(&mut self) -> ([u8; BLOCK_SIZE], bool) {
        let mut block = [0u8; BLOCK_SIZE];
        // The block is exactly BLOCK_SIZE long, so encoding cannot fail.
        let needs_pax = self.encode(&mut block).unwrap_or(true);
        (block, needs_pax)
    }
}

const CKSUM_RANGE: std::ops::Range<usize> = 148..156;

/// Computes the unsigned and signed (historical) checksums of a block,
/// treating the checksum field as eight spaces.
pub fn checksum(block: &[u8]) -> (u32, i64) {
    let mut unsigned = BLANK_CHECKSUM;
    let mut signed = i64::from(BLANK_CHECKSUM);
    for (i, &b) in block[..BLOCK_SIZE].iter().enumerate() {
        if CKSUM_RANGE.contains(&i) {
            continue;
        }
        unsigned += u32::from(b);
        signed += i64::from(b as i8);
    }
    (unsigned, signed)
}

/// Splits a long path into a USTAR `(name, prefix)` pair.
///
/// The split happens at a `/` such that the name fits 100 bytes and the
/// prefix fits `prefix_size` bytes. When no such separator exists, the
/// returned name is truncated and the flag reports that PAX is required.
pub fn split_path(path: &str, prefix_size: usize) -> (&str, &str, bool) {
    let name_size = PATH.width();
    if path.len() <= name_size {
        return (path, "", false);
    }
    let bytes = path.as_bytes();
    // Never split at a leading or trailing slash.
    for i in (1..bytes.len() - 1).rev() {
        if bytes[i] != b'/' {
            continue;
        }
        let (prefix, name) = (&path[..i], &path[i + 1..]);
        if prefix.len() > prefix_size {
            continue;
        }
        if name.len() <= name_size {
            return (name, prefix, false);
        }
        return (truncate(name, name_size - 1), prefix, true);
    }
    (truncate(path, name_size - 1), "", true)
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn saturate(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

fn read_u64(field: NumericField, block: &[u8], name: &str) -> Result<Option<u64>> {
    match field.read(block)? {
        Some(v) => u64::try_from(v)
            .map(Some)
            .map_err(|_| Error::InvalidFormat(format!("negative {name} field"))),
        None => Ok(None),
    }
}

fn read_u32(field: NumericField, block: &[u8], name: &str) -> Result<Option<u32>> {
    match read_u64(field, block, name)? {
        Some(v) => u32::try_from(v)
            .map(Some)
            .map_err(|_| Error::InvalidFormat(format!("{name} field out of range"))),
        None => Ok(None),
    }
}

fn read_time(field: NumericField, block: &[u8]) -> Result<Option<Timestamp>> {
    Ok(field.read(block)?.map(Timestamp::from_unix_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> Header {
        Header {
            path: "dir/file.txt".into(),
            mode: Some(0o644),
            uid: Some(1000),
            gid: Some(100),
            size: 1234,
            mtime: Some(Timestamp::from_unix_secs(1_700_000_000)),
            entry_type: EntryType::File,
            uname: Some("alice".into()),
            gname: Some("users".into()),
            ..Header::default()
        }
    }

    #[test]
    fn test_encode_decode() {
        let mut header = sample();
        let (block, needs_pax) = header.to_block();
        assert!(!needs_pax);
        assert_eq!(&block[257..265], b"ustar\x0000");

        let decoded = Header::decode(&block).unwrap();
        assert!(decoded.cksum_valid);
        assert_eq!(decoded.path, "dir/file.txt");
        assert_eq!(decoded.mode, Some(0o644));
        assert_eq!(decoded.size, 1234);
        assert_eq!(decoded.uname.as_deref(), Some("alice"));
        assert_eq!(decoded.variant, HeaderVariant::Ustar);
    }

    #[test]
    fn test_checksum_field_format() {
        let mut header = sample();
        let (block, _) = header.to_block();
        let field = &block[148..156];
        assert!(field[..6].iter().all(u8::is_ascii_digit));
        assert_eq!(&field[6..], b"\0 ");
    }

    #[test]
    fn test_null_block() {
        let decoded = Header::decode(&[0u8; BLOCK_SIZE]).unwrap();
        assert!(decoded.null_block);
        assert!(!decoded.cksum_valid);
    }

    #[test]
    fn test_short_block_rejected() {
        assert!(Header::decode(&[0u8; 100]).is_err());
        let mut header = sample();
        assert!(header.encode(&mut [0u8; 511]).is_err());
    }

    #[test]
    fn test_trailing_slash_file_is_directory() {
        let mut header = Header {
            path: "old/".into(),
            size: 99,
            ..Header::default()
        };
        let (block, _) = header.to_block();
        let decoded = Header::decode(&block).unwrap();
        assert_eq!(decoded.entry_type, EntryType::Directory);
        assert_eq!(decoded.size, 0);
    }

    #[test]
    fn test_xstar_times() {
        let mut header = sample();
        header.atime = Some(Timestamp::from_unix_secs(1_600_000_000));
        header.ctime = Some(Timestamp::from_unix_secs(1_600_000_001));
        let (block, _) = header.to_block();
        assert_eq!(block[XSTAR_TERMINATOR], 0);
        let decoded = Header::decode(&block).unwrap();
        assert_eq!(decoded.variant, HeaderVariant::Xstar);
        assert_eq!(decoded.atime, header.atime);
        assert_eq!(decoded.ctime, header.ctime);
    }

    #[test]
    fn test_gnu_layout() {
        let mut header = sample();
        let (mut block, _) = header.to_block();
        block[MAGIC].copy_from_slice(GNU_MAGIC);
        block[VERSION].copy_from_slice(GNU_VERSION);
        GNU_ATIME.write(1_500_000_000, &mut block);
        let (sum, _) = checksum(&block);
        block[CKSUM_RANGE].copy_from_slice(format!("{sum:06o}\0 ").as_bytes());

        let decoded = Header::decode(&block).unwrap();
        assert_eq!(decoded.variant, HeaderVariant::Gnu);
        assert!(decoded.cksum_valid);
        assert_eq!(decoded.uname.as_deref(), Some("alice"));
        assert_eq!(decoded.atime, Some(Timestamp::from_unix_secs(1_500_000_000)));
    }

    #[test]
    fn test_basic_layout_ignores_owner_names() {
        let mut header = sample();
        let (mut block, _) = header.to_block();
        block[MAGIC].fill(0);
        block[VERSION].fill(0);
        let (sum, _) = checksum(&block);
        block[CKSUM_RANGE].copy_from_slice(format!("{sum:06o}\0 ").as_bytes());
        let decoded = Header::decode(&block).unwrap();
        assert_eq!(decoded.variant, HeaderVariant::Basic);
        assert!(decoded.uname.is_none());
        assert!(decoded.cksum_valid);
    }

    #[test]
    fn test_split_long_path() {
        let path = format!("{}/{}", "a".repeat(120), "b".repeat(90));
        let mut header = Header {
            path: path.clone(),
            ..sample()
        };
        let (block, needs_pax) = header.to_block();
        assert!(!needs_pax);
        assert_eq!(Header::decode(&block).unwrap().path, path);
    }

    #[test]
    fn test_unsplittable_path_needs_pax() {
        let path = "x".repeat(150);
        let (name, prefix, needs_pax) = split_path(&path, 155);
        assert!(needs_pax);
        assert_eq!(name.len(), 99);
        assert!(prefix.is_empty());

        let path = format!("short/{}", "y".repeat(120));
        let (name, prefix, needs_pax) = split_path(&path, 155);
        assert!(needs_pax);
        assert_eq!(prefix, "short");
        assert_eq!(name.len(), 99);
    }

    #[test]
    fn test_exactly_100_bytes_fits() {
        let path = "z".repeat(100);
        assert_eq!(split_path(&path, 155), (path.as_str(), "", false));
    }

    #[test]
    fn test_directory_split_keeps_trailing_slash() {
        let path = format!("{}/{}/", "p".repeat(80), "q".repeat(60));
        let (name, prefix, needs_pax) = split_path(&path, 155);
        assert!(!needs_pax);
        assert_eq!(format!("{prefix}/{name}"), path);
    }

    #[test]
    fn test_non_ascii_needs_pax() {
        let mut header = Header {
            path: "café.txt".into(),
            ..sample()
        };
        let (_, needs_pax) = header.to_block();
        assert!(needs_pax);
    }

    #[test]
    fn test_large_size_needs_pax() {
        let mut header = Header {
            size: 1 << 34,
            ..sample()
        };
        let (block, needs_pax) = header.to_block();
        assert!(needs_pax);
        assert_eq!(block[124], 0x80);
        assert_eq!(Header::decode(&block).unwrap().size, 1 << 34);
    }

    proptest! {
        #[test]
        fn prop_corruption_invalidates_checksum(
            index in (0usize..BLOCK_SIZE).prop_filter("outside checksum", |i| !CKSUM_RANGE.contains(i)),
            delta in 1u8..=255,
        ) {
            let mut header = sample();
            let (mut block, _) = header.to_block();
            block[index] = block[index].wrapping_add(delta);
            // Corruption may make a numeric field undecodable; that is a failure too.
            if let Ok(decoded) = Header::decode(&block) {
                prop_assert!(!decoded.cksum_valid);
            }
        }

        #[test]
        fn prop_split_reconstructs(
            parts in proptest::collection::vec("[a-z]{1,40}", 2..12),
        ) {
            let path = parts.join("/");
            let (name, prefix, needs_pax) = split_path(&path, 155);
            if !needs_pax {
                let rebuilt = if prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{prefix}/{name}")
                };
                prop_assert_eq!(rebuilt, path);
            }
        }
    }
}

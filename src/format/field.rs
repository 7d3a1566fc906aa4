//! Fixed-width header field accessors.
//!
//! Every header field lives at a fixed offset with a fixed width. Numeric
//! fields are octal ASCII when the value fits in `width - 1` digits and
//! base-256 otherwise: a sentinel first byte (`0x80` for positive values,
//! `0xFF` for negative ones) followed by a big-endian two's-complement
//! number. Text fields are NUL-padded UTF-8.
//!
//! Writers return `true` when the value did not fit the field faithfully,
//! which tells the header codec that a PAX extended header is needed.

use crate::{Error, Result};

/// Sentinel byte for positive base-256 numbers.
const BASE256_POSITIVE: u8 = 0x80;

/// Sentinel byte for negative base-256 numbers.
const BASE256_NEGATIVE: u8 = 0xFF;

/// A numeric header field (mode, uid, size, mtime, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericField {
    offset: usize,
    width: usize,
}

impl NumericField {
    /// Creates a field descriptor.
    pub const fn new(offset: usize, width: usize) -> Self {
        Self { offset, width }
    }

    /// Returns the first value that no longer fits as octal ASCII.
    ///
    /// One byte of the field is reserved for the terminator, so an 8-byte
    /// field holds at most 7 octal digits.
    pub const fn octal_capacity(&self) -> i64 {
        1i64 << (3 * (self.width as u32 - 1))
    }

    fn bytes<'a>(&self, block: &'a [u8]) -> &'a [u8] {
        &block[self.offset..self.offset + self.width]
    }

    /// Decodes the field.
    ///
    /// Returns `Ok(None)` for an empty (all NUL / space) field. Octal parsing
    /// stops at the first character that is not an octal digit.
    pub fn read(&self, block: &[u8]) -> Result<Option<i64>> {
        let bytes = self.bytes(block);
        if bytes[0] & 0x80 != 0 {
            return decode_base256(bytes).map(Some);
        }
        let digits = bytes
            .iter()
            .skip_while(|&&b| b == b' ')
            .take_while(|&&b| (b'0'..=b'7').contains(&b));
        let mut value: i64 = 0;
        let mut any = false;
        for &b in digits {
            any = true;
            value = value
                .checked_mul(8)
                .and_then(|v| v.checked_add(i64::from(b - b'0')))
                .ok_or_else(|| Error::InvalidFormat("octal field overflows i64".into()))?;
        }
        Ok(any.then_some(value))
    }

    /// Encodes `value` into the field, returning `true` if base-256 was needed.
    ///
    /// Octal values shorter than the field are zero-padded and followed by a
    /// space and a NUL; a value using all `width - 1` digits is followed by a
    /// NUL only.
    pub fn write(&self, value: i64, block: &mut [u8]) -> bool {
        let field = &mut block[self.offset..self.offset + self.width];
        if value < 0 || value >= self.octal_capacity() {
            encode_base256(value, field);
            return true;
        }
        let digits = format!("{value:o}");
        field.fill(0);
        if digits.len() == self.width - 1 {
            field[..digits.len()].copy_from_slice(digits.as_bytes());
        } else {
            let padded = format!("{value:0w$o} ", w = self.width - 2);
            field[..padded.len()].copy_from_slice(padded.as_bytes());
        }
        false
    }

    /// Encodes an optional value; `None` leaves an all-NUL field.
    pub fn write_opt(&self, value: Option<i64>, block: &mut [u8]) -> bool {
        match value {
            Some(v) => self.write(v, block),
            None => {
                block[self.offset..self.offset + self.width].fill(0);
                false
            }
        }
    }
}

fn decode_base256(bytes: &[u8]) -> Result<i64> {
    if bytes[0] == BASE256_NEGATIVE {
        // Two's complement over the whole field: start from all ones.
        let mut value: i128 = -1;
        for &b in &bytes[1..] {
            value = value
                .checked_mul(256)
                .map(|v| v | i128::from(b))
                .ok_or_else(|| Error::InvalidFormat("base-256 field overflows".into()))?;
        }
        return i64::try_from(value)
            .map_err(|_| Error::InvalidFormat("base-256 field overflows i64".into()));
    }
    let mut value: u128 = u128::from(bytes[0] & 0x7F);
    for &b in &bytes[1..] {
        value = value
            .checked_mul(256)
            .map(|v| v | u128::from(b))
            .ok_or_else(|| Error::InvalidFormat("base-256 field overflows".into()))?;
    }
    i64::try_from(value).map_err(|_| Error::InvalidFormat("base-256 field overflows i64".into()))
}

fn encode_base256(value: i64, field: &mut [u8]) {
    let (sentinel, fill) = if value < 0 {
        (BASE256_NEGATIVE, 0xFF)
    } else {
        (BASE256_POSITIVE, 0x00)
    };
    field.fill(fill);
    field[0] = sentinel;
    let be = value.to_be_bytes();
    let n = be.len().min(field.len() - 1);
    let start = field.len() - n;
    field[start..].copy_from_slice(&be[be.len() - n..]);
}

/// A NUL-padded text header field (path, linkpath, uname, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextField {
    offset: usize,
    width: usize,
}

impl TextField {
    /// Creates a field descriptor.
    pub const fn new(offset: usize, width: usize) -> Self {
        Self { offset, width }
    }

    /// Returns the field width in bytes.
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Decodes the field up to the first NUL, replacing invalid UTF-8.
    pub fn read(&self, block: &[u8]) -> String {
        let bytes = &block[self.offset..self.offset + self.width];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }

    /// Encodes `value`, truncating at a character boundary if needed.
    ///
    /// Returns `true` if the value is longer than the field or is not ASCII.
    pub fn write(&self, value: &str, block: &mut [u8]) -> bool {
        let field = &mut block[self.offset..self.offset + self.width];
        field.fill(0);
        let mut end = value.len().min(self.width);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        field[..end].copy_from_slice(&value.as_bytes()[..end]);
        !value.is_ascii() || value.len() > self.width
    }

    /// Encodes an optional value; `None` leaves an all-NUL field.
    pub fn write_opt(&self, value: Option<&str>, block: &mut [u8]) -> bool {
        self.write(value.unwrap_or(""), block)
    }
}

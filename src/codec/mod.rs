//! Compression transforms for compressed tarballs.
//!
//! The parser and the packer drive codecs as push-style byte transforms:
//! bytes go in through [`Transform::write`], whatever output is ready comes
//! back, and [`Transform::finish`] flushes the tail. Gzip and zstd streams are
//! recognised by their magic bytes; brotli has no magic and is selected by a
//! hint (see [`Decompression::MaybeBrotli`]).

#[cfg(feature = "gzip")]
pub mod gzip;

#[cfg(feature = "zstd")]
pub mod zstd;

#[cfg(feature = "brotli")]
pub mod brotli;

use std::io;

use crate::{Error, Result};

/// Gzip member magic.
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Zstandard frame magic.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// A push-style byte transform.
pub trait Transform: Send {
    /// Feeds `input`, returning any output produced so far.
    fn write(&mut self, input: &[u8]) -> io::Result<Vec<u8>>;

    /// Signals end of input, returning the remaining output.
    fn finish(&mut self) -> io::Result<Vec<u8>>;
}

/// Codec of a compressed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// RFC 1952 gzip.
    Gzip,
    /// Brotli.
    Brotli,
    /// Zstandard.
    Zstd,
}

impl Codec {
    /// Returns the codec name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Brotli => "brotli",
            Self::Zstd => "zstd",
        }
    }
}

/// How the parser decides whether its input is compressed.
///
/// Brotli streams carry no magic number. With [`MaybeBrotli`] the parser
/// waits for 512 bytes and treats the input as a plain archive if they form
/// a header with a valid checksum (or a zero block), and as brotli
/// otherwise. A stream shorter than 512 bytes is assumed to be brotli. This
/// is a best-effort heuristic: a brotli stream whose first block happens to
/// look like a valid tar header is misdetected.
///
/// [`MaybeBrotli`]: Decompression::MaybeBrotli
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decompression {
    /// Detect gzip and zstd by magic bytes, otherwise read plain tar.
    #[default]
    Auto,
    /// Like `Auto`, and fall back to brotli if the input is not tar.
    MaybeBrotli,
    /// Always decode as gzip.
    Gzip,
    /// Always decode as brotli.
    Brotli,
    /// Always decode as zstd.
    Zstd,
    /// Never decompress.
    None,
}

impl Decompression {
    /// Picks a hint from an archive file name.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Self {
        let name = path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tbr") || name.ends_with(".tar.br") {
            Self::MaybeBrotli
        } else if name.ends_with(".tzst") || name.ends_with(".tar.zst") {
            Self::Zstd
        } else {
            Self::Auto
        }
    }
}

/// Compression applied to packed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Plain tar.
    #[default]
    None,
    /// Gzip with the given level (0-9).
    Gzip(u32),
    /// Brotli with the given quality (0-11).
    Brotli(u32),
    /// Zstandard with the given level (1-22).
    Zstd(i32),
}

/// Result of sniffing the start of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniff {
    /// The stream starts with a codec's magic.
    Compressed(Codec),
    /// The stream cannot start with a known magic.
    Plain,
    /// More bytes are needed to decide.
    NeedMore,
}

/// Looks for gzip and zstd magic at the start of `head`.
///
/// With `ended` set, a short prefix is decided as plain instead of waiting.
pub fn sniff(head: &[u8], ended: bool) -> Sniff {
    if matches_prefix(head, &GZIP_MAGIC) {
        if head.len() >= GZIP_MAGIC.len() {
            return Sniff::Compressed(Codec::Gzip);
        }
    } else if matches_prefix(head, &ZSTD_MAGIC) {
        if head.len() >= ZSTD_MAGIC.len() {
            return Sniff::Compressed(Codec::Zstd);
        }
    } else {
        return Sniff::Plain;
    }
    if ended { Sniff::Plain } else { Sniff::NeedMore }
}

fn matches_prefix(head: &[u8], magic: &[u8]) -> bool {
    let n = head.len().min(magic.len());
    head[..n] == magic[..n]
}

/// Creates a decoder for `codec`.
pub fn decoder(codec: Codec) -> Result<Box<dyn Transform>> {
    match codec {
        #[cfg(feature = "gzip")]
        Codec::Gzip => Ok(Box::new(gzip::GzipDecoder::new())),
        #[cfg(feature = "brotli")]
        Codec::Brotli => Ok(Box::new(brotli::BrotliDecoder::new())),
        #[cfg(feature = "zstd")]
        Codec::Zstd => Ok(Box::new(zstd::ZstdDecoder::new()?)),
        #[allow(unreachable_patterns)]
        other => Err(Error::UnsupportedFeature {
            feature: other.name(),
        }),
    }
}

/// Creates an encoder for `compression`, or `None` for plain output.
pub fn encoder(compression: Compression) -> Result<Option<Box<dyn Transform>>> {
    match compression {
        Compression::None => Ok(None),
        #[cfg(feature = "gzip")]
        Compression::Gzip(level) => Ok(Some(Box::new(gzip::GzipEncoder::new(level)))),
        #[cfg(feature = "brotli")]
        Compression::Brotli(quality) => Ok(Some(Box::new(brotli::BrotliEncoder::new(quality)))),
        #[cfg(feature = "zstd")]
        Compression::Zstd(level) => Ok(Some(Box::new(zstd::ZstdEncoder::new(level)?))),
        #[allow(unreachable_patterns)]
        other => Err(Error::UnsupportedFeature {
            feature: match other {
                Compression::Gzip(_) => "gzip",
                Compression::Brotli(_) => "brotli",
                _ => "zstd",
            },
        }),
    }
}

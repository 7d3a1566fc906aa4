//! Gzip codec implementation.

use std::io::{self, Write};

use flate2::Compression;
use flate2::write::{GzEncoder, MultiGzDecoder};

use super::Transform;

/// Push-style gzip decoder accepting concatenated members.
pub struct GzipDecoder {
    inner: Option<MultiGzDecoder<Vec<u8>>>,
}

impl std::fmt::Debug for GzipDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipDecoder").finish_non_exhaustive()
    }
}

impl GzipDecoder {
    /// Creates a new gzip decoder.
    pub fn new() -> Self {
        Self {
            inner: Some(MultiGzDecoder::new(Vec::new())),
        }
    }
}

impl Default for GzipDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for GzipDecoder {
    fn write(&mut self, input: &[u8]) -> io::Result<Vec<u8>> {
        let inner = self.inner.as_mut().ok_or_else(finished)?;
        inner.write_all(input)?;
        Ok(std::mem::take(inner.get_mut()))
    }

    fn finish(&mut self) -> io::Result<Vec<u8>> {
        match self.inner.take() {
            Some(inner) => inner.finish(),
            None => Ok(Vec::new()),
        }
    }
}

/// Push-style gzip encoder.
pub struct GzipEncoder {
    inner: Option<GzEncoder<Vec<u8>>>,
}

impl std::fmt::Debug for GzipEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipEncoder").finish_non_exhaustive()
    }
}

impl GzipEncoder {
    /// Creates a new gzip encoder.
    ///
    /// # Arguments
    ///
    /// * `level` - Compression level (0-9, clamped)
    pub fn new(level: u32) -> Self {
        Self {
            inner: Some(GzEncoder::new(Vec::new(), Compression::new(level.min(9)))),
        }
    }
}

impl Transform for GzipEncoder {
    fn write(&mut self, input: &[u8]) -> io::Result<Vec<u8>> {
        let inner = self.inner.as_mut().ok_or_else(finished)?;
        inner.write_all(input)?;
        Ok(std::mem::take(inner.get_mut()))
    }

    fn finish(&mut self) -> io::Result<Vec<u8>> {
        match self.inner.take() {
            Some(inner) => inner.finish(),
            None => Ok(Vec::new()),
        }
    }
}

fn finished() -> io::Error {
    io::Error::other("gzip stream already finished")
}

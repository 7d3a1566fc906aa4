//! Brotli codec implementation.

use std::io::{self, Write};

use brotli::{CompressorWriter, DecompressorWriter};

use super::Transform;

/// Internal buffer size for the brotli writers.
const BUFFER_SIZE: usize = 4096;

/// Window size (log2) used when compressing.
const LG_WINDOW_SIZE: u32 = 22;

/// Push-style brotli decoder.
pub struct BrotliDecoder {
    inner: Option<DecompressorWriter<Vec<u8>>>,
}

impl std::fmt::Debug for BrotliDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrotliDecoder").finish_non_exhaustive()
    }
}

impl BrotliDecoder {
    /// Creates a new brotli decoder.
    pub fn new() -> Self {
        Self {
            inner: Some(DecompressorWriter::new(Vec::new(), BUFFER_SIZE)),
        }
    }
}

impl Default for BrotliDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for BrotliDecoder {
    fn write(&mut self, input: &[u8]) -> io::Result<Vec<u8>> {
        let inner = self.inner.as_mut().ok_or_else(finished)?;
        inner.write_all(input)?;
        Ok(std::mem::take(inner.get_mut()))
    }

    fn finish(&mut self) -> io::Result<Vec<u8>> {
        match self.inner.take() {
            Some(inner) => inner.into_inner().map_err(|_| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "incomplete brotli stream")
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// Push-style brotli encoder.
pub struct BrotliEncoder {
    inner: Option<CompressorWriter<Vec<u8>>>,
}

impl std::fmt::Debug for BrotliEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrotliEncoder").finish_non_exhaustive()
    }
}

impl BrotliEncoder {
    /// Creates a new brotli encoder.
    ///
    /// # Arguments
    ///
    /// * `quality` - Compression quality (0-11, clamped)
    pub fn new(quality: u32) -> Self {
        Self {
            inner: Some(CompressorWriter::new(
                Vec::new(),
                BUFFER_SIZE,
                quality.min(11),
                LG_WINDOW_SIZE,
            )),
        }
    }
}

impl Transform for BrotliEncoder {
    fn write(&mut self, input: &[u8]) -> io::Result<Vec<u8>> {
        let inner = self.inner.as_mut().ok_or_else(finished)?;
        inner.write_all(input)?;
        Ok(std::mem::take(inner.get_mut()))
    }

    fn finish(&mut self) -> io::Result<Vec<u8>> {
        Ok(self.inner.take().map(CompressorWriter::into_inner).unwrap_or_default())
    }
}

fn finished() -> io::Error {
    io::Error::other("brotli stream already finished")
}

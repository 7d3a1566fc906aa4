//! Zstandard (ZSTD) codec implementation.

use std::io::{self, Write};

use zstd::stream::write::{Decoder as ZstdWriteDecoder, Encoder as ZstdWriteEncoder};

use super::Transform;

/// Push-style zstd decoder.
pub struct ZstdDecoder {
    inner: Option<ZstdWriteDecoder<'static, Vec<u8>>>,
}

impl std::fmt::Debug for ZstdDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZstdDecoder").finish_non_exhaustive()
    }
}

impl ZstdDecoder {
    /// Creates a new zstd decoder.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            inner: Some(ZstdWriteDecoder::new(Vec::new())?),
        })
    }
}

impl Transform for ZstdDecoder {
    fn write(&mut self, input: &[u8]) -> io::Result<Vec<u8>> {
        let inner = self.inner.as_mut().ok_or_else(finished)?;
        inner.write_all(input)?;
        Ok(std::mem::take(inner.get_mut()))
    }

    fn finish(&mut self) -> io::Result<Vec<u8>> {
        match self.inner.take() {
            Some(mut inner) => {
                inner.flush()?;
                Ok(inner.into_inner())
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Push-style zstd encoder.
pub struct ZstdEncoder {
    inner: Option<ZstdWriteEncoder<'static, Vec<u8>>>,
}

impl std::fmt::Debug for ZstdEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZstdEncoder").finish_non_exhaustive()
    }
}

impl ZstdEncoder {
    /// Creates a new zstd encoder.
    ///
    /// # Arguments
    ///
    /// * `level` - Compression level (1-22)
    pub fn new(level: i32) -> io::Result<Self> {
        Ok(Self {
            inner: Some(ZstdWriteEncoder::new(Vec::new(), level)?),
        })
    }
}

impl Transform for ZstdEncoder {
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
    io::Error::other("zstd stream already finished")
}

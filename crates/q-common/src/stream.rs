// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Byte stream abstractions
//!
//! The delta and boot crates consume and produce raw byte streams (old
//! image, patch, new image) through these traits instead of filesystem
//! paths, so the same code runs against flash, RAM buffers, or host files.

use crate::errors::{Error, Result};

/// A readable byte stream
pub trait ByteSource {
    /// Read up to `buf.len()` bytes, returning the number of bytes read
    ///
    /// Returns `Ok(0)` only at end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Read exactly `buf.len()` bytes or fail with `UnexpectedEof`
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(Error::UnexpectedEof);
            }
            filled += n;
        }
        Ok(())
    }
}

/// A readable byte stream with random access
pub trait SeekSource: ByteSource {
    /// Position the stream at an absolute byte offset
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// Total length of the stream in bytes
    fn stream_len(&mut self) -> Result<u64>;
}

/// A writable byte stream
pub trait ByteSink {
    /// Write the entire buffer or fail
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;
}

// =============================================================================
// Slice-backed implementations
// =============================================================================

/// Read-only source over a byte slice
#[derive(Debug)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    /// Wrap a slice as a seekable source
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current read position
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }
}

impl ByteSource for SliceSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = &self.data[self.pos..];
        let n = buf.len().min(remaining.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl SeekSource for SliceSource<'_> {
    fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.data.len() as u64 {
            return Err(Error::UnexpectedEof);
        }
        self.pos = pos as usize;
        Ok(())
    }

    fn stream_len(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}

/// Sink writing into a fixed mutable slice
#[derive(Debug)]
pub struct SliceSink<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> SliceSink<'a> {
    /// Wrap a mutable slice as a sink
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes written so far
    #[must_use]
    pub const fn written(&self) -> usize {
        self.pos
    }

    /// The written prefix of the underlying buffer
    #[must_use]
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
}

impl ByteSink for SliceSink<'_> {
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let end = self
            .pos
            .checked_add(buf.len())
            .ok_or(Error::BufferTooSmall)?;
        if end > self.buf.len() {
            return Err(Error::BufferTooSmall);
        }
        self.buf[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(())
    }
}

/// Sink that discards data and only counts the bytes it would have written
///
/// Used by the patch generator to size the operation stream before the
/// header is written.
#[derive(Debug, Default)]
pub struct CountingSink {
    count: u64,
}

impl CountingSink {
    /// Create a sink with a zeroed counter
    #[must_use]
    pub const fn new() -> Self {
        Self { count: 0 }
    }

    /// Bytes counted so far
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }
}

impl ByteSink for CountingSink {
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.count += buf.len() as u64;
        Ok(())
    }
}

#[cfg(feature = "std")]
impl ByteSink for std::vec::Vec<u8> {
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.extend_from_slice(buf);
        Ok(())
    }
}

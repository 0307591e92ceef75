//! Byte sources consumed by the container prober.
//!
//! A [`ByteSource`] is anything that can be read and (maybe) seeked, and can
//! tell how long it is. Files, in-memory buffers and forward-only streams are
//! provided here. The prober wraps whichever source it gets in a
//! [`BufferedSource`] before handing it to the demuxer.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};

use symphonia::core::io::MediaSource;

/// Default I/O block size when the source has no natural chunk size.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// A readable, possibly seekable, byte stream.
pub trait ByteSource: Read + Seek + Send + Sync {
    /// Total length in bytes, or `None` if unknown.
    fn byte_len(&self) -> Option<u64>;

    /// Whether `seek` is supported.
    fn is_seekable(&self) -> bool;

    /// Natural read size of the underlying medium. Values <= 1 mean "none".
    fn chunk_size(&self) -> usize {
        0
    }
}

impl ByteSource for File {
    fn byte_len(&self) -> Option<u64> {
        self.metadata().ok().map(|m| m.len())
    }

    fn is_seekable(&self) -> bool {
        self.metadata().map(|m| m.is_file()).unwrap_or(false)
    }
}

/// An in-memory source.
#[derive(Debug, Clone)]
pub struct MemorySource {
    inner: Cursor<Vec<u8>>,
    chunk_size: usize,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            inner: Cursor::new(data),
            chunk_size: 0,
        }
    }

    /// Report `chunk_size` as the natural read size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

impl Read for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for MemorySource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl ByteSource for MemorySource {
    fn byte_len(&self) -> Option<u64> {
        Some(self.inner.get_ref().len() as u64)
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// A forward-only stream of unknown length, e.g. a pipe or network body.
///
/// Only position queries (`SeekFrom::Current(0)`) succeed.
pub struct ForwardOnly<R> {
    inner: R,
    position: u64,
}

impl<R: Read + Send + Sync> ForwardOnly<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }
}

impl<R: Read> Read for ForwardOnly<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R> Seek for ForwardOnly<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.position),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "source does not support seeking",
            )),
        }
    }
}

impl<R: Read + Send + Sync> ByteSource for ForwardOnly<R> {
    fn byte_len(&self) -> Option<u64> {
        None
    }

    fn is_seekable(&self) -> bool {
        false
    }
}

/// Buffered adapter between a [`ByteSource`] and the demuxer.
///
/// Reads in blocks of the source's natural chunk size when it reports one
/// (> 1), otherwise in blocks of the configured default. A source of unknown
/// length is treated as non-seekable.
pub struct BufferedSource {
    inner: BufReader<Box<dyn ByteSource>>,
    block_size: usize,
    seekable: bool,
    byte_len: Option<u64>,
}

impl BufferedSource {
    pub fn new(source: Box<dyn ByteSource>, default_block_size: usize) -> Self {
        let chunk = source.chunk_size();
        let block_size = if chunk > 1 {
            chunk
        } else {
            default_block_size.max(1)
        };
        let byte_len = source.byte_len();
        let seekable = source.is_seekable() && byte_len.is_some();

        Self {
            inner: BufReader::with_capacity(block_size, source),
            block_size,
            seekable,
            byte_len,
        }
    }

    /// Block size actually used for reads.
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

impl Read for BufferedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for BufferedSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if pos == SeekFrom::Current(0) {
            return self.inner.stream_position();
        }
        if !self.seekable {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "source does not support seeking",
            ));
        }
        self.inner.seek(pos)
    }
}

impl MediaSource for BufferedSource {
    fn is_seekable(&self) -> bool {
        self.seekable
    }

    fn byte_len(&self) -> Option<u64> {
        self.byte_len
    }
}

//! A BGZF writer implementation.
use std::{
    fs::File,
    io::{self, Write},
    path::Path,
};

use crate::block::WriteBlock;
use crate::error::BgzfError;
use crate::framing;
use crate::virtual_offset::VirtualOffset;
use crate::{CompressionLevel, BGZF_SAFE_BLOCK_SIZE};

/// A BGZF writer.
///
/// Bytes passed to [`Write::write`] are staged into an uncompressed block buffer and flushed as
/// a complete BGZF block once that buffer reaches [`bgzf_codec::BGZF_SAFE_BLOCK_SIZE`]. Dropping
/// a `Writer` without calling [`Writer::close`] makes a best-effort attempt to flush and
/// terminate the stream, but I/O errors at that point are unobservable - call `close` explicitly
/// to be sure the trailing EOF marker was written.
///
/// # Example
///
/// ```rust
/// use bgzf_codec::{CompressionLevel, Writer};
/// use std::error::Error;
/// use std::io::Write;
///
/// fn main() -> Result<(), Box<dyn Error>> {
///     let mut destination = vec![];
///     let mut writer = Writer::new(&mut destination, CompressionLevel::new(2)?);
///     let input = &[b'A'; 100];
///     writer.write_all(input)?;
///     writer.close()?;
///
///     assert!(destination.len() < input.len());
///     Ok(())
/// }
/// ```
pub struct Writer<W>
where
    W: Write,
{
    block: WriteBlock,
    /// Uncompressed-payload threshold at which a block is flushed. Always `<= BGZF_SAFE_BLOCK_SIZE`.
    capacity: usize,
    xfl_hint: u8,
    file_offset: u64,
    closed: bool,
    writer: W,
}

impl<W> Writer<W>
where
    W: Write,
{
    /// Create a new [`Writer`] at the default block capacity.
    pub fn new(writer: W, compression_level: CompressionLevel) -> Self {
        Self::with_capacity(writer, compression_level, BGZF_SAFE_BLOCK_SIZE)
    }

    /// Create a writer that flushes a block once its staged uncompressed payload reaches
    /// `capacity` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`bgzf_codec::BGZF_SAFE_BLOCK_SIZE`]: a larger buffer risks
    /// producing a compressed block over the 64 KiB on-disk limit.
    pub fn with_capacity(writer: W, compression_level: CompressionLevel, capacity: usize) -> Self {
        Self::with_capacity_at(writer, compression_level, capacity, 0)
    }

    /// Like [`Writer::with_capacity`], but starts virtual-offset bookkeeping at `initial_offset`
    /// rather than zero. Used when resuming a stream whose underlying writer is already
    /// positioned partway through a file, e.g. append mode.
    pub(crate) fn with_capacity_at(
        writer: W,
        compression_level: CompressionLevel,
        capacity: usize,
        initial_offset: u64,
    ) -> Self {
        assert!(capacity <= BGZF_SAFE_BLOCK_SIZE, "capacity must not exceed BGZF_SAFE_BLOCK_SIZE");
        assert!(capacity > 0, "capacity must be nonzero");
        let xfl_hint = compression_level.xfl_hint();
        let mut block = WriteBlock::new(compression_level);
        block.reset(initial_offset);
        Self { block, capacity, xfl_hint, file_offset: initial_offset, closed: false, writer }
    }

    /// The current virtual offset: the start of the block currently being staged, plus however
    /// many bytes have been written into it so far.
    #[must_use]
    pub fn virtual_position(&self) -> VirtualOffset {
        VirtualOffset::new(self.block.voffset().file_offset(), self.block.len() as u16)
            .expect("staged block length always fits in 16 bits")
    }

    /// Whether `close` has already been called on this writer.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Write a single byte.
    pub fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.write_all(&[byte])
    }

    /// Flush any staged payload as a full block, then write the canonical BGZF EOF marker and
    /// flush the underlying writer.
    ///
    /// Not idempotent: a second call returns [`BgzfError::StreamClosed`]. [`Drop`] only invokes
    /// this finalization if `close` was never called explicitly.
    pub fn close(&mut self) -> io::Result<()> {
        self.check_open().map_err(io::Error::from)?;
        self.flush_block()?;
        self.writer.write_all(&framing::BGZF_EOF)?;
        self.writer.flush()?;
        self.closed = true;
        Ok(())
    }

    fn check_open(&self) -> Result<(), BgzfError> {
        if self.closed {
            return Err(BgzfError::StreamClosed);
        }
        Ok(())
    }

    /// Deflate and emit the currently-staged block, if it holds any bytes, and advance
    /// `file_offset`/the block's virtual offset to the next block's start.
    fn flush_block(&mut self) -> io::Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }
        let compressed = self.block.deflate(self.xfl_hint).map_err(io::Error::from)?;
        self.writer.write_all(compressed)?;
        self.file_offset += compressed.len() as u64;
        self.block.reset(self.file_offset);
        Ok(())
    }
}

impl Writer<File> {
    /// Create a BGZF writer from a [`Path`], truncating any existing file.
    pub fn from_path<P>(path: P, compression_level: CompressionLevel) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        File::create(path).map(|f| Self::new(f, compression_level))
    }
}

impl<W> Write for Writer<W>
where
    W: Write,
{
    /// Stage `buf` into the current block, flushing complete blocks as the staging buffer fills.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_open().map_err(io::Error::from)?;

        let mut written = 0;
        while written < buf.len() {
            let remaining = self.capacity - self.block.len();
            let take = usize::min(buf.len() - written, remaining);
            self.block.extend(&buf[written..written + take]);
            written += take;
            if self.block.len() >= self.capacity {
                self.flush_block()?;
            }
        }
        Ok(written)
    }

    /// Flush the underlying writer. Does not force a new BGZF block: bytes staged in the
    /// current block remain buffered until enough data arrives to fill it, or until [`Writer::close`]
    /// is called.
    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl<W> Drop for Writer<W>
where
    W: Write,
{
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

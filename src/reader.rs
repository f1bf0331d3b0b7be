//! A Reader for BGZF compressed data.
use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::Path,
};

use crate::block::{self, ReadBlock};
use crate::error::BgzfError;
use crate::virtual_offset::VirtualOffset;

/// A BGZF reader.
///
/// Blocks are decoded in batches of up to `worker_count` at a time: each batch is read off the
/// wire sequentially (there is only one underlying stream), then inflated in parallel, one
/// thread per block, before any of its bytes are handed back through [`Read::read`]. See
/// [`Reader::with_worker_count`] to control the batch size; [`Reader::new`] picks one based on
/// the available parallelism.
///
/// # Example
///
/// ```rust
/// use bgzf_codec::{CompressionLevel, Reader, Writer};
/// use std::error::Error;
/// use std::io::{Read, Write};
///
/// fn main() -> Result<(), Box<dyn Error>> {
///     let mut compressed = vec![];
///     let mut writer = Writer::new(&mut compressed, CompressionLevel::new(2)?);
///     writer.write_all(&[b'A'; 100])?;
///     writer.close()?;
///
///     let mut reader = Reader::new(compressed.as_slice());
///     let mut decompressed = vec![];
///     reader.read_to_end(&mut decompressed)?;
///     assert_eq!(decompressed, vec![b'A'; 100]);
///     Ok(())
/// }
/// ```
pub struct Reader<R>
where
    R: Read,
{
    blocks: Vec<ReadBlock>,
    /// Number of entries at the front of `blocks` that hold data from the most recent batch.
    filled: usize,
    /// Index into `blocks[..filled]` of the block currently being consumed.
    cursor: usize,
    /// File offset at which the next, not-yet-read batch should begin.
    next_file_offset: u64,
    /// Whether the canonical EOF marker block has already been read.
    saw_eof_marker: bool,
    closed: bool,
    reader: R,
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(1)
}

impl<R> Reader<R>
where
    R: Read,
{
    /// Create a reader using a worker count derived from the available parallelism.
    pub fn new(reader: R) -> Self {
        Self::with_worker_count(reader, default_worker_count())
    }

    /// Create a reader that inflates up to `worker_count` blocks in parallel per batch.
    /// `worker_count` is clamped to a minimum of 1.
    pub fn with_worker_count(reader: R, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        Self {
            blocks: (0..worker_count).map(|_| ReadBlock::new()).collect(),
            filled: 0,
            cursor: 0,
            next_file_offset: 0,
            saw_eof_marker: false,
            closed: false,
            reader,
        }
    }

    /// Whether `close` has already been called on this reader.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Mark this reader closed. There is no underlying resource to flush on the read side; this
    /// exists so read and write streams share the same open/closed lifecycle.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Read a single byte, failing with `UnexpectedEof` at a clean end of stream.
    pub fn read_byte(&mut self) -> io::Result<u8> {
        let mut byte = [0u8];
        let n = self.read(&mut byte)?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "end of BGZF stream"));
        }
        Ok(byte[0])
    }

    /// Whether the stream has been fully consumed (no further bytes remain to be read).
    pub fn eof(&mut self) -> io::Result<bool> {
        self.check_open().map_err(io::Error::from)?;
        Ok(!self.ensure_current_block().map_err(io::Error::from)?)
    }

    /// The virtual offset of the next byte this reader will return.
    #[must_use]
    pub fn virtual_position(&self) -> VirtualOffset {
        if self.cursor < self.filled {
            self.blocks[self.cursor].voffset()
        } else {
            VirtualOffset::new(self.next_file_offset, 0).expect("block offset 0 always fits")
        }
    }

    fn check_open(&self) -> Result<(), BgzfError> {
        if self.closed {
            return Err(BgzfError::StreamClosed);
        }
        Ok(())
    }

    /// Advance past any already-exhausted blocks, refilling the batch if needed. Returns `true`
    /// if a non-exhausted block is now available to read from, `false` at a clean end of stream.
    fn ensure_current_block(&mut self) -> Result<bool, BgzfError> {
        loop {
            while self.cursor < self.filled && self.blocks[self.cursor].is_exhausted() {
                self.cursor += 1;
            }
            if self.cursor < self.filled {
                return Ok(true);
            }
            if self.saw_eof_marker {
                return Ok(false);
            }
            self.refill_batch()?;
            if self.filled == 0 {
                return Ok(false);
            }
        }
    }

    /// Read and inflate the next batch of up to `blocks.len()` blocks, stopping early if the
    /// EOF marker block is encountered. Reading is inherently sequential (one underlying
    /// stream); inflating each block's independent DEFLATE payload is not, so that part runs on
    /// a scoped thread per block.
    fn refill_batch(&mut self) -> Result<(), BgzfError> {
        let worker_count = self.blocks.len();
        let mut filled = 0;
        for i in 0..worker_count {
            self.blocks[i].reset_for_fill(self.next_file_offset);
            let has_block = block::load_block(&mut self.reader, &mut self.blocks[i])?;
            if !has_block {
                if filled == 0 {
                    return Err(BgzfError::Truncated);
                }
                break;
            }
            self.next_file_offset += self.blocks[i].raw_len() as u64;
            filled += 1;
            if self.blocks[i].is_eof_marker() {
                self.saw_eof_marker = true;
                break;
            }
        }

        let to_inflate = &mut self.blocks[..filled];
        let mut results = Vec::with_capacity(filled);
        std::thread::scope(|scope| {
            let handles: Vec<_> = to_inflate.iter_mut().map(|b| scope.spawn(|| b.inflate())).collect();
            for handle in handles {
                results.push(handle.join().expect("block inflate thread panicked"));
            }
        });
        for result in results {
            result?;
        }

        self.filled = filled;
        self.cursor = 0;
        Ok(())
    }
}

impl Reader<File> {
    /// Create a BGZF reader from a [`Path`].
    pub fn from_path<P>(path: P) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        File::open(path).map(Self::new)
    }
}

impl<R> Reader<R>
where
    R: Read + Seek,
{
    /// Seek directly to a byte within a specific block, as addressed by `target`.
    ///
    /// Discards any buffered batch and loads only the one targeted block, synchronously.
    /// Returns `target` back on success, mirroring `std::io::Seek::seek`'s convention of
    /// returning the position actually landed on.
    pub fn seek(&mut self, target: VirtualOffset) -> io::Result<VirtualOffset> {
        self.check_open().map_err(io::Error::from)?;
        self.reader.seek(SeekFrom::Start(target.file_offset()))?;

        self.blocks[0].reset_for_fill(target.file_offset());
        let has_block = block::load_block(&mut self.reader, &mut self.blocks[0]).map_err(io::Error::from)?;
        if !has_block {
            return Err(io::Error::from(BgzfError::InvalidSeek("no block at target file offset")));
        }
        self.blocks[0].inflate().map_err(io::Error::from)?;

        if usize::from(target.block_offset()) > self.blocks[0].size() {
            return Err(io::Error::from(BgzfError::InvalidInBlockOffset {
                offset: u64::from(target.block_offset()),
                size: self.blocks[0].size(),
            }));
        }

        self.next_file_offset = target.file_offset() + self.blocks[0].raw_len() as u64;
        self.saw_eof_marker = self.blocks[0].is_eof_marker();
        self.blocks[0].set_voffset(target);
        self.filled = 1;
        self.cursor = 0;
        Ok(target)
    }
}

impl<R> Read for Reader<R>
where
    R: Read,
{
    /// Attempt to read `buf.len()` bytes from source into `buf`.
    ///
    /// - `Ok(0)` means that EOF has been reached or `buf.len() == 0`.
    /// - `Ok(n) where n < buf.len()` means that EOF has been reached.
    /// - `Err(..)` means that an error has occurred.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_open().map_err(io::Error::from)?;

        let mut copied = 0;
        while copied < buf.len() {
            if !self.ensure_current_block().map_err(io::Error::from)? {
                break;
            }
            let block = &mut self.blocks[self.cursor];
            let available = block.remaining();
            let take = usize::min(available.len(), buf.len() - copied);
            buf[copied..copied + take].copy_from_slice(&available[..take]);
            block.consume(take as u16);
            copied += take;
        }
        Ok(copied)
    }
}

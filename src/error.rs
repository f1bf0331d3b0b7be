//! The error type shared by the reader and writer.
use std::io;

use thiserror::Error;

/// Errors that can occur while reading, writing, or seeking a BGZF stream.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BgzfError {
    /// A compressed block would exceed the maximum on-disk block size.
    #[error("Compressed block size ({0}) exceeds max allowed: ({1})")]
    BlockSizeExceeded(usize, usize),
    /// An invalid compression level (outside 1-12) was requested.
    #[error("Invalid compression level: {0}")]
    CompressionLevel(u8),
    /// An I/O error on the underlying stream.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// A decompressed block's CRC32 did not match the footer.
    #[error("Invalid checksum, found {found}, expected {expected}")]
    InvalidChecksum { found: u32, expected: u32 },
    /// The gzip/BGZF header did not match the expected framing.
    #[error("Invalid block header: {0}")]
    InvalidHeader(&'static str),
    /// The underlying stream ended without a trailing EOF marker block.
    #[error("Truncated BGZF file: missing EOF marker")]
    Truncated,
    /// A virtual offset's in-block component pointed past the block's data.
    #[error("Invalid in-block offset {offset} for block of size {size}")]
    InvalidInBlockOffset { offset: u64, size: usize },
    /// A seek was requested that isn't representable or isn't supported in this mode.
    #[error("Invalid seek: {0}")]
    InvalidSeek(&'static str),
    /// The stream was used after `close` was called on it.
    #[error("Stream is closed")]
    StreamClosed,
    /// A write was attempted on a read-mode stream, or vice-versa.
    #[error("Stream does not support this operation: {0}")]
    InvalidMode(&'static str),
    /// `libdeflater` failed to compress a block.
    #[error("LibDeflater compression error: {0:?}")]
    LibDeflaterCompress(libdeflater::CompressionError),
    /// `libdeflater` failed to decompress a block.
    #[error(transparent)]
    LibDeflaterDecompress(#[from] libdeflater::DecompressionError),
}

impl From<BgzfError> for io::Error {
    fn from(err: BgzfError) -> Self {
        match err {
            BgzfError::Io(e) => e,
            BgzfError::Truncated => io::Error::new(io::ErrorKind::UnexpectedEof, err.to_string()),
            BgzfError::StreamClosed
            | BgzfError::InvalidMode(_)
            | BgzfError::InvalidSeek(_)
            | BgzfError::InvalidInBlockOffset { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err.to_string())
            }
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}

//! The per-block buffers and codec contexts used by the reader and writer pipelines.
use std::io::Read;

use byteorder::{ByteOrder, LittleEndian};
use libdeflater::{Compressor, Crc, Decompressor};

use crate::error::BgzfError;
use crate::framing;
use crate::virtual_offset::VirtualOffset;
use crate::{CompressionLevel, BGZF_MAX_BLOCK_SIZE, BGZF_SAFE_BLOCK_SIZE};

/// One slot in the decoder's block pool: owns a raw (still-compressed) buffer, the matching
/// decompressed buffer, and a reusable inflate context.
///
/// Reused across refills - `reset_for_fill` clears the bookkeeping without freeing either
/// buffer's allocation.
pub(crate) struct ReadBlock {
    /// Exactly the bytes read off the wire for this block: header, extra field, DEFLATE
    /// stream, and 8-byte footer. Compared byte-for-byte against the canonical EOF marker.
    raw: Vec<u8>,
    header_len: usize,
    expected_crc: u32,
    expected_isize: u32,
    decompressed: Vec<u8>,
    decompressor: Decompressor,
    voffset: VirtualOffset,
    size: usize,
}

impl ReadBlock {
    pub(crate) fn new() -> Self {
        Self {
            raw: Vec::with_capacity(BGZF_MAX_BLOCK_SIZE),
            header_len: 0,
            expected_crc: 0,
            expected_isize: 0,
            decompressed: vec![0; BGZF_MAX_BLOCK_SIZE],
            decompressor: Decompressor::new(),
            voffset: VirtualOffset::MIN,
            size: 0,
        }
    }

    /// Clear prior contents in preparation for a fresh `load` at the given file offset.
    pub(crate) fn reset_for_fill(&mut self, file_offset: u64) {
        self.raw.clear();
        self.size = 0;
        self.voffset = VirtualOffset::new(file_offset, 0).expect("fresh block offset is always 0");
    }

    /// Total on-disk length of the block as last loaded, header through footer.
    pub(crate) fn raw_len(&self) -> usize {
        self.raw.len()
    }

    pub(crate) fn is_eof_marker(&self) -> bool {
        framing::is_eof_block(&self.raw)
    }

    pub(crate) fn voffset(&self) -> VirtualOffset {
        self.voffset
    }

    pub(crate) fn set_voffset(&mut self, v: VirtualOffset) {
        self.voffset = v;
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        usize::from(self.voffset.block_offset()) >= self.size
    }

    pub(crate) fn remaining(&self) -> &[u8] {
        &self.decompressed[usize::from(self.voffset.block_offset())..self.size]
    }

    pub(crate) fn consume(&mut self, n: u16) {
        self.voffset = self.voffset.advance(n);
    }

    /// Inflate this block's DEFLATE stream into its decompressed buffer, verifying the CRC32
    /// recorded in the footer. Runs entirely against this block's own buffers/decompressor, so
    /// it is safe to call concurrently with other blocks' `inflate` calls.
    pub(crate) fn inflate(&mut self) -> Result<(), BgzfError> {
        let deflate_end = self.raw.len() - framing::FOOTER_LEN;
        let deflate = &self.raw[self.header_len..deflate_end];

        self.decompressed.resize(self.expected_isize as usize, 0);
        if self.expected_isize != 0 {
            self.decompressor.deflate_decompress(deflate, &mut self.decompressed)?;
        }

        let mut crc = Crc::new();
        crc.update(&self.decompressed);
        if crc.sum() != self.expected_crc {
            return Err(BgzfError::InvalidChecksum { found: crc.sum(), expected: self.expected_crc });
        }

        self.size = self.expected_isize as usize;
        if self.size >= BGZF_MAX_BLOCK_SIZE {
            return Err(BgzfError::BlockSizeExceeded(self.size, BGZF_MAX_BLOCK_SIZE));
        }
        Ok(())
    }
}

/// Read one framed block from `reader` directly into `block`, recording the header length and
/// footer values needed for `inflate`. Free function (rather than a `ReadBlock` method) because
/// it needs to interleave reading the fixed header/extra field with the remainder of the block,
/// without re-parsing bytes already consumed.
pub(crate) fn load_block<R: Read>(reader: &mut R, block: &mut ReadBlock) -> Result<bool, BgzfError> {
    let mut prefix = Vec::new();
    let header = match framing::read_header_keeping_bytes(reader, &mut prefix)? {
        Some(h) => h,
        None => return Ok(false),
    };

    block.raw.clear();
    block.raw.extend_from_slice(&prefix);
    block.raw.resize(header.total_len, 0);
    let tail_start = prefix.len();
    reader.read_exact(&mut block.raw[tail_start..]).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            BgzfError::Truncated
        } else {
            BgzfError::Io(e)
        }
    })?;

    block.header_len = header.header_len;
    let footer_start = block.raw.len() - framing::FOOTER_LEN;
    block.expected_crc = LittleEndian::read_u32(&block.raw[footer_start..footer_start + 4]);
    block.expected_isize = LittleEndian::read_u32(&block.raw[footer_start + 4..footer_start + 8]);
    Ok(true)
}

/// The encoder's single active block: an uncompressed staging buffer, a reusable compressed
/// output buffer (with the 18-byte prologue reserved up front), and a reusable deflate context.
pub(crate) struct WriteBlock {
    decompressed: Vec<u8>,
    compressed: Vec<u8>,
    compressor: Compressor,
    voffset: VirtualOffset,
}

impl WriteBlock {
    pub(crate) fn new(level: CompressionLevel) -> Self {
        Self {
            decompressed: Vec::with_capacity(BGZF_SAFE_BLOCK_SIZE),
            compressed: Vec::with_capacity(BGZF_MAX_BLOCK_SIZE),
            compressor: Compressor::new(*level.inner()),
            voffset: VirtualOffset::MIN,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.decompressed.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.decompressed.is_empty()
    }

    pub(crate) fn remaining_capacity(&self) -> usize {
        BGZF_SAFE_BLOCK_SIZE - self.decompressed.len()
    }

    pub(crate) fn voffset(&self) -> VirtualOffset {
        self.voffset
    }

    pub(crate) fn extend(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= self.remaining_capacity());
        self.decompressed.extend_from_slice(data);
    }

    /// Deflate the currently-staged payload into the internal compressed buffer (prologue
    /// reserved, footer appended) and return it as a byte slice ready to write out.
    ///
    /// Does not touch the underlying writer or reset `voffset` - the caller does that once the
    /// bytes are actually on the wire, since only it knows the new file offset.
    pub(crate) fn deflate(&mut self, xfl_hint: u8) -> Result<&[u8], BgzfError> {
        let extra = usize::max(128, self.decompressed.len() / 10);
        self.compressed.resize(framing::PROLOGUE_LEN + self.decompressed.len() + extra + framing::FOOTER_LEN, 0);
        framing::write_prologue(&mut self.compressed, xfl_hint);

        let written = self
            .compressor
            .deflate_compress(&self.decompressed, &mut self.compressed[framing::PROLOGUE_LEN..])
            .map_err(BgzfError::LibDeflaterCompress)?;

        let total_len = framing::PROLOGUE_LEN + written + framing::FOOTER_LEN;
        if total_len > BGZF_MAX_BLOCK_SIZE {
            return Err(BgzfError::BlockSizeExceeded(total_len, BGZF_MAX_BLOCK_SIZE));
        }
        framing::patch_bsize(&mut self.compressed, total_len);

        let mut crc = Crc::new();
        crc.update(&self.decompressed);
        let footer_start = framing::PROLOGUE_LEN + written;
        self.compressed.truncate(total_len);
        LittleEndian::write_u32(&mut self.compressed[footer_start..footer_start + 4], crc.sum());
        LittleEndian::write_u32(
            &mut self.compressed[footer_start + 4..footer_start + 8],
            self.decompressed.len() as u32,
        );

        Ok(&self.compressed[..total_len])
    }

    /// Reset bookkeeping for the next block, now starting at `file_offset` in the underlying
    /// stream.
    pub(crate) fn reset(&mut self, file_offset: u64) {
        self.decompressed.clear();
        self.voffset = VirtualOffset::new(file_offset, 0).expect("fresh block offset is always 0");
    }
}

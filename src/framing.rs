//! On-wire BGZF block framing: gzip header/extra-field parsing, the reserved write-side
//! prologue, and the canonical EOF marker.
use std::io::{self, Read};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::BgzfError;

pub(crate) const ID1: u8 = 0x1f;
pub(crate) const ID2: u8 = 0x8b;
pub(crate) const CM_DEFLATE: u8 = 0x08;
pub(crate) const FLG_FEXTRA: u8 = 0x04;

pub(crate) const BGZF_SUBFIELD_SI1: u8 = b'B';
pub(crate) const BGZF_SUBFIELD_SI2: u8 = b'C';
pub(crate) const BGZF_SUBFIELD_SLEN: u16 = 2;

/// Bytes consumed before the extra-field payload: ID1, ID2, CM, FLG, MTIME(4), XFL, OS, XLEN(2).
pub(crate) const FIXED_HEADER_LEN: usize = 12;
/// CRC32(4) + ISIZE(4).
pub(crate) const FOOTER_LEN: usize = 8;
/// The prologue this crate writes: `FIXED_HEADER_LEN` + a single 6-byte extra field
/// (4-byte subfield header + 2-byte BSIZE payload).
pub(crate) const PROLOGUE_LEN: usize = FIXED_HEADER_LEN + 6;
/// Byte offset of the little-endian BSIZE value within a written prologue.
const BSIZE_OFFSET: usize = 16;

pub(crate) const BGZF_EOF: [u8; 28] = [
    0x1f, 0x8b, // ID1, ID2
    0x08, // CM = DEFLATE
    0x04, // FLG = FEXTRA
    0x00, 0x00, 0x00, 0x00, // MTIME = 0
    0x00, // XFL = 0
    0xff, // OS = 255 (unknown)
    0x06, 0x00, // XLEN = 6
    0x42, 0x43, // SI1, SI2 = 'B', 'C'
    0x02, 0x00, // SLEN = 2
    0x1b, 0x00, // BSIZE = 27
    0x03, 0x00, // empty DEFLATE stream (final, stored, zero-length)
    0x00, 0x00, 0x00, 0x00, // CRC32 = 0
    0x00, 0x00, 0x00, 0x00, // ISIZE = 0
];

/// Compression-level hint byte (XFL) conventions used by flate2/bgzip-compatible tools.
pub(crate) const XFL_BEST: u8 = 2;
pub(crate) const XFL_FASTEST: u8 = 4;
pub(crate) const XFL_DEFAULT: u8 = 0;

/// Whether the as-read raw bytes of a block are exactly the canonical EOF marker.
///
/// This must be checked against the raw compressed bytes, not the decompressed payload: an
/// empty decompressed payload does not by itself prove the block is the canonical marker.
pub(crate) fn is_eof_block(raw: &[u8]) -> bool {
    raw == BGZF_EOF
}

/// The result of successfully parsing one block's header.
pub(crate) struct ParsedHeader {
    /// Total on-disk length of the block, header through footer (`BSIZE + 1`).
    pub(crate) total_len: usize,
    /// Length of the fixed header plus extra field (`FIXED_HEADER_LEN + XLEN`).
    pub(crate) header_len: usize,
}

/// Read exactly `buf.len()` bytes, or fewer if the reader hits a clean EOF with zero bytes
/// consumed so far. Returns the number of bytes actually filled.
fn fill_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Parse one BGZF block header from `reader`.
///
/// Returns `Ok(None)` only when the underlying stream is cleanly exhausted before any header
/// byte was read. A partially-read header (the stream ends mid-header) is reported as
/// [`BgzfError::Truncated`], since at that point we know a block was starting but never
/// completed.
/// Appends every byte consumed from `reader` (fixed header plus extra field) onto `keep`. Used
/// by the block loader, which needs those bytes again to assemble the full raw block without
/// re-reading the stream.
pub(crate) fn read_header_keeping_bytes<R: Read>(
    reader: &mut R,
    keep: &mut Vec<u8>,
) -> Result<Option<ParsedHeader>, BgzfError> {
    let mut fixed = [0u8; FIXED_HEADER_LEN];
    let filled = fill_or_eof(reader, &mut fixed)?;
    if filled == 0 {
        return Ok(None);
    }
    if filled < FIXED_HEADER_LEN {
        return Err(BgzfError::Truncated);
    }

    if fixed[0] != ID1 || fixed[1] != ID2 {
        return Err(BgzfError::InvalidHeader("bad gzip magic bytes"));
    }
    if fixed[2] != CM_DEFLATE {
        return Err(BgzfError::InvalidHeader("unsupported compression method"));
    }
    if fixed[3] & FLG_FEXTRA != FLG_FEXTRA {
        return Err(BgzfError::InvalidHeader("FEXTRA flag not set"));
    }

    let xlen = LittleEndian::read_u16(&fixed[10..12]) as usize;
    let mut extra = vec![0u8; xlen];
    reader.read_exact(&mut extra).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            BgzfError::Truncated
        } else {
            BgzfError::Io(e)
        }
    })?;

    let bsize = extract_bsize(&extra)?;
    keep.extend_from_slice(&fixed);
    keep.extend_from_slice(&extra);
    Ok(Some(ParsedHeader {
        total_len: bsize as usize + 1,
        header_len: FIXED_HEADER_LEN + xlen,
    }))
}

/// Scan a gzip extra field for the BGZF `BC` subfield and return its BSIZE payload.
///
/// Unknown subfields are skipped over using their own declared length, per the gzip spec;
/// a missing or zero BSIZE is a framing error.
fn extract_bsize(extra: &[u8]) -> Result<u16, BgzfError> {
    let mut i = 0;
    let mut bsize = None;
    while i + 4 <= extra.len() {
        let si1 = extra[i];
        let si2 = extra[i + 1];
        let slen = LittleEndian::read_u16(&extra[i + 2..i + 4]) as usize;
        let data_start = i + 4;
        if data_start + slen > extra.len() {
            break;
        }
        if si1 == BGZF_SUBFIELD_SI1 && si2 == BGZF_SUBFIELD_SI2 && slen == BGZF_SUBFIELD_SLEN as usize {
            bsize = Some(LittleEndian::read_u16(&extra[data_start..data_start + 2]));
        }
        i = data_start + slen;
    }
    match bsize {
        None | Some(0) => Err(BgzfError::InvalidHeader("missing or zero BSIZE subfield")),
        Some(b) => Ok(b),
    }
}

/// Write the 18-byte reserved prologue (fixed header + BC subfield) with a placeholder BSIZE
/// of zero, deriving the XFL compression-level hint the way flate2/bgzip tooling does.
pub(crate) fn write_prologue(buf: &mut [u8], xfl_hint: u8) {
    debug_assert!(buf.len() >= PROLOGUE_LEN);
    buf[0] = ID1;
    buf[1] = ID2;
    buf[2] = CM_DEFLATE;
    buf[3] = FLG_FEXTRA;
    buf[4..8].copy_from_slice(&[0, 0, 0, 0]); // MTIME
    buf[8] = xfl_hint;
    buf[9] = 0xff; // OS = unknown
    LittleEndian::write_u16(&mut buf[10..12], 6); // XLEN
    buf[12] = BGZF_SUBFIELD_SI1;
    buf[13] = BGZF_SUBFIELD_SI2;
    LittleEndian::write_u16(&mut buf[14..16], BGZF_SUBFIELD_SLEN);
    LittleEndian::write_u16(&mut buf[BSIZE_OFFSET..PROLOGUE_LEN], 0);
}

/// Backpatch the BSIZE field of a prologue written by [`write_prologue`] once the total
/// on-disk block size is known.
pub(crate) fn patch_bsize(buf: &mut [u8], total_block_len: usize) {
    debug_assert!(total_block_len >= 1 && total_block_len <= u16::MAX as usize + 1);
    LittleEndian::write_u16(&mut buf[BSIZE_OFFSET..PROLOGUE_LEN], (total_block_len - 1) as u16);
}

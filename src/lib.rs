//! A streaming codec for BGZF (Blocked GZip Format), the multi-member gzip container used by
//! BAM/VCF.gz and other bioinformatics formats.
//!
//! BGZF concatenates independently-compressed gzip members, each bounded to 64 KiB of
//! uncompressed payload, carrying a custom `BSIZE` subfield in the gzip extra-field area. This
//! framing is what permits random access via [`VirtualOffset`]s that address a specific byte
//! inside a specific compressed block.
//!
//! This crate is not a general-purpose compressed stream: it will not produce or accept
//! non-BGZF gzip data, and write-mode streams cannot seek.
//!
//! # Examples
//!
//! ```rust
//! use bgzf_codec::{Reader, Writer};
//! use std::error::Error;
//! use std::io::{Read, Write};
//!
//! /// Contrived example that round-trips some bytes through BGZF in memory.
//! fn main() -> Result<(), Box<dyn Error>> {
//!     let mut destination = Vec::new();
//!     let mut writer = Writer::new(&mut destination, 2.try_into()?);
//!     writer.write_all(b"hello, bgzf")?;
//!     writer.close()?;
//!
//!     let mut reader = Reader::new(destination.as_slice());
//!     let mut out = String::new();
//!     reader.read_to_string(&mut out)?;
//!     assert_eq!(out, "hello, bgzf");
//!     Ok(())
//! }
//! ```
#![forbid(unsafe_code)]
#![allow(clippy::must_use_candidate, clippy::missing_errors_doc, clippy::missing_panics_doc)]

mod block;
mod error;
mod framing;
mod reader;
mod virtual_offset;
mod writer;

pub use error::BgzfError;
pub use reader::Reader;
pub use virtual_offset::VirtualOffset;
pub use writer::Writer;

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use libdeflater::CompressionLvl;

/// The maximum number of uncompressed bytes a single BGZF block written by this crate may hold.
///
/// 256 bytes below [`BGZF_MAX_BLOCK_SIZE`] so that even maximally-incompressible input cannot
/// push the compressed block over the 64 KiB on-disk bound.
pub const BGZF_SAFE_BLOCK_SIZE: usize = 65280;

/// The hard 64 KiB bound on any single BGZF block's on-disk size, and the maximum size of a
/// decompressed payload this crate will ever produce or accept without error.
pub const BGZF_MAX_BLOCK_SIZE: usize = 64 * 1024;

/// Level of compression to use for the compressors.
///
/// Valid values are 1-12. See the [libdeflater](https://github.com/ebiggers/libdeflate#compression-levels)
/// documentation for what each level trades off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(CompressionLvl);

impl CompressionLevel {
    /// Create a new [`CompressionLevel`] instance.
    ///
    /// Valid levels are 1-12.
    #[allow(clippy::cast_lossless)]
    pub fn new(level: u8) -> Result<Self, BgzfError> {
        Ok(Self(CompressionLvl::new(level as i32).map_err(|_e| BgzfError::CompressionLevel(level))?))
    }

    pub(crate) fn inner(&self) -> &CompressionLvl {
        &self.0
    }

    /// The XFL compression-level hint byte flate2/bgzip-compatible tools expect.
    pub(crate) fn xfl_hint(&self) -> u8 {
        if self.inner() >= &CompressionLvl::best() {
            framing::XFL_BEST
        } else if self.inner() <= &CompressionLvl::fastest() {
            framing::XFL_FASTEST
        } else {
            framing::XFL_DEFAULT
        }
    }
}

impl Default for CompressionLevel {
    /// The zlib/libdeflate conventional "default" level, 6.
    fn default() -> Self {
        Self::new(6).expect("6 is always a valid compression level")
    }
}

impl TryFrom<u8> for CompressionLevel {
    type Error = BgzfError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CompressionLevel> for u8 {
    fn from(level: CompressionLevel) -> Self {
        let inner: i32 = level.inner().into();
        inner as u8
    }
}

/// Open a BGZF file for reading, writing, or appending.
///
/// `mode` follows the conventional single-letter forms: `"r"` for read, `"w"` for write
/// (truncating any existing file), and `"a"` for append. See [`BgzfFile`] for the returned
/// value, and the crate-level append-mode note below for exactly what `"a"` does.
///
/// Appending strips a pre-existing trailing EOF marker (if present) before resuming writes, so
/// that the file ends up with exactly one EOF marker, at the very end, once closed. If the
/// existing file has no trailing EOF marker (e.g. it is empty, or was truncated), append simply
/// resumes at true end-of-file; the corruption that implies is unrelated to, and not masked by,
/// the append path itself.
pub fn open<P: AsRef<Path>>(path: P, mode: &str) -> io::Result<BgzfFile> {
    match mode {
        "r" => Ok(BgzfFile::Read(Reader::from_path(path)?)),
        "w" => Ok(BgzfFile::Write(Writer::from_path(path, CompressionLevel::default())?)),
        "a" => Ok(BgzfFile::Write(open_append(path, CompressionLevel::default())?)),
        other => Err(io::Error::new(io::ErrorKind::InvalidInput, format!("unknown BGZF mode: {other}"))),
    }
}

/// Open a BGZF file for reading. Equivalent to [`Reader::from_path`]; provided alongside
/// [`open_write`] so callers that don't need [`open`]'s runtime mode string have typed
/// constructors to reach for instead.
pub fn open_read<P: AsRef<Path>>(path: P) -> io::Result<Reader<File>> {
    Reader::from_path(path)
}

/// Open a BGZF file for writing at the default compression level, truncating any existing file.
/// Equivalent to [`Writer::from_path`].
pub fn open_write<P: AsRef<Path>>(path: P) -> io::Result<Writer<File>> {
    Writer::from_path(path, CompressionLevel::default())
}

fn open_append<P: AsRef<Path>>(path: P, level: CompressionLevel) -> io::Result<Writer<File>> {
    let mut file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
    let mut len = file.seek(SeekFrom::End(0))?;
    if len >= framing::BGZF_EOF.len() as u64 {
        file.seek(SeekFrom::End(-(framing::BGZF_EOF.len() as i64)))?;
        let mut tail = [0u8; framing::BGZF_EOF.len()];
        file.read_exact(&mut tail)?;
        if framing::is_eof_block(&tail) {
            len -= framing::BGZF_EOF.len() as u64;
            file.set_len(len)?;
        }
    }
    file.seek(SeekFrom::End(0))?;
    Ok(Writer::with_capacity_at(file, level, BGZF_SAFE_BLOCK_SIZE, len))
}

/// The result of [`open`]: either a read-mode or a write-mode BGZF stream over a [`File`].
pub enum BgzfFile {
    Read(Reader<File>),
    Write(Writer<File>),
}

impl BgzfFile {
    /// Unwrap into the read-mode stream, or fail with [`BgzfError::InvalidMode`] if `self` was
    /// opened for writing.
    pub fn into_reader(self) -> Result<Reader<File>, BgzfError> {
        match self {
            Self::Read(r) => Ok(r),
            Self::Write(_) => Err(BgzfError::InvalidMode("stream was opened for writing, not reading")),
        }
    }

    /// Unwrap into the write-mode stream, or fail with [`BgzfError::InvalidMode`] if `self` was
    /// opened for reading.
    pub fn into_writer(self) -> Result<Writer<File>, BgzfError> {
        match self {
            Self::Write(w) => Ok(w),
            Self::Read(_) => Err(BgzfError::InvalidMode("stream was opened for reading, not writing")),
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::{BufReader, BufWriter, Read, Write};
    use std::fs::File;

    use proptest::prelude::*;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_simple_bgzf_roundtrip() {
        let dir = tempdir().unwrap();

        let input = b"
        This is a longer test than normal to come up with a bunch of text.
        We'll read just a few lines at a time.
        What if this is a longer string, does that then make
        things fail?
        ";

        let output_file = dir.path().join("output.txt");
        let out_writer = BufWriter::new(File::create(&output_file).unwrap());

        let mut bgzf = Writer::new(out_writer, CompressionLevel::new(3).unwrap());
        bgzf.write_all(input).unwrap();
        bgzf.close().unwrap();

        let mut reader = Reader::new(BufReader::new(File::open(output_file).unwrap()));
        let mut bytes = vec![];
        reader.read_to_end(&mut bytes).unwrap();

        assert_eq!(input.to_vec(), bytes);
    }

    #[test]
    fn test_append_strips_existing_eof_marker() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("append.bgz");

        {
            let mut w = open(&path, "w").unwrap();
            let BgzfFile::Write(w) = &mut w else { panic!("expected write mode") };
            w.write_all(b"first-").unwrap();
            w.close().unwrap();
        }
        {
            let mut w = open(&path, "a").unwrap();
            let BgzfFile::Write(w) = &mut w else { panic!("expected write mode") };
            w.write_all(b"second").unwrap();
            w.close().unwrap();
        }

        let mut r = Reader::from_path(&path).unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"first-second");

        // Exactly one EOF marker, at the very end.
        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[raw.len() - 28..], &framing::BGZF_EOF[..]);
    }

    #[test]
    fn test_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.bgz");

        let mut w = Writer::from_path(&path, CompressionLevel::default()).unwrap();
        w.close().unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(raw, framing::BGZF_EOF);

        let mut r = Reader::from_path(&path).unwrap();
        assert!(r.eof().unwrap());
        assert!(r.read_byte().is_err());
    }

    #[test]
    fn test_single_small_payload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("small.bgz");

        let mut w = Writer::from_path(&path, CompressionLevel::default()).unwrap();
        w.write_all(&[0x41, 0x42, 0x43]).unwrap();
        w.close().unwrap();

        let mut r = Reader::from_path(&path).unwrap();
        let mut out = [0u8; 3];
        r.read_exact(&mut out).unwrap();
        assert_eq!(out, [0x41, 0x42, 0x43]);
        assert!(r.read_byte().is_err());
    }

    #[test]
    fn test_cross_block_payload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cross.bgz");
        let payload: Vec<u8> = (0..BGZF_SAFE_BLOCK_SIZE + 5).map(|i| (i % 251) as u8).collect();

        let mut w = Writer::from_path(&path, CompressionLevel::default()).unwrap();
        w.write_all(&payload).unwrap();
        w.close().unwrap();

        let mut r = Reader::from_path(&path).unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_seek_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seek.bgz");
        let payload: Vec<u8> = (0..200_000).map(|i| (i % 251) as u8).collect();

        let mut offsets = Vec::new();
        {
            let mut w = Writer::from_path(&path, CompressionLevel::default()).unwrap();
            let mut written = 0;
            for chunk in payload.chunks(10_000) {
                offsets.push((written, w.virtual_position()));
                w.write_all(chunk).unwrap();
                written += chunk.len();
            }
            w.close().unwrap();
        }

        let mut r = Reader::from_path(&path).unwrap();
        for (start, voffset) in offsets {
            r.seek(voffset).unwrap();
            let mut buf = [0u8; 100];
            r.read_exact(&mut buf).unwrap();
            assert_eq!(&buf[..], &payload[start..start + 100]);
        }
    }

    #[test]
    fn test_truncation_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("truncated.bgz");

        let mut w = Writer::from_path(&path, CompressionLevel::default()).unwrap();
        w.write_all(&vec![0u8; 100_000]).unwrap();
        w.close().unwrap();

        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - framing::BGZF_EOF.len() as u64).unwrap();
        drop(file);

        let mut r = Reader::from_path(&path).unwrap();
        let mut out = Vec::new();
        assert!(r.read_to_end(&mut out).is_err());
    }

    const DICT_SIZE: usize = 32768;
    proptest! {
        #[test]
        fn proptest_bgzf(
            input in prop::collection::vec(0..u8::MAX, 1..(DICT_SIZE * 10)),
            write_size in 1..BGZF_SAFE_BLOCK_SIZE * 4,
            comp_level in 1..12_u8
        ) {
            let dir = tempdir().unwrap();
            let output_file = dir.path().join("output.txt");
            let out_writer = BufWriter::new(File::create(&output_file).unwrap());

            let mut writer = Writer::new(out_writer, CompressionLevel::new(comp_level).unwrap());
            for chunk in input.chunks(write_size) {
                writer.write_all(chunk).unwrap();
            }
            writer.close().unwrap();

            let mut reader = Reader::new(BufReader::new(File::open(output_file).unwrap()));
            let mut bytes = vec![];
            reader.read_to_end(&mut bytes).unwrap();

            prop_assert_eq!(input, bytes);
        }
    }
}

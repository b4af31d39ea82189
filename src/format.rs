//! Information and structures for the `GKO` and `PUD` containers, and the
//! LZSS bitstream they carry.
//!
//! All multi-byte values in both containers are little endian.
//!
//! ## GKO Archive
//! A flat archive of named blobs. There is a four byte entry count, followed
//! immediately by one 24 byte table row per entry:
//!
//! | Byte Num  | Description |
//! | :-------: | ----------- |
//! | 0..16     | name, single byte characters, NUL padded |
//! | 16..20    | absolute offset of the payload |
//! | 20..24    | size of the payload |
//!
//! The payloads follow the table. Every payload starts on the same power-of-two
//! boundary (commonly `0x800`, one CD sector), and the gaps are zero filled.
//! The boundary is not stored anywhere; it can only be recovered from the
//! offsets themselves with [`detect_alignment`](crate::gko::detect_alignment).
//!
//! ## PUD Block Stream
//! Two opaque 16-bit values, then a run of blocks. Each block is a 20 byte
//! header followed by `csize` bytes of LZSS compressed data:
//!
//! | Byte Num | Description |
//! | :------: | ----------- |
//! | 0..2     | width |
//! | 2..4     | height |
//! | 4..12    | four unknown 16-bit values |
//! | 12..16   | decompressed size (`dsize`) |
//! | 16..20   | compressed size (`csize`) |
//!
//! There is no block count. The stream ends at the first header with a zero
//! width, height, or `csize`, or whose payload would run past the end of file.
//!
//! ## LZSS Bitstream
//! The payloads use the classic 4 KiB ring buffer LZSS, with the ring starting
//! at `0xFEE`. A flag byte introduces up to eight tokens, read from the most
//! significant bit down. A `0` bit is a literal byte; a `1` bit is a two byte
//! reference into the ring:
//! ```text
//!  byte 0    byte 1
//! pppppppp  PPPPLLLL
//! ```
//! where `PPPPpppppppp` is the absolute ring position and `LLLL + 3` is the
//! number of bytes to copy (3 to 18).
//!
//! So, the ten bytes "ABCABCABCA" would be encoded as:
//! ```text
//! 10           <- flags: three literals, then a reference
//! 41 42 43     <- 'A' 'B' 'C'
//! EE F4        <- position 0xFEE, length 4 + 3
//! ```

use crate::errors::{PsxError, PsxResult};
use bitstream_io::{ByteRead, ByteReader, ByteWrite, ByteWriter, LittleEndian};
use std::convert::TryFrom;
use std::io::{self, Write};

/// Size of the LZSS ring buffer
pub const RING_SIZE: usize = 0x1000;
/// Mask for wrapping a ring buffer position
pub const RING_MASK: usize = RING_SIZE - 1;
/// Write cursor position of a fresh ring buffer
pub const RING_START: usize = 0xFEE;
/// Shortest match that can be encoded
pub const MIN_MATCH: usize = 3;
/// Longest match that can be encoded
pub const MAX_MATCH: usize = 18;

/// Size of the GKO entry count
pub const GKO_COUNT_SIZE: usize = 4;
/// Size of the fixed-width GKO name field
pub const GKO_NAME_SIZE: usize = 16;
/// Size of one GKO table row
pub const GKO_ROW_SIZE: usize = 24;

/// Size of the two opaque values at the start of a PUD file
pub const PUD_HEADER_SIZE: usize = 4;
/// Size of a PUD block header
pub const PUD_BLOCK_HEADER_SIZE: usize = 20;

/// One row of a GKO table of contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocRow {
    pub name_raw: [u8; GKO_NAME_SIZE],
    pub offset: u32,
    pub size: u32,
}

impl TocRow {
    /// Parse a row from a 24 byte slice
    pub(crate) fn from_slice(row: &[u8]) -> io::Result<Self> {
        let mut rdr = ByteReader::endian(row, LittleEndian);
        let mut name_raw = [0u8; GKO_NAME_SIZE];
        rdr.read_bytes(&mut name_raw)?;
        let offset = rdr.read::<u32>()?;
        let size = rdr.read::<u32>()?;

        Ok(Self {
            name_raw,
            offset,
            size,
        })
    }

    pub(crate) fn write<W: Write>(&self, wtr: &mut ByteWriter<W, LittleEndian>) -> io::Result<()> {
        wtr.write_bytes(&self.name_raw)?; // 0..16
        wtr.write(self.offset)?; // 16..20
        wtr.write(self.size) // 20..24
    }
}

/// Decode a NUL padded name field. Each byte is one Latin-1 character.
pub fn decode_name(raw: &[u8]) -> String {
    raw.iter()
        .take_while(|&&b| b != 0)
        .map(|&b| char::from(b))
        .collect()
}

/// The 20 byte header in front of every PUD block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub width: u16,
    pub height: u16,
    /// Four values of unknown meaning, carried through untouched
    pub unknown: [u16; 4],
    pub dsize: u32,
    pub csize: u32,
}

impl BlockHeader {
    pub(crate) fn from_slice(hdr: &[u8]) -> io::Result<Self> {
        let mut rdr = ByteReader::endian(hdr, LittleEndian);
        let width = rdr.read::<u16>()?;
        let height = rdr.read::<u16>()?;
        let mut unknown = [0u16; 4];
        for u in unknown.iter_mut() {
            *u = rdr.read::<u16>()?;
        }
        let dsize = rdr.read::<u32>()?;
        let csize = rdr.read::<u32>()?;

        Ok(Self {
            width,
            height,
            unknown,
            dsize,
            csize,
        })
    }

    /// A header with any zero dimension or an empty payload marks the end of the stream
    pub fn is_terminator(&self) -> bool {
        self.width == 0 || self.height == 0 || self.csize == 0
    }

    pub(crate) fn write<W: Write>(&self, wtr: &mut ByteWriter<W, LittleEndian>) -> io::Result<()> {
        wtr.write(self.width)?; // 0..2
        wtr.write(self.height)?; // 2..4
        for &u in &self.unknown {
            wtr.write(u)?; // 4..12
        }
        wtr.write(self.dsize)?; // 12..16
        wtr.write(self.csize) // 16..20
    }
}

/// Read a little endian `u16` from `bytes` at `offset`, or zero if it is out of range
pub(crate) fn u16_or_zero(bytes: &[u8], offset: usize) -> u16 {
    bytes
        .get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .unwrap_or(0)
}

/// Narrow a size or offset to the 32-bit fields both containers use
pub(crate) fn to_field(value: usize) -> PsxResult<u32> {
    u32::try_from(value).map_err(|_| PsxError::FieldOverflow(value))
}

/// Round `x` up to the next multiple of `align`
pub(crate) const fn align_up(x: usize, align: usize) -> usize {
    if align <= 1 {
        x
    } else {
        (x + align - 1) / align * align
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toc_row_layout() {
        let mut bytes = vec![0u8; GKO_ROW_SIZE];
        bytes[..5].copy_from_slice(b"A.BIN");
        bytes[16..20].copy_from_slice(&0x800u32.to_le_bytes());
        bytes[20..24].copy_from_slice(&0x1234u32.to_le_bytes());

        let row = TocRow::from_slice(&bytes).unwrap();
        assert_eq!(decode_name(&row.name_raw), "A.BIN");
        assert_eq!(row.offset, 0x800);
        assert_eq!(row.size, 0x1234);

        let mut out = Vec::new();
        row.write(&mut ByteWriter::endian(&mut out, LittleEndian))
            .unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn block_header_layout() {
        let bytes: Vec<u8> = vec![
            0x40, 0x00, 0x20, 0x00, // 64 x 32
            0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04, 0x00, // unknown
            0x00, 0x08, 0x00, 0x00, // dsize 0x800
            0x10, 0x00, 0x00, 0x00, // csize 0x10
        ];
        let hdr = BlockHeader::from_slice(&bytes).unwrap();
        assert_eq!((hdr.width, hdr.height), (64, 32));
        assert_eq!(hdr.unknown, [1, 2, 3, 4]);
        assert_eq!(hdr.dsize, 0x800);
        assert_eq!(hdr.csize, 0x10);
        assert!(!hdr.is_terminator());

        let mut out = Vec::new();
        hdr.write(&mut ByteWriter::endian(&mut out, LittleEndian))
            .unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn latin1_names() {
        assert_eq!(decode_name(b"CAF\xC9.TIM\0\0\0\0\0\0\0\0"), "CAF\u{c9}.TIM");
        assert_eq!(decode_name(b"0123456789ABCDEF"), "0123456789ABCDEF");
        assert_eq!(decode_name(&[0u8; 16]), "");
    }

    #[test]
    fn aligning() {
        assert_eq!(align_up(28, 1), 28);
        assert_eq!(align_up(28, 4), 28);
        assert_eq!(align_up(28, 0x800), 0x800);
        assert_eq!(align_up(0x800, 0x800), 0x800);
        assert_eq!(align_up(0x801, 0x800), 0x1000);
    }
}

use crate::decode::decompress;
use crate::encode::{compress, LzssSettings};
use crate::errors::{PsxError, PsxResult};
use crate::format::{
    to_field, u16_or_zero, BlockHeader, PUD_BLOCK_HEADER_SIZE, PUD_HEADER_SIZE,
};
use bitstream_io::{ByteWrite, ByteWriter, LittleEndian};
use log::{debug, warn};
use std::{borrow::Cow, fmt, io::Write, ops::Range, path::Path};

/// Whether block payloads are handled as plain data or as LZSS streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockMode {
    /// Decompressed block data; compressed when building
    Raw,
    /// LZSS compressed block data, copied as is
    Compressed,
}

impl BlockMode {
    fn extension(self) -> &'static str {
        match self {
            Self::Raw => "decomp.bin",
            Self::Compressed => "bin",
        }
    }

    /// File name for block `index` of the PUD file with stem `stem`,
    /// e.g. `STAGE01.block3.decomp.bin`
    pub fn file_name(self, stem: &str, index: usize) -> String {
        format!("{}.block{}.{}", stem, index, self.extension())
    }

    /// Stem-less file name accepted when packing, e.g. `block3.bin`
    pub fn short_file_name(self, index: usize) -> String {
        format!("block{}.{}", index, self.extension())
    }
}

impl fmt::Display for BlockMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Compressed => write!(f, "compressed"),
        }
    }
}

/// One block of a PUD file. The payload stays in the source buffer, at `data_offset..data_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PudBlock {
    pub index: usize,
    pub header_offset: usize,
    pub width: u16,
    pub height: u16,
    pub unknown: [u16; 4],
    pub dsize: u32,
    pub csize: u32,
    pub data_offset: usize,
    pub data_end: usize,
}

impl PudBlock {
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            width: self.width,
            height: self.height,
            unknown: self.unknown,
            dsize: self.dsize,
            csize: self.csize,
        }
    }

    pub fn data_range(&self) -> Range<usize> {
        self.data_offset..self.data_end
    }
}

/// The decompressed payload of a block, and the size its header promised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompressedBlock {
    pub index: usize,
    pub data: Vec<u8>,
    pub expected: u32,
}

impl DecompressedBlock {
    pub fn size_mismatch(&self) -> bool {
        self.data.len() != self.expected as usize
    }
}

/// A parsed PUD file: the two leading values and the block list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PudFile {
    /// Display name, usually the source file name
    pub name: String,
    /// Size of the parsed buffer
    pub size: usize,
    pub first0: u16,
    pub first1: u16,
    pub blocks: Vec<PudBlock>,
}

impl PudFile {
    /// Scan the blocks of `bytes`. Nothing is decompressed.
    ///
    /// The scan stops quietly at the first terminating header, or at a block
    /// that would run past the end of `bytes`. Finding no block at all is an error.
    pub fn parse(bytes: &[u8], name: &str) -> PsxResult<Self> {
        let size = bytes.len();
        let first0 = u16_or_zero(bytes, 0);
        let first1 = u16_or_zero(bytes, 2);

        let mut blocks = Vec::new();
        let mut off = PUD_HEADER_SIZE;
        while let Some(raw) = bytes.get(off..off + PUD_BLOCK_HEADER_SIZE) {
            let hdr = BlockHeader::from_slice(raw)?;
            if hdr.is_terminator() {
                break;
            }
            let data_offset = off + PUD_BLOCK_HEADER_SIZE;
            let data_end = data_offset + hdr.csize as usize;
            if data_end > size {
                debug!(
                    "pud: block {} at {:#x} overruns the file, stopping",
                    blocks.len(),
                    off
                );
                break;
            }

            blocks.push(PudBlock {
                index: blocks.len(),
                header_offset: off,
                width: hdr.width,
                height: hdr.height,
                unknown: hdr.unknown,
                dsize: hdr.dsize,
                csize: hdr.csize,
                data_offset,
                data_end,
            });
            off = data_end;
        }

        if blocks.is_empty() {
            return Err(PsxError::NoValidBlocks);
        }
        debug!(
            "pud: '{}' has {} blocks, {:#x} of {:#x} bytes used",
            name,
            blocks.len(),
            off,
            size
        );

        Ok(Self {
            name: name.to_string(),
            size,
            first0,
            first1,
            blocks,
        })
    }

    /// File stem of `name`, used to name extracted blocks
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }

    fn block(&self, index: usize) -> PsxResult<&PudBlock> {
        self.blocks
            .get(index)
            .ok_or(PsxError::BlockIndexOutOfRange {
                index,
                count: self.blocks.len(),
            })
    }

    /// The compressed payload of block `index` in `bytes`, the buffer this file was parsed from
    pub fn block_data<'b>(&self, bytes: &'b [u8], index: usize) -> PsxResult<&'b [u8]> {
        let block = self.block(index)?;
        bytes
            .get(block.data_range())
            .ok_or(PsxError::TruncatedInput {
                needed: block.data_end,
                available: bytes.len(),
            })
    }

    /// Decompress block `index`, using its `dsize` as the size hint.
    ///
    /// A result whose length differs from `dsize` is still returned; the
    /// difference is logged and reported by [`DecompressedBlock::size_mismatch`].
    pub fn decompress_block(&self, bytes: &[u8], index: usize) -> PsxResult<DecompressedBlock> {
        let expected = self.block(index)?.dsize;
        let data = decompress(self.block_data(bytes, index)?, Some(expected as usize))?;

        let block = DecompressedBlock {
            index,
            data,
            expected,
        };
        if block.size_mismatch() {
            warn!(
                "pud: block {} decompressed to {} bytes, header says {}",
                index,
                block.data.len(),
                expected
            );
        }

        Ok(block)
    }

    /// Rebuild with new payloads. See [`build_from_blocks`].
    pub fn rebuild<P: AsRef<[u8]>>(
        &self,
        payloads: &[P],
        mode: BlockMode,
        settings: LzssSettings,
    ) -> PsxResult<Vec<u8>> {
        build_from_blocks(self, payloads, mode, settings)
    }
}

/// Build a PUD file from `template`, swapping in one payload per block.
///
/// Payloads are paired with blocks by position. With [`BlockMode::Raw`], each
/// payload is compressed with `settings` and becomes the new `dsize`. With
/// [`BlockMode::Compressed`], the payload is stored as is and the template's
/// `dsize` is kept. Every other header value comes from the template.
pub fn build_from_blocks<P: AsRef<[u8]>>(
    template: &PudFile,
    payloads: &[P],
    mode: BlockMode,
    settings: LzssSettings,
) -> PsxResult<Vec<u8>> {
    if payloads.len() != template.blocks.len() {
        return Err(PsxError::BlockCountMismatch {
            expected: template.blocks.len(),
            actual: payloads.len(),
        });
    }

    let mut out = Vec::new();
    write_blocks(
        &mut ByteWriter::endian(&mut out, LittleEndian),
        template,
        payloads,
        mode,
        settings,
    )?;

    debug!(
        "pud: built {} {} blocks, {} bytes",
        template.blocks.len(),
        mode,
        out.len()
    );

    Ok(out)
}

fn write_blocks<W: Write, P: AsRef<[u8]>>(
    wtr: &mut ByteWriter<W, LittleEndian>,
    template: &PudFile,
    payloads: &[P],
    mode: BlockMode,
    settings: LzssSettings,
) -> PsxResult<()> {
    wtr.write(template.first0)?;
    wtr.write(template.first1)?;

    for (block, payload) in template.blocks.iter().zip(payloads) {
        let payload = payload.as_ref();
        let (dsize, data) = match mode {
            BlockMode::Raw => (
                to_field(payload.len())?,
                Cow::Owned(compress(payload, settings)),
            ),
            BlockMode::Compressed => (block.dsize, Cow::Borrowed(payload)),
        };
        if data.is_empty() {
            warn!(
                "pud: block {} has an empty payload and will end the block stream",
                block.index
            );
        }

        let header = BlockHeader {
            dsize,
            csize: to_field(data.len())?,
            ..block.header()
        };
        header.write(wtr)?;
        wtr.write_bytes(&data)?;
    }

    Ok(())
}

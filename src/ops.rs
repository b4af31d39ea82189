//! File level operations behind the `gkopud` command line tool.

use crate::decode::Decoder;
use crate::encode::{EncoderBuilder, LzssSettings};
use crate::errors::{PsxError, PsxResult};
use crate::gko::{DirResolver, GkoArchive};
use crate::pud::{BlockMode, DecompressedBlock, PudFile};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// `path` with `suffix` appended to its full file name, e.g. `a.bin` -> `a.bin.lzss`
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Compress `input` into `output`, or `<input>.lzss`. Returns the path written.
pub fn compress_file(
    input: &Path,
    output: Option<&Path>,
    settings: LzssSettings,
) -> PsxResult<PathBuf> {
    let output = output.map_or_else(|| with_suffix(input, ".lzss"), Path::to_path_buf);
    let data = fs::read(input)?;

    EncoderBuilder::for_bytes(&data)
        .with_lzss_settings(settings)
        .encode_to_file(&output)?;

    Ok(output)
}

/// Decompress `input` into `output`, or `<input>.decomp.bin`. Returns the path written.
///
/// `out_len` stops decoding once that many bytes are produced.
pub fn decompress_file(
    input: &Path,
    output: Option<&Path>,
    out_len: Option<usize>,
) -> PsxResult<PathBuf> {
    let output = output.map_or_else(|| with_suffix(input, ".decomp.bin"), Path::to_path_buf);
    let data = Decoder::for_file(input)?.optional_size_hint(out_len).decode()?;
    fs::write(&output, data)?;

    Ok(output)
}

pub fn gko_open(path: &Path) -> PsxResult<GkoArchive> {
    GkoArchive::parse(&fs::read(path)?)
}

/// Write every entry of `archive` into `dir`. Returns the number of files written.
pub fn gko_unpack(archive: &GkoArchive, dir: &Path) -> PsxResult<usize> {
    fs::create_dir_all(dir)?;
    for entry in &archive.entries {
        let out_path = dir.join(entry.file_name());
        debug!("gko: '{}' -> {}", entry.name, out_path.display());
        fs::write(&out_path, &entry.data)?;
    }

    Ok(archive.entries.len())
}

/// Rebuild the archive at `template` with the files found in `dir`, writing it to `output`.
///
/// Nothing is written unless every entry was resolved.
pub fn gko_pack(dir: &Path, template: &Path, output: &Path) -> PsxResult<GkoArchive> {
    let archive = gko_open(template)?;
    let sources = DirResolver::new(dir)?;
    let out = archive.rebuild(&sources)?;
    fs::write(output, &out)?;

    GkoArchive::parse(&out)
}

/// Parse the PUD file at `path`, returning it with the bytes it was parsed from
pub fn pud_open(path: &Path) -> PsxResult<(PudFile, Vec<u8>)> {
    let bytes = fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let pud = PudFile::parse(&bytes, &name)?;

    Ok((pud, bytes))
}

/// Write every block of `pud` into `dir`, named by [`BlockMode::file_name`].
///
/// In [`BlockMode::Raw`] the blocks are decompressed first, and the blocks whose
/// size differs from their header are returned.
pub fn pud_extract(
    pud: &PudFile,
    bytes: &[u8],
    dir: &Path,
    mode: BlockMode,
) -> PsxResult<Vec<DecompressedBlock>> {
    fs::create_dir_all(dir)?;

    let mut mismatched = Vec::new();
    for block in &pud.blocks {
        let out_path = dir.join(mode.file_name(pud.stem(), block.index));
        match mode {
            BlockMode::Compressed => fs::write(&out_path, pud.block_data(bytes, block.index)?)?,
            BlockMode::Raw => {
                let decomp = pud.decompress_block(bytes, block.index)?;
                fs::write(&out_path, &decomp.data)?;
                if decomp.size_mismatch() {
                    mismatched.push(decomp);
                }
            }
        }
    }

    Ok(mismatched)
}

/// Read one file per block of `pud` from `dir`, trying the full name first and
/// then the stem-less one
pub fn collect_block_files(pud: &PudFile, dir: &Path, mode: BlockMode) -> PsxResult<Vec<Vec<u8>>> {
    pud.blocks
        .iter()
        .map(|block| {
            let full = dir.join(mode.file_name(pud.stem(), block.index));
            let short = dir.join(mode.short_file_name(block.index));
            let path = if full.is_file() {
                full
            } else if short.is_file() {
                short
            } else {
                return Err(PsxError::BlockFileNotFound {
                    index: block.index,
                    expected: full.display().to_string(),
                });
            };
            debug!("pud: block {} <- {}", block.index, path.display());

            fs::read(&path).map_err(Into::into)
        })
        .collect()
}

/// Rebuild `pud` with the block files in `dir`, writing it to `output`. Returns the new size.
pub fn pud_pack(
    pud: &PudFile,
    dir: &Path,
    mode: BlockMode,
    settings: LzssSettings,
    output: &Path,
) -> PsxResult<usize> {
    let payloads = collect_block_files(pud, dir, mode)?;
    let out = pud.rebuild(&payloads, mode, settings)?;
    fs::write(output, &out)?;

    Ok(out.len())
}

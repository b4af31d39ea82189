//! Reading and rebuilding `GKO` archives.
//!
//! A rebuild never trusts the sizes of the template: the template only fixes
//! the order of the entries and their raw name fields, and the payloads come
//! from a [`SourceResolver`].

use crate::errors::{PsxError, PsxResult};
use crate::format::{
    align_up, decode_name, to_field, TocRow, GKO_COUNT_SIZE, GKO_NAME_SIZE, GKO_ROW_SIZE,
};
use bitstream_io::{ByteRead, ByteReader, ByteWrite, ByteWriter, LittleEndian};
use log::debug;
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Payload boundaries that are tested, largest first
const ALIGNMENTS: [usize; 11] = [
    0x800, 0x400, 0x200, 0x100, 0x80, 0x40, 0x20, 0x10, 0x08, 0x04, 0x02,
];

/// One file stored in a `GKO` archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GkoEntry {
    /// Name decoded from `name_raw`, up to the first NUL
    pub name: String,
    /// The name field exactly as stored, written back verbatim on rebuild
    pub name_raw: [u8; GKO_NAME_SIZE],
    /// Absolute offset of the payload in the source file
    pub offset: u32,
    pub size: u32,
    pub data: Vec<u8>,
}

impl GkoEntry {
    /// The last path component of `name`, used when extracting to a folder
    pub fn file_name(&self) -> &str {
        base_name(&self.name)
    }
}

/// A parsed `GKO` archive and the payload alignment its offsets use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GkoArchive {
    pub entries: Vec<GkoEntry>,
    pub alignment: usize,
}

impl GkoArchive {
    /// Parse `bytes` and detect the archive's alignment
    pub fn parse(bytes: &[u8]) -> PsxResult<Self> {
        let entries = parse(bytes)?;
        let alignment = detect_alignment(&entries);
        debug!(
            "gko: {} entries, alignment {:#x}",
            entries.len(),
            alignment
        );

        Ok(Self { entries, alignment })
    }

    /// Rebuild this archive with payloads from `sources`. See [`build`].
    pub fn rebuild<S: SourceResolver + ?Sized>(&self, sources: &S) -> PsxResult<Vec<u8>> {
        build(&self.entries, sources)
    }
}

/// Parse the table of contents of a `GKO` archive, copying out every payload
pub fn parse(bytes: &[u8]) -> PsxResult<Vec<GkoEntry>> {
    let len = bytes.len();
    let count_field = bytes
        .get(..GKO_COUNT_SIZE)
        .ok_or(PsxError::TruncatedInput {
            needed: GKO_COUNT_SIZE,
            available: len,
        })?;
    let count = ByteReader::endian(count_field, LittleEndian).read::<u32>()? as usize;

    // a bogus count should fail on its first missing row, not on allocation
    let mut entries = Vec::with_capacity(count.min(len / GKO_ROW_SIZE));
    for entry in 0..count {
        let row_start = GKO_COUNT_SIZE + entry * GKO_ROW_SIZE;
        let row_end = row_start + GKO_ROW_SIZE;
        let row = bytes
            .get(row_start..row_end)
            .ok_or(PsxError::TruncatedTable {
                entry,
                row_end,
                len,
            })?;
        let TocRow {
            name_raw,
            offset,
            size,
        } = TocRow::from_slice(row)?;

        let start = offset as usize;
        let data = start
            .checked_add(size as usize)
            .and_then(|end| bytes.get(start..end))
            .ok_or(PsxError::EntryOutOfBounds {
                entry,
                offset,
                size,
                len,
            })?;

        entries.push(GkoEntry {
            name: decode_name(&name_raw),
            name_raw,
            offset,
            size,
            data: data.to_vec(),
        });
    }

    Ok(entries)
}

/// Find the largest power-of-two boundary (up to `0x800`) that every entry's
/// offset sits on. An empty list, or offsets with no common boundary, give `1`.
pub fn detect_alignment(entries: &[GkoEntry]) -> usize {
    if entries.is_empty() {
        return 1;
    }

    ALIGNMENTS
        .iter()
        .copied()
        .find(|&a| entries.iter().all(|e| e.offset as usize % a == 0))
        .unwrap_or(1)
}

/// Build a new `GKO` archive with the same entry order and name fields as `order`,
/// taking every payload from `sources`.
///
/// The payloads are laid out back to back after the table, each starting on the
/// alignment detected from `order`'s offsets, with zero filled gaps. Each table
/// row records the new offset and the size of the resolved payload.
pub fn build<S: SourceResolver + ?Sized>(order: &[GkoEntry], sources: &S) -> PsxResult<Vec<u8>> {
    if order.is_empty() {
        return Err(PsxError::EmptyOrderList);
    }

    let align = detect_alignment(order);
    let header_size = GKO_COUNT_SIZE + order.len() * GKO_ROW_SIZE;

    let mut rows = Vec::with_capacity(order.len());
    let mut payloads: Vec<u8> = Vec::new();
    let mut csr = align_up(header_size, align);

    for entry in order {
        let data = sources.resolve(&entry.name)?;

        let pad = csr - (header_size + payloads.len());
        payloads.resize(payloads.len() + pad, 0);

        rows.push(TocRow {
            name_raw: entry.name_raw,
            offset: to_field(csr)?,
            size: to_field(data.len())?,
        });
        payloads.extend_from_slice(&data);
        csr = align_up(csr + data.len(), align);
    }

    let mut out = Vec::with_capacity(header_size + payloads.len());
    {
        let mut wtr = ByteWriter::endian(&mut out, LittleEndian);
        wtr.write(to_field(order.len())?)?;
        for row in &rows {
            row.write(&mut wtr)?;
        }
    }
    out.extend_from_slice(&payloads);

    debug!(
        "gko: built {} entries, {} bytes, alignment {:#x}",
        order.len(),
        out.len(),
        align
    );

    Ok(out)
}

/// Supplies the payload for a named archive entry when rebuilding
pub trait SourceResolver {
    fn resolve(&self, name: &str) -> PsxResult<Vec<u8>>;
}

/// ASCII case-insensitive name comparison
fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}

/// Last component of an archive name, with either kind of separator
fn base_name(name: &str) -> &str {
    name.rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(name)
}

/// Pick the candidate for `want`: an exact (case-insensitive) file name first,
/// then the first candidate with the same stem. Folders in `want` are ignored.
fn pick<'n, I>(candidates: I, want: &str) -> Option<usize>
where
    I: Iterator<Item = &'n str> + Clone,
{
    let want = base_name(want);
    candidates
        .clone()
        .position(|c| same_name(c, want))
        .or_else(|| {
            let want = stem(want);
            candidates.clone().position(|c| same_name(stem(c), want))
        })
}

/// Resolves entries against the regular files directly inside a folder.
///
/// The folder is listed once, when the resolver is created, in file name order.
#[derive(Debug, Clone)]
pub struct DirResolver {
    files: Vec<(String, PathBuf)>,
}

impl DirResolver {
    pub fn new<P: AsRef<Path>>(dir: P) -> PsxResult<Self> {
        let mut files = Vec::new();
        for ent in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let ent = ent.map_err(|e| {
                let msg = e.to_string();
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, msg))
            })?;

            if !ent.file_type().is_file() {
                continue;
            }
            let name = ent.file_name().to_string_lossy().into_owned();
            files.push((name, ent.into_path()));
        }

        Ok(Self { files })
    }

    /// Path of the file that would be used for `name`
    pub fn find(&self, name: &str) -> Option<&Path> {
        pick(self.files.iter().map(|(n, _)| n.as_str()), name)
            .map(|idx| self.files[idx].1.as_path())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl SourceResolver for DirResolver {
    fn resolve(&self, name: &str) -> PsxResult<Vec<u8>> {
        let path = self
            .find(name)
            .ok_or_else(|| PsxError::SourceFileNotFound(name.to_string()))?;
        debug!("gko: '{}' <- {}", name, path.display());

        fs::read(path).map_err(Into::into)
    }
}

/// Resolves entries against named buffers held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    files: Vec<(String, Vec<u8>)>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, data: Vec<u8>) -> &mut Self {
        self.files.push((name.into(), data));
        self
    }
}

impl SourceResolver for MemoryResolver {
    fn resolve(&self, name: &str) -> PsxResult<Vec<u8>> {
        pick(self.files.iter().map(|(n, _)| n.as_str()), name)
            .map(|idx| self.files[idx].1.clone())
            .ok_or_else(|| PsxError::SourceFileNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_field(name: &str) -> [u8; GKO_NAME_SIZE] {
        let mut raw = [0u8; GKO_NAME_SIZE];
        raw[..name.len()].copy_from_slice(name.as_bytes());
        raw
    }

    fn entry(name: &str, offset: u32) -> GkoEntry {
        GkoEntry {
            name: name.to_string(),
            name_raw: name_field(name),
            offset,
            size: 0,
            data: Vec::new(),
        }
    }

    /// count, one row, and the payload [1, 2, 3, 4] at byte 28
    fn single_entry_archive() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&name_field("A.BIN"));
        bytes.extend_from_slice(&28u32.to_le_bytes());
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        bytes
    }

    #[test]
    fn parse_single_entry() {
        let archive = GkoArchive::parse(&single_entry_archive()).unwrap();
        assert_eq!(archive.entries.len(), 1);

        let e = &archive.entries[0];
        assert_eq!(e.name, "A.BIN");
        assert_eq!((e.offset, e.size), (28, 4));
        assert_eq!(e.data, [1, 2, 3, 4]);
        assert_eq!(archive.alignment, 4);
    }

    #[test]
    fn rebuild_single_entry() {
        let bytes = single_entry_archive();
        let archive = GkoArchive::parse(&bytes).unwrap();
        let mut sources = MemoryResolver::new();
        sources.insert("A.BIN", vec![1, 2, 3, 4]);

        assert_eq!(archive.rebuild(&sources).unwrap(), bytes);
    }

    #[test]
    fn empty_archive() {
        let archive = GkoArchive::parse(&0u32.to_le_bytes()).unwrap();
        assert!(archive.entries.is_empty());
        assert_eq!(archive.alignment, 1);
    }

    #[test]
    fn too_short_for_count() {
        match parse(&[1, 0]) {
            Err(PsxError::TruncatedInput { needed, available }) => {
                assert_eq!((needed, available), (4, 2))
            }
            other => panic!("expected truncated input, got {:?}", other),
        }
    }

    #[test]
    fn truncated_table() {
        let mut bytes = single_entry_archive();
        bytes[0] = 2;
        match parse(&bytes) {
            Err(PsxError::TruncatedTable { entry, .. }) => assert_eq!(entry, 1),
            other => panic!("expected truncated table, got {:?}", other),
        }
    }

    #[test]
    fn entry_out_of_bounds() {
        let mut bytes = single_entry_archive();
        bytes[24] = 5; // size 5, one past the end
        match parse(&bytes) {
            Err(PsxError::EntryOutOfBounds {
                entry,
                offset,
                size,
                len,
            }) => assert_eq!((entry, offset, size, len), (0, 28, 5, 32)),
            other => panic!("expected out of bounds, got {:?}", other),
        }
    }

    #[test]
    fn alignment_detection() {
        let entries = |offsets: &[u32]| -> Vec<GkoEntry> {
            offsets.iter().map(|&o| entry("X", o)).collect()
        };

        assert_eq!(detect_alignment(&entries(&[0x800, 0x1000, 0x3800])), 0x800);
        assert_eq!(detect_alignment(&entries(&[0x800, 0x1200])), 0x200);
        assert_eq!(detect_alignment(&entries(&[0x40, 0x70])), 0x10);
        assert_eq!(detect_alignment(&entries(&[0x41])), 1);
        assert_eq!(detect_alignment(&entries(&[0])), 0x800);
        assert_eq!(detect_alignment(&[]), 1);
    }

    #[test]
    fn build_pads_and_recomputes_sizes() {
        // template sizes are stale, the payloads decide
        let order = vec![entry("ONE.TIM", 0x800), entry("TWO.SEQ", 0x1000)];
        let mut sources = MemoryResolver::new();
        sources
            .insert("one.tim", vec![0x11; 0x801])
            .insert("TWO.SEQ", vec![0x22; 3]);

        let out = build(&order, &sources).unwrap();
        let rebuilt = GkoArchive::parse(&out).unwrap();

        assert_eq!(rebuilt.alignment, 0x800);
        let layout: Vec<_> = rebuilt.entries.iter().map(|e| (e.offset, e.size)).collect();
        assert_eq!(layout, [(0x800, 0x801), (0x1800, 3)]);
        assert_eq!(out.len(), 0x1803);
        assert!(out[GKO_COUNT_SIZE + 2 * GKO_ROW_SIZE..0x800]
            .iter()
            .all(|&b| b == 0));
        assert!(out[0x1001..0x1800].iter().all(|&b| b == 0));
        assert_eq!(rebuilt.entries[0].name_raw, order[0].name_raw);
    }

    #[test]
    fn raw_name_field_survives() {
        // bytes after the NUL are not part of the name, but are kept
        let mut e = entry("PIC.TIM", 0x800);
        e.name_raw[10] = 0xCD;
        let mut sources = MemoryResolver::new();
        sources.insert("PIC.TIM", vec![9; 4]);

        let out = build(&[e.clone()], &sources).unwrap();
        assert_eq!(&out[4..20], &e.name_raw);
    }

    #[test]
    fn resolve_by_stem() {
        let mut sources = MemoryResolver::new();
        sources
            .insert("map.dat", vec![1])
            .insert("MAP.BIN", vec![2])
            .insert("tex.png", vec![3]);

        assert_eq!(sources.resolve("Map.bin").unwrap(), [2]);
        assert_eq!(sources.resolve("TEX.TIM").unwrap(), [3]);
        assert_eq!(sources.resolve("MAP.SEQ").unwrap(), [1]);
        match sources.resolve("SOUND.VAB") {
            Err(PsxError::SourceFileNotFound(name)) => assert_eq!(name, "SOUND.VAB"),
            other => panic!("expected missing source, got {:?}", other),
        }
    }

    #[test]
    fn empty_order_list() {
        match build(&[], &MemoryResolver::new()) {
            Err(PsxError::EmptyOrderList) => {}
            other => panic!("expected empty order error, got {:?}", other),
        }
    }

    #[test]
    fn file_names() {
        assert_eq!(entry("DATA\\A.BIN", 0).file_name(), "A.BIN");
        assert_eq!(entry("B.BIN", 0).file_name(), "B.BIN");
    }
}

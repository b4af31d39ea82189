use crate::{
    errors::PsxResult,
    format::{MIN_MATCH, RING_MASK, RING_SIZE, RING_START},
};
use log::debug;
use smallvec::{smallvec, SmallVec};
use std::{
    fmt,
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
    str::FromStr,
};

pub(crate) mod lzss;

use self::lzss::{LzssPass, LzssToken};
pub use self::lzss::LzssSettings;

type LogWtr<'a> = &'a mut dyn Write;

/// Flag byte plus up to eight two-byte tokens
type Group = SmallVec<[u8; 17]>;

/// Search effort presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionProfile {
    /// 64 positions per hash, 128 compares
    Fast,
    /// 128 positions per hash, 256 compares
    Balanced,
    /// 256 positions per hash, 1024 compares
    Max,
}

impl CompressionProfile {
    /// The [`LzssSettings`] for this profile
    pub const fn settings(self, lazy_matching: bool) -> LzssSettings {
        match self {
            Self::Fast => LzssSettings::new(64, 128, lazy_matching),
            Self::Balanced => LzssSettings::new(128, 256, lazy_matching),
            Self::Max => LzssSettings::new(256, 1024, lazy_matching),
        }
    }
}

impl Default for CompressionProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

impl fmt::Display for CompressionProfile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Balanced => write!(f, "balanced"),
            Self::Max => write!(f, "max"),
        }
    }
}

impl FromStr for CompressionProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" | "rapido" | "rápido" => Ok(Self::Fast),
            "balanced" | "equilibrado" => Ok(Self::Balanced),
            "max" | "maximum" | "maximo" | "máximo" | "maxima" | "máxima" => Ok(Self::Max),
            unk => Err(format!(
                "unknown profile '{}' (expected fast, balanced, or max)",
                unk
            )),
        }
    }
}

/// Specify the encoding settings, such as match search effort, logging, input, and output
///
/// To create a new `EncoderBuilder`, use [`for_reader()`], [`for_file()`], or [`for_bytes()`].
/// Then, change any of the encoding settings with `EncoderBuilder`'s helper methods.
/// Finally, encode the input data with [`encode_to_writer()`], [`encode_to_file()`], or [`encode_to_vec()`].
/// ```
/// # use gkopud::{EncoderBuilder, CompressionProfile};
/// let input = b"ABBACABBCADFEGABA";
/// let compressed = EncoderBuilder::for_bytes(input)
///     .profile(CompressionProfile::Max)
///     .lazy(false)
///     .encode_to_vec();
/// ```
///
/// The default encoding settings are the [`Balanced`] profile with lazy matching.
///
/// [`for_reader()`]: EncoderBuilder::for_reader
/// [`for_file()`]: EncoderBuilder::for_file
/// [`for_bytes()`]: EncoderBuilder::for_bytes
/// [`encode_to_writer()`]: EncoderBuilder::encode_to_writer
/// [`encode_to_file()`]: EncoderBuilder::encode_to_file
/// [`encode_to_vec()`]: EncoderBuilder::encode_to_vec
/// [`Balanced`]: CompressionProfile::Balanced
pub struct EncoderBuilder<'a, R> {
    rdr: R,
    settings: LzssSettings,
    log: Option<LogWtr<'a>>,
}

impl<'a, R: Read> EncoderBuilder<'a, R> {
    /// Create a new `EncoderBuilder` for the data in `rdr`.
    #[inline]
    pub fn for_reader(rdr: R) -> Self {
        Self {
            rdr,
            settings: LzssSettings::default(),
            log: None,
        }
    }

    /// Set all of the match search settings at once. See [`LzssSettings`] for more details.
    #[inline]
    pub fn with_lzss_settings(&mut self, settings: LzssSettings) -> &mut Self {
        self.settings = settings;
        self
    }

    /// Use the bucket and candidate limits of `profile`, keeping the lazy matching setting
    #[inline]
    pub fn profile(&mut self, profile: CompressionProfile) -> &mut Self {
        self.settings = profile.settings(self.settings.lazy_matching);
        self
    }

    #[inline]
    pub fn lazy(&mut self, lazy_matching: bool) -> &mut Self {
        self.settings.lazy_matching = lazy_matching;
        self
    }

    #[inline]
    pub fn bucket_limit(&mut self, limit: usize) -> &mut Self {
        self.settings.bucket_limit = limit;
        self
    }

    #[inline]
    pub fn max_candidates(&mut self, candidates: usize) -> &mut Self {
        self.settings.max_candidates = candidates;
        self
    }

    /// Write the token stream to `log` once the input has been encoded.
    #[inline]
    pub fn with_logging<L: Write>(&mut self, log: &'a mut L) -> &mut Self {
        self.log = Some(log as &'a mut dyn Write);
        self
    }

    /// Start the encoding and write the compressed data out to `wtr`
    #[inline]
    pub fn encode_to_writer<W: Write>(&mut self, wtr: W) -> PsxResult<()> {
        do_encode(self, wtr)
    }

    /// Start the encoding and write the compressed data out to the newly created
    /// `File` `f`
    #[inline]
    pub fn encode_to_file<P: AsRef<Path>>(&mut self, f: P) -> PsxResult<()> {
        let mut wtr = BufWriter::new(File::create(f)?);
        self.encode_to_writer(&mut wtr)?;
        wtr.flush().map_err(Into::into)
    }

    /// Start the encoding and return the compressed data in a `Vec<u8>`.
    #[inline]
    pub fn encode_to_vec(&mut self) -> PsxResult<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_to_writer(&mut out).map(|_| out)
    }
}

impl<'a> EncoderBuilder<'a, BufReader<File>> {
    /// Create a new `EncoderBuilder` for the file at `p`.
    #[inline]
    pub fn for_file<P: AsRef<Path>>(p: P) -> PsxResult<Self> {
        let rdr = BufReader::new(File::open(p)?);
        Ok(Self::for_reader(rdr))
    }
}

impl<'a> EncoderBuilder<'a, &'a [u8]> {
    /// Create a new `EncoderBuilder` for the data the `bytes` slice.
    #[inline]
    pub fn for_bytes(bytes: &'a [u8]) -> Self {
        Self::for_reader(bytes)
    }
}

/// Compress `data` into a `Vec<u8>`
///
/// This is a convenience function to encode a byte slice without having to
/// set up an [`EncoderBuilder`]. Compressing into memory cannot fail.
pub fn compress(data: &[u8], settings: LzssSettings) -> Vec<u8> {
    let pass = lzss::compress_bytes(data, &settings);
    log_ratio(&pass, data.len(), &settings);
    write_stream(&pass)
}

fn do_encode<R: Read, W: Write>(
    opts: &mut EncoderBuilder<'_, R>,
    mut wtr: W,
) -> PsxResult<()> {
    let EncoderBuilder {
        rdr,
        settings,
        ref mut log,
    } = opts;

    let mut input = Vec::new();
    rdr.read_to_end(&mut input)?;

    let pass = lzss::compress_bytes(&input, settings);
    if let Some(wtr) = log.as_mut() {
        writeln!(wtr, "{}", &pass)?;
    }
    log_ratio(&pass, input.len(), settings);

    wtr.write_all(&write_stream(&pass))?;
    Ok(())
}

fn log_ratio(pass: &LzssPass, input_len: usize, settings: &LzssSettings) {
    debug!(
        "lzss: {} bytes as {} tokens ({} matches) with {:?}",
        input_len,
        pass.buf.len(),
        pass.encoded_count(),
        settings
    );
}

/// Pack the tokens into flag groups, turning each match distance into the ring
/// position the decoder will see at that point.
fn write_stream(pass: &LzssPass) -> Vec<u8> {
    let mut out = Vec::with_capacity(pass.decompressed_size / 2 + 64);
    let mut ring_csr = RING_START;

    for tokens in pass.buf.chunks(8) {
        let mut group: Group = smallvec![0];

        for (bit, token) in tokens.iter().enumerate() {
            match *token {
                LzssToken::Uncoded(byte) => {
                    group[0] |= LzssSettings::UNCODED << (7 - bit);
                    group.push(byte);
                    ring_csr = (ring_csr + 1) & RING_MASK;
                }
                LzssToken::Encoded(m) => {
                    group[0] |= LzssSettings::ENCODED << (7 - bit);
                    let position = (ring_csr + RING_SIZE - m.moveback) & RING_MASK;
                    let length = (m.length - MIN_MATCH) as u8 & 0x0F;
                    group.push((position & 0xFF) as u8);
                    group.push(((position >> 8) as u8 & 0x0F) << 4 | length);
                    ring_csr = (ring_csr + m.length) & RING_MASK;
                }
            }
        }

        out.extend_from_slice(&group);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decompress;
    use crate::format::MAX_MATCH;

    /// Walk a compressed stream and return every (position, length) reference
    fn references(stream: &[u8]) -> Vec<(usize, usize)> {
        let mut refs = Vec::new();
        let mut i = 0;
        while i < stream.len() {
            let flags = stream[i];
            i += 1;
            for bit in 0..8 {
                if i >= stream.len() {
                    break;
                }
                if flags & (0x80 >> bit) == 0 {
                    i += 1;
                } else {
                    let lo = usize::from(stream[i]);
                    let hi = usize::from(stream[i + 1]);
                    refs.push((((hi & 0xF0) << 4) | lo, (hi & 0x0F) + MIN_MATCH));
                    i += 2;
                }
            }
        }
        refs
    }

    #[test]
    fn known_stream() {
        let out = compress(b"ABCABCABCA", LzssSettings::default());
        assert_eq!(out, [0x10, b'A', b'B', b'C', 0xEE, 0xF4]);
    }

    #[test]
    fn run_of_one_byte() {
        let input = [0xAAu8; 20];
        let out = compress(&input, LzssSettings::default());
        assert_eq!(out, [0x40, 0xAA, 0xEE, 0xFF, 0xAA]);
        assert_eq!(references(&out), [(0xFEE, MAX_MATCH)]);
        assert_eq!(decompress(&out, Some(input.len())).unwrap(), &input[..]);
    }

    #[test]
    fn empty_input() {
        assert!(compress(&[], LzssSettings::default()).is_empty());
    }

    #[test]
    fn short_final_group_keeps_flag_byte() {
        let out = compress(b"0123456789", LzssSettings::default());
        // eight literals, flag, two literals
        assert_eq!(out.len(), 1 + 8 + 1 + 2);
        assert_eq!(out[0], 0);
        assert_eq!(out[9], 0);
        assert_eq!(&out[10..], b"89");
    }

    #[test]
    fn match_lengths_stay_in_range() {
        let input: Vec<u8> = (0..10_000u32)
            .map(|i| if i % 97 < 40 { b'x' } else { (i % 13) as u8 })
            .collect();
        for &lazy in &[true, false] {
            let out = compress(&input, CompressionProfile::Fast.settings(lazy));
            let refs = references(&out);
            assert!(!refs.is_empty());
            assert!(refs
                .iter()
                .all(|&(_, len)| (MIN_MATCH..=MAX_MATCH).contains(&len)));
        }
    }

    #[test]
    fn ring_position_tracks_decoder() {
        // long enough for the ring cursor to wrap several times
        let input: Vec<u8> = (0..20_000u32)
            .map(|i| ((i / 7) ^ (i % 5) * 3) as u8)
            .collect();
        let out = compress(&input, LzssSettings::default());
        assert_eq!(decompress(&out, Some(input.len())).unwrap(), input);
    }

    #[test]
    fn deterministic() {
        let input: Vec<u8> = (0..5000u32).map(|i| (i % 31 + i / 300) as u8).collect();
        let a = compress(&input, LzssSettings::default());
        let b = compress(&input, LzssSettings::default());
        assert_eq!(a, b);
    }

    #[test]
    fn builder_matches_convenience_function() {
        let input: Vec<u8> = (0..3000u32).map(|i| (i % 17) as u8).collect();
        let settings = CompressionProfile::Max.settings(false);
        let mut log = Vec::new();
        let built = EncoderBuilder::for_bytes(&input)
            .profile(CompressionProfile::Max)
            .lazy(false)
            .with_logging(&mut log)
            .encode_to_vec()
            .unwrap();

        assert_eq!(built, compress(&input, settings));
        assert!(String::from_utf8(log).unwrap().starts_with("# LZSS Tokens"));
    }

    #[test]
    fn profile_names() {
        assert_eq!("fast".parse::<CompressionProfile>(), Ok(CompressionProfile::Fast));
        assert_eq!("Equilibrado".parse::<CompressionProfile>(), Ok(CompressionProfile::Balanced));
        assert_eq!("máximo".parse::<CompressionProfile>(), Ok(CompressionProfile::Max));
        assert!("turbo".parse::<CompressionProfile>().is_err());
        assert_eq!(
            CompressionProfile::default().settings(true),
            LzssSettings::default()
        );
    }
}

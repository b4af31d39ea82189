use std::{
    collections::{HashMap, VecDeque},
    fmt,
};

use crate::format::{MAX_MATCH, MIN_MATCH, RING_SIZE};

/// Number of bytes hashed to find match candidates
const HASH_LEN: usize = 3;

/// Configure the match search that drives the LZSS compression
///
/// The bitstream itself is fixed (4 KiB window, 3 to 18 byte matches), so the only
/// knobs are how hard the encoder looks for matches:
///
/// | Field          | Meaning |
/// | -------------- | ------- |
/// | bucket_limit   | positions remembered per 3-byte hash |
/// | max_candidates | positions compared per search |
/// | lazy_matching  | give up a 3 byte match if the next byte starts a longer one |
///
/// By [`default`](LzssSettings::default) the "balanced" profile is used
/// (128 / 256 with lazy matching). See [`CompressionProfile`](crate::CompressionProfile)
/// for the other presets.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct LzssSettings {
    pub bucket_limit: usize,
    pub max_candidates: usize,
    pub lazy_matching: bool,
}

impl LzssSettings {
    pub(crate) const ENCODED: u8 = 1;
    pub(crate) const UNCODED: u8 = 0;

    pub const fn new(bucket_limit: usize, max_candidates: usize, lazy_matching: bool) -> Self {
        Self {
            bucket_limit,
            max_candidates,
            lazy_matching,
        }
    }
}

impl Default for LzssSettings {
    fn default() -> Self {
        Self::new(128, 256, true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Match {
    pub length: usize,
    pub moveback: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LzssToken {
    Uncoded(u8),
    Encoded(Match),
}

impl LzssToken {
    /// total number of input bytes this token covers
    fn size(&self) -> usize {
        match self {
            Self::Encoded(m) => m.length,
            Self::Uncoded(..) => 1,
        }
    }
}

#[derive(Debug)]
pub(crate) struct LzssPass {
    pub buf: Vec<LzssToken>,
    pub decompressed_size: usize,
}

impl LzssPass {
    fn new(input_size: usize) -> Self {
        Self {
            buf: Vec::with_capacity(input_size),
            decompressed_size: input_size,
        }
    }

    pub(crate) fn encoded_count(&self) -> usize {
        self.buf
            .iter()
            .filter(|t| matches!(t, LzssToken::Encoded(..)))
            .count()
    }
}

impl fmt::Display for LzssPass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "# LZSS Tokens")?;
        let mut position = 0;
        for token in &self.buf {
            write!(f, "{:04x} - ", position)?;
            match token {
                LzssToken::Uncoded(b) => writeln!(f, "Uncoded: {:02x}", b),
                LzssToken::Encoded(m) => writeln!(
                    f,
                    "Encoded [Copyback]: size: {} mb: {}",
                    m.length, m.moveback
                ),
            }?;
            position += token.size();
        }

        Ok(())
    }
}

/// 3-byte rolling hash used to bucket candidate positions
#[inline]
fn hash3(b: &[u8]) -> u32 {
    u32::from(b[0]) * 0x1F1F + u32::from(b[1]) * 0x1F + u32::from(b[2])
}

/// Recent input positions, grouped by the hash of the three bytes starting there.
/// Each bucket is oldest first.
#[derive(Debug)]
struct MatchIndex {
    buckets: HashMap<u32, VecDeque<usize>>,
    bucket_limit: usize,
}

impl MatchIndex {
    fn new(bucket_limit: usize) -> Self {
        Self {
            buckets: HashMap::new(),
            bucket_limit,
        }
    }

    /// Remember position `j` of `src`, dropping anything that has left the window
    fn insert(&mut self, src: &[u8], j: usize) {
        if j + HASH_LEN > src.len() {
            return;
        }

        let bucket = self.buckets.entry(hash3(&src[j..])).or_default();
        while bucket.front().map_or(false, |&p| p + RING_SIZE <= j) {
            bucket.pop_front();
        }
        bucket.push_back(j);
        while bucket.len() > self.bucket_limit {
            bucket.pop_front();
        }
    }

    /// Search for the longest match for `src[i..]`, newest candidates first.
    /// Only a strictly longer match replaces the current best, so ties go to the
    /// closest position.
    fn find_best(&self, src: &[u8], i: usize, max_candidates: usize) -> Option<Match> {
        let remaining = src.len() - i;
        if remaining < MIN_MATCH {
            return None;
        }
        let bucket = self.buckets.get(&hash3(&src[i..]))?;
        let max_len = MAX_MATCH.min(remaining);

        let mut best: Option<Match> = None;
        let mut checked = 0;
        for &pos in bucket.iter().rev() {
            if pos + RING_SIZE < i || pos >= i {
                continue;
            }

            // the hash is not unique, so a candidate may not match at all
            let length = src[pos..]
                .iter()
                .zip(&src[i..])
                .take(max_len)
                .take_while(|(s, d)| s == d)
                .count();

            if length >= MIN_MATCH && best.map_or(true, |b| length > b.length) {
                best = Some(Match {
                    length,
                    moveback: i - pos,
                });
                if length == MAX_MATCH {
                    break;
                }
            }

            checked += 1;
            if checked >= max_candidates {
                break;
            }
        }

        best
    }
}

/// Compress `input` with `settings` into a list of coded and uncoded tokens.
pub(crate) fn compress_bytes(input: &[u8], settings: &LzssSettings) -> LzssPass {
    let n = input.len();
    let mut index = MatchIndex::new(settings.bucket_limit);
    let mut pass = LzssPass::new(n);
    let mut i = 0;

    while i < n {
        let best = index.find_best(input, i, settings.max_candidates);

        if settings.lazy_matching && i + 1 < n && best.map_or(false, |m| m.length == MIN_MATCH)
        {
            let next = index.find_best(input, i + 1, settings.max_candidates);
            if next.map_or(false, |m| m.length > MIN_MATCH) {
                pass.buf.push(LzssToken::Uncoded(input[i]));
                index.insert(input, i);
                i += 1;
                continue;
            }
        }

        match best {
            Some(m) => {
                pass.buf.push(LzssToken::Encoded(m));
                for j in i..i + m.length {
                    index.insert(input, j);
                }
                i += m.length;
            }
            None => {
                pass.buf.push(LzssToken::Uncoded(input[i]));
                index.insert(input, i);
                i += 1;
            }
        }
    }

    pass
}

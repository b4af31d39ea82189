use crate::errors::{PsxError, PsxResult};
use crate::format::{MIN_MATCH, RING_MASK, RING_SIZE, RING_START};
use log::debug;
use std::{
    fs::File,
    io::{BufReader, Read, Write},
    path::Path,
};

type LogWtr<'a> = &'a mut dyn Write;

/// Specify the decoding settings, such as the expected output size, logging, and input.
///
/// To create a new `Decoder`, use [`for_reader()`], [`for_bytes()`], or
/// [`for_file()`]. Then, change any of the decoder settings.
/// Finally, decompress the input data with [`decode()`].
/// ```
/// # use gkopud::{EncoderBuilder, Decoder};
/// let original = b"ABBACABBACD";
/// let compressed = EncoderBuilder::for_bytes(original)
///     .encode_to_vec()
///     .unwrap();
/// let decompressed = Decoder::for_bytes(&compressed)
///     .size_hint(original.len())
///     .decode()
///     .unwrap();
/// assert_eq!(&original[..], decompressed);
/// ```
/// The LZSS stream has no header and no end marker. Without a size hint, decoding
/// runs until the input is exhausted. A stream whose final flag byte announces
/// more tokens than remain will decode to whatever was complete.
///
/// [`for_reader()`]: Decoder::for_reader
/// [`for_bytes()`]: Decoder::for_bytes
/// [`for_file()`]: Decoder::for_file
/// [`decode()`]: Decoder::decode
pub struct Decoder<'a, R: Read> {
    src: R,
    size_hint: Option<usize>,
    log: Option<LogWtr<'a>>,
}

impl<'a, R: Read> Decoder<'a, R> {
    #[inline]
    pub fn for_reader(rdr: R) -> Self {
        Self {
            src: rdr,
            size_hint: None,
            log: None,
        }
    }

    /// Stop decoding once at least `size` bytes have been produced.
    ///
    /// The hint is checked between tokens, so a copy-back that crosses it is
    /// still completed. A hint of zero is the same as no hint.
    #[inline]
    pub fn size_hint(&mut self, size: usize) -> &mut Self {
        self.size_hint = Some(size);
        self
    }

    #[inline]
    pub fn optional_size_hint(&mut self, size: Option<usize>) -> &mut Self {
        self.size_hint = size;
        self
    }

    /// Write every decoded token to `wtr`
    #[inline]
    pub fn with_logging<W: Write>(&mut self, wtr: &'a mut W) -> &mut Self {
        self.log = Some(wtr as LogWtr);
        self
    }

    #[inline]
    pub fn decode(&mut self) -> PsxResult<Vec<u8>> {
        let mut input = Vec::new();
        self.src.read_to_end(&mut input)?;

        do_decode(&input, self.size_hint, &mut self.log)
    }
}

impl<'a> Decoder<'a, &'a [u8]> {
    #[inline]
    pub fn for_bytes(bytes: &'a [u8]) -> Self {
        Self::for_reader(bytes)
    }
}

impl<'a> Decoder<'a, BufReader<File>> {
    #[inline]
    pub fn for_file<P: AsRef<Path>>(p: P) -> PsxResult<Self> {
        File::open(p)
            .map(BufReader::new)
            .map(Self::for_reader)
            .map_err(Into::into)
    }
}

/// Decompress LZSS data into a `Vec<u8>`
///
/// This is a convenience function to decode a byte slice without
/// having to set up a [`Decoder`]
pub fn decompress(data: &[u8], size_hint: Option<usize>) -> PsxResult<Vec<u8>> {
    do_decode(data, size_hint, &mut None)
}

/// The 4 KiB history window shared by the encoder and decoder
pub(crate) struct Ring {
    buf: [u8; RING_SIZE],
    csr: usize,
}

impl Ring {
    pub(crate) fn new() -> Self {
        Self {
            buf: [0; RING_SIZE],
            csr: RING_START,
        }
    }

    #[inline]
    fn get(&self, position: usize) -> u8 {
        self.buf[position & RING_MASK]
    }

    #[inline]
    fn push(&mut self, byte: u8) {
        self.buf[self.csr] = byte;
        self.csr = (self.csr + 1) & RING_MASK;
    }
}

/// Byte cursor over the compressed input
struct Source<'s> {
    data: &'s [u8],
    pos: usize,
}

impl<'s> Source<'s> {
    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn flags(&mut self) -> PsxResult<u8> {
        let offset = self.pos;
        self.next()
            .ok_or(PsxError::UnexpectedEndOfInput { offset })
    }

    fn next(&mut self) -> Option<u8> {
        let byte = self.data.get(self.pos).copied();
        if byte.is_some() {
            self.pos += 1;
        }
        byte
    }
}

fn do_decode(
    data: &[u8],
    size_hint: Option<usize>,
    log: &mut Option<LogWtr>,
) -> PsxResult<Vec<u8>> {
    let hint = size_hint.filter(|&n| n > 0);
    let done = |out: &[u8]| hint.map_or(false, |n| out.len() >= n);

    let mut src = Source { data, pos: 0 };
    let mut ring = Ring::new();
    let mut output: Vec<u8> = Vec::with_capacity(hint.unwrap_or(data.len() * 4 + 64));

    'groups: while !done(&output) && !src.is_empty() {
        let flags = src.flags()?;

        for bit in 0..8 {
            if done(&output) || src.is_empty() {
                break;
            }

            if flags & (0x80 >> bit) == 0 {
                let byte = match src.next() {
                    Some(b) => b,
                    None => break 'groups,
                };
                if let Some(wtr) = log.as_mut() {
                    writeln!(wtr, "{:04x} - Uncoded: {:02x}", output.len(), byte)?;
                }
                output.push(byte);
                ring.push(byte);
            } else {
                // a reference cut short by the end of input is dropped
                let (lo, hi) = match (src.next(), src.next()) {
                    (Some(lo), Some(hi)) => (lo, hi),
                    _ => break 'groups,
                };
                let position = (usize::from(hi & 0xF0) << 4) | usize::from(lo);
                let length = usize::from(hi & 0x0F) + MIN_MATCH;

                if let Some(wtr) = log.as_mut() {
                    writeln!(
                        wtr,
                        "{:04x} - Encoded [Copyback]: size: {} | ring: {:03x} | csr: {:03x}",
                        output.len(),
                        length,
                        position,
                        ring.csr
                    )?;
                }

                // one byte at a time: the source may overlap what is being written
                for i in 0..length {
                    let byte = ring.get(position + i);
                    output.push(byte);
                    ring.push(byte);
                }
            }
        }
    }

    debug!(
        "lzss: decompressed {} bytes into {} bytes",
        src.pos,
        output.len()
    );

    Ok(output)
}

use std::io;
use thiserror::Error;

/// Possible errors that arise from decompressing LZSS data, or from parsing and
/// rebuilding GKO archives and PUD block streams.
#[derive(Error, Debug)]
pub enum PsxError {
    #[error("Ran out of input reading a flag byte at offset {offset:#x}")]
    UnexpectedEndOfInput { offset: usize },

    #[error("Input too short: needed {needed} bytes, got {available}")]
    TruncatedInput { needed: usize, available: usize },

    #[error("GKO table row {entry} ends at {row_end:#x}, past the end of the file ({len:#x})")]
    TruncatedTable {
        entry: usize,
        row_end: usize,
        len: usize,
    },

    #[error("GKO entry {entry} at {offset:#x} with size {size:#x} exceeds the file ({len:#x})")]
    EntryOutOfBounds {
        entry: usize,
        offset: u32,
        size: u32,
        len: usize,
    },

    #[error("Cannot build a GKO archive without a template entry list")]
    EmptyOrderList,

    #[error("No file matching GKO entry '{0}' in the source folder")]
    SourceFileNotFound(String),

    #[error("No valid PUD blocks found")]
    NoValidBlocks,

    #[error("PUD template has {expected} blocks, but {actual} payloads were supplied")]
    BlockCountMismatch { expected: usize, actual: usize },

    #[error("PUD block {index} does not exist ({count} blocks)")]
    BlockIndexOutOfRange { index: usize, count: usize },

    #[error("Missing file for PUD block {index}: expected '{expected}'")]
    BlockFileNotFound { index: usize, expected: String },

    #[error("Value {0:#x} does not fit in a 32-bit field")]
    FieldOverflow(usize),

    #[error("{0}")]
    Io(#[from] io::Error),
}

pub type PsxResult<T> = Result<T, PsxError>;

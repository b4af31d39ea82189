//! Tools for the data of a PS1 game: the LZSS compression it uses, the `GKO`
//! archives that bundle its files, and the `PUD` block streams that hold its
//! compressed images.
//!
//! ```
//! use gkopud::{compress, decompress, LzssSettings};
//!
//! let data = b"ABCABCABCA";
//! let packed = compress(data, LzssSettings::default());
//! assert_eq!(decompress(&packed, None).unwrap(), data);
//! ```

mod decode;
mod encode;
mod errors;
pub mod format;
pub mod gko;
pub mod ops;
pub mod pud;

pub use decode::{decompress, Decoder};
pub use encode::{compress, CompressionProfile, EncoderBuilder, LzssSettings};
pub use errors::{PsxError, PsxResult};
pub use gko::{DirResolver, GkoArchive, GkoEntry, MemoryResolver, SourceResolver};
pub use pud::{build_from_blocks, BlockMode, DecompressedBlock, PudBlock, PudFile};

#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use gkopud::{ops, BlockMode, CompressionProfile, PsxResult};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "gkopud", version, about = "GKO archive, PUD block and LZSS tool")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// LZSS compress a file.
    Compress {
        input: PathBuf,
        /// Output file (default: <input>.lzss).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Match search effort: fast, balanced, or max.
        #[arg(long, default_value_t = CompressionProfile::Balanced)]
        profile: CompressionProfile,
        /// Always take the match at hand instead of checking the next byte.
        #[arg(long, default_value_t = false)]
        no_lazy: bool,
    },

    /// LZSS decompress a file.
    Decompress {
        input: PathBuf,
        /// Output file (default: <input>.decomp.bin).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Stop after this many bytes.
        #[arg(long)]
        out_len: Option<usize>,
    },

    /// List the entries of a GKO archive.
    GkoList { gko: PathBuf },

    /// Extract a GKO archive to a folder.
    GkoUnpack { gko: PathBuf, dir: PathBuf },

    /// Rebuild a GKO archive from a folder, keeping the entry order of a template.
    GkoPack {
        dir: PathBuf,
        /// Archive whose entry list and alignment are reused.
        #[arg(long)]
        template: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List the blocks of a PUD file.
    PudList { pud: PathBuf },

    /// Extract the blocks of a PUD file to a folder.
    PudExtract {
        pud: PathBuf,
        dir: PathBuf,
        /// Decompress the blocks.
        #[arg(long, default_value_t = false)]
        raw: bool,
    },

    /// Rebuild a PUD file from a folder of block files.
    PudPack {
        dir: PathBuf,
        /// PUD file whose headers are reused.
        #[arg(long)]
        template: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Blocks are decompressed and are compressed again.
        #[arg(long, default_value_t = false)]
        raw: bool,
        #[arg(long, default_value_t = CompressionProfile::Balanced)]
        profile: CompressionProfile,
        #[arg(long, default_value_t = false)]
        no_lazy: bool,
    },
}

fn block_mode(raw: bool) -> BlockMode {
    if raw {
        BlockMode::Raw
    } else {
        BlockMode::Compressed
    }
}

fn run(cmd: Command) -> PsxResult<()> {
    match cmd {
        Command::Compress {
            input,
            output,
            profile,
            no_lazy,
        } => {
            let out = ops::compress_file(&input, output.as_deref(), profile.settings(!no_lazy))?;
            println!("{} -> {}", input.display(), out.display());
        }
        Command::Decompress {
            input,
            output,
            out_len,
        } => {
            let out = ops::decompress_file(&input, output.as_deref(), out_len)?;
            println!("{} -> {}", input.display(), out.display());
        }
        Command::GkoList { gko } => {
            let archive = ops::gko_open(&gko)?;
            println!(
                "{} entries, alignment {:#x}",
                archive.entries.len(),
                archive.alignment
            );
            for e in &archive.entries {
                println!("{:<16}  off={:#010x} size={:#x}", e.name, e.offset, e.size);
            }
        }
        Command::GkoUnpack { gko, dir } => {
            let archive = ops::gko_open(&gko)?;
            let count = ops::gko_unpack(&archive, &dir)?;
            println!("ok: {} files -> {}", count, dir.display());
        }
        Command::GkoPack {
            dir,
            template,
            output,
        } => {
            let archive = ops::gko_pack(&dir, &template, &output)?;
            println!(
                "ok: {} entries, alignment {:#x} -> {}",
                archive.entries.len(),
                archive.alignment,
                output.display()
            );
        }
        Command::PudList { pud } => {
            let (pud, _) = ops::pud_open(&pud)?;
            println!(
                "{}: {} bytes, first values {:#06x} {:#06x}, {} blocks",
                pud.name,
                pud.size,
                pud.first0,
                pud.first1,
                pud.blocks.len()
            );
            for b in &pud.blocks {
                println!(
                    "block {:>3}  off={:#08x} {}x{} u={:04x?} dsize={:#x} csize={:#x}",
                    b.index, b.header_offset, b.width, b.height, b.unknown, b.dsize, b.csize
                );
            }
        }
        Command::PudExtract { pud, dir, raw } => {
            let (file, bytes) = ops::pud_open(&pud)?;
            let mismatched = ops::pud_extract(&file, &bytes, &dir, block_mode(raw))?;
            for b in &mismatched {
                eprintln!(
                    "warning: block {} decompressed to {} bytes, header says {}",
                    b.index,
                    b.data.len(),
                    b.expected
                );
            }
            println!("ok: {} blocks -> {}", file.blocks.len(), dir.display());
        }
        Command::PudPack {
            dir,
            template,
            output,
            raw,
            profile,
            no_lazy,
        } => {
            let (file, _) = ops::pud_open(&template)?;
            let size = ops::pud_pack(
                &file,
                &dir,
                block_mode(raw),
                profile.settings(!no_lazy),
                &output,
            )?;
            println!(
                "ok: {} blocks, {} bytes -> {}",
                file.blocks.len(),
                size,
                output.display()
            );
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli.cmd) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

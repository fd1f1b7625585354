// Copyright 2026 driedpampas@proton.me
// SPDX-License-Identifier: GPL-3.0-or-later

use clap::{Parser, Subcommand};
use flate2::read::GzDecoder;
use mcanvil::anvil::RegionFile;
use mcanvil::nbt::parse::parse_named_tag;
use mcanvil::world::block;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mca-inspect")]
#[command(about = "Inspect Minecraft NBT and Anvil files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect a .dat (NBT) file
    Nbt {
        /// Path to the .dat file
        path: PathBuf,
        /// Force uncompressed (if not gzipped)
        #[arg(short, long)]
        uncompressed: bool,
    },
    /// Inspect an .mca (Anvil) file
    Anvil {
        /// Path to the .mca file
        path: PathBuf,
        /// Chunk X coordinate
        #[arg(short, long)]
        x: Option<i32>,
        /// Chunk Z coordinate
        #[arg(short, long)]
        z: Option<i32>,
        /// Summarize decoded sections instead of dumping raw NBT
        #[arg(short, long)]
        blocks: bool,
    },
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        let msg = format!("{:?}", e).to_lowercase();
        if msg.contains("broken pipe") || msg.contains("os error 32") {
            std::process::exit(0);
        }
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();

    match cli.command {
        Commands::Nbt { path, uncompressed } => {
            let mut file = File::open(path)?;
            let mut data = Vec::new();
            if uncompressed {
                file.read_to_end(&mut data)?;
            } else {
                let mut decoder = GzDecoder::new(file);
                decoder.read_to_end(&mut data)?;
            }

            let mut input = &data[..];
            let (name, tag) = parse_named_tag(&mut input)?;
            writeln!(handle, "Root tag name: '{}'", name)?;
            writeln!(handle, "{:#?}", tag)?;
        }
        Commands::Anvil { path, x, z, blocks } => {
            let mut region = RegionFile::open(path)?;
            let (Some(x), Some(z)) = (x, z) else {
                let present = (0..32)
                    .flat_map(|z| (0..32).map(move |x| (x, z)))
                    .filter(|&(x, z)| region.has_chunk(x, z))
                    .count();
                writeln!(
                    handle,
                    "Anvil region file loaded, {present} chunks present. Use -x and -z to inspect one."
                )?;
                return Ok(());
            };
            if blocks {
                let Some(chunk) = region.read_chunk(x, z)? else {
                    writeln!(handle, "Chunk ({}, {}) is not present in this region.", x, z)?;
                    return Ok(());
                };
                writeln!(
                    handle,
                    "Chunk ({}, {}): DataVersion {}, {} sections",
                    chunk.x_pos(),
                    chunk.z_pos(),
                    chunk.data_version(),
                    chunk.sections().count()
                )?;
                for section in chunk.sections() {
                    if !section.has_blocks() {
                        writeln!(handle, "  Y={:>3}: no block data", section.y())?;
                        continue;
                    }
                    let mut distinct = std::collections::BTreeSet::new();
                    for y in 0..16 {
                        for sz in 0..16 {
                            for sx in 0..16 {
                                distinct.insert(section.get_block(sx, y, sz));
                            }
                        }
                    }
                    let names: Vec<String> = distinct
                        .iter()
                        .map(|&handle| block::lookup(handle).id().to_string())
                        .collect();
                    writeln!(
                        handle,
                        "  Y={:>3}: {} distinct states: {}",
                        section.y(),
                        names.len(),
                        names.join(", ")
                    )?;
                }
            } else if let Some(data) = region.read_chunk_raw(x, z)? {
                let mut input = &data[..];
                let (name, tag) = parse_named_tag(&mut input)?;
                writeln!(handle, "Chunk ({}, {}) root tag name: '{}'", x, z, name)?;
                writeln!(handle, "{:#?}", tag)?;
            } else {
                writeln!(handle, "Chunk ({}, {}) is not present in this region.", x, z)?;
            }
        }
    }
    Ok(())
}

// Copyright 2026 driedpampas@proton.me
// SPDX-License-Identifier: GPL-3.0-or-later

//! Anvil region file format handling.

pub mod region;

pub use region::RegionFile;

use crate::nbt::NbtError;
use crate::world::ChunkError;
use std::path::PathBuf;
use thiserror::Error;

/// The size of a single sector in an Anvil region file (4096 bytes).
pub const SECTOR_SIZE: usize = 4096;

/// The size of the two-sector region header (locations + timestamps).
pub const HEADER_SIZE: usize = 2 * SECTOR_SIZE;

/// Errors from the region file container.
#[derive(Debug, Error)]
pub enum RegionError {
    /// The region file path does not exist or is not a regular file.
    #[error("region file not found: {0}")]
    FileNotFound(PathBuf),
    /// The file violates a size or header invariant.
    #[error("malformed region file: {0}")]
    MalformedRegion(String),
    /// A chunk's compression byte is not gzip, zlib, or uncompressed.
    #[error("unknown compression type: {0}")]
    UnknownCompression(u8),
    /// The decompressor or compressor reported an error.
    #[error("compression failure")]
    CompressionFailure(#[source] std::io::Error),
    /// An NBT codec failure inside a chunk payload.
    #[error(transparent)]
    Nbt(#[from] NbtError),
    /// A chunk translation failure.
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    /// An underlying file I/O error.
    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// The area of a region file a chunk occupies, in 4 KiB units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sector {
    /// Offset from the start of the file, in sectors.
    pub offset: u32,
    /// Number of sectors occupied.
    pub count: u32,
}

impl Sector {
    /// The sector reserved for the two header tables.
    pub const HEADER: Sector = Sector { offset: 0, count: 2 };

    /// One past the last sector occupied; the start of the next sector.
    pub fn end(&self) -> u32 {
        self.offset + self.count
    }

    /// Byte offset of the sector's start.
    pub fn byte_offset(&self) -> u64 {
        self.offset as u64 * SECTOR_SIZE as u64
    }

    /// Total size in bytes.
    pub fn byte_len(&self) -> usize {
        self.count as usize * SECTOR_SIZE
    }

    pub fn intersects(&self, other: &Sector) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }

    /// The 4-byte location table entry: 24-bit offset, 8-bit count.
    pub fn header_entry(&self) -> [u8; 4] {
        let [_, a, b, c] = self.offset.to_be_bytes();
        [a, b, c, self.count as u8]
    }
}

/// Supported compression types for chunk data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// Gzip compression (standard for .dat files, less common in .mca).
    Gzip = 1,
    /// Zlib compression (standard for .mca chunks).
    Zlib = 2,
    /// No compression.
    None = 3,
}

impl TryFrom<u8> for CompressionType {
    type Error = RegionError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CompressionType::Gzip),
            2 => Ok(CompressionType::Zlib),
            3 => Ok(CompressionType::None),
            _ => Err(RegionError::UnknownCompression(value)),
        }
    }
}

/// The occupied sectors of a region file, sorted by offset.
///
/// Always contains [`Sector::HEADER`], so allocation can never place chunk
/// data under the header tables.
#[derive(Debug, Clone)]
pub struct SectorMap {
    sectors: Vec<Sector>,
}

impl SectorMap {
    pub fn new() -> Self {
        Self {
            sectors: vec![Sector::HEADER],
        }
    }

    /// Inserts an occupied sector, keeping the list sorted.
    ///
    /// Returns `false` without inserting when the sector overlaps an
    /// existing one.
    pub fn insert(&mut self, sector: Sector) -> bool {
        let index = self
            .sectors
            .partition_point(|existing| existing.offset < sector.offset);
        if index > 0 && self.sectors[index - 1].intersects(&sector) {
            return false;
        }
        if index < self.sectors.len() && self.sectors[index].intersects(&sector) {
            return false;
        }
        self.sectors.insert(index, sector);
        true
    }

    /// Removes an exact occupied sector. Returns whether it was present.
    pub fn remove(&mut self, sector: Sector) -> bool {
        match self.sectors.iter().position(|s| *s == sector) {
            Some(index) => {
                self.sectors.remove(index);
                true
            }
            None => false,
        }
    }

    /// First-fit allocation of `count` contiguous sectors.
    ///
    /// Scans the gaps between adjacent occupied sectors and appends past
    /// the last one when no gap is large enough. The returned sector is
    /// already inserted.
    pub fn allocate(&mut self, count: u32) -> Sector {
        debug_assert!(count >= 1);
        for window in self.sectors.windows(2) {
            let gap_start = window[0].end();
            if window[1].offset - gap_start >= count {
                let sector = Sector {
                    offset: gap_start,
                    count,
                };
                self.insert(sector);
                return sector;
            }
        }
        let offset = self
            .sectors
            .last()
            .map(Sector::end)
            .unwrap_or(Sector::HEADER.count);
        let sector = Sector { offset, count };
        self.insert(sector);
        sector
    }
}

impl Default for SectorMap {
    fn default() -> Self {
        Self::new()
    }
}

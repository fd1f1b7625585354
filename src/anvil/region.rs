// Copyright 2026 driedpampas@proton.me
// SPDX-License-Identifier: GPL-3.0-or-later

//! The region file manager: header tables, sector allocation, and chunk
//! payload I/O.

use crate::anvil::{CompressionType, HEADER_SIZE, RegionError, SECTOR_SIZE, Sector, SectorMap};
use crate::nbt::encode::write_named_tag;
use crate::nbt::parse::parse_named_tag;
use crate::world::Chunk;
use byteorder::{BigEndian, WriteBytesExt};
use flate2::Compression;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use log::{debug, warn};
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Flat index of a chunk within the 32×32 region grid.
///
/// Coordinates may be absolute chunk coordinates; only the low 5 bits of
/// each are used.
pub fn chunk_index(x: i32, z: i32) -> usize {
    ((x & 31) | ((z & 31) << 5)) as usize
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or(0)
}

/// Encodes a chunk to its on-disk payload form: NBT, zlib-compressed.
fn encode_chunk_payload(chunk: &Chunk) -> Result<Vec<u8>, RegionError> {
    let mut raw = Vec::new();
    write_named_tag(&mut raw, "", &chunk.to_nbt())?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&raw)
        .map_err(RegionError::CompressionFailure)?;
    encoder.finish().map_err(RegionError::CompressionFailure)
}

/// An Anvil region file holding up to 32×32 chunks.
///
/// The file is memory-mapped for reads. Mutation goes through loaded
/// [`Chunk`] values and becomes durable on [`RegionFile::save`] (whole-file
/// atomic rewrite) or [`RegionFile::flush_chunk`] (in-place single chunk).
pub struct RegionFile {
    path: PathBuf,
    mmap: Mmap,
    sectors: Vec<Option<Sector>>,
    timestamps: Vec<u32>,
    occupied: SectorMap,
    loaded: HashMap<usize, Chunk>,
}

impl RegionFile {
    /// Opens a region file and parses both header tables.
    ///
    /// The file must exist, be at least 8192 bytes, and be a whole number
    /// of 4 KiB sectors. Location entries pointing into the header or
    /// overlapping each other are rejected.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RegionError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(RegionError::FileNotFound(path));
        }
        let file = File::open(&path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.len() < HEADER_SIZE || mmap.len() % SECTOR_SIZE != 0 {
            return Err(RegionError::MalformedRegion(format!(
                "file size {} is not a whole number of sectors of at least {HEADER_SIZE} bytes",
                mmap.len()
            )));
        }

        let mut sectors: Vec<Option<Sector>> = vec![None; 1024];
        let mut occupied = SectorMap::new();
        for index in 0..1024 {
            let entry = &mmap[index * 4..index * 4 + 4];
            let offset = u32::from_be_bytes([0, entry[0], entry[1], entry[2]]);
            let count = entry[3] as u32;
            if offset == 0 || count == 0 {
                continue;
            }
            if offset < 2 {
                return Err(RegionError::MalformedRegion(format!(
                    "chunk {index} location points into the header (offset {offset})"
                )));
            }
            let sector = Sector { offset, count };
            if !occupied.insert(sector) {
                return Err(RegionError::MalformedRegion(format!(
                    "chunk {index} sector overlaps another chunk"
                )));
            }
            sectors[index] = Some(sector);
        }

        let mut timestamps = Vec::with_capacity(1024);
        for index in 0..1024 {
            let start = SECTOR_SIZE + index * 4;
            timestamps.push(u32::from_be_bytes(
                mmap[start..start + 4].try_into().unwrap(),
            ));
        }

        debug!(
            "opened {}: {} chunks present",
            path.display(),
            sectors.iter().flatten().count()
        );
        Ok(Self {
            path,
            mmap,
            sectors,
            timestamps,
            occupied,
            loaded: HashMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the location table has an entry for the chunk.
    pub fn has_chunk(&self, x: i32, z: i32) -> bool {
        self.sectors[chunk_index(x, z)].is_some()
    }

    /// The chunk's last-modified unix timestamp from the header table.
    pub fn timestamp(&self, x: i32, z: i32) -> u32 {
        self.timestamps[chunk_index(x, z)]
    }

    /// Reads and decompresses a chunk's NBT payload without decoding it.
    pub fn read_chunk_raw(&self, x: i32, z: i32) -> Result<Option<Vec<u8>>, RegionError> {
        let Some(sector) = self.sectors[chunk_index(x, z)] else {
            return Ok(None);
        };
        let start = sector.byte_offset() as usize;
        if start + 5 > self.mmap.len() {
            return Err(RegionError::MalformedRegion(format!(
                "chunk ({x}, {z}) starts past the end of the file"
            )));
        }
        let data_length =
            u32::from_be_bytes(self.mmap[start..start + 4].try_into().unwrap()) as usize;
        if data_length == 0 {
            warn!("chunk ({x}, {z}) is allocated but has a zero-length payload");
            return Ok(None);
        }
        let compression = CompressionType::try_from(self.mmap[start + 4])?;
        let end = start + 4 + data_length;
        if end > self.mmap.len() {
            return Err(RegionError::MalformedRegion(format!(
                "chunk ({x}, {z}) payload extends past the end of the file"
            )));
        }
        let data = &self.mmap[start + 5..end];

        let mut decoded = Vec::new();
        match compression {
            CompressionType::Gzip => {
                GzDecoder::new(data)
                    .read_to_end(&mut decoded)
                    .map_err(RegionError::CompressionFailure)?;
            }
            CompressionType::Zlib => {
                ZlibDecoder::new(data)
                    .read_to_end(&mut decoded)
                    .map_err(RegionError::CompressionFailure)?;
            }
            CompressionType::None => decoded.extend_from_slice(data),
        }
        Ok(Some(decoded))
    }

    /// Reads and decodes a chunk, retaining it in the loaded set.
    ///
    /// Repeated calls for the same chunk return the already-loaded value.
    pub fn read_chunk(&mut self, x: i32, z: i32) -> Result<Option<&mut Chunk>, RegionError> {
        let index = chunk_index(x, z);
        if !self.loaded.contains_key(&index) {
            let Some(data) = self.read_chunk_raw(x, z)? else {
                return Ok(None);
            };
            let mut input = &data[..];
            let (_, root) = parse_named_tag(&mut input)?;
            let chunk = Chunk::from_nbt(&root)?;
            self.loaded.insert(index, chunk);
        }
        Ok(self.loaded.get_mut(&index))
    }

    /// The loaded chunk for these coordinates, if any.
    pub fn loaded_chunk(&self, x: i32, z: i32) -> Option<&Chunk> {
        self.loaded.get(&chunk_index(x, z))
    }

    /// Stores a chunk, marked dirty, pending the next save.
    pub fn write_chunk(&mut self, mut chunk: Chunk) {
        chunk.mark_dirty();
        let index = chunk_index(chunk.x_pos(), chunk.z_pos());
        self.loaded.insert(index, chunk);
    }

    /// Rewrites the region file atomically.
    ///
    /// Dirty loaded chunks are re-encoded and zlib-compressed; every other
    /// allocated chunk is copied sector-for-sector, so clean data is
    /// preserved byte-exactly. The output is written to `<path>.out` and
    /// renamed over the original only after a successful sync.
    pub fn save(&mut self) -> Result<(), RegionError> {
        let mut out_path = self.path.clone().into_os_string();
        out_path.push(".out");
        let out_path = PathBuf::from(out_path);

        let mut new_sectors: Vec<Option<Sector>> = vec![None; 1024];
        let mut new_timestamps = self.timestamps.clone();
        let mut rewritten = 0usize;
        let mut copied = 0usize;

        let file = File::create(&out_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&[0u8; HEADER_SIZE])?;
        let mut position = HEADER_SIZE as u64;

        for index in 0..1024 {
            let offset = (position / SECTOR_SIZE as u64) as u32;
            if let Some(chunk) = self.loaded.get_mut(&index).filter(|chunk| chunk.is_dirty()) {
                let compressed = encode_chunk_payload(chunk)?;
                let data_length = compressed.len() + 1;
                let total = data_length + 4;
                let padding = (SECTOR_SIZE - total % SECTOR_SIZE) % SECTOR_SIZE;
                let count = ((total + padding) / SECTOR_SIZE) as u32;
                if count > u8::MAX as u32 {
                    return Err(RegionError::MalformedRegion(format!(
                        "chunk {index} needs {count} sectors, over the 255-sector limit"
                    )));
                }
                writer.write_u32::<BigEndian>(data_length as u32)?;
                writer.write_u8(CompressionType::Zlib as u8)?;
                writer.write_all(&compressed)?;
                writer.write_all(&vec![0u8; padding])?;
                new_sectors[index] = Some(Sector { offset, count });
                new_timestamps[index] = unix_now();
                chunk.mark_clean();
                position += (total + padding) as u64;
                rewritten += 1;
            } else if let Some(sector) = self.sectors[index] {
                let start = sector.byte_offset() as usize;
                let end = start + sector.byte_len();
                if end > self.mmap.len() {
                    return Err(RegionError::MalformedRegion(format!(
                        "chunk {index} sector extends past the end of the file"
                    )));
                }
                writer.write_all(&self.mmap[start..end])?;
                new_sectors[index] = Some(Sector {
                    offset,
                    count: sector.count,
                });
                position += sector.byte_len() as u64;
                copied += 1;
            }
        }

        writer.seek(SeekFrom::Start(0))?;
        for entry in &new_sectors {
            match entry {
                Some(sector) => writer.write_all(&sector.header_entry())?,
                None => writer.write_all(&[0u8; 4])?,
            }
        }
        for &timestamp in &new_timestamps {
            writer.write_u32::<BigEndian>(timestamp)?;
        }
        let file = writer
            .into_inner()
            .map_err(|error| RegionError::Io(error.into_error()))?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&out_path, &self.path)?;
        debug!(
            "saved {}: {rewritten} chunks rewritten, {copied} copied",
            self.path.display()
        );

        let reopened = File::open(&self.path)?;
        self.mmap = unsafe { Mmap::map(&reopened)? };
        self.occupied = SectorMap::new();
        for sector in new_sectors.iter().flatten() {
            self.occupied.insert(*sector);
        }
        self.sectors = new_sectors;
        self.timestamps = new_timestamps;
        Ok(())
    }

    /// Writes one dirty loaded chunk in place, without rewriting the file.
    ///
    /// The chunk's old sector is released and the payload placed by
    /// first-fit scan over the gaps between occupied sectors, appending
    /// past the last sector when nothing fits. The location entry and
    /// timestamp are patched in place. Returns whether anything was
    /// written.
    pub fn flush_chunk(&mut self, x: i32, z: i32) -> Result<bool, RegionError> {
        let index = chunk_index(x, z);
        let Some(chunk) = self.loaded.get(&index) else {
            return Ok(false);
        };
        if !chunk.is_dirty() {
            return Ok(false);
        }

        let compressed = encode_chunk_payload(chunk)?;
        let data_length = compressed.len() + 1;
        let total = data_length + 4;
        let count = total.div_ceil(SECTOR_SIZE) as u32;
        if count > u8::MAX as u32 {
            return Err(RegionError::MalformedRegion(format!(
                "chunk ({x}, {z}) needs {count} sectors, over the 255-sector limit"
            )));
        }

        if let Some(old) = self.sectors[index].take() {
            self.occupied.remove(old);
        }
        let sector = self.occupied.allocate(count);
        debug!(
            "flushing chunk ({x}, {z}) to sectors [{}, {})",
            sector.offset,
            sector.end()
        );

        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(sector.byte_offset()))?;
        file.write_u32::<BigEndian>(data_length as u32)?;
        file.write_u8(CompressionType::Zlib as u8)?;
        file.write_all(&compressed)?;
        file.write_all(&vec![0u8; sector.byte_len() - total])?;

        let timestamp = unix_now();
        file.seek(SeekFrom::Start(index as u64 * 4))?;
        file.write_all(&sector.header_entry())?;
        file.seek(SeekFrom::Start(SECTOR_SIZE as u64 + index as u64 * 4))?;
        file.write_u32::<BigEndian>(timestamp)?;
        file.sync_all()?;
        drop(file);

        self.sectors[index] = Some(sector);
        self.timestamps[index] = timestamp;
        if let Some(chunk) = self.loaded.get_mut(&index) {
            chunk.mark_clean();
        }

        let reopened = File::open(&self.path)?;
        self.mmap = unsafe { Mmap::map(&reopened)? };
        Ok(true)
    }
}

// Copyright 2026 driedpampas@proton.me
// SPDX-License-Identifier: GPL-3.0-or-later

//! The chunk value object and its NBT translation.
//!
//! A chunk is decoded from the `DataVersion`/`Level` compound of a region
//! payload. Sections with both a `Palette` and a `BlockStates` array are
//! translated into addressable block grids backed by the block-state
//! registry; every other `Level` field is carried through opaquely and
//! re-emitted verbatim when the chunk is re-encoded.

use crate::nbt::NbtTag;
use crate::world::block::{self, BlockHandle, Properties, AIR};
use crate::world::palette::{self, SECTION_VOLUME};
use crate::world::{ChunkError, NibbleArray};
use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeMap;

/// Level fields the translator interprets; everything else passes through.
const INTERPRETED_FIELDS: [&str; 5] = ["xPos", "zPos", "InhabitedTime", "LastUpdate", "Sections"];

fn malformed(msg: impl Into<String>) -> ChunkError {
    ChunkError::MalformedChunk(msg.into())
}

fn require<'a>(map: &'a IndexMap<String, NbtTag>, key: &str) -> Result<&'a NbtTag, ChunkError> {
    map.get(key)
        .ok_or_else(|| malformed(format!("missing required field `{key}`")))
}

/// Block index within a section: `y * 256 + z * 16 + x`.
fn block_index(x: usize, y: usize, z: usize) -> usize {
    y * 256 + z * 16 + x
}

/// A 16×16×16 slice of a chunk.
///
/// `blocks`, `block_light`, and `sky_light` are each optional; a section
/// without blocks answers air to reads and silently drops writes.
#[derive(Debug, Clone)]
pub struct ChunkSection {
    y: i8,
    blocks: Option<Vec<BlockHandle>>,
    block_light: Option<NibbleArray>,
    sky_light: Option<NibbleArray>,
}

impl ChunkSection {
    /// Creates a section filled with air.
    pub fn new(y: i8) -> Self {
        Self {
            y,
            blocks: Some(vec![AIR; SECTION_VOLUME]),
            block_light: None,
            sky_light: None,
        }
    }

    /// Creates a section with no block data at all.
    pub fn empty(y: i8) -> Self {
        Self {
            y,
            blocks: None,
            block_light: None,
            sky_light: None,
        }
    }

    pub fn y(&self) -> i8 {
        self.y
    }

    pub fn has_blocks(&self) -> bool {
        self.blocks.is_some()
    }

    pub fn block_light(&self) -> Option<&NibbleArray> {
        self.block_light.as_ref()
    }

    pub fn sky_light(&self) -> Option<&NibbleArray> {
        self.sky_light.as_ref()
    }

    /// Reads the block at section-local coordinates, air when no block data
    /// is present.
    ///
    /// # Panics
    ///
    /// Panics if any coordinate is outside `[0, 16)`.
    pub fn get_block(&self, x: usize, y: usize, z: usize) -> BlockHandle {
        assert!(x < 16 && y < 16 && z < 16, "section coordinate out of range");
        match &self.blocks {
            Some(blocks) => blocks[block_index(x, y, z)],
            None => AIR,
        }
    }

    /// Writes the block at section-local coordinates.
    ///
    /// Returns whether the write applied; a section without block data
    /// drops writes.
    ///
    /// # Panics
    ///
    /// Panics if any coordinate is outside `[0, 16)`.
    pub fn set_block(&mut self, x: usize, y: usize, z: usize, handle: BlockHandle) -> bool {
        assert!(x < 16 && y < 16 && z < 16, "section coordinate out of range");
        match &mut self.blocks {
            Some(blocks) => {
                blocks[block_index(x, y, z)] = handle;
                true
            }
            None => false,
        }
    }

    /// Translates one entry of the `Sections` list.
    pub fn from_nbt(section: &IndexMap<String, NbtTag>) -> Result<Self, ChunkError> {
        let y = require(section, "Y")?
            .as_i8()
            .ok_or_else(|| malformed("section `Y` is not a Byte"))?;

        let block_light = read_light(section, "BlockLight")?;
        let sky_light = read_light(section, "SkyLight")?;

        let palette = match section.get("Palette") {
            Some(tag) => Some(read_palette(tag)?),
            None => None,
        };
        let states = match section.get("BlockStates") {
            Some(tag) => Some(
                tag.as_long_array()
                    .ok_or_else(|| malformed("`BlockStates` is not a LongArray"))?,
            ),
            None => None,
        };

        // Blocks materialize only when the palette and the packed indices
        // are both present.
        let blocks = match (palette, states) {
            (Some(palette), Some(states)) => {
                let indices = palette::unpack(states, palette.len())?;
                let mut blocks = Vec::with_capacity(SECTION_VOLUME);
                for index in indices {
                    let handle = palette.get(index as usize).ok_or_else(|| {
                        malformed(format!(
                            "block state index {index} out of bounds for palette of {}",
                            palette.len()
                        ))
                    })?;
                    blocks.push(*handle);
                }
                Some(blocks)
            }
            _ => None,
        };

        Ok(Self {
            y,
            blocks,
            block_light,
            sky_light,
        })
    }

    /// Emits the section compound.
    ///
    /// The palette is rebuilt as the distinct handles in order of first
    /// appearance, so unreferenced palette entries never survive a
    /// re-encode.
    pub fn to_nbt(&self) -> NbtTag {
        let mut map = IndexMap::new();
        map.insert("Y".to_string(), NbtTag::Byte(self.y));

        if let Some(blocks) = &self.blocks {
            let mut distinct: IndexSet<BlockHandle> = IndexSet::new();
            for handle in blocks {
                distinct.insert(*handle);
            }
            let indices: Vec<u16> = blocks
                .iter()
                .map(|handle| distinct.get_index_of(handle).unwrap_or(0) as u16)
                .collect();
            let palette_tags: Vec<NbtTag> = distinct
                .iter()
                .map(|handle| block::lookup(*handle).to_nbt())
                .collect();
            map.insert("Palette".to_string(), NbtTag::List(palette_tags));
            map.insert(
                "BlockStates".to_string(),
                NbtTag::LongArray(palette::pack(&indices, distinct.len())),
            );
        }
        if let Some(light) = &self.block_light {
            map.insert(
                "BlockLight".to_string(),
                NbtTag::ByteArray(light.as_packed().to_vec()),
            );
        }
        if let Some(light) = &self.sky_light {
            map.insert(
                "SkyLight".to_string(),
                NbtTag::ByteArray(light.as_packed().to_vec()),
            );
        }
        NbtTag::Compound(map)
    }
}

fn read_light(
    section: &IndexMap<String, NbtTag>,
    key: &str,
) -> Result<Option<NibbleArray>, ChunkError> {
    match section.get(key) {
        None => Ok(None),
        Some(tag) => {
            let bytes = tag
                .as_byte_array()
                .ok_or_else(|| malformed(format!("`{key}` is not a ByteArray")))?;
            let array = NibbleArray::from_packed(bytes)
                .ok_or_else(|| malformed(format!("`{key}` has {} bytes, expected 2048", bytes.len())))?;
            Ok(Some(array))
        }
    }
}

/// Interns every palette entry, yielding handles in palette order.
fn read_palette(tag: &NbtTag) -> Result<Vec<BlockHandle>, ChunkError> {
    let entries = tag
        .as_list()
        .ok_or_else(|| malformed("`Palette` is not a List"))?;
    let mut handles = Vec::with_capacity(entries.len());
    for entry in entries {
        let map = entry
            .as_compound()
            .ok_or_else(|| malformed("palette entry is not a Compound"))?;
        let name = require(map, "Name")?
            .as_str()
            .ok_or_else(|| malformed("palette `Name` is not a String"))?;
        let mut properties = Properties::new();
        if let Some(props_tag) = map.get("Properties") {
            let props = props_tag
                .as_compound()
                .ok_or_else(|| malformed("palette `Properties` is not a Compound"))?;
            for (key, value) in props {
                let value = value
                    .as_str()
                    .ok_or_else(|| malformed(format!("palette property `{key}` is not a String")))?;
                properties.insert(key.clone(), value.to_string());
            }
        }
        handles.push(block::intern(name, properties));
    }
    Ok(handles)
}

/// A 16×256×16 column of blocks plus the game data the core carries through
/// opaquely.
#[derive(Debug, Clone)]
pub struct Chunk {
    data_version: i32,
    x_pos: i32,
    z_pos: i32,
    inhabited_time: i64,
    last_update: i64,
    sections: BTreeMap<i8, ChunkSection>,
    /// Uninterpreted `Level` fields, in encounter order.
    extra: IndexMap<String, NbtTag>,
    dirty: bool,
}

impl Chunk {
    /// Creates an empty chunk with no sections.
    pub fn new(data_version: i32, x_pos: i32, z_pos: i32) -> Self {
        Self {
            data_version,
            x_pos,
            z_pos,
            inhabited_time: 0,
            last_update: 0,
            sections: BTreeMap::new(),
            extra: IndexMap::new(),
            dirty: true,
        }
    }

    pub fn data_version(&self) -> i32 {
        self.data_version
    }

    pub fn x_pos(&self) -> i32 {
        self.x_pos
    }

    pub fn z_pos(&self) -> i32 {
        self.z_pos
    }

    pub fn inhabited_time(&self) -> i64 {
        self.inhabited_time
    }

    pub fn last_update(&self) -> i64 {
        self.last_update
    }

    pub fn sections(&self) -> impl Iterator<Item = &ChunkSection> {
        self.sections.values()
    }

    pub fn section(&self, y: i8) -> Option<&ChunkSection> {
        self.sections.get(&y)
    }

    /// Pass-through `Level` fields this library does not interpret.
    pub fn extra(&self) -> &IndexMap<String, NbtTag> {
        &self.extra
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn locate(x: usize, y: i32, z: usize) -> Result<(i8, usize), ChunkError> {
        let section_y = y.div_euclid(16);
        if x >= 16 || z >= 16 || !(-1..=16).contains(&section_y) {
            return Err(ChunkError::OutOfRange(format!("block ({x}, {y}, {z})")));
        }
        Ok((section_y as i8, y.rem_euclid(16) as usize))
    }

    /// Reads the block at chunk-local coordinates. A missing section, or a
    /// section without block data, reads as air.
    pub fn get_block(&self, x: usize, y: i32, z: usize) -> Result<BlockHandle, ChunkError> {
        let (section_y, local_y) = Self::locate(x, y, z)?;
        Ok(self
            .sections
            .get(&section_y)
            .map(|section| section.get_block(x, local_y, z))
            .unwrap_or(AIR))
    }

    /// Writes the block at chunk-local coordinates.
    ///
    /// A missing section is created air-filled. A present section without
    /// block data drops the write, and the chunk stays clean.
    pub fn set_block(&mut self, x: usize, y: i32, z: usize, handle: BlockHandle) -> Result<(), ChunkError> {
        let (section_y, local_y) = Self::locate(x, y, z)?;
        let section = self
            .sections
            .entry(section_y)
            .or_insert_with(|| ChunkSection::new(section_y));
        if section.set_block(x, local_y, z, handle) {
            self.dirty = true;
        }
        Ok(())
    }

    /// Interns `(id, properties)` and writes it, like [`Chunk::set_block`].
    pub fn set_block_named(
        &mut self,
        x: usize,
        y: i32,
        z: usize,
        id: &str,
        properties: Properties,
    ) -> Result<(), ChunkError> {
        self.set_block(x, y, z, block::intern(id, properties))
    }

    /// Decodes a chunk from its root NBT compound.
    pub fn from_nbt(root: &NbtTag) -> Result<Self, ChunkError> {
        let root_map = root
            .as_compound()
            .ok_or_else(|| malformed("chunk root is not a Compound"))?;
        let data_version = require(root_map, "DataVersion")?
            .as_i32()
            .ok_or_else(|| malformed("`DataVersion` is not an Int"))?;
        let level = require(root_map, "Level")?
            .as_compound()
            .ok_or_else(|| malformed("`Level` is not a Compound"))?;

        let x_pos = require(level, "xPos")?
            .as_i32()
            .ok_or_else(|| malformed("`xPos` is not an Int"))?;
        let z_pos = require(level, "zPos")?
            .as_i32()
            .ok_or_else(|| malformed("`zPos` is not an Int"))?;
        let inhabited_time = require(level, "InhabitedTime")?
            .as_i64()
            .ok_or_else(|| malformed("`InhabitedTime` is not a Long"))?;
        let last_update = require(level, "LastUpdate")?
            .as_i64()
            .ok_or_else(|| malformed("`LastUpdate` is not a Long"))?;

        let section_tags = require(level, "Sections")?
            .as_list()
            .ok_or_else(|| malformed("`Sections` is not a List"))?;
        let mut sections = BTreeMap::new();
        for tag in section_tags {
            let map = tag
                .as_compound()
                .ok_or_else(|| malformed("section entry is not a Compound"))?;
            let section = ChunkSection::from_nbt(map)?;
            sections.insert(section.y(), section);
        }

        let extra = level
            .iter()
            .filter(|(key, _)| !INTERPRETED_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            data_version,
            x_pos,
            z_pos,
            inhabited_time,
            last_update,
            sections,
            extra,
            dirty: false,
        })
    }

    /// Re-encodes the chunk. Sections are emitted in ascending Y order and
    /// pass-through fields verbatim.
    pub fn to_nbt(&self) -> NbtTag {
        let mut level = IndexMap::new();
        level.insert("xPos".to_string(), NbtTag::Int(self.x_pos));
        level.insert("zPos".to_string(), NbtTag::Int(self.z_pos));
        level.insert("LastUpdate".to_string(), NbtTag::Long(self.last_update));
        level.insert(
            "InhabitedTime".to_string(),
            NbtTag::Long(self.inhabited_time),
        );
        level.insert(
            "Sections".to_string(),
            NbtTag::List(self.sections.values().map(ChunkSection::to_nbt).collect()),
        );
        for (key, value) in &self.extra {
            level.insert(key.clone(), value.clone());
        }

        let mut root = IndexMap::new();
        root.insert("DataVersion".to_string(), NbtTag::Int(self.data_version));
        root.insert("Level".to_string(), NbtTag::Compound(level));
        NbtTag::Compound(root)
    }
}

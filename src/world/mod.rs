// Copyright 2026 driedpampas@proton.me
// SPDX-License-Identifier: GPL-3.0-or-later

//! Chunk data: block states, palettes, light arrays, and the chunk ↔ NBT
//! translation layer.

pub mod block;
pub mod chunk;
pub mod nibble;
pub mod palette;

pub use block::{BlockHandle, BlockState};
pub use chunk::{Chunk, ChunkSection};
pub use nibble::NibbleArray;

use crate::nbt::NbtError;
use thiserror::Error;

/// Errors from the chunk translator and block accessors.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// A required chunk NBT field is absent or has the wrong type.
    #[error("malformed chunk: {0}")]
    MalformedChunk(String),
    /// A block coordinate or section Y is outside the defined bounds.
    #[error("out of range: {0}")]
    OutOfRange(String),
    /// An NBT codec failure while translating a chunk.
    #[error(transparent)]
    Nbt(#[from] NbtError),
}

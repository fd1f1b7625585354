// Copyright 2026 driedpampas@proton.me
// SPDX-License-Identifier: GPL-3.0-or-later

#![cfg_attr(docsrs, feature(doc_cfg))]

//! # mcanvil
//!
//! A Rust library for reading and editing Minecraft's NBT and Anvil (.mca) world data.
//!
//! This library provides efficient, safe, and bit-perfect handling of Minecraft world data.
//! Key features include:
//! - Full NBT support (including Modified UTF-8)
//! - Lazy-loading Anvil region files with memory mapping
//! - Atomic region saves that preserve untouched chunks byte-exactly
//! - Block access through a deduplicated, process-wide block-state registry
//! - Idempotent round-trips for NBT, chunk, and region data

pub mod anvil;
pub mod nbt;
pub mod world;

// Copyright 2026 driedpampas@proton.me
// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

/// Errors that can occur while decoding or encoding NBT data.
#[derive(Debug, Error)]
pub enum NbtError {
    /// The input ended unexpectedly before a tag or field could be fully read.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// An unknown or invalid NBT tag type ID was encountered.
    #[error("unknown tag type: {0}")]
    UnknownTag(u8),
    /// A string field could not be decoded as Modified UTF-8.
    #[error("string is not valid Modified UTF-8")]
    MalformedString,
    /// An array or list carried a negative length prefix.
    #[error("negative length prefix: {0}")]
    MalformedLength(i32),
    /// A list declared element type 0 (End) with a nonzero length.
    #[error("typeless list with nonzero length")]
    MalformedList,
    /// A string's Modified UTF-8 form exceeds the u16 length prefix.
    #[error("string of {0} bytes does not fit the u16 length prefix")]
    StringTooLong(usize),
    /// An array's length exceeds the i32 length prefix.
    #[error("array of {0} elements does not fit the i32 length prefix")]
    ArrayTooLong(usize),
    /// A list contained elements of more than one tag type.
    #[error("list elements do not all match the declared element type")]
    HeterogeneousList,
    /// An underlying I/O error from the writer.
    #[error("io error")]
    Io(#[from] std::io::Error),
}

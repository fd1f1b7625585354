// Copyright 2026 driedpampas@proton.me
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::nbt::mutf8::decode_mutf8;
use crate::nbt::{NbtError, NbtTag};
use indexmap::IndexMap;

/// A reader that maintains a cursor over a byte slice for manual parsing.
pub struct ByteReader<'a> {
    /// The remaining data to be read.
    pub data: &'a [u8],
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    #[inline]
    fn read_u8(&mut self) -> Result<u8, NbtError> {
        if self.data.is_empty() {
            return Err(NbtError::UnexpectedEof);
        }
        let b = self.data[0];
        self.data = &self.data[1..];
        Ok(b)
    }

    #[inline]
    fn read_i8(&mut self) -> Result<i8, NbtError> {
        self.read_u8().map(|b| b as i8)
    }

    #[inline]
    fn read_u16(&mut self) -> Result<u16, NbtError> {
        if self.data.len() < 2 {
            return Err(NbtError::UnexpectedEof);
        }
        let bytes = [self.data[0], self.data[1]];
        self.data = &self.data[2..];
        Ok(u16::from_be_bytes(bytes))
    }

    #[inline]
    fn read_i16(&mut self) -> Result<i16, NbtError> {
        self.read_u16().map(|v| v as i16)
    }

    #[inline]
    fn read_i32(&mut self) -> Result<i32, NbtError> {
        if self.data.len() < 4 {
            return Err(NbtError::UnexpectedEof);
        }
        let bytes = [self.data[0], self.data[1], self.data[2], self.data[3]];
        self.data = &self.data[4..];
        Ok(i32::from_be_bytes(bytes))
    }

    #[inline]
    fn read_i64(&mut self) -> Result<i64, NbtError> {
        if self.data.len() < 8 {
            return Err(NbtError::UnexpectedEof);
        }
        let bytes: [u8; 8] = self.data[..8].try_into().unwrap();
        self.data = &self.data[8..];
        Ok(i64::from_be_bytes(bytes))
    }

    #[inline]
    fn read_f32(&mut self) -> Result<f32, NbtError> {
        self.read_i32().map(|v| f32::from_bits(v as u32))
    }

    #[inline]
    fn read_f64(&mut self) -> Result<f64, NbtError> {
        self.read_i64().map(|v| f64::from_bits(v as u64))
    }

    /// Reads an i32 length prefix, rejecting negative values.
    #[inline]
    fn read_length(&mut self) -> Result<usize, NbtError> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(NbtError::MalformedLength(len));
        }
        Ok(len as usize)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], NbtError> {
        if self.data.len() < len {
            return Err(NbtError::UnexpectedEof);
        }
        let bytes = &self.data[..len];
        self.data = &self.data[len..];
        Ok(bytes)
    }
}

/// Parses a length-prefixed Modified UTF-8 string from the input.
pub fn parse_nbt_string(reader: &mut ByteReader) -> Result<String, NbtError> {
    let len = reader.read_u16()? as usize;
    let bytes = reader.read_bytes(len)?;
    decode_mutf8(bytes).map_err(|_| NbtError::MalformedString)
}

/// Parses the payload of an NBT tag based on its type ID.
pub fn parse_tag_payload(reader: &mut ByteReader, type_id: u8) -> Result<NbtTag, NbtError> {
    match type_id {
        0 => Ok(NbtTag::End),
        1 => Ok(NbtTag::Byte(reader.read_i8()?)),
        2 => Ok(NbtTag::Short(reader.read_i16()?)),
        3 => Ok(NbtTag::Int(reader.read_i32()?)),
        4 => Ok(NbtTag::Long(reader.read_i64()?)),
        5 => Ok(NbtTag::Float(reader.read_f32()?)),
        6 => Ok(NbtTag::Double(reader.read_f64()?)),
        7 => {
            let len = reader.read_length()?;
            let bytes = reader.read_bytes(len)?;
            Ok(NbtTag::ByteArray(bytes.to_vec()))
        }
        8 => Ok(NbtTag::String(parse_nbt_string(reader)?)),
        9 => {
            let element_type = reader.read_u8()?;
            let len = reader.read_length()?;
            if element_type == 0 && len > 0 {
                return Err(NbtError::MalformedList);
            }
            let mut elements = Vec::with_capacity(len.min(reader.data.len()));
            for _ in 0..len {
                elements.push(parse_tag_payload(reader, element_type)?);
            }
            Ok(NbtTag::List(elements))
        }
        10 => {
            let mut map = IndexMap::new();
            loop {
                let tag_type = reader.read_u8()?;
                if tag_type == 0 {
                    break;
                }
                let name = parse_nbt_string(reader)?;
                let payload = parse_tag_payload(reader, tag_type)?;
                map.insert(name, payload);
            }
            Ok(NbtTag::Compound(map))
        }
        11 => {
            let len = reader.read_length()?;
            let bytes = reader.read_bytes(len * 4)?;
            let mut ints = Vec::with_capacity(len);
            for chunk in bytes.chunks_exact(4) {
                ints.push(i32::from_be_bytes(chunk.try_into().unwrap()));
            }
            Ok(NbtTag::IntArray(ints))
        }
        12 => {
            let len = reader.read_length()?;
            let bytes = reader.read_bytes(len * 8)?;
            let mut longs = Vec::with_capacity(len);
            for chunk in bytes.chunks_exact(8) {
                longs.push(i64::from_be_bytes(chunk.try_into().unwrap()));
            }
            Ok(NbtTag::LongArray(longs))
        }
        _ => Err(NbtError::UnknownTag(type_id)),
    }
}

/// Parses a named tag (type ID + name + payload) from the input.
///
/// This is the entry point for parsing top-level NBT data (like `level.dat`
/// or a decompressed chunk). On success, returns the name of the tag and the
/// tag itself, and updates `input` to point to the remaining bytes.
pub fn parse_named_tag(input: &mut &[u8]) -> Result<(String, NbtTag), NbtError> {
    let mut reader = ByteReader::new(input);
    let tag_type = reader.read_u8()?;
    if tag_type == 0 {
        *input = reader.data;
        return Ok((String::new(), NbtTag::End));
    }
    let name = parse_nbt_string(&mut reader)?;
    let payload = parse_tag_payload(&mut reader, tag_type)?;
    *input = reader.data;
    Ok((name, payload))
}

// Copyright 2026 driedpampas@proton.me
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::nbt::mutf8::encode_mutf8;
use crate::nbt::{NbtError, NbtTag};
use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;

/// Writes a length-prefixed Modified UTF-8 string to the writer.
///
/// Fails with [`NbtError::StringTooLong`] if the encoded form does not fit
/// the u16 length prefix.
pub fn write_nbt_string<W: Write>(writer: &mut W, s: &str) -> Result<(), NbtError> {
    let bytes = encode_mutf8(s);
    if bytes.len() > u16::MAX as usize {
        return Err(NbtError::StringTooLong(bytes.len()));
    }
    writer.write_u16::<BigEndian>(bytes.len() as u16)?;
    writer.write_all(&bytes)?;
    Ok(())
}

fn array_length(len: usize) -> Result<i32, NbtError> {
    i32::try_from(len).map_err(|_| NbtError::ArrayTooLong(len))
}

/// Writes the payload of an NBT tag to the writer.
///
/// This does not include the type ID or the name of the tag.
pub fn write_tag_payload<W: Write>(writer: &mut W, tag: &NbtTag) -> Result<(), NbtError> {
    match tag {
        NbtTag::End => Ok(()),
        NbtTag::Byte(v) => Ok(writer.write_i8(*v)?),
        NbtTag::Short(v) => Ok(writer.write_i16::<BigEndian>(*v)?),
        NbtTag::Int(v) => Ok(writer.write_i32::<BigEndian>(*v)?),
        NbtTag::Long(v) => Ok(writer.write_i64::<BigEndian>(*v)?),
        NbtTag::Float(v) => Ok(writer.write_f32::<BigEndian>(*v)?),
        NbtTag::Double(v) => Ok(writer.write_f64::<BigEndian>(*v)?),
        NbtTag::ByteArray(v) => {
            writer.write_i32::<BigEndian>(array_length(v.len())?)?;
            Ok(writer.write_all(v)?)
        }
        NbtTag::String(v) => write_nbt_string(writer, v),
        NbtTag::List(v) => {
            if v.is_empty() {
                writer.write_u8(0)?; // Tag_End as element type
                writer.write_i32::<BigEndian>(0)?;
            } else {
                let element_type = v[0].get_type_id();
                if v.iter().any(|e| e.get_type_id() != element_type) {
                    return Err(NbtError::HeterogeneousList);
                }
                writer.write_u8(element_type)?;
                writer.write_i32::<BigEndian>(array_length(v.len())?)?;
                for element in v {
                    write_tag_payload(writer, element)?;
                }
            }
            Ok(())
        }
        NbtTag::Compound(v) => {
            for (name, tag) in v {
                writer.write_u8(tag.get_type_id())?;
                write_nbt_string(writer, name)?;
                write_tag_payload(writer, tag)?;
            }
            writer.write_u8(0)?; // Tag_End
            Ok(())
        }
        NbtTag::IntArray(v) => {
            writer.write_i32::<BigEndian>(array_length(v.len())?)?;
            for &i in v {
                writer.write_i32::<BigEndian>(i)?;
            }
            Ok(())
        }
        NbtTag::LongArray(v) => {
            writer.write_i32::<BigEndian>(array_length(v.len())?)?;
            for &i in v {
                writer.write_i64::<BigEndian>(i)?;
            }
            Ok(())
        }
    }
}

/// Writes a named tag (type ID + name + payload) to the writer.
///
/// This is the standard way to encode a root NBT tag for storage.
pub fn write_named_tag<W: Write>(writer: &mut W, name: &str, tag: &NbtTag) -> Result<(), NbtError> {
    writer.write_u8(tag.get_type_id())?;
    write_nbt_string(writer, name)?;
    write_tag_payload(writer, tag)?;
    Ok(())
}

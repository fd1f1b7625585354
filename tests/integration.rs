use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::{GzEncoder, ZlibEncoder};
use indexmap::IndexMap;
use mcanvil::anvil::{RegionError, RegionFile};
use mcanvil::nbt::NbtTag;
use mcanvil::nbt::encode::write_named_tag;
use mcanvil::nbt::parse::parse_named_tag;
use mcanvil::world::block::{self, Properties};
use mcanvil::world::{Chunk, ChunkSection};
use std::io::{Read, Write};
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("mcanvil-{name}-{}.mca", std::process::id()))
}

#[test]
fn test_complex_nbt_round_trip_gzip() {
    let mut root_map = IndexMap::new();

    // Some basic types
    root_map.insert("byte".to_string(), NbtTag::Byte(127));
    root_map.insert("short".to_string(), NbtTag::Short(32767));
    root_map.insert("int".to_string(), NbtTag::Int(2147483647));
    root_map.insert("long".to_string(), NbtTag::Long(i64::MIN));
    root_map.insert("float".to_string(), NbtTag::Float(3.5));
    root_map.insert("double".to_string(), NbtTag::Double(-0.25));

    // List of Strings
    let list = vec![
        NbtTag::String("A".to_string()),
        NbtTag::String("B".to_string()),
        NbtTag::String("C".to_string()),
    ];
    root_map.insert("list".to_string(), NbtTag::List(list));

    // Arrays
    root_map.insert("byteArray".to_string(), NbtTag::ByteArray(vec![0, 127, 255]));
    root_map.insert("intArray".to_string(), NbtTag::IntArray(vec![1, -2, 3]));
    root_map.insert("longArray".to_string(), NbtTag::LongArray(vec![i64::MAX, -1]));

    // Compound
    let mut nested = IndexMap::new();
    nested.insert("key".to_string(), NbtTag::String("value".to_string()));
    root_map.insert("nested".to_string(), NbtTag::Compound(nested));

    let root = NbtTag::Compound(root_map);

    // 1. Encode
    let mut raw_buf = Vec::new();
    write_named_tag(&mut raw_buf, "Level", &root).expect("Failed to encode");

    // 2. Gzip (Simulating level.dat)
    let mut gzipped = Vec::new();
    let mut encoder = GzEncoder::new(&mut gzipped, Compression::default());
    encoder.write_all(&raw_buf).expect("Failed to gzip");
    encoder.finish().expect("Failed to finish gzip");

    // 3. Gunzip
    let mut decoder = GzDecoder::new(&gzipped[..]);
    let mut unzipped = Vec::new();
    decoder
        .read_to_end(&mut unzipped)
        .expect("Failed to gunzip");
    assert_eq!(unzipped, raw_buf);

    // 4. Decode
    let mut input = &unzipped[..];
    let (name, decoded) = parse_named_tag(&mut input).expect("Failed to decode");

    assert_eq!(name, "Level");
    assert_eq!(decoded, root);

    // Key order must survive, not just the key set.
    let original_keys: Vec<&String> = match &root {
        NbtTag::Compound(map) => map.keys().collect(),
        _ => unreachable!(),
    };
    let decoded_keys: Vec<&String> = match &decoded {
        NbtTag::Compound(map) => map.keys().collect(),
        _ => unreachable!(),
    };
    assert_eq!(original_keys, decoded_keys);
}

#[test]
fn test_known_byte_layout() {
    let mut map = IndexMap::new();
    map.insert("hello".to_string(), NbtTag::String("world".to_string()));
    map.insert("n".to_string(), NbtTag::Int(42));
    let mut buf = Vec::new();
    write_named_tag(&mut buf, "", &NbtTag::Compound(map)).unwrap();
    assert_eq!(
        buf,
        vec![
            0x0A, 0x00, 0x00, // Compound, empty name
            0x08, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o', 0x00, 0x05, b'w', b'o', b'r', b'l',
            b'd', // String "hello" = "world"
            0x03, 0x00, 0x01, b'n', 0x00, 0x00, 0x00, 0x2A, // Int "n" = 42
            0x00, // Tag_End
        ]
    );
}

/// Builds a chunk NBT tree the way the game lays it out.
fn chunk_nbt(x: i32, z: i32) -> NbtTag {
    let mut section = IndexMap::new();
    section.insert("Y".to_string(), NbtTag::Byte(0));
    section.insert(
        "Palette".to_string(),
        NbtTag::List(vec![
            block::lookup(block::intern_simple("air")).to_nbt(),
            block::lookup(block::intern_simple("stone")).to_nbt(),
        ]),
    );
    // All stone except block 0.
    let mut indices = vec![1u16; 4096];
    indices[0] = 0;
    section.insert(
        "BlockStates".to_string(),
        NbtTag::LongArray(mcanvil::world::palette::pack(&indices, 2)),
    );

    let mut level = IndexMap::new();
    level.insert("xPos".to_string(), NbtTag::Int(x));
    level.insert("zPos".to_string(), NbtTag::Int(z));
    level.insert("LastUpdate".to_string(), NbtTag::Long(123456));
    level.insert("InhabitedTime".to_string(), NbtTag::Long(99));
    level.insert(
        "Sections".to_string(),
        NbtTag::List(vec![NbtTag::Compound(section)]),
    );
    level.insert("Status".to_string(), NbtTag::String("full".to_string()));
    // Incompressible ballast so the chunk spans several sectors.
    let mut seed = 0x9E3779B97F4A7C15u64 ^ ((x as u64) << 32 | z as u64 & 0xFFFF_FFFF);
    let ballast: Vec<i64> = (0..3000)
        .map(|_| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            seed as i64
        })
        .collect();
    level.insert("PostProcessing".to_string(), NbtTag::LongArray(ballast));

    let mut root = IndexMap::new();
    root.insert("DataVersion".to_string(), NbtTag::Int(2230));
    root.insert("Level".to_string(), NbtTag::Compound(level));
    NbtTag::Compound(root)
}

/// Assembles a full region file image with the given chunks packed in
/// ascending sector order.
fn region_image(chunks: &[(i32, i32)]) -> Vec<u8> {
    let mut locations = vec![0u8; 4096];
    let mut timestamps = vec![0u8; 4096];
    let mut body = Vec::new();
    let mut next_sector = 2u32;
    for &(x, z) in chunks {
        let mut raw = Vec::new();
        write_named_tag(&mut raw, "", &chunk_nbt(x, z)).unwrap();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        let compressed = encoder.finish().unwrap();

        let data_length = compressed.len() + 1;
        let total = data_length + 4;
        let padding = (4096 - total % 4096) % 4096;
        body.extend_from_slice(&(data_length as u32).to_be_bytes());
        body.push(2);
        body.extend_from_slice(&compressed);
        body.extend(std::iter::repeat_n(0u8, padding));

        let count = ((total + padding) / 4096) as u32;
        let index = ((x & 31) | ((z & 31) << 5)) as usize;
        let offset_bytes = next_sector.to_be_bytes();
        locations[index * 4..index * 4 + 4].copy_from_slice(&[
            offset_bytes[1],
            offset_bytes[2],
            offset_bytes[3],
            count as u8,
        ]);
        timestamps[index * 4..index * 4 + 4].copy_from_slice(&1_600_000_000u32.to_be_bytes());
        next_sector += count;
    }
    let mut image = locations;
    image.extend_from_slice(&timestamps);
    image.extend_from_slice(&body);
    image
}

#[test]
fn test_clean_save_is_byte_identical() {
    let path = temp_path("clean-save");
    let image = region_image(&[(0, 0)]);
    std::fs::write(&path, &image).unwrap();

    let mut region = RegionFile::open(&path).unwrap();
    assert!(region.has_chunk(0, 0));
    assert!(!region.has_chunk(1, 0));
    assert_eq!(region.timestamp(0, 0), 1_600_000_000);

    // Loading a chunk without mutating it must not dirty anything.
    assert!(region.read_chunk(0, 0).unwrap().is_some());
    region.save().unwrap();

    let saved = std::fs::read(&path).unwrap();
    assert_eq!(saved, image);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_dirty_save_preserves_clean_chunks() {
    let path = temp_path("dirty-save");
    std::fs::write(&path, region_image(&[(0, 0), (5, 7)])).unwrap();

    let mut region = RegionFile::open(&path).unwrap();
    let clean_before = region.read_chunk_raw(5, 7).unwrap().unwrap();
    let old_timestamp = region.timestamp(5, 7);

    let chunk = region.read_chunk(0, 0).unwrap().unwrap();
    chunk
        .set_block_named(3, 3, 3, "bedrock", Properties::new())
        .unwrap();
    region.save().unwrap();

    // The untouched chunk survives byte-exactly, timestamp included.
    let mut reopened = RegionFile::open(&path).unwrap();
    assert_eq!(reopened.read_chunk_raw(5, 7).unwrap().unwrap(), clean_before);
    assert_eq!(reopened.timestamp(5, 7), old_timestamp);
    assert!(reopened.timestamp(0, 0) > old_timestamp);

    let chunk = reopened.read_chunk(0, 0).unwrap().unwrap();
    assert_eq!(
        chunk.get_block(3, 3, 3).unwrap(),
        block::intern_simple("bedrock")
    );
    assert_eq!(
        chunk.get_block(1, 1, 1).unwrap(),
        block::intern_simple("stone")
    );
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_save_failure_leaves_original_untouched() {
    let path = temp_path("aborted-save");
    let image = region_image(&[(0, 0)]);
    std::fs::write(&path, &image).unwrap();
    // A stale temp file from an aborted save is simply overwritten.
    let mut out_path = path.clone().into_os_string();
    out_path.push(".out");
    std::fs::write(&out_path, b"stale").unwrap();

    let mut region = RegionFile::open(&path).unwrap();
    region.save().unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), image);
    assert!(!std::path::Path::new(&out_path).exists());
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_undersized_region_rejected() {
    let path = temp_path("undersized");
    std::fs::write(&path, vec![0u8; 8193]).unwrap();
    assert!(matches!(
        RegionFile::open(&path),
        Err(RegionError::MalformedRegion(_))
    ));
    std::fs::write(&path, vec![0u8; 4096]).unwrap();
    assert!(matches!(
        RegionFile::open(&path),
        Err(RegionError::MalformedRegion(_))
    ));
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_missing_region_file() {
    assert!(matches!(
        RegionFile::open(temp_path("never-created")),
        Err(RegionError::FileNotFound(_))
    ));
}

#[test]
fn test_header_offset_into_header_rejected() {
    let path = temp_path("bad-offset");
    let mut image = vec![0u8; 8192];
    // Slot 0: offset 1 (inside the header), count 1.
    image[0..4].copy_from_slice(&[0, 0, 1, 1]);
    std::fs::write(&path, &image).unwrap();
    assert!(matches!(
        RegionFile::open(&path),
        Err(RegionError::MalformedRegion(_))
    ));
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_overlapping_sectors_rejected() {
    let path = temp_path("overlap");
    let mut image = vec![0u8; 8192 + 4096 * 3];
    image[0..4].copy_from_slice(&[0, 0, 2, 2]);
    image[4..8].copy_from_slice(&[0, 0, 3, 1]);
    std::fs::write(&path, &image).unwrap();
    assert!(matches!(
        RegionFile::open(&path),
        Err(RegionError::MalformedRegion(_))
    ));
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_unknown_compression_rejected() {
    let path = temp_path("bad-compression");
    let mut image = vec![0u8; 8192 + 4096];
    image[0..4].copy_from_slice(&[0, 0, 2, 1]);
    image[8192..8196].copy_from_slice(&10u32.to_be_bytes());
    image[8196] = 7;
    std::fs::write(&path, &image).unwrap();
    let region = RegionFile::open(&path).unwrap();
    assert!(matches!(
        region.read_chunk_raw(0, 0),
        Err(RegionError::UnknownCompression(7))
    ));
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_gzip_chunk_payload_accepted() {
    let path = temp_path("gzip-chunk");
    let mut raw = Vec::new();
    write_named_tag(&mut raw, "", &chunk_nbt(0, 0)).unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw).unwrap();
    let compressed = encoder.finish().unwrap();

    let data_length = compressed.len() + 1;
    let total = data_length + 4;
    let padding = (4096 - total % 4096) % 4096;
    let count = ((total + padding) / 4096) as u32;
    let mut image = vec![0u8; 8192];
    image[0..4].copy_from_slice(&[0, 0, 2, count as u8]);
    image.extend_from_slice(&(data_length as u32).to_be_bytes());
    image.push(1); // gzip
    image.extend_from_slice(&compressed);
    image.extend(std::iter::repeat_n(0u8, padding));
    std::fs::write(&path, &image).unwrap();

    let region = RegionFile::open(&path).unwrap();
    assert_eq!(region.read_chunk_raw(0, 0).unwrap().unwrap(), raw);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_write_chunk_into_empty_slot() {
    let path = temp_path("write-new");
    std::fs::write(&path, region_image(&[(0, 0)])).unwrap();

    let mut region = RegionFile::open(&path).unwrap();
    let mut fresh = Chunk::new(2230, 9, 4);
    fresh
        .set_block_named(0, 0, 0, "dirt", Properties::new())
        .unwrap();
    region.write_chunk(fresh);
    assert!(region.loaded_chunk(9, 4).is_some_and(Chunk::is_dirty));
    region.save().unwrap();

    let mut reopened = RegionFile::open(&path).unwrap();
    assert!(reopened.has_chunk(9, 4));
    let chunk = reopened.read_chunk(9, 4).unwrap().unwrap();
    assert_eq!(chunk.x_pos(), 9);
    assert_eq!(chunk.z_pos(), 4);
    assert_eq!(
        chunk.get_block(0, 0, 0).unwrap(),
        block::intern_simple("dirt")
    );
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_flush_chunk_in_place() {
    let path = temp_path("flush");
    std::fs::write(&path, region_image(&[(0, 0), (1, 0)])).unwrap();

    let mut region = RegionFile::open(&path).unwrap();
    let neighbor_before = region.read_chunk_raw(1, 0).unwrap().unwrap();

    // Nothing dirty yet, so nothing to flush.
    assert!(region.read_chunk(0, 0).unwrap().is_some());
    assert!(!region.flush_chunk(0, 0).unwrap());

    let chunk = region.read_chunk(0, 0).unwrap().unwrap();
    chunk
        .set_block_named(15, 15, 15, "bedrock", Properties::new())
        .unwrap();
    assert!(region.flush_chunk(0, 0).unwrap());
    assert!(!region.flush_chunk(0, 0).unwrap());

    // Reopening revalidates the sector invariants from the patched header.
    let mut reopened = RegionFile::open(&path).unwrap();
    assert_eq!(reopened.read_chunk_raw(1, 0).unwrap().unwrap(), neighbor_before);
    let chunk = reopened.read_chunk(0, 0).unwrap().unwrap();
    assert_eq!(
        chunk.get_block(15, 15, 15).unwrap(),
        block::intern_simple("bedrock")
    );
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_palette_shrinks_when_last_air_removed() {
    // Palette [air, stone], everything stone except block 0.
    let root = chunk_nbt(0, 0);
    let mut chunk = Chunk::from_nbt(&root).unwrap();
    let stone = block::intern_simple("stone");
    assert_eq!(chunk.get_block(0, 0, 0).unwrap(), block::AIR);
    assert_eq!(chunk.get_block(1, 0, 0).unwrap(), stone);

    chunk.set_block(0, 0, 0, stone).unwrap();
    let reencoded = chunk.to_nbt();
    let level = reencoded.as_compound().unwrap().get("Level").unwrap();
    let sections = level.as_compound().unwrap().get("Sections").unwrap();
    let section = sections.as_list().unwrap()[0].as_compound().unwrap();

    let palette = section.get("Palette").unwrap().as_list().unwrap();
    assert_eq!(palette.len(), 1);
    assert_eq!(
        palette[0].as_compound().unwrap().get("Name").unwrap().as_str(),
        Some("minecraft:stone")
    );
    let states = section.get("BlockStates").unwrap().as_long_array().unwrap();
    assert_eq!(states.len(), 256);
    assert!(states.iter().all(|&slot| slot == 0));
}

#[test]
fn test_states_without_palette_reads_air_drops_writes() {
    let mut section = IndexMap::new();
    section.insert("Y".to_string(), NbtTag::Byte(0));
    section.insert("BlockStates".to_string(), NbtTag::LongArray(vec![0; 256]));

    let mut level = IndexMap::new();
    level.insert("xPos".to_string(), NbtTag::Int(0));
    level.insert("zPos".to_string(), NbtTag::Int(0));
    level.insert("LastUpdate".to_string(), NbtTag::Long(0));
    level.insert("InhabitedTime".to_string(), NbtTag::Long(0));
    level.insert(
        "Sections".to_string(),
        NbtTag::List(vec![NbtTag::Compound(section)]),
    );
    let mut root = IndexMap::new();
    root.insert("DataVersion".to_string(), NbtTag::Int(2230));
    root.insert("Level".to_string(), NbtTag::Compound(level));

    let mut chunk = Chunk::from_nbt(&NbtTag::Compound(root)).unwrap();
    assert!(!chunk.section(0).unwrap().has_blocks());
    assert_eq!(chunk.get_block(4, 4, 4).unwrap(), block::AIR);

    chunk
        .set_block_named(4, 4, 4, "stone", Properties::new())
        .unwrap();
    assert_eq!(chunk.get_block(4, 4, 4).unwrap(), block::AIR);
    assert!(!chunk.is_dirty());
}

#[test]
fn test_chunk_round_trip_through_region() {
    let path = temp_path("chunk-round-trip");
    std::fs::write(&path, region_image(&[(2, 3)])).unwrap();

    let mut region = RegionFile::open(&path).unwrap();
    let original = region.read_chunk(2, 3).unwrap().unwrap().clone();

    let decoded = Chunk::from_nbt(&original.to_nbt()).unwrap();
    assert_eq!(decoded.data_version(), original.data_version());
    assert_eq!(decoded.x_pos(), original.x_pos());
    assert_eq!(decoded.z_pos(), original.z_pos());
    assert_eq!(decoded.inhabited_time(), original.inhabited_time());
    assert_eq!(decoded.last_update(), original.last_update());
    assert_eq!(decoded.extra(), original.extra());
    let original_ys: Vec<i8> = original.sections().map(ChunkSection::y).collect();
    let decoded_ys: Vec<i8> = decoded.sections().map(ChunkSection::y).collect();
    assert_eq!(decoded_ys, original_ys);
    for y in 0..16 {
        for z in 0..16 {
            for x in 0..16 {
                assert_eq!(
                    decoded.get_block(x, y, z).unwrap(),
                    original.get_block(x, y, z).unwrap()
                );
            }
        }
    }
    std::fs::remove_file(&path).ok();
}

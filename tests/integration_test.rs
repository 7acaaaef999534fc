use std::fs::{self, File};
use std::io::{Cursor, Write};
use tempfile::{tempdir, NamedTempFile};
use uomap::block::{ART_RECORD_SIZE, TERRAIN_BLOCK_SIZE};
use uomap::io_stream::{
    load_container, save_container, ChunkedBlocks, ContainerError, ContainerOptions,
    ContainerReader, ContainerWriter, EntryTemplate,
};
use uomap::map::flat::{IndexRecord, SENTINEL};
use uomap::map::uop::{terrain_template, UOP_RUN_LENGTH};
use uomap::{ArtTile, CodecId, DiffMode, MapError, TerrainBlock, TerrainCell, UoMap};

fn patterned_map(width: usize, height: usize) -> UoMap {
    let mut map = UoMap::new(0, width, height).unwrap();
    for x in 0..width {
        for y in 0..height {
            let tile = ((x * 31 + y * 7) % 0x4000) as u16;
            let alt = ((x + y) % 100) as i8 - 50;
            map.set_terrain(x, y, TerrainCell::new(tile, alt)).unwrap();
        }
    }
    map
}

fn block_bytes(tile: u16) -> Vec<u8> {
    let mut block = TerrainBlock::with_header(0x1234);
    block.fill(TerrainCell::new(tile, 1));
    block.as_bytes().to_vec()
}

fn write_file(bytes: &[u8]) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(bytes).unwrap();
    f.flush().unwrap();
    f
}

// ── Flat terrain ─────────────────────────────────────────────────────────────

#[test]
fn test_flat_terrain_exact_size_loads_verbatim() {
    let raw: Vec<u8> = (0..4 * TERRAIN_BLOCK_SIZE).map(|i| (i * 13 % 251) as u8).collect();
    let file = write_file(&raw);

    let mut map = UoMap::new(0, 16, 16).unwrap();
    map.load_terrain_mul(file.path()).unwrap();
    for (i, block) in map.terrain_blocks().iter().enumerate() {
        assert_eq!(&block.as_bytes()[..], &raw[i * TERRAIN_BLOCK_SIZE..(i + 1) * TERRAIN_BLOCK_SIZE]);
    }
}

#[test]
fn test_flat_terrain_one_byte_short_fails() {
    let raw = vec![7u8; 4 * TERRAIN_BLOCK_SIZE - 1];
    let file = write_file(&raw);

    let mut map = UoMap::new(0, 16, 16).unwrap();
    let err = map.load_terrain_mul(file.path());
    assert!(matches!(err, Err(MapError::ShortRead { what: "terrain", got, .. }) if got == TERRAIN_BLOCK_SIZE - 1));
    // Blocks before the short one are kept.
    assert_eq!(map.terrain_blocks()[2].as_bytes()[..], [7u8; TERRAIN_BLOCK_SIZE][..]);
    assert_eq!(map.terrain_blocks()[3], TerrainBlock::default());
}

#[test]
fn test_flat_terrain_missing_file_is_open_error() {
    let dir = tempdir().unwrap();
    let mut map = UoMap::new(0, 16, 16).unwrap();
    let err = map.load_terrain_mul(dir.path().join("nope.mul"));
    assert!(matches!(err, Err(MapError::Open { .. })));
}

#[test]
fn test_flat_terrain_save_reload() {
    let map = patterned_map(32, 24);
    let file = NamedTempFile::new().unwrap();
    map.save_terrain_mul(file.path()).unwrap();
    assert_eq!(fs::metadata(file.path()).unwrap().len(), (12 * TERRAIN_BLOCK_SIZE) as u64);

    let mut back = UoMap::new(0, 32, 24).unwrap();
    back.load_terrain_mul(file.path()).unwrap();
    assert_eq!(back.terrain_blocks(), map.terrain_blocks());
}

// ── Art ──────────────────────────────────────────────────────────────────────

#[test]
fn test_end_to_end_flat_roundtrip() {
    let mut map = UoMap::new(0, 16, 16).unwrap();
    map.add_art(3, 3, ArtTile::new(0x0EED, 5, 10)).unwrap();

    let dir = tempdir().unwrap();
    let (terrain, idx, mul) = (dir.path().join("map0.mul"), dir.path().join("staidx0.mul"), dir.path().join("statics0.mul"));
    map.save_terrain_mul(&terrain).unwrap();
    map.save_art(&idx, &mul).unwrap();

    let mut back = UoMap::new(0, 16, 16).unwrap();
    back.load_terrain_mul(&terrain).unwrap();
    back.load_art(&idx, &mul).unwrap();

    assert_eq!(back.terrain_blocks(), map.terrain_blocks());
    assert_eq!(back.art(3, 3).unwrap(), vec![ArtTile::new(0x0EED, 5, 10)]);
    assert!(back.art(4, 3).unwrap().is_empty());
}

#[test]
fn test_save_art_writes_sentinels_for_empty_blocks() {
    let mut map = UoMap::new(0, 16, 16).unwrap();
    map.add_art(0, 9, ArtTile::new(1, 0, 0)).unwrap(); // block 1
    map.add_art(9, 9, ArtTile::new(2, 0, 0)).unwrap(); // block 3
    map.add_art(9, 10, ArtTile::new(3, 0, 0)).unwrap();

    let mut idx = Vec::new();
    let mut mul = Vec::new();
    map.write_art(&mut idx, &mut mul).unwrap();

    let records: Vec<IndexRecord> = idx
        .chunks_exact(12)
        .map(|c| IndexRecord::parse(c.try_into().unwrap()))
        .collect();
    assert_eq!(records.len(), 4);
    assert_eq!(records[0], IndexRecord { offset: SENTINEL, length: 0, extra: 0 });
    assert_eq!(records[1], IndexRecord { offset: 0, length: 7, extra: 0 });
    assert_eq!(records[2], IndexRecord::EMPTY);
    assert_eq!(records[3], IndexRecord { offset: 7, length: 14, extra: 0 });
    assert_eq!(mul.len(), 3 * ART_RECORD_SIZE);
}

#[test]
fn test_load_art_short_payload_fails() {
    let mut idx = Vec::new();
    IndexRecord { offset: 0, length: 14, extra: 0 }.write(&mut idx).unwrap();
    let mut map = UoMap::new(0, 16, 16).unwrap();
    let err = map.read_art(Cursor::new(idx), Cursor::new(vec![0u8; 7]));
    assert!(matches!(err, Err(MapError::ShortRead { wanted: 14, got: 7, .. })));
}

#[test]
fn test_load_art_huge_declared_length_is_short_read() {
    let mut idx = Vec::new();
    IndexRecord { offset: 0, length: 0xFFFF_FFF0, extra: 0 }.write(&mut idx).unwrap();
    let mut map = UoMap::new(0, 16, 16).unwrap();
    let err = map.read_art(Cursor::new(idx), Cursor::new(vec![0u8; 21]));
    assert!(matches!(err, Err(MapError::ShortRead { wanted: 0xFFFF_FFF0, got: 21, .. })));
}

#[test]
fn test_load_art_too_many_index_records_fails() {
    let mut idx = Vec::new();
    for _ in 0..5 {
        IndexRecord::EMPTY.write(&mut idx).unwrap();
    }
    let mut map = UoMap::new(0, 16, 16).unwrap();
    let err = map.read_art(Cursor::new(idx), Cursor::new(Vec::new()));
    assert!(matches!(err, Err(MapError::ExtraData { capacity: 4, .. })));
}

#[test]
fn test_load_art_skips_sentinel_and_zero_length() {
    let mut data = vec![0u8; 7];
    data[0] = 0x34;
    data[1] = 0x12; // tile 0x1234 at local (0,0)
    let mut idx = Vec::new();
    IndexRecord { offset: 0, length: 0, extra: 0 }.write(&mut idx).unwrap();
    IndexRecord { offset: 0xFFFF_FFFE, length: 7, extra: 0 }.write(&mut idx).unwrap();
    IndexRecord { offset: 0, length: 7, extra: 9 }.write(&mut idx).unwrap();

    let mut map = UoMap::new(0, 16, 16).unwrap();
    map.add_art(0, 0, ArtTile::new(1, 1, 1)).unwrap();
    let read = map.read_art(Cursor::new(idx), Cursor::new(data)).unwrap();
    assert_eq!(read, 3);
    assert!(map.art(0, 0).unwrap().is_empty(), "load replaces existing art");
    assert!(map.art(0, 8).unwrap().is_empty());
    assert_eq!(map.art(8, 0).unwrap(), vec![ArtTile::new(0x1234, 0, 0)]);
}

#[test]
fn test_art_edits_through_map() {
    let mut map = UoMap::new(0, 16, 16).unwrap();
    map.add_art(10, 12, ArtTile::new(1, 0, 0)).unwrap();
    map.add_art(10, 12, ArtTile::new(2, 20, 0)).unwrap();
    map.add_art(11, 12, ArtTile::new(3, 0, 0)).unwrap();
    map.add_art(10, 12, ArtTile::new(4, 0, 5)).unwrap();

    assert_eq!(
        map.art(10, 12).unwrap(),
        vec![ArtTile::new(1, 0, 0), ArtTile::new(2, 20, 0), ArtTile::new(4, 0, 5)]
    );
    assert_eq!(map.art_at(10, 12, 0).unwrap().len(), 2);

    map.remove_art_at(10, 12, 0).unwrap();
    assert_eq!(map.art(10, 12).unwrap(), vec![ArtTile::new(2, 20, 0)]);

    map.remove_art(10, 12).unwrap();
    assert!(map.art(10, 12).unwrap().is_empty());
    assert_eq!(map.art(11, 12).unwrap(), vec![ArtTile::new(3, 0, 0)]);
}

// ── Diffs ────────────────────────────────────────────────────────────────────

#[test]
fn test_terrain_diff_partial_application() {
    let mut map = UoMap::new(0, 16, 16).unwrap();
    let original = map.terrain_blocks().to_vec();

    let list: Vec<u8> = [0u32, 1, 2].iter().flat_map(|b| b.to_le_bytes()).collect();
    let mut data = block_bytes(0x11);
    data.extend(&block_bytes(0x22)[..100]); // block 1's replacement is short

    let difl = write_file(&list);
    let dif = write_file(&data);
    let err = map.apply_terrain_diff(difl.path(), dif.path());
    assert!(matches!(err, Err(MapError::ShortRead { what: "terrain diff", got: 100, .. })));

    assert_eq!(map.terrain(0, 0).unwrap(), TerrainCell::new(0x11, 1));
    assert_eq!(map.terrain_blocks()[0].header(), 0x1234);
    assert_eq!(map.terrain_blocks()[1], original[1]);
    assert_eq!(map.terrain_blocks()[2], original[2]);
}

#[test]
fn test_terrain_diff_out_of_range_block_fails_after_earlier_blocks() {
    let mut map = UoMap::new(0, 16, 16).unwrap();
    let list: Vec<u8> = [3u32, 4].iter().flat_map(|b| b.to_le_bytes()).collect();
    let mut data = block_bytes(0x33);
    data.extend(block_bytes(0x44));

    let err = map.read_terrain_diff(Cursor::new(list), Cursor::new(data), DiffMode::BestEffort);
    assert!(matches!(err, Err(MapError::BlockOutOfRange { block: 4, count: 4 })));
    assert_eq!(map.terrain(15, 15).unwrap(), TerrainCell::new(0x33, 1));
}

#[test]
fn test_terrain_diff_only_touches_listed_blocks() {
    let mut map = patterned_map(16, 16);
    let before = map.terrain_blocks().to_vec();
    let list: Vec<u8> = 2u32.to_le_bytes().to_vec();
    let applied = map
        .read_terrain_diff(Cursor::new(list), Cursor::new(block_bytes(0x55)), DiffMode::BestEffort)
        .unwrap();
    assert_eq!(applied, 1);
    for (i, block) in map.terrain_blocks().iter().enumerate() {
        if i == 2 {
            assert_eq!(block.cell(7, 7), TerrainCell::new(0x55, 1));
        } else {
            assert_eq!(block, &before[i]);
        }
    }
}

#[test]
fn test_art_diff_replaces_and_clears() {
    let mut map = UoMap::new(0, 16, 16).unwrap();
    map.add_art(1, 1, ArtTile::new(1, 0, 0)).unwrap();   // block 0
    map.add_art(1, 9, ArtTile::new(2, 0, 0)).unwrap();   // block 1
    map.add_art(9, 9, ArtTile::new(3, 0, 0)).unwrap();   // block 3

    // Replacement for block 3: one record at local (2,2), stored at offset 5.
    let mut data = vec![0xAAu8; 5];
    data.extend_from_slice(&[0x99, 0x00, 2, 2, 4, 0x01, 0x00]);

    let list: Vec<u8> = [3u32, 0].iter().flat_map(|b| b.to_le_bytes()).collect();
    let mut index = Vec::new();
    IndexRecord { offset: 5, length: 7, extra: 0 }.write(&mut index).unwrap();
    IndexRecord::EMPTY.write(&mut index).unwrap();

    let (difl, difi, dif) = (write_file(&list), write_file(&index), write_file(&data));
    let applied = map.apply_art_diff(difl.path(), difi.path(), dif.path()).unwrap();
    assert_eq!(applied, 2);

    assert!(map.art(1, 1).unwrap().is_empty());
    assert_eq!(map.art(1, 9).unwrap(), vec![ArtTile::new(2, 0, 0)]);
    assert!(map.art(9, 9).unwrap().is_empty());
    assert_eq!(map.art(10, 10).unwrap(), vec![ArtTile::new(0x99, 4, 1)]);
}

#[test]
fn test_art_diff_atomic_leaves_map_untouched() {
    let mut map = UoMap::new(0, 16, 16).unwrap();
    map.add_art(1, 1, ArtTile::new(1, 0, 0)).unwrap();

    let list: Vec<u8> = [0u32, 1].iter().flat_map(|b| b.to_le_bytes()).collect();
    let mut index = Vec::new();
    IndexRecord::EMPTY.write(&mut index).unwrap();
    IndexRecord { offset: 0, length: 70, extra: 0 }.write(&mut index).unwrap();

    let err = map.read_art_diff(Cursor::new(list), Cursor::new(index), Cursor::new(vec![0u8; 7]), DiffMode::Atomic);
    assert!(err.is_err());
    assert_eq!(map.art(1, 1).unwrap(), vec![ArtTile::new(1, 0, 0)]);
}

// ── UOP container ────────────────────────────────────────────────────────────

#[test]
fn test_uop_roundtrip_multiple_runs() {
    let map = patterned_map(8 * 4, 8 * 1100); // 4400 blocks -> 2 runs
    assert!(map.block_count() > UOP_RUN_LENGTH);

    let file = NamedTempFile::new().unwrap();
    map.save_terrain_uop(file.path()).unwrap();

    let mut back = UoMap::new(0, 8 * 4, 8 * 1100).unwrap();
    back.load_terrain_uop(file.path()).unwrap();
    assert_eq!(back.terrain_blocks(), map.terrain_blocks());

    let mut reader = ContainerReader::new(File::open(file.path()).unwrap()).unwrap();
    assert_eq!(reader.superblock.entry_count, 2);
    assert_eq!(reader.entries().len(), 2);
    let second = reader.read_named("build/map0legacymul/00000001.dat").unwrap().unwrap();
    assert_eq!(second.len(), UOP_RUN_LENGTH * TERRAIN_BLOCK_SIZE);
    // Blocks past the map are zero padding.
    let used = (map.block_count() - UOP_RUN_LENGTH) * TERRAIN_BLOCK_SIZE;
    assert!(second[used..].iter().all(|&b| b == 0));
}

#[test]
fn test_uop_zlib_roundtrip() {
    let map = patterned_map(64, 64);
    let cursor = map.write_terrain_uop(Cursor::new(Vec::new()), CodecId::Zlib).unwrap();

    let mut reader = ContainerReader::new(Cursor::new(cursor.get_ref().clone())).unwrap();
    assert_eq!(reader.entries().entries[0].flag, CodecId::Zlib.flag());
    let raw = reader.read_named("build/map0legacymul/00000000.dat").unwrap().unwrap();
    assert_eq!(raw.len(), UOP_RUN_LENGTH * TERRAIN_BLOCK_SIZE);

    let mut back = UoMap::new(0, 64, 64).unwrap();
    back.read_terrain_uop(Cursor::new(cursor.into_inner())).unwrap();
    assert_eq!(back.terrain_blocks(), map.terrain_blocks());
}

#[test]
fn test_uop_larger_container_than_map_is_not_an_error() {
    let big = patterned_map(32, 32);
    let bytes = big.write_terrain_uop(Cursor::new(Vec::new()), CodecId::None).unwrap().into_inner();

    let mut small = UoMap::new(0, 16, 16).unwrap();
    let runs = small.read_terrain_uop(Cursor::new(bytes)).unwrap();
    assert_eq!(runs, 1);
    // The first four blocks of the larger map are its first column strip.
    for i in 0..4 {
        assert_eq!(small.terrain_blocks()[i], big.terrain_blocks()[i]);
    }
}

#[test]
fn test_uop_ignores_entries_of_other_maps() {
    let map = patterned_map(16, 16);
    let mut other = UoMap::new(3, 16, 16).unwrap();
    let bytes = map.write_terrain_uop(Cursor::new(Vec::new()), CodecId::None).unwrap().into_inner();
    let runs = other.read_terrain_uop(Cursor::new(bytes)).unwrap();
    assert_eq!(runs, 0);
    assert!(other.terrain_blocks().iter().all(|b| *b == TerrainBlock::default()));
}

#[test]
fn test_uop_partial_run_truncates_to_whole_blocks() {
    // Hand-build a container whose only entry is 2.5 blocks long.
    let mut run = block_bytes(0x66);
    run.extend(block_bytes(0x77));
    run.extend(&block_bytes(0x88)[..98]);

    let template = terrain_template(0);
    let mut writer = ContainerWriter::new(Cursor::new(Vec::new()), ContainerOptions::default()).unwrap();
    writer.add_entry(&template.name(0), &run).unwrap();
    let bytes = writer.finalize().unwrap().into_inner();

    let mut map = UoMap::new(0, 16, 16).unwrap();
    map.read_terrain_uop(Cursor::new(bytes)).unwrap();
    assert_eq!(map.terrain(0, 0).unwrap().tile_id, 0x66);
    assert_eq!(map.terrain(0, 8).unwrap().tile_id, 0x77);
    assert_eq!(map.terrain_blocks()[2], TerrainBlock::default());
}

#[test]
fn test_uop_table_chain_spans_multiple_tables() {
    let template = EntryTemplate::new("test/{}.bin");
    let opts = ContainerOptions { table_capacity: 3, ..ContainerOptions::default() };
    let mut writer = ContainerWriter::new(Cursor::new(Vec::new()), opts).unwrap();
    for i in 0..8u8 {
        writer.add_entry(&template.name(i as usize), &[i; 10]).unwrap();
    }
    let bytes = writer.finalize().unwrap().into_inner();

    let mut reader = ContainerReader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.entries().tables, 3);
    assert_eq!(reader.entries().len(), 8);
    for i in 0..8u8 {
        let data = reader.read_named(&template.name(i as usize)).unwrap().unwrap();
        assert_eq!(data, vec![i; 10]);
    }
    assert!(reader.read_named("test/missing.bin").unwrap().is_none());
}

#[test]
fn test_uop_bad_magic_is_rejected() {
    let mut map = UoMap::new(0, 16, 16).unwrap();
    let err = map.read_terrain_uop(Cursor::new(vec![0u8; 0x400]));
    assert!(matches!(err, Err(MapError::Container(_))));
}

#[test]
fn test_uop_huge_stored_length_is_truncated_error() {
    let template = terrain_template(0);
    let mut writer = ContainerWriter::new(Cursor::new(Vec::new()), ContainerOptions::default()).unwrap();
    writer.add_entry(&template.name(0), &block_bytes(0x11)).unwrap();
    let mut bytes = writer.finalize().unwrap().into_inner();

    // First table sits right after the 0x200-byte header; comp_len is the
    // third field of its first entry.
    let comp_len_at = 0x200 + 12 + 8 + 4;
    bytes[comp_len_at..comp_len_at + 4].copy_from_slice(&0xFFFF_0000u32.to_le_bytes());

    let mut map = UoMap::new(0, 16, 16).unwrap();
    let err = map.read_terrain_uop(Cursor::new(bytes));
    assert!(matches!(
        err,
        Err(MapError::Container(ContainerError::Truncated { wanted: 0xFFFF_0000, got: TERRAIN_BLOCK_SIZE, .. }))
    ));
    assert_eq!(map.terrain_blocks()[0], TerrainBlock::default());
}

#[test]
fn test_empty_container_is_valid() {
    let writer = ContainerWriter::new(Cursor::new(Vec::new()), ContainerOptions::default()).unwrap();
    let bytes = writer.finalize().unwrap().into_inner();
    let reader = ContainerReader::new(Cursor::new(bytes)).unwrap();
    assert!(reader.entries().is_empty());
    assert_eq!(reader.entries().tables, 1);
}

/// Fixed 4-byte blocks, three to a run.
struct Words(Vec<[u8; 4]>);

impl ChunkedBlocks for Words {
    fn block_count(&self) -> usize {
        self.0.len()
    }

    fn receive_chunk(&mut self, _ordinal: usize, start_block: usize, data: &[u8]) {
        for (i, rec) in data.chunks_exact(4).enumerate() {
            if let Some(slot) = self.0.get_mut(start_block + i) {
                slot.copy_from_slice(rec);
            }
        }
    }

    fn produce_chunk(&self, ordinal: usize) -> Vec<u8> {
        let mut run = vec![0u8; 12];
        for (slot, word) in run.chunks_exact_mut(4).zip(self.0.iter().skip(ordinal * 3)) {
            slot.copy_from_slice(word);
        }
        run
    }
}

#[test]
fn test_generic_store_roundtrip_through_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("words.uop");
    let template = EntryTemplate::new("words/{}.bin");
    let opts = ContainerOptions { compression: CodecId::Zlib, ..ContainerOptions::with_run_length(3) };

    let source = Words((0..7u8).map(|i| [i; 4]).collect());
    assert_eq!(save_container(&path, &template, &opts, &source).unwrap(), 3);

    let mut sink = Words(vec![[0xFF; 4]; 7]);
    assert_eq!(load_container(&path, &template, &opts, &mut sink).unwrap(), 3);
    assert_eq!(sink.0, source.0);

    // The last run is padded to a full run on disk.
    let mut reader = ContainerReader::new(File::open(&path).unwrap()).unwrap();
    let last = reader.read_named(&template.name(2)).unwrap().unwrap();
    assert_eq!(last, vec![6, 6, 6, 6, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert!(fs::metadata(&path).unwrap().len() > 0x200);
}

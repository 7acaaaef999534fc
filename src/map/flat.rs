//! Flat (MUL) terrain and art files.
//!
//! Terrain: `block_count` consecutive 196-byte records, no header.
//!
//! Art: an index file of one [`IndexRecord`] per block, in block order, and
//! a data file the records point into.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use log::{debug, info, warn};

use super::{open_error, MapError, UoMap};
use crate::block::{ArtBlock, TERRAIN_BLOCK_SIZE};

pub const INDEX_RECORD_SIZE: usize = 12;
/// Offset/length value meaning "no data".
pub const SENTINEL: u32 = 0xFFFF_FFFF;

/// Read until `buf` is full or the stream ends.  Returns bytes read.
pub(crate) fn read_up_to<R: Read>(mut reader: R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ── IndexRecord ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    pub offset: u32,
    pub length: u32,
    pub extra:  u32,
}

impl IndexRecord {
    pub const EMPTY: IndexRecord = IndexRecord { offset: SENTINEL, length: 0, extra: 0 };

    /// Whether the record points at real data.
    pub fn has_data(&self) -> bool {
        self.offset < SENTINEL - 1 && self.length > 0 && self.length < SENTINEL
    }

    pub fn parse(raw: &[u8; INDEX_RECORD_SIZE]) -> Self {
        Self {
            offset: LittleEndian::read_u32(&raw[0..4]),
            length: LittleEndian::read_u32(&raw[4..8]),
            extra:  LittleEndian::read_u32(&raw[8..12]),
        }
    }

    /// `Ok(None)` at a clean end of stream; a partial record is a short read.
    pub fn read_next<R: Read>(reader: R, what: &'static str) -> Result<Option<Self>, MapError> {
        let mut raw = [0u8; INDEX_RECORD_SIZE];
        match read_up_to(reader, &mut raw)? {
            0 => Ok(None),
            INDEX_RECORD_SIZE => Ok(Some(Self::parse(&raw))),
            got => Err(MapError::ShortRead { what, wanted: INDEX_RECORD_SIZE, got }),
        }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.length)?;
        writer.write_u32::<LittleEndian>(self.extra)?;
        Ok(())
    }

    /// Fetch the payload this record points at from `data`.
    pub fn fetch<R: Read + Seek>(&self, mut data: R, what: &'static str) -> Result<ArtBlock, MapError> {
        data.seek(SeekFrom::Start(u64::from(self.offset)))?;
        let wanted = self.length as usize;
        let mut payload = Vec::new();
        let got = data.take(u64::from(self.length)).read_to_end(&mut payload)?;
        if got != wanted {
            return Err(MapError::ShortRead { what, wanted, got });
        }
        Ok(ArtBlock::from_bytes(payload))
    }
}

// ── Terrain ──────────────────────────────────────────────────────────────────

impl UoMap {
    /// Fill terrain blocks in order from a flat stream.
    ///
    /// Stops at end of stream or once every block is filled; a partial record
    /// is an error and leaves earlier blocks loaded.  Returns blocks read.
    pub fn read_terrain_mul<R: Read>(&mut self, mut reader: R) -> Result<usize, MapError> {
        let count = self.block_count();
        let mut buf = [0u8; TERRAIN_BLOCK_SIZE];
        let mut block = 0;
        while block < count {
            match read_up_to(&mut reader, &mut buf)? {
                0 => break,
                TERRAIN_BLOCK_SIZE => {
                    *self.terrain[block].as_bytes_mut() = buf;
                    block += 1;
                }
                got => {
                    return Err(MapError::ShortRead {
                        what: "terrain",
                        wanted: TERRAIN_BLOCK_SIZE,
                        got,
                    })
                }
            }
        }
        if block == count && read_up_to(&mut reader, &mut [0u8; 1])? != 0 {
            warn!("terrain stream holds more than {count} blocks, extra data ignored");
        }
        Ok(block)
    }

    pub fn write_terrain_mul<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for block in &self.terrain {
            writer.write_all(block.as_bytes())?;
        }
        writer.flush()
    }

    pub fn load_terrain_mul<P: AsRef<Path>>(&mut self, path: P) -> Result<(), MapError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(open_error(path))?;
        let blocks = self.read_terrain_mul(BufReader::new(file))?;
        info!("{}: loaded {blocks} terrain block(s)", path.display());
        Ok(())
    }

    pub fn save_terrain_mul<P: AsRef<Path>>(&self, path: P) -> Result<(), MapError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(open_error(path))?;
        self.write_terrain_mul(BufWriter::new(file))?;
        Ok(())
    }

    // ── Art ──────────────────────────────────────────────────────────────────

    /// Replace all art from an index stream and its data stream.
    ///
    /// Returns the number of index records consumed.
    pub fn read_art<I: Read, D: Read + Seek>(&mut self, mut index: I, mut data: D) -> Result<usize, MapError> {
        self.clear_art();
        let count = self.block_count();
        let mut block = 0;
        while let Some(record) = IndexRecord::read_next(&mut index, "art index")? {
            if block >= count {
                return Err(MapError::ExtraData { what: "art index", capacity: count });
            }
            if record.has_data() {
                self.art[block] = record.fetch(&mut data, "art data")?;
            }
            block += 1;
        }
        debug!("read {block} art index record(s)");
        Ok(block)
    }

    /// Write one index record per block and append non-empty payloads.
    pub fn write_art<I: Write, D: Write>(&self, mut index: I, mut data: D) -> Result<(), MapError> {
        let mut offset = 0u64;
        for block in &self.art {
            let record = if block.is_empty() {
                IndexRecord::EMPTY
            } else {
                let record = IndexRecord {
                    offset: u32::try_from(offset).map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidData, "art data exceeds 4 GiB")
                    })?,
                    length: block.len() as u32,
                    extra:  0,
                };
                data.write_all(block.as_bytes())?;
                offset += block.len() as u64;
                record
            };
            record.write(&mut index)?;
        }
        index.flush()?;
        data.flush()?;
        Ok(())
    }

    pub fn load_art<P: AsRef<Path>, Q: AsRef<Path>>(&mut self, index_path: P, data_path: Q) -> Result<(), MapError> {
        let (index_path, data_path) = (index_path.as_ref(), data_path.as_ref());
        let index = File::open(index_path).map_err(open_error(index_path))?;
        let data = File::open(data_path).map_err(open_error(data_path))?;
        let records = self.read_art(BufReader::new(index), BufReader::new(data))?;
        info!("{}: loaded art for {records} block(s)", index_path.display());
        Ok(())
    }

    pub fn save_art<P: AsRef<Path>, Q: AsRef<Path>>(&self, index_path: P, data_path: Q) -> Result<(), MapError> {
        let (index_path, data_path) = (index_path.as_ref(), data_path.as_ref());
        let index = File::create(index_path).map_err(open_error(index_path))?;
        let data = File::create(data_path).map_err(open_error(data_path))?;
        self.write_art(BufWriter::new(index), BufWriter::new(data))
    }
}

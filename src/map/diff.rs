//! Diff overlays: sparse block replacements applied on top of a loaded map.
//!
//! A terrain diff is a list of u32 block numbers plus a stream of 196-byte
//! replacement records in the same order.  An art diff is a list of u32
//! block numbers, one [`IndexRecord`] per listed block, and a data stream the
//! records point into; an index record without data clears the block.
//!
//! Every listed block is read in full before it is written, so a short
//! replacement never leaves a half-written block.  Across blocks the
//! behaviour depends on [`DiffMode`].

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info};

use super::flat::{read_up_to, IndexRecord};
use super::{open_error, MapError, UoMap};
use crate::block::{ArtBlock, TerrainBlock, TERRAIN_BLOCK_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffMode {
    /// Blocks before a failure stay replaced.
    #[default]
    BestEffort,
    /// Nothing is replaced unless the whole diff is valid.
    Atomic,
}

/// Next block number from a diff list; `Ok(None)` at a clean end.
fn next_block<R: Read>(mut list: R) -> Result<Option<u32>, MapError> {
    let mut raw = [0u8; 4];
    match read_up_to(&mut list, &mut raw)? {
        0 => Ok(None),
        4 => Ok(Some(LittleEndian::read_u32(&raw))),
        got => Err(MapError::ShortRead { what: "diff list", wanted: 4, got }),
    }
}

/// Applies changes immediately or holds them until `commit`.
struct Staging<T> {
    mode:    DiffMode,
    pending: Vec<(usize, T)>,
    applied: usize,
}

impl<T> Staging<T> {
    fn new(mode: DiffMode) -> Self {
        Self { mode, pending: Vec::new(), applied: 0 }
    }

    fn put(&mut self, target: &mut [T], block: usize, value: T) {
        match self.mode {
            DiffMode::BestEffort => target[block] = value,
            DiffMode::Atomic     => self.pending.push((block, value)),
        }
        self.applied += 1;
    }

    fn commit(self, target: &mut [T]) -> usize {
        for (block, value) in self.pending {
            target[block] = value;
        }
        self.applied
    }
}

impl UoMap {
    fn diff_target(&self, block: u32) -> Result<usize, MapError> {
        let count = self.block_count();
        match usize::try_from(block) {
            Ok(b) if b < count => Ok(b),
            _ => Err(MapError::BlockOutOfRange { block: block as usize, count }),
        }
    }

    /// Apply a terrain diff from streams.  Returns blocks replaced.
    pub fn read_terrain_diff<L: Read, D: Read>(
        &mut self,
        mut list: L,
        mut data: D,
        mode:     DiffMode,
    ) -> Result<usize, MapError> {
        let mut staging = Staging::new(mode);
        while let Some(raw) = next_block(&mut list)? {
            let block = self.diff_target(raw)?;
            let mut record = [0u8; TERRAIN_BLOCK_SIZE];
            let got = read_up_to(&mut data, &mut record)?;
            if got != TERRAIN_BLOCK_SIZE {
                return Err(MapError::ShortRead { what: "terrain diff", wanted: TERRAIN_BLOCK_SIZE, got });
            }
            staging.put(&mut self.terrain, block, TerrainBlock::from_bytes(&record));
        }
        Ok(staging.commit(&mut self.terrain))
    }

    /// Apply an art diff from streams.  Returns blocks replaced or cleared.
    pub fn read_art_diff<L: Read, I: Read, D: Read + Seek>(
        &mut self,
        mut list:  L,
        mut index: I,
        mut data:  D,
        mode:      DiffMode,
    ) -> Result<usize, MapError> {
        let mut staging = Staging::new(mode);
        while let Some(raw) = next_block(&mut list)? {
            let block = self.diff_target(raw)?;
            let record = IndexRecord::read_next(&mut index, "art diff index")?.ok_or(
                MapError::ShortRead { what: "art diff index", wanted: 12, got: 0 },
            )?;
            let art = if record.has_data() {
                record.fetch(&mut data, "art diff data")?
            } else {
                ArtBlock::new()
            };
            staging.put(&mut self.art, block, art);
        }
        Ok(staging.commit(&mut self.art))
    }

    pub fn apply_terrain_diff<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        list_path: P,
        data_path: Q,
    ) -> Result<usize, MapError> {
        self.apply_terrain_diff_with(list_path, data_path, DiffMode::default())
    }

    pub fn apply_terrain_diff_with<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        list_path: P,
        data_path: Q,
        mode:      DiffMode,
    ) -> Result<usize, MapError> {
        let (list_path, data_path) = (list_path.as_ref(), data_path.as_ref());
        let list = File::open(list_path).map_err(open_error(list_path))?;
        let data = File::open(data_path).map_err(open_error(data_path))?;
        let applied = self.read_terrain_diff(BufReader::new(list), BufReader::new(data), mode)?;
        info!("{}: {applied} terrain block(s) patched", list_path.display());
        Ok(applied)
    }

    pub fn apply_art_diff<P: AsRef<Path>, Q: AsRef<Path>, S: AsRef<Path>>(
        &mut self,
        list_path:  P,
        index_path: Q,
        data_path:  S,
    ) -> Result<usize, MapError> {
        self.apply_art_diff_with(list_path, index_path, data_path, DiffMode::default())
    }

    pub fn apply_art_diff_with<P: AsRef<Path>, Q: AsRef<Path>, S: AsRef<Path>>(
        &mut self,
        list_path:  P,
        index_path: Q,
        data_path:  S,
        mode:       DiffMode,
    ) -> Result<usize, MapError> {
        let list_path = list_path.as_ref();
        let (index_path, data_path) = (index_path.as_ref(), data_path.as_ref());
        let list = File::open(list_path).map_err(open_error(list_path))?;
        let index = File::open(index_path).map_err(open_error(index_path))?;
        let data = File::open(data_path).map_err(open_error(data_path))?;
        debug!("art diff {} ({mode:?})", list_path.display());
        let applied = self.read_art_diff(
            BufReader::new(list),
            BufReader::new(index),
            BufReader::new(data),
            mode,
        )?;
        info!("{}: {applied} art block(s) patched", list_path.display());
        Ok(applied)
    }
}

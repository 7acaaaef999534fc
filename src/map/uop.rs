//! Terrain stored in a UOP container.
//!
//! Entry `build/map{N}legacymul/{ordinal:08}.dat` holds terrain blocks
//! `ordinal * 4096 .. (ordinal + 1) * 4096`, concatenated.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use log::{debug, info};

use super::{open_error, MapError, UoMap};
use crate::block::TERRAIN_BLOCK_SIZE;
use crate::codec::CodecId;
use crate::io_stream::{
    ChunkedBlocks, ContainerOptions, ContainerReader, ContainerWriter, EntryTemplate,
    DEFAULT_MAX_ORDINALS,
};

/// Terrain blocks per container entry.
pub const UOP_RUN_LENGTH: usize = 4096;

pub fn terrain_template(map_number: usize) -> EntryTemplate {
    EntryTemplate::new(format!("build/map{map_number}legacymul/{{}}.dat"))
}

pub fn terrain_options(compression: CodecId) -> ContainerOptions {
    ContainerOptions {
        run_length:   UOP_RUN_LENGTH,
        max_ordinals: DEFAULT_MAX_ORDINALS,
        compression,
        ..ContainerOptions::default()
    }
}

impl ChunkedBlocks for UoMap {
    fn block_count(&self) -> usize {
        self.terrain.len()
    }

    fn receive_chunk(&mut self, ordinal: usize, start_block: usize, data: &[u8]) {
        let count = self.terrain.len();
        let mut copied = 0usize;
        for (i, record) in data.chunks_exact(TERRAIN_BLOCK_SIZE).enumerate() {
            let Some(block) = self.terrain.get_mut(start_block + i) else {
                debug!("run {ordinal}: blocks past {count} ignored");
                break;
            };
            block.as_bytes_mut().copy_from_slice(record);
            copied += 1;
        }
        debug!("run {ordinal}: {copied} block(s) from {} bytes", data.len());
    }

    fn produce_chunk(&self, ordinal: usize) -> Vec<u8> {
        let mut run = vec![0u8; UOP_RUN_LENGTH * TERRAIN_BLOCK_SIZE];
        let blocks = self.terrain.iter().skip(ordinal * UOP_RUN_LENGTH);
        for (slot, block) in run.chunks_exact_mut(TERRAIN_BLOCK_SIZE).zip(blocks) {
            slot.copy_from_slice(block.as_bytes());
        }
        run
    }
}

impl UoMap {
    /// Returns the number of runs delivered.
    pub fn read_terrain_uop<R: Read + Seek>(&mut self, reader: R) -> Result<usize, MapError> {
        let mut container = ContainerReader::new(reader)?;
        let template = terrain_template(self.map_number);
        let delivered = container.load_chunks(&template, &terrain_options(CodecId::None), self)?;
        Ok(delivered)
    }

    /// Returns the writer after the container is finalized.
    pub fn write_terrain_uop<W: Write + Seek>(&self, writer: W, compression: CodecId) -> Result<W, MapError> {
        let mut container = ContainerWriter::new(writer, terrain_options(compression))?;
        container.write_chunks(&terrain_template(self.map_number), self)?;
        Ok(container.finalize()?)
    }

    pub fn load_terrain_uop<P: AsRef<Path>>(&mut self, path: P) -> Result<(), MapError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(open_error(path))?;
        let runs = self.read_terrain_uop(BufReader::new(file))?;
        info!("{}: loaded {runs} terrain run(s)", path.display());
        Ok(())
    }

    pub fn save_terrain_uop<P: AsRef<Path>>(&self, path: P) -> Result<(), MapError> {
        self.save_terrain_uop_with(path, CodecId::None)
    }

    pub fn save_terrain_uop_with<P: AsRef<Path>>(&self, path: P, compression: CodecId) -> Result<(), MapError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(open_error(path))?;
        self.write_terrain_uop(BufWriter::new(file), compression)?;
        info!("{}: wrote terrain ({})", path.display(), compression.name());
        Ok(())
    }
}

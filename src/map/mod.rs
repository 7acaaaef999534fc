//! Map store: terrain and art layers for one map.
//!
//! Both layers are arrays of per-block data indexed by the same block number.
//! Blocks are laid out column-major:
//!
//! ```text
//! block   = (x / 8) * (height / 8) + (y / 8)
//! block_x = (block / (height / 8)) * 8
//! block_y = (block % (height / 8)) * 8
//! ```
//!
//! Loading, saving and diffing live in the submodules; this file holds the
//! store itself and the coordinate-addressed queries.

pub mod diff;
pub mod flat;
pub mod uop;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::block::{ArtBlock, ArtTile, TerrainBlock, TerrainCell, BLOCK_EDGE};
use crate::io_stream::ContainerError;

pub use diff::DiffMode;

/// Canonical `(width, height)` per map number.
pub const MAP_SIZES: [(usize, usize); 6] = [
    (7168, 4096),
    (7168, 4096),
    (2304, 1600),
    (2560, 2048),
    (1448, 1448),
    (1280, 4096),
];

pub fn max_maps() -> usize {
    MAP_SIZES.len()
}

/// Canonical size of `map_number`, if it is a supported map.
pub fn canonical_size(map_number: usize) -> Option<(usize, usize)> {
    MAP_SIZES.get(map_number).copied()
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum MapError {
    #[error("Unable to open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("Short read in {what}: wanted {wanted} bytes, got {got}")]
    ShortRead { what: &'static str, wanted: usize, got: usize },
    #[error("{what} holds more than {capacity} blocks")]
    ExtraData { what: &'static str, capacity: usize },
    #[error("Block {block} out of range, map has {count} blocks")]
    BlockOutOfRange { block: usize, count: usize },
    #[error("Invalid loc({x},{y}), map size {width},{height}")]
    OutOfRange { x: usize, y: usize, width: usize, height: usize },
    #[error("Map size {width}x{height} is not a whole number of 8x8 blocks")]
    BadSize { width: usize, height: usize },
    #[error("{0} exceeds maximum map number of {max}", max = MAP_SIZES.len() - 1)]
    UnknownMap(usize),
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub(crate) fn open_error(path: &std::path::Path) -> impl FnOnce(io::Error) -> MapError + '_ {
    move |source| MapError::Open { path: path.to_owned(), source }
}

// ── UoMap ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UoMap {
    map_number: usize,
    width:      usize,
    height:     usize,
    terrain:    Vec<TerrainBlock>,
    art:        Vec<ArtBlock>,
}

impl UoMap {
    /// A zeroed map.  A zero `width` or `height` selects the canonical size.
    pub fn new(map_number: usize, width: usize, height: usize) -> Result<Self, MapError> {
        if map_number >= MAP_SIZES.len() {
            return Err(MapError::UnknownMap(map_number));
        }
        let mut map = Self {
            map_number,
            width:   0,
            height:  0,
            terrain: Vec::new(),
            art:     Vec::new(),
        };
        map.set_size(width, height)?;
        Ok(map)
    }

    /// Resize both layers.  Existing blocks keep their index; new ones start
    /// zeroed / empty.  Both dimensions must be multiples of 8.
    pub fn set_size(&mut self, width: usize, height: usize) -> Result<(), MapError> {
        let (width, height) = if width == 0 || height == 0 {
            MAP_SIZES[self.map_number]
        } else {
            (width, height)
        };
        if width % BLOCK_EDGE != 0 || height % BLOCK_EDGE != 0 {
            return Err(MapError::BadSize { width, height });
        }
        self.width = width;
        self.height = height;
        let count = (width / BLOCK_EDGE) * (height / BLOCK_EDGE);
        self.terrain.resize(count, TerrainBlock::default());
        self.art.resize(count, ArtBlock::default());
        Ok(())
    }

    pub fn map_number(&self) -> usize {
        self.map_number
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn block_count(&self) -> usize {
        self.terrain.len()
    }

    fn blocks_high(&self) -> usize {
        self.height / BLOCK_EDGE
    }

    // ── Addressing ───────────────────────────────────────────────────────────

    fn check(&self, x: usize, y: usize) -> Result<(), MapError> {
        if x < self.width && y < self.height {
            Ok(())
        } else {
            Err(MapError::OutOfRange { x, y, width: self.width, height: self.height })
        }
    }

    /// Block index holding tile `(x, y)`.
    pub fn block_of(&self, x: usize, y: usize) -> Result<usize, MapError> {
        self.check(x, y)?;
        Ok((x / BLOCK_EDGE) * self.blocks_high() + y / BLOCK_EDGE)
    }

    /// Top-left tile of `block`.
    pub fn block_origin(&self, block: usize) -> Result<(usize, usize), MapError> {
        if block >= self.block_count() {
            return Err(MapError::BlockOutOfRange { block, count: self.block_count() });
        }
        let high = self.blocks_high();
        Ok(((block / high) * BLOCK_EDGE, (block % high) * BLOCK_EDGE))
    }

    /// `(block, x_offset, y_offset)` for tile `(x, y)`.
    pub fn locate(&self, x: usize, y: usize) -> Result<(usize, usize, usize), MapError> {
        let block = self.block_of(x, y)?;
        let (bx, by) = self.block_origin(block)?;
        Ok((block, x - bx, y - by))
    }

    // ── Block access ─────────────────────────────────────────────────────────

    pub fn terrain_blocks(&self) -> &[TerrainBlock] {
        &self.terrain
    }

    pub fn art_blocks(&self) -> &[ArtBlock] {
        &self.art
    }

    pub fn terrain_block_mut(&mut self, block: usize) -> Result<&mut TerrainBlock, MapError> {
        let count = self.block_count();
        self.terrain.get_mut(block).ok_or(MapError::BlockOutOfRange { block, count })
    }

    pub fn art_block_mut(&mut self, block: usize) -> Result<&mut ArtBlock, MapError> {
        let count = self.block_count();
        self.art.get_mut(block).ok_or(MapError::BlockOutOfRange { block, count })
    }

    // ── Terrain ──────────────────────────────────────────────────────────────

    pub fn terrain(&self, x: usize, y: usize) -> Result<TerrainCell, MapError> {
        let (block, xoff, yoff) = self.locate(x, y)?;
        Ok(self.terrain[block].cell(xoff, yoff))
    }

    pub fn set_terrain(&mut self, x: usize, y: usize, cell: TerrainCell) -> Result<(), MapError> {
        let (block, xoff, yoff) = self.locate(x, y)?;
        self.terrain[block].set_cell(xoff, yoff, cell);
        Ok(())
    }

    /// Set every cell of the map to `cell`.
    pub fn fill_terrain(&mut self, cell: TerrainCell) {
        for block in &mut self.terrain {
            block.fill(cell);
        }
    }

    // ── Art ──────────────────────────────────────────────────────────────────

    /// Every placement at `(x, y)`, in stored order.
    pub fn art(&self, x: usize, y: usize) -> Result<Vec<ArtTile>, MapError> {
        let (block, xoff, yoff) = self.locate(x, y)?;
        Ok(self.art[block].query(xoff, yoff))
    }

    pub fn art_at(&self, x: usize, y: usize, altitude: i8) -> Result<Vec<ArtTile>, MapError> {
        let (block, xoff, yoff) = self.locate(x, y)?;
        Ok(self.art[block].query_at(xoff, yoff, altitude))
    }

    pub fn add_art(&mut self, x: usize, y: usize, tile: ArtTile) -> Result<(), MapError> {
        let (block, xoff, yoff) = self.locate(x, y)?;
        self.art[block].push(xoff, yoff, tile);
        Ok(())
    }

    pub fn remove_art(&mut self, x: usize, y: usize) -> Result<(), MapError> {
        let (block, xoff, yoff) = self.locate(x, y)?;
        self.art[block].remove(xoff, yoff);
        Ok(())
    }

    pub fn remove_art_at(&mut self, x: usize, y: usize, altitude: i8) -> Result<(), MapError> {
        let (block, xoff, yoff) = self.locate(x, y)?;
        self.art[block].remove_at(xoff, yoff, altitude);
        Ok(())
    }

    pub fn clear_art(&mut self) {
        for block in &mut self.art {
            block.clear();
        }
    }
}

//! Fixed-layout map blocks.
//!
//! A block covers an 8x8 tile region.  Terrain is a fixed 196-byte record:
//!
//! ```text
//! [ header i32 (4 B) | 64 x ( tile_id u16 | altitude i8 ) ]
//! ```
//!
//! Cell `(x, y)` lives at byte offset `x*3 + y*24 + 4`.
//!
//! Art is a variable-length run of 7-byte placement records:
//!
//! ```text
//! [ tile_id u16 | x u8 | y u8 | altitude i8 | hue u16 ]
//! ```
//!
//! All multi-byte fields are little-endian.

use byteorder::{ByteOrder, LittleEndian};

pub const BLOCK_EDGE:         usize = 8;
pub const CELLS_PER_BLOCK:    usize = BLOCK_EDGE * BLOCK_EDGE;
pub const TERRAIN_HEADER_SIZE: usize = 4;
pub const TERRAIN_CELL_SIZE:  usize = 3;
pub const TERRAIN_BLOCK_SIZE: usize = TERRAIN_HEADER_SIZE + CELLS_PER_BLOCK * TERRAIN_CELL_SIZE;
pub const ART_RECORD_SIZE:    usize = 7;

#[inline]
fn check_local(x: usize, y: usize) {
    assert!(
        x < BLOCK_EDGE && y < BLOCK_EDGE,
        "local offset ({x},{y}) outside 8x8 block"
    );
}

#[inline]
fn cell_offset(x: usize, y: usize) -> usize {
    x * TERRAIN_CELL_SIZE + y * BLOCK_EDGE * TERRAIN_CELL_SIZE + TERRAIN_HEADER_SIZE
}

// ── Terrain ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TerrainCell {
    pub tile_id:  u16,
    pub altitude: i8,
}

impl TerrainCell {
    pub fn new(tile_id: u16, altitude: i8) -> Self {
        Self { tile_id, altitude }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct TerrainBlock {
    data: [u8; TERRAIN_BLOCK_SIZE],
}

impl Default for TerrainBlock {
    fn default() -> Self {
        Self { data: [0u8; TERRAIN_BLOCK_SIZE] }
    }
}

impl std::fmt::Debug for TerrainBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainBlock")
            .field("header", &self.header())
            .field("first_cell", &self.cell(0, 0))
            .finish()
    }
}

impl TerrainBlock {
    pub fn with_header(header: i32) -> Self {
        let mut block = Self::default();
        block.set_header(header);
        block
    }

    pub fn from_bytes(bytes: &[u8; TERRAIN_BLOCK_SIZE]) -> Self {
        Self { data: *bytes }
    }

    /// Split a raw record into its header and 64 cells (row-major, `y*8 + x`).
    pub fn decode(bytes: &[u8; TERRAIN_BLOCK_SIZE]) -> (i32, [TerrainCell; CELLS_PER_BLOCK]) {
        let block = Self::from_bytes(bytes);
        let mut cells = [TerrainCell::default(); CELLS_PER_BLOCK];
        for y in 0..BLOCK_EDGE {
            for x in 0..BLOCK_EDGE {
                cells[y * BLOCK_EDGE + x] = block.cell(x, y);
            }
        }
        (block.header(), cells)
    }

    pub fn encode(header: i32, cells: &[TerrainCell; CELLS_PER_BLOCK]) -> [u8; TERRAIN_BLOCK_SIZE] {
        let mut block = Self::with_header(header);
        for y in 0..BLOCK_EDGE {
            for x in 0..BLOCK_EDGE {
                block.set_cell(x, y, cells[y * BLOCK_EDGE + x]);
            }
        }
        block.data
    }

    pub fn header(&self) -> i32 {
        LittleEndian::read_i32(&self.data[..TERRAIN_HEADER_SIZE])
    }

    pub fn set_header(&mut self, value: i32) {
        LittleEndian::write_i32(&mut self.data[..TERRAIN_HEADER_SIZE], value);
    }

    pub fn as_bytes(&self) -> &[u8; TERRAIN_BLOCK_SIZE] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; TERRAIN_BLOCK_SIZE] {
        &mut self.data
    }

    /// # Panics
    /// If `x` or `y` is not in `0..8`.
    pub fn cell(&self, x: usize, y: usize) -> TerrainCell {
        check_local(x, y);
        let off = cell_offset(x, y);
        TerrainCell {
            tile_id:  LittleEndian::read_u16(&self.data[off..off + 2]),
            altitude: self.data[off + 2] as i8,
        }
    }

    /// # Panics
    /// If `x` or `y` is not in `0..8`.
    pub fn set_cell(&mut self, x: usize, y: usize, cell: TerrainCell) {
        check_local(x, y);
        let off = cell_offset(x, y);
        LittleEndian::write_u16(&mut self.data[off..off + 2], cell.tile_id);
        self.data[off + 2] = cell.altitude as u8;
    }

    pub fn fill(&mut self, cell: TerrainCell) {
        for x in 0..BLOCK_EDGE {
            for y in 0..BLOCK_EDGE {
                self.set_cell(x, y, cell);
            }
        }
    }
}

// ── Art ──────────────────────────────────────────────────────────────────────

/// What an art query hands back for one placement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ArtTile {
    pub tile_id:  u16,
    pub altitude: i8,
    pub hue:      u16,
}

impl ArtTile {
    pub fn new(tile_id: u16, altitude: i8, hue: u16) -> Self {
        Self { tile_id, altitude, hue }
    }
}

/// One 7-byte placement record, with block-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtPlacement {
    pub tile_id:  u16,
    pub x:        u8,
    pub y:        u8,
    pub altitude: i8,
    pub hue:      u16,
}

impl ArtPlacement {
    pub fn read(rec: &[u8]) -> Self {
        Self {
            tile_id:  LittleEndian::read_u16(&rec[0..2]),
            x:        rec[2],
            y:        rec[3],
            altitude: rec[4] as i8,
            hue:      LittleEndian::read_u16(&rec[5..7]),
        }
    }

    pub fn write(&self, rec: &mut [u8]) {
        LittleEndian::write_u16(&mut rec[0..2], self.tile_id);
        rec[2] = self.x;
        rec[3] = self.y;
        rec[4] = self.altitude as u8;
        LittleEndian::write_u16(&mut rec[5..7], self.hue);
    }

    pub fn tile(&self) -> ArtTile {
        ArtTile::new(self.tile_id, self.altitude, self.hue)
    }

    fn at(&self, x: usize, y: usize) -> bool {
        usize::from(self.x) == x && usize::from(self.y) == y
    }
}

/// Placement list for one block, kept as the raw on-disk payload.
///
/// Trailing bytes that do not form a whole record are carried through
/// load/save untouched but are invisible to queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtBlock {
    data: Vec<u8>,
}

impl ArtBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn placements(&self) -> impl Iterator<Item = ArtPlacement> + '_ {
        self.data.chunks_exact(ART_RECORD_SIZE).map(ArtPlacement::read)
    }

    /// # Panics
    /// If `x` or `y` is not in `0..8`.
    pub fn push(&mut self, x: usize, y: usize, tile: ArtTile) {
        check_local(x, y);
        // Drop any partial trailing record so the new one stays aligned.
        let whole = self.data.len() - self.data.len() % ART_RECORD_SIZE;
        self.data.truncate(whole);
        let start = self.data.len();
        self.data.resize(start + ART_RECORD_SIZE, 0);
        ArtPlacement {
            tile_id:  tile.tile_id,
            x:        x as u8,
            y:        y as u8,
            altitude: tile.altitude,
            hue:      tile.hue,
        }
        .write(&mut self.data[start..]);
    }

    pub fn query(&self, x: usize, y: usize) -> Vec<ArtTile> {
        self.placements()
            .filter(|p| p.at(x, y))
            .map(|p| p.tile())
            .collect()
    }

    pub fn query_at(&self, x: usize, y: usize, altitude: i8) -> Vec<ArtTile> {
        self.placements()
            .filter(|p| p.at(x, y) && p.altitude == altitude)
            .map(|p| p.tile())
            .collect()
    }

    pub fn remove(&mut self, x: usize, y: usize) {
        self.retain(|p| !p.at(x, y));
    }

    pub fn remove_at(&mut self, x: usize, y: usize, altitude: i8) {
        self.retain(|p| !(p.at(x, y) && p.altitude == altitude));
    }

    fn retain<F: Fn(&ArtPlacement) -> bool>(&mut self, keep: F) {
        let kept: Vec<u8> = self.data
            .chunks_exact(ART_RECORD_SIZE)
            .filter(|rec| keep(&ArtPlacement::read(rec)))
            .flatten()
            .copied()
            .collect();
        self.data = kept;
    }
}

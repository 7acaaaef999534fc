//! File layout of a client installation.
//!
//! ```no_run
//! use uomap::client::ClientFiles;
//!
//! let files = ClientFiles::new("/opt/uo", 2);
//! let mut map = files.load_map()?;
//! files.apply_diffs(&mut map);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::map::{MapError, UoMap};

/// Paths of every file that makes up one map in a client directory.
#[derive(Debug, Clone)]
pub struct ClientFiles {
    dir: PathBuf,
    map: usize,
}

impl ClientFiles {
    pub fn new<P: AsRef<Path>>(dir: P, map: usize) -> Self {
        Self { dir: dir.as_ref().to_owned(), map }
    }

    pub fn map_number(&self) -> usize { self.map }
    pub fn dir(&self) -> &Path { &self.dir }

    fn file(&self, stem: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{stem}{}.{ext}", self.map))
    }

    pub fn terrain_uop(&self) -> PathBuf {
        self.dir.join(format!("map{}LegacyMUL.uop", self.map))
    }

    pub fn terrain_mul(&self)  -> PathBuf { self.file("map", "mul") }
    pub fn terrain_difl(&self) -> PathBuf { self.file("mapdifl", "mul") }
    pub fn terrain_dif(&self)  -> PathBuf { self.file("mapdif", "mul") }
    pub fn art_idx(&self)      -> PathBuf { self.file("staidx", "mul") }
    pub fn art_mul(&self)      -> PathBuf { self.file("statics", "mul") }
    pub fn art_difl(&self)     -> PathBuf { self.file("stadifl", "mul") }
    pub fn art_difi(&self)     -> PathBuf { self.file("stadifi", "mul") }
    pub fn art_dif(&self)      -> PathBuf { self.file("stadif", "mul") }

    /// Name of the build script generated for this map.
    pub fn script_name(&self) -> String {
        format!("buildmap{}.lst", self.map)
    }

    /// The terrain file `load_map` reads: the UOP container when present,
    /// otherwise the flat file.
    pub fn terrain_source(&self) -> PathBuf {
        let uop = self.terrain_uop();
        if uop.exists() { uop } else { self.terrain_mul() }
    }

    /// Load terrain from [`terrain_source`](Self::terrain_source), then art.
    pub fn load_map(&self) -> Result<UoMap, MapError> {
        let mut map = UoMap::new(self.map, 0, 0)?;
        let source = self.terrain_source();
        if source == self.terrain_uop() {
            map.load_terrain_uop(&source)?;
        } else {
            info!("{} not found, using {}", self.terrain_uop().display(), source.display());
            map.load_terrain_mul(&source)?;
        }
        map.load_art(self.art_idx(), self.art_mul())?;
        Ok(map)
    }

    /// Apply whichever diff sets are present and return the files of the
    /// sets that applied cleanly.  Failures are logged and the map keeps
    /// whatever was applied before the failure.
    pub fn apply_diffs(&self, map: &mut UoMap) -> Vec<PathBuf> {
        let mut applied = Vec::new();
        if self.terrain_difl().exists() {
            match map.apply_terrain_diff(self.terrain_difl(), self.terrain_dif()) {
                Ok(_)  => applied.extend([self.terrain_difl(), self.terrain_dif()]),
                Err(e) => warn!("map {}: unable to apply terrain diff, continuing without: {e}", self.map),
            }
        }
        if self.art_difl().exists() {
            match map.apply_art_diff(self.art_difl(), self.art_difi(), self.art_dif()) {
                Ok(_)  => applied.extend([self.art_difl(), self.art_difi(), self.art_dif()]),
                Err(e) => warn!("map {}: unable to load art diffs, continuing without: {e}", self.map),
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{TerrainBlock, TerrainCell, TERRAIN_BLOCK_SIZE};
    use std::fs;

    fn flat_client(dir: &Path) -> ClientFiles {
        let files = ClientFiles::new(dir, 4);
        let blocks = (1448 / 8) * (1448 / 8);
        let mut block = TerrainBlock::default();
        block.fill(TerrainCell::new(3, 0));
        fs::write(files.terrain_mul(), block.as_bytes().repeat(blocks)).unwrap();
        fs::write(files.art_idx(), b"").unwrap();
        fs::write(files.art_mul(), b"").unwrap();
        files
    }

    #[test]
    fn flat_terrain_is_used_without_uop() {
        let dir = tempfile::tempdir().unwrap();
        let files = flat_client(dir.path());
        assert_eq!(files.terrain_source(), files.terrain_mul());

        let mut map = files.load_map().unwrap();
        assert_eq!(map.terrain(0, 0).unwrap(), TerrainCell::new(3, 0));
        assert!(files.apply_diffs(&mut map).is_empty());
    }

    #[test]
    fn applied_diffs_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let files = flat_client(dir.path());
        fs::write(files.terrain_difl(), 0u32.to_le_bytes()).unwrap();
        fs::write(files.terrain_dif(), [9u8; TERRAIN_BLOCK_SIZE]).unwrap();
        // Broken art diff: list entry without an index record.
        fs::write(files.art_difl(), 0u32.to_le_bytes()).unwrap();
        fs::write(files.art_difi(), b"").unwrap();
        fs::write(files.art_dif(), b"").unwrap();

        let mut map = files.load_map().unwrap();
        let applied = files.apply_diffs(&mut map);
        assert_eq!(applied, vec![files.terrain_difl(), files.terrain_dif()]);
        assert_eq!(map.terrain(0, 0).unwrap(), TerrainCell::new(0x0909, 9));
    }
}

//! Build command script for a loaded map.
//!
//! ```text
//! //Generation of map 0
//! //Terrain from: ...
//! init 0,7168,4096
//! msg Populating map
//! //
//! // Starting section y=0
//! msg Starting section y = 0
//! //
//! add terrain,0,0,0x0168,-5
//! add art,0,0,0x0eed,0,0
//! ```
//!
//! Rows are emitted top to bottom, tiles left to right, with a section
//! marker every 8 rows.

use std::io::Write;

use crate::block::BLOCK_EDGE;
use crate::map::{MapError, UoMap};

/// Comment lines written before `init`, e.g. which files were used.
#[derive(Debug, Clone, Default)]
pub struct ScriptHeader {
    lines: Vec<String>,
}

impl ScriptHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(mut self, text: impl Into<String>) -> Self {
        self.lines.push(text.into());
        self
    }

    pub fn source(self, label: &str, path: &std::path::Path) -> Self {
        self.line(format!("{label} from: {}", path.display()))
    }

    pub fn separator(self) -> Self {
        self.line("")
    }
}

pub fn write_build_script<W: Write>(
    mut out: W,
    map:     &UoMap,
    header:  &ScriptHeader,
) -> Result<(), MapError> {
    let (width, height) = map.size();
    let number = map.map_number();

    writeln!(out, "//Generation of map {number}")?;
    for line in &header.lines {
        writeln!(out, "//{line}")?;
    }
    writeln!(out, "//")?;
    writeln!(out, "init {number},{width},{height}")?;
    writeln!(out, "msg Populating map")?;

    for y in 0..height {
        if y % BLOCK_EDGE == 0 {
            writeln!(out, "//")?;
            writeln!(out, "// Starting section y={y}")?;
            writeln!(out, "msg Starting section y = {y}")?;
            writeln!(out, "//")?;
        }
        for x in 0..width {
            let cell = map.terrain(x, y)?;
            writeln!(out, "add terrain,{x},{y},{:#06x},{}", cell.tile_id, cell.altitude)?;
            for tile in map.art(x, y)? {
                writeln!(out, "add art,{x},{y},{:#06x},{},{}", tile.tile_id, tile.altitude, tile.hue)?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

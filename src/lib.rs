pub mod block;
pub mod hash;
pub mod codec;
pub mod superblock;
pub mod index;
pub mod io_stream;
pub mod map;
pub mod client;
pub mod script;

pub use block::{ArtBlock, ArtTile, TerrainBlock, TerrainCell, TERRAIN_BLOCK_SIZE};
pub use codec::CodecId;
pub use io_stream::{ChunkedBlocks, ContainerOptions, ContainerReader, ContainerWriter, EntryTemplate};
pub use map::{DiffMode, MapError, UoMap};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;

/// `"MYP\0"` read as a little-endian u32.
pub const MAGIC: u32 = 0x0050_594D;
pub const VERSION: u32 = 5;
pub const SIGNATURE: u32 = 0xFD23_EC43;
/// Bytes reserved for the header; the first table follows.
pub const HEADER_SIZE: usize = 0x200;
/// Bytes actually carrying fields.
pub const HEADER_FIELDS_SIZE: usize = 28;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Invalid magic number {0:#010x}")]
    InvalidMagic(u32),
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u32),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub magic:          u32,
    pub version:        u32,
    pub signature:      u32,
    pub first_table:    u64,
    pub table_capacity: u32,
    pub entry_count:    u32,
}

impl Superblock {
    pub fn new(table_capacity: u32) -> Self {
        Self {
            magic:          MAGIC,
            version:        VERSION,
            signature:      SIGNATURE,
            first_table:    HEADER_SIZE as u64,
            table_capacity,
            entry_count:    0,
        }
    }

    /// Writes the fields followed by zero padding up to `HEADER_SIZE`.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.magic)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.signature)?;
        writer.write_u64::<LittleEndian>(self.first_table)?;
        writer.write_u32::<LittleEndian>(self.table_capacity)?;
        writer.write_u32::<LittleEndian>(self.entry_count)?;
        writer.write_all(&[0u8; HEADER_SIZE - HEADER_FIELDS_SIZE])?;
        Ok(())
    }

    /// Reads only the field bytes; callers seek to `first_table` afterwards.
    pub fn read<R: Read>(mut reader: R) -> Result<Self, HeaderError> {
        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != MAGIC {
            return Err(HeaderError::InvalidMagic(magic));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version > VERSION {
            return Err(HeaderError::UnsupportedVersion(version));
        }
        Ok(Self {
            magic,
            version,
            signature:      reader.read_u32::<LittleEndian>()?,
            first_table:    reader.read_u64::<LittleEndian>()?,
            table_capacity: reader.read_u32::<LittleEndian>()?,
            entry_count:    reader.read_u32::<LittleEndian>()?,
        })
    }
}

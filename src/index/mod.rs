//! UOP entry tables.
//!
//! Tables form a singly linked list starting at `Superblock::first_table`.
//! Each table is
//!
//! ```text
//! [ count u32 | next_table u64 | capacity x EntryRecord (34 B) ]
//! ```
//!
//! Only the first `count` slots are meaningful; a slot with `offset == 0` is
//! empty.  `next_table == 0` ends the chain.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom, Write};

pub const ENTRY_SIZE: usize = 34;
pub const TABLE_HEADER_SIZE: usize = 12;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntryRecord {
    pub offset:       u64,
    pub header_len:   u32,
    pub comp_len:     u32,
    pub decomp_len:   u32,
    pub hash:         u64,
    pub data_hash:    u32,
    pub flag:         u16,
}

impl EntryRecord {
    pub fn is_empty(&self) -> bool {
        self.offset == 0
    }

    /// Absolute offset of the (possibly compressed) payload.
    pub fn payload_offset(&self) -> u64 {
        self.offset + u64::from(self.header_len)
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.header_len)?;
        writer.write_u32::<LittleEndian>(self.comp_len)?;
        writer.write_u32::<LittleEndian>(self.decomp_len)?;
        writer.write_u64::<LittleEndian>(self.hash)?;
        writer.write_u32::<LittleEndian>(self.data_hash)?;
        writer.write_u16::<LittleEndian>(self.flag)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            offset:     reader.read_u64::<LittleEndian>()?,
            header_len: reader.read_u32::<LittleEndian>()?,
            comp_len:   reader.read_u32::<LittleEndian>()?,
            decomp_len: reader.read_u32::<LittleEndian>()?,
            hash:       reader.read_u64::<LittleEndian>()?,
            data_hash:  reader.read_u32::<LittleEndian>()?,
            flag:       reader.read_u16::<LittleEndian>()?,
        })
    }
}

/// Size on disk of a table with `capacity` slots.
pub fn table_size(capacity: usize) -> u64 {
    (TABLE_HEADER_SIZE + capacity * ENTRY_SIZE) as u64
}

/// Write one table: `entries` followed by zeroed slots up to `capacity`.
pub fn write_table<W: Write>(
    mut writer: W,
    entries:    &[EntryRecord],
    capacity:   usize,
    next_table: u64,
) -> io::Result<()> {
    debug_assert!(entries.len() <= capacity);
    writer.write_u32::<LittleEndian>(entries.len() as u32)?;
    writer.write_u64::<LittleEndian>(next_table)?;
    for entry in entries {
        entry.write(&mut writer)?;
    }
    let empty = EntryRecord::default();
    for _ in entries.len()..capacity {
        empty.write(&mut writer)?;
    }
    Ok(())
}

/// The flattened entry list of a container, in table order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntryTable {
    pub entries: Vec<EntryRecord>,
    pub tables:  usize,
}

impl EntryTable {
    /// Walk the table chain from `first_table`.  Empty slots are dropped.
    ///
    /// A chain that revisits a table offset is treated as ending there.
    pub fn read<R: Read + Seek>(reader: &mut R, first_table: u64) -> io::Result<Self> {
        let mut table = EntryTable::default();
        let mut seen = HashSet::new();
        let mut next = first_table;

        while next != 0 && seen.insert(next) {
            reader.seek(SeekFrom::Start(next))?;
            let count = reader.read_u32::<LittleEndian>()?;
            next = reader.read_u64::<LittleEndian>()?;
            for _ in 0..count {
                let entry = EntryRecord::read(&mut *reader)?;
                if !entry.is_empty() {
                    table.entries.push(entry);
                }
            }
            table.tables += 1;
        }
        Ok(table)
    }

    pub fn find(&self, hash: u64) -> Option<&EntryRecord> {
        self.entries.iter().find(|e| e.hash == hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Chunked container engine: UOP reader and writer.
//!
//! # Model
//! A UOP container is a header, a linked list of entry tables, and a bulk
//! data region.  Entries are anonymous on disk: each is identified only by
//! the hash of its name (see [`crate::hash::entry_hash`]).  Names follow an
//! [`EntryTemplate`] such as `build/map0legacymul/{}.dat`, where `{}` is an
//! 8-digit zero-padded ordinal.
//!
//! Each entry holds a *run* of consecutively numbered fixed-size blocks.
//! Entry ordinal `e` covers logical blocks `e * run_length ..`.
//!
//! # Consumer contract
//! The engine never interprets block bytes.  A consumer implements
//! [`ChunkedBlocks`]: it says how many blocks it has, takes decoded runs on
//! load, and produces runs on save.
//!
//! # Reader
//! [`ContainerReader`] parses the header and the whole table chain up front.
//! `load_chunks` visits entries in table order, keeps the ones whose hash
//! matches an ordinal below `max_ordinals`, decompresses them and hands them
//! to the consumer.  Unmatched entries are skipped.  Delivery is not
//! transactional: an error leaves earlier runs delivered.
//!
//! # Writer
//! [`ContainerWriter`] always builds a fresh file.  Tables are reserved as
//! zeroed placeholders, payloads follow, and each table is patched once it is
//! full (or on `finalize`).  The header is patched last.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, info};
use thiserror::Error;

use crate::codec::{get_codec, get_codec_by_flag, CodecError, CodecId};
use crate::hash::{adler32, entry_hash};
use crate::index::{table_size, write_table, EntryRecord, EntryTable};
use crate::superblock::{HeaderError, Superblock, HEADER_SIZE};

/// Entries per table in files we write.
pub const DEFAULT_TABLE_CAPACITY: usize = 1000;
/// Ordinals probed when matching entry hashes on load.
pub const DEFAULT_MAX_ORDINALS: usize = 0x300;

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Header error: {0}")]
    Header(#[from] HeaderError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Entry {hash:016x} decoded to {actual} bytes, table declares {declared}")]
    SizeMismatch { hash: u64, declared: u32, actual: usize },
    #[error("Entry {hash:016x} payload truncated: wanted {wanted} bytes, got {got}")]
    Truncated { hash: u64, wanted: u32, got: usize },
    #[error("Entry of {0} bytes does not fit a 32-bit length field")]
    EntryTooLarge(usize),
}

// ── Consumer contract ────────────────────────────────────────────────────────

/// Capability a block store exposes to the container engine.
pub trait ChunkedBlocks {
    /// Number of logical blocks the store holds.
    fn block_count(&self) -> usize;

    /// Accept the decoded run for entry `ordinal`; `start_block` is
    /// `ordinal * run_length`.  The store keeps whole blocks that fit and
    /// ignores the rest.
    fn receive_chunk(&mut self, ordinal: usize, start_block: usize, data: &[u8]);

    /// Produce the full run for entry `ordinal`, zero-padded past the end of
    /// the store.
    fn produce_chunk(&self, ordinal: usize) -> Vec<u8>;
}

/// Number of entries needed to hold `block_count` blocks.
pub fn chunks_needed(block_count: usize, run_length: usize) -> usize {
    block_count.div_ceil(run_length.max(1))
}

// ── Entry naming ─────────────────────────────────────────────────────────────

/// Entry name pattern with a single `{}` ordinal placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryTemplate {
    pattern: String,
}

impl EntryTemplate {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self { pattern: pattern.into() }
    }

    pub fn name(&self, ordinal: usize) -> String {
        self.pattern.replacen("{}", &format!("{ordinal:08}"), 1)
    }

    pub fn hash(&self, ordinal: usize) -> u64 {
        entry_hash(&self.name(ordinal))
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ContainerOptions {
    /// Blocks per entry.
    pub run_length:     usize,
    /// Upper bound on ordinals matched when loading.
    pub max_ordinals:   usize,
    /// Entry slots per table when writing.
    pub table_capacity: usize,
    /// Compression applied to written entries.
    pub compression:    CodecId,
}

impl ContainerOptions {
    pub fn with_run_length(run_length: usize) -> Self {
        Self { run_length, ..Self::default() }
    }
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            run_length:     1,
            max_ordinals:   DEFAULT_MAX_ORDINALS,
            table_capacity: DEFAULT_TABLE_CAPACITY,
            compression:    CodecId::None,
        }
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct ContainerWriter<W: Write + Seek> {
    writer:        W,
    pub superblock: Superblock,
    options:       ContainerOptions,
    /// Offset of the table currently being filled.
    open_table:    Option<u64>,
    pending:       Vec<EntryRecord>,
}

impl<W: Write + Seek> ContainerWriter<W> {
    pub fn new(mut writer: W, options: ContainerOptions) -> Result<Self, ContainerError> {
        let capacity = options.table_capacity.max(1);
        let options = ContainerOptions { table_capacity: capacity, ..options };
        let superblock = Superblock::new(capacity as u32);
        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(&[0u8; HEADER_SIZE])?; // reserved; overwritten on finalize
        Ok(Self {
            writer,
            superblock,
            options,
            open_table: None,
            pending:    Vec::new(),
        })
    }

    /// Append one named entry.
    pub fn add_entry(&mut self, name: &str, data: &[u8]) -> Result<(), ContainerError> {
        if self.open_table.is_none() || self.pending.len() == self.options.table_capacity {
            self.start_table()?;
        }

        let payload = get_codec(self.options.compression).compress(data)?;
        let comp_len = u32::try_from(payload.len())
            .map_err(|_| ContainerError::EntryTooLarge(payload.len()))?;
        let decomp_len = u32::try_from(data.len())
            .map_err(|_| ContainerError::EntryTooLarge(data.len()))?;

        let offset = self.writer.stream_position()?;
        self.writer.write_all(&payload)?;

        debug!("entry {name}: {} -> {} bytes at {offset:#x}", data.len(), payload.len());
        self.pending.push(EntryRecord {
            offset,
            header_len: 0,
            comp_len,
            decomp_len,
            hash:       entry_hash(name),
            data_hash:  adler32(&payload),
            flag:       self.options.compression.flag(),
        });
        self.superblock.entry_count += 1;
        Ok(())
    }

    /// Request every run from `source` and append it under `template`.
    /// Returns the number of entries written.
    pub fn write_chunks<C: ChunkedBlocks + ?Sized>(
        &mut self,
        template: &EntryTemplate,
        source:   &C,
    ) -> Result<usize, ContainerError> {
        let total = chunks_needed(source.block_count(), self.options.run_length);
        for ordinal in 0..total {
            let chunk = source.produce_chunk(ordinal);
            self.add_entry(&template.name(ordinal), &chunk)?;
        }
        Ok(total)
    }

    /// Patch the last table and the header.  Must be called exactly once.
    pub fn finalize(mut self) -> Result<W, ContainerError> {
        if self.open_table.is_none() {
            // An empty container still gets one (empty) table.
            self.start_table()?;
        }
        self.close_table(0)?;

        self.writer.seek(SeekFrom::Start(0))?;
        self.superblock.write(&mut self.writer)?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn start_table(&mut self) -> Result<(), ContainerError> {
        let table_pos = self.writer.stream_position()?;
        if self.open_table.is_some() {
            self.close_table(table_pos)?;
        }
        let placeholder = vec![0u8; table_size(self.options.table_capacity) as usize];
        self.writer.write_all(&placeholder)?;
        self.open_table = Some(table_pos);
        Ok(())
    }

    fn close_table(&mut self, next_table: u64) -> Result<(), ContainerError> {
        if let Some(pos) = self.open_table.take() {
            let end = self.writer.stream_position()?;
            self.writer.seek(SeekFrom::Start(pos))?;
            write_table(&mut self.writer, &self.pending, self.options.table_capacity, next_table)?;
            self.writer.seek(SeekFrom::Start(end))?;
            self.pending.clear();
        }
        Ok(())
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct ContainerReader<R: Read + Seek> {
    reader:         R,
    pub superblock: Superblock,
    pub table:      EntryTable,
}

impl<R: Read + Seek> ContainerReader<R> {
    pub fn new(mut reader: R) -> Result<Self, ContainerError> {
        reader.seek(SeekFrom::Start(0))?;
        let superblock = Superblock::read(&mut reader)?;
        let table = EntryTable::read(&mut reader, superblock.first_table)?;
        debug!(
            "container: {} entries in {} table(s), header declares {}",
            table.len(), table.tables, superblock.entry_count
        );
        Ok(Self { reader, superblock, table })
    }

    pub fn entries(&self) -> &EntryTable {
        &self.table
    }

    /// Read and decompress one entry's payload.
    pub fn read_entry(&mut self, entry: &EntryRecord) -> Result<Vec<u8>, ContainerError> {
        let codec = get_codec_by_flag(entry.flag)?;
        self.reader.seek(SeekFrom::Start(entry.payload_offset()))?;
        let mut payload = Vec::new();
        let got = (&mut self.reader).take(u64::from(entry.comp_len)).read_to_end(&mut payload)?;
        if got != entry.comp_len as usize {
            return Err(ContainerError::Truncated { hash: entry.hash, wanted: entry.comp_len, got });
        }

        let data = codec.decompress(&payload, entry.decomp_len as usize)?;
        if data.len() != entry.decomp_len as usize {
            return Err(ContainerError::SizeMismatch {
                hash:     entry.hash,
                declared: entry.decomp_len,
                actual:   data.len(),
            });
        }
        Ok(data)
    }

    /// Read an entry by name; `Ok(None)` if no entry carries that hash.
    pub fn read_named(&mut self, name: &str) -> Result<Option<Vec<u8>>, ContainerError> {
        match self.table.find(entry_hash(name)).cloned() {
            Some(entry) => self.read_entry(&entry).map(Some),
            None        => Ok(None),
        }
    }

    /// Deliver every entry matching `template` to `sink`, in table order.
    /// Returns the number of runs delivered.
    pub fn load_chunks<C: ChunkedBlocks + ?Sized>(
        &mut self,
        template: &EntryTemplate,
        options:  &ContainerOptions,
        sink:     &mut C,
    ) -> Result<usize, ContainerError> {
        let ordinals: HashMap<u64, usize> = (0..options.max_ordinals)
            .map(|ordinal| (template.hash(ordinal), ordinal))
            .collect();

        let entries = self.table.entries.clone();
        let mut delivered = 0usize;
        for entry in &entries {
            let Some(&ordinal) = ordinals.get(&entry.hash) else {
                debug!("skipping entry {:016x}: not part of {}", entry.hash, template.pattern());
                continue;
            };
            let data = self.read_entry(entry)?;
            sink.receive_chunk(ordinal, ordinal * options.run_length, &data);
            delivered += 1;
        }
        Ok(delivered)
    }
}

// ── File-level convenience ───────────────────────────────────────────────────

pub fn load_container<P, C>(
    path:     P,
    template: &EntryTemplate,
    options:  &ContainerOptions,
    sink:     &mut C,
) -> Result<usize, ContainerError>
where
    P: AsRef<Path>,
    C: ChunkedBlocks + ?Sized,
{
    let path = path.as_ref();
    let mut reader = ContainerReader::new(BufReader::new(File::open(path)?))?;
    let delivered = reader.load_chunks(template, options, sink)?;
    info!("{}: loaded {delivered} run(s)", path.display());
    Ok(delivered)
}

/// Rebuild `path` from scratch with every run `source` produces.
pub fn save_container<P, C>(
    path:     P,
    template: &EntryTemplate,
    options:  &ContainerOptions,
    source:   &C,
) -> Result<usize, ContainerError>
where
    P: AsRef<Path>,
    C: ChunkedBlocks + ?Sized,
{
    let path = path.as_ref();
    let mut writer = ContainerWriter::new(BufWriter::new(File::create(path)?), options.clone())?;
    let written = writer.write_chunks(template, source)?;
    writer.finalize()?;
    info!("{}: wrote {written} run(s)", path.display());
    Ok(written)
}

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use uomap::client::ClientFiles;
use uomap::codec::CodecId;
use uomap::io_stream::ContainerReader;
use uomap::map::{max_maps, uop::terrain_template};
use uomap::script::{write_build_script, ScriptHeader};
use uomap::{DiffMode, UoMap};

#[derive(Parser)]
#[command(name = "uomap", about = "Legacy UO map terrain/art tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Mul,
    Uop,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate buildmap{N}.lst scripts from a client directory
    Extract {
        /// Client installation directory
        client_dir: PathBuf,
        /// Map numbers to process (default: all)
        #[arg(short, long)]
        map: Vec<usize>,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        /// Ignore diff files
        #[arg(long)]
        no_diff: bool,
    },
    /// Convert terrain between flat MUL and UOP containers
    Convert {
        #[arg(short, long)]
        map: usize,
        #[arg(long, value_enum)]
        from: Format,
        #[arg(long, value_enum)]
        to: Format,
        input: PathBuf,
        output: PathBuf,
        /// UOP entry compression: none, zlib
        #[arg(short, long, default_value = "none")]
        codec: String,
        /// Terrain diff list/data applied before writing
        #[arg(long, requires = "dif")]
        difl: Option<PathBuf>,
        #[arg(long, requires = "difl")]
        dif: Option<PathBuf>,
        /// Reject the diff entirely if any part of it is bad
        #[arg(long)]
        atomic: bool,
        /// Art index and data files copied alongside the terrain
        #[arg(long, num_args = 2, value_names = ["IDX", "MUL"], requires = "art_out")]
        art_in: Option<Vec<PathBuf>>,
        #[arg(long, num_args = 2, value_names = ["IDX", "MUL"], requires = "art_in")]
        art_out: Option<Vec<PathBuf>>,
    },
    /// Show container header and entry table
    Info {
        input: PathBuf,
        /// Mark entries belonging to this map's terrain
        #[arg(short, long)]
        map: Option<usize>,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { client_dir, map, output_dir, no_diff } => {
            let maps: Vec<usize> = if map.is_empty() { (0..max_maps()).collect() } else { map };
            if !output_dir.exists() { std::fs::create_dir_all(&output_dir)?; }

            for number in maps {
                let files = ClientFiles::new(&client_dir, number);
                let mut uomap = match files.load_map() {
                    Ok(m)  => m,
                    Err(e) => {
                        warn!("map {number}: {e}, skipping");
                        continue;
                    }
                };
                let diffs = if no_diff { Vec::new() } else { files.apply_diffs(&mut uomap) };

                let script = output_dir.join(files.script_name());
                let out = match File::create(&script) {
                    Ok(f)  => BufWriter::new(f),
                    Err(e) => {
                        error!("Unable to create {}: {e}", script.display());
                        break;
                    }
                };
                info!("Generating map {number}");
                let mut header = ScriptHeader::new()
                    .source("Terrain", &files.terrain_source())
                    .separator()
                    .source("Art", &files.art_idx())
                    .source("Art", &files.art_mul());
                if !diffs.is_empty() {
                    header = header.separator();
                    for diff in &diffs {
                        header = header.source("Diff", diff);
                    }
                }
                write_build_script(out, &uomap, &header)?;
                println!("  wrote  {}", script.display());
            }
        }

        // ── Convert ──────────────────────────────────────────────────────────
        Commands::Convert { map, from, to, input, output, codec, difl, dif, atomic, art_in, art_out } => {
            let mut uomap = UoMap::new(map, 0, 0)?;
            match from {
                Format::Mul => uomap.load_terrain_mul(&input)?,
                Format::Uop => uomap.load_terrain_uop(&input)?,
            }
            if let (Some(difl), Some(dif)) = (difl, dif) {
                let mode = if atomic { DiffMode::Atomic } else { DiffMode::BestEffort };
                if let Err(e) = uomap.apply_terrain_diff_with(&difl, &dif, mode) {
                    warn!("terrain diff not fully applied: {e}");
                }
            }
            match to {
                Format::Mul => uomap.save_terrain_mul(&output)?,
                Format::Uop => uomap.save_terrain_uop_with(&output, parse_codec(&codec))?,
            }
            if let (Some(art_in), Some(art_out)) = (art_in, art_out) {
                uomap.load_art(&art_in[0], &art_in[1])?;
                uomap.save_art(&art_out[0], &art_out[1])?;
                println!("Art       → {}", art_out[0].display());
            }
            println!("Converted → {}", output.display());
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, map, json } => {
            let reader = ContainerReader::new(BufReader::new(File::open(&input)?))?;
            let report = InfoReport::build(&reader, map);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                report.print(&input);
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn parse_codec(s: &str) -> CodecId {
    CodecId::from_name(s).unwrap_or_else(|| {
        eprintln!("Unknown codec '{}', defaulting to none", s);
        CodecId::None
    })
}

#[derive(Serialize)]
struct InfoEntry {
    hash:       String,
    offset:     u64,
    comp_len:   u32,
    decomp_len: u32,
    codec:      String,
    ordinal:    Option<usize>,
}

#[derive(Serialize)]
struct InfoReport {
    version:        u32,
    signature:      String,
    table_capacity: u32,
    declared:       u32,
    tables:         usize,
    entries:        Vec<InfoEntry>,
}

impl InfoReport {
    fn build<R: std::io::Read + std::io::Seek>(reader: &ContainerReader<R>, map: Option<usize>) -> Self {
        let template = map.map(terrain_template);
        let ordinal_of = |hash: u64| {
            template.as_ref().and_then(|t| {
                (0..uomap::io_stream::DEFAULT_MAX_ORDINALS).find(|&o| t.hash(o) == hash)
            })
        };
        let sb = &reader.superblock;
        InfoReport {
            version:        sb.version,
            signature:      format!("{:#010x}", sb.signature),
            table_capacity: sb.table_capacity,
            declared:       sb.entry_count,
            tables:         reader.entries().tables,
            entries:        reader.entries().entries.iter().map(|e| InfoEntry {
                hash:       hex::encode(e.hash.to_be_bytes()),
                offset:     e.offset,
                comp_len:   e.comp_len,
                decomp_len: e.decomp_len,
                codec:      CodecId::from_flag(e.flag)
                    .map(|c| c.name().to_owned())
                    .unwrap_or_else(|| format!("flag {}", e.flag)),
                ordinal:    ordinal_of(e.hash),
            }).collect(),
        }
    }

    fn print(&self, path: &std::path::Path) {
        println!("── UOP container ────────────────────────────────────────");
        println!("  Path           {}", path.display());
        println!("  Version        {}", self.version);
        println!("  Signature      {}", self.signature);
        println!("  Table capacity {}", self.table_capacity);
        println!("  Entries        {} ({} declared, {} table(s))",
                 self.entries.len(), self.declared, self.tables);
        println!("{:<18} {:>12} {:>10} {:>10} {:>6} {:>8}",
                 "Hash", "Offset", "Stored", "Size", "Codec", "Ordinal");
        for e in &self.entries {
            let ordinal = e.ordinal.map(|o| o.to_string()).unwrap_or_else(|| "—".into());
            println!("{:<18} {:>12} {:>10} {:>10} {:>6} {:>8}",
                     e.hash, e.offset, e.comp_len, e.decomp_len, e.codec, ordinal);
        }
    }
}

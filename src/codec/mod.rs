//! Entry compression registry.
//!
//! Every UOP entry carries a 16-bit compression flag.  This build knows two:
//! stored (0) and zlib (1).  Anything else is reported as unsupported and the
//! entry cannot be decoded; there is no fallback.

use std::io::{self, Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;

pub const FLAG_NONE: u16 = 0;
pub const FLAG_ZLIB: u16 = 1;

/// Default zlib level when writing compressed entries.
pub const DEFAULT_ZLIB_LEVEL: u32 = 6;

// ── CodecId ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecId {
    #[default]
    None,
    Zlib,
}

impl CodecId {
    /// The flag value written into the entry table.
    pub fn flag(self) -> u16 {
        match self {
            CodecId::None => FLAG_NONE,
            CodecId::Zlib => FLAG_ZLIB,
        }
    }

    pub fn from_flag(flag: u16) -> Option<Self> {
        match flag {
            FLAG_NONE => Some(CodecId::None),
            FLAG_ZLIB => Some(CodecId::Zlib),
            _         => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CodecId::None => "none",
            CodecId::Zlib => "zlib",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" | "stored" => Some(CodecId::None),
            "zlib"            => Some(CodecId::Zlib),
            _                 => None,
        }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("Unsupported compression flag {0}")]
    Unsupported(u16),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec {
    fn codec_id(&self) -> CodecId;
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
    /// `size_hint` is the declared decompressed length; used for allocation only.
    fn decompress(&self, data: &[u8], size_hint: usize) -> Result<Vec<u8>, CodecError>;
}

pub struct NoneCodec;
impl Codec for NoneCodec {
    fn codec_id(&self) -> CodecId { CodecId::None }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8], _: usize) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
}

pub struct ZlibCodec {
    pub level: u32,
}

impl Default for ZlibCodec {
    fn default() -> Self {
        Self { level: DEFAULT_ZLIB_LEVEL }
    }
}

impl Codec for ZlibCodec {
    fn codec_id(&self) -> CodecId { CodecId::Zlib }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::new(self.level.min(9)));
        enc.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        enc.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8], size_hint: usize) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(size_hint);
        ZlibDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

pub fn get_codec(id: CodecId) -> Box<dyn Codec> {
    match id {
        CodecId::None => Box::new(NoneCodec),
        CodecId::Zlib => Box::new(ZlibCodec::default()),
    }
}

/// Resolve an on-disk flag to a codec.  Unknown flags are an error.
pub fn get_codec_by_flag(flag: u16) -> Result<Box<dyn Codec>, CodecError> {
    CodecId::from_flag(flag)
        .map(get_codec)
        .ok_or(CodecError::Unsupported(flag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zlib_roundtrip() {
        let data: Vec<u8> = (0u8..=255).cycle().take(196 * 40).collect();
        let codec = get_codec(CodecId::Zlib);
        let packed = codec.compress(&data).unwrap();
        assert_eq!(packed[0], 0x78, "zlib stream header");
        assert_eq!(codec.decompress(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(matches!(get_codec_by_flag(3), Err(CodecError::Unsupported(3))));
        assert_eq!(get_codec_by_flag(FLAG_NONE).unwrap().codec_id(), CodecId::None);
    }

    #[test]
    fn names_parse_back() {
        for id in [CodecId::None, CodecId::Zlib] {
            assert_eq!(CodecId::from_name(id.name()), Some(id));
            assert_eq!(CodecId::from_flag(id.flag()), Some(id));
        }
    }
}

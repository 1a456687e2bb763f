use std::io::Read;

use crate::config::{CompressionAlgorithm, CompressionConfig};
use crate::error::{MnemoError, Result};

const TAG_NONE: u8 = 0x00;
const TAG_LZ4: u8 = 0x01;
const TAG_ZSTD: u8 = 0x02;

/// Maximum decompressed output size. Caps memory use when decoding
/// hostile or corrupted objects.
const MAX_DECOMPRESS_SIZE: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    None,
    #[default]
    Lz4,
    Zstd {
        level: i32,
    },
}

impl Compression {
    pub fn from_config(cfg: &CompressionConfig) -> Self {
        match cfg.algorithm {
            CompressionAlgorithm::None => Compression::None,
            CompressionAlgorithm::Lz4 => Compression::Lz4,
            CompressionAlgorithm::Zstd => Compression::Zstd {
                level: cfg.zstd_level,
            },
        }
    }
}

/// Compress data and prepend a 1-byte tag identifying the codec.
pub fn compress(compression: Compression, data: &[u8]) -> Result<Vec<u8>> {
    match compression {
        Compression::None => {
            let mut out = Vec::with_capacity(1 + data.len());
            out.push(TAG_NONE);
            out.extend_from_slice(data);
            Ok(out)
        }
        Compression::Lz4 => {
            let compressed = lz4_flex::compress_prepend_size(data);
            let mut out = Vec::with_capacity(1 + compressed.len());
            out.push(TAG_LZ4);
            out.extend_from_slice(&compressed);
            Ok(out)
        }
        Compression::Zstd { level } => {
            let compressed = zstd::bulk::compress(data, level)
                .map_err(|e| MnemoError::Other(format!("zstd compress: {e}")))?;
            let mut out = Vec::with_capacity(1 + compressed.len());
            out.push(TAG_ZSTD);
            out.extend_from_slice(&compressed);
            Ok(out)
        }
    }
}

/// Decompress data by reading the 1-byte tag prefix and dispatching.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Err(MnemoError::Decompression("empty data".into()));
    }
    let tag = data[0];
    let payload = &data[1..];
    match tag {
        TAG_NONE => Ok(payload.to_vec()),
        TAG_LZ4 => {
            if payload.len() < 4 {
                return Err(MnemoError::Decompression("lz4: payload too short".into()));
            }
            let uncompressed_size = u32::from_le_bytes(payload[..4].try_into().unwrap()) as u64;
            if uncompressed_size > MAX_DECOMPRESS_SIZE {
                return Err(MnemoError::Decompression(format!(
                    "lz4: decompressed size ({uncompressed_size}) exceeds limit of {MAX_DECOMPRESS_SIZE} bytes"
                )));
            }
            lz4_flex::decompress_size_prepended(payload)
                .map_err(|e| MnemoError::Decompression(format!("lz4: {e}")))
        }
        TAG_ZSTD => {
            let mut decoder = zstd::stream::Decoder::new(std::io::Cursor::new(payload))
                .map_err(|e| MnemoError::Decompression(format!("zstd init: {e}")))?;
            let mut output = Vec::new();
            decoder
                .by_ref()
                .take(MAX_DECOMPRESS_SIZE + 1)
                .read_to_end(&mut output)
                .map_err(|e| MnemoError::Decompression(format!("zstd: {e}")))?;
            if output.len() as u64 > MAX_DECOMPRESS_SIZE {
                return Err(MnemoError::Decompression(format!(
                    "zstd: decompressed size exceeds limit of {MAX_DECOMPRESS_SIZE} bytes"
                )));
            }
            Ok(output)
        }
        _ => Err(MnemoError::UnknownCompressionTag(tag)),
    }
}

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Engine configuration, passed to [`crate::Repository::open`].
///
/// Everything is wired by the embedder; the engine reads no environment
/// variables and defines no CLI surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The user data folder that snapshots capture.
    pub data_root: PathBuf,
    /// Root of the local content-addressed object store.
    pub repo_path: PathBuf,
    #[serde(default)]
    pub chunker: ChunkerConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
    /// Gitignore-dialect patterns selecting paths handled lazily.
    #[serde(default)]
    pub lazy_patterns: Vec<String>,
    /// When false the lazy subsystem is entirely inert.
    #[serde(default)]
    pub lazy_load_enabled: bool,
}

impl EngineConfig {
    pub fn new(data_root: impl Into<PathBuf>, repo_path: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            repo_path: repo_path.into(),
            chunker: ChunkerConfig::default(),
            compression: CompressionConfig::default(),
            encryption: EncryptionConfig::default(),
            lazy_patterns: Vec::new(),
            lazy_load_enabled: false,
        }
    }
}

/// FastCDC parameters for content-defined chunking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkerConfig {
    #[serde(default = "default_min_chunk_size")]
    pub min_size: u32,
    #[serde(default = "default_avg_chunk_size")]
    pub avg_size: u32,
    #[serde(default = "default_max_chunk_size")]
    pub max_size: u32,
}

fn default_min_chunk_size() -> u32 {
    64 * 1024
}

fn default_avg_chunk_size() -> u32 {
    256 * 1024
}

fn default_max_chunk_size() -> u32 {
    1024 * 1024
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_size: default_min_chunk_size(),
            avg_size: default_avg_chunk_size(),
            max_size: default_max_chunk_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    None,
    #[default]
    Lz4,
    Zstd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default)]
    pub algorithm: CompressionAlgorithm,
    #[serde(default = "default_zstd_level")]
    pub zstd_level: i32,
}

fn default_zstd_level() -> i32 {
    3
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::default(),
            zstd_level: default_zstd_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMode {
    #[default]
    None,
    Aes256Gcm,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncryptionConfig {
    #[serde(default)]
    pub mode: EncryptionMode,
    /// 64-hex-char symmetric key; required when `mode` is not `None`.
    #[serde(default)]
    pub key_hex: Option<String>,
}

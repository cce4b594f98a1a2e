use std::path::PathBuf;
use thiserror::Error;

use super::de::DecodeError;
use super::file::ConfigFormat;
use super::source::Precedence;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config file '{name}' not found in {searched:?}")]
    ConfigFileNotFound { name: String, searched: Vec<PathBuf> },

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {format} config from {origin}: {message}")]
    Parse {
        origin: String,
        format: ConfigFormat,
        message: String,
    },

    #[error("unsupported config type: {0}")]
    UnsupportedFormat(String),

    #[error("cannot convert '{key}': expected {expected}, found {found}")]
    TypeConversion {
        key: String,
        expected: &'static str,
        found: String,
    },

    #[error("failed to decode '{key}': {source}")]
    Decode { key: String, source: DecodeError },

    #[error("conflicting {precedence} layer at '{key}': mapping and non-mapping values cannot be merged")]
    DuplicateLayer { precedence: Precedence, key: String },

    #[error("failed to serialize layer: {0}")]
    Serialize(String),
}

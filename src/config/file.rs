//! Config file formats and discovery.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use super::value::{Map, Value};
use super::ConfigError;

/// Supported on-disk formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// Extensions tried, in order, when searching a directory.
    pub const SEARCH_EXTENSIONS: [&'static str; 4] = ["json", "toml", "yaml", "yml"];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(ConfigFormat::Json),
            "toml" => Some(ConfigFormat::Toml),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    fn extensions(self) -> &'static [&'static str] {
        match self {
            ConfigFormat::Json => &["json"],
            ConfigFormat::Toml => &["toml"],
            ConfigFormat::Yaml => &["yaml", "yml"],
        }
    }

    /// Parses `contents` into a mapping. `origin` names the source in errors.
    pub fn parse(self, contents: &str, origin: &str) -> Result<Map, ConfigError> {
        let parse_error = |message: String| ConfigError::Parse {
            origin: origin.to_string(),
            format: self,
            message,
        };

        let value = match self {
            ConfigFormat::Json => serde_json::from_str::<serde_json::Value>(contents)
                .map(Value::from)
                .map_err(|e| parse_error(e.to_string()))?,
            ConfigFormat::Toml => toml::from_str::<toml::Table>(contents)
                .map(|table| Value::from(toml::Value::Table(table)))
                .map_err(|e| parse_error(e.to_string()))?,
            ConfigFormat::Yaml => serde_yaml::from_str::<serde_yaml::Value>(contents)
                .map(Value::from)
                .map_err(|e| parse_error(e.to_string()))?,
        };

        match value {
            Value::Map(map) => Ok(map),
            // An empty YAML document.
            Value::Null => Ok(Map::new()),
            other => Err(parse_error(format!(
                "top-level value must be a mapping, found {}",
                other.kind()
            ))),
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigFormat::Json => "json",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Yaml => "yaml",
        })
    }
}

impl FromStr for ConfigFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| ConfigError::UnsupportedFormat(s.to_string()))
    }
}

/// Reads and parses a config file.
///
/// The format is `format` when given, otherwise taken from the extension.
pub(crate) fn read_config_file(
    path: &Path,
    format: Option<ConfigFormat>,
) -> Result<Map, ConfigError> {
    let format = match format {
        Some(format) => format,
        None => ConfigFormat::from_path(path).ok_or_else(|| {
            ConfigError::UnsupportedFormat(
                path.extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            )
        })?,
    };

    match std::fs::read_to_string(path) {
        Ok(contents) => format.parse(&contents, &path.display().to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ConfigError::FileNotFound(path.to_path_buf()))
        }
        Err(e) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Looks for `<dir>/<name>.<ext>` in each directory, in registration order.
///
/// Within a directory the extensions of `format` are tried, or every
/// supported extension when no format is pinned.
pub(crate) fn find_config_file(
    dirs: &[PathBuf],
    name: &str,
    format: Option<ConfigFormat>,
) -> Result<PathBuf, ConfigError> {
    let extensions: &[&str] = match format {
        Some(format) => format.extensions(),
        None => &ConfigFormat::SEARCH_EXTENSIONS,
    };

    for dir in dirs {
        for ext in extensions {
            let candidate = dir.join(format!("{name}.{ext}"));
            debug!(path = %candidate.display(), "checking for config file");
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    Err(ConfigError::ConfigFileNotFound {
        name: name.to_string(),
        searched: dirs.to_vec(),
    })
}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::convert::FromValue;
use super::de::decode;
use super::expand::expand_path;
use super::file::{find_config_file, read_config_file, ConfigFormat};
use super::source::{deep_merge, try_deep_merge, Layer, MergeReport, Precedence};
use super::value::{lookup_in_map, split_path, walk_map, Lookup, Map, Value, DEFAULT_DELIMITER};
use super::ConfigError;

const DEFAULT_CONFIG_NAME: &str = "config";

/// Everything a resolver knows at one point in time.
///
/// Snapshots are never mutated once published; writers clone, modify and
/// swap in a new one.
#[derive(Debug, Clone)]
struct Snapshot {
    delimiter: String,
    layers: BTreeMap<Precedence, Map>,
    config_name: String,
    config_type: Option<ConfigFormat>,
    config_file: Option<PathBuf>,
    search_paths: Vec<PathBuf>,
    file_used: Option<PathBuf>,
}

impl Snapshot {
    fn new(delimiter: String) -> Self {
        Self {
            delimiter,
            layers: BTreeMap::new(),
            config_name: DEFAULT_CONFIG_NAME.to_string(),
            config_type: None,
            config_file: None,
            search_paths: Vec::new(),
            file_used: None,
        }
    }

    fn segments(&self, key: &str) -> Vec<String> {
        split_path(key, &self.delimiter)
    }

    /// Values at `segments` making up the resolved view, highest class
    /// first.
    ///
    /// The walk stops at the first class holding a non-mapping at the path
    /// or at any prefix of it: that value either is the answer or hides the
    /// path from every lower class. Mappings found above it merge.
    fn contributions(&self, segments: &[String]) -> Vec<(Precedence, &Value)> {
        let mut found = Vec::new();
        for (precedence, layer) in self.layers.iter().rev() {
            match walk_map(layer, segments) {
                Lookup::Absent => {}
                Lookup::Shadowed => break,
                Lookup::Found(value) => {
                    let is_map = matches!(value, Value::Map(_));
                    if is_map || found.is_empty() {
                        found.push((*precedence, value));
                    }
                    if !is_map {
                        break;
                    }
                }
            }
        }
        found
    }

    /// The resolved value at `segments`; the empty path is the whole view.
    fn resolve(&self, segments: &[String]) -> Option<Value> {
        if segments.is_empty() {
            return Some(Value::Map(self.merged()));
        }
        let mut found = self.contributions(segments).into_iter().rev();
        let (_, lowest) = found.next()?;
        let mut resolved = lowest.clone();
        for (_, value) in found {
            if let (Value::Map(base), Value::Map(overlay)) = (&mut resolved, value) {
                deep_merge(base, overlay.clone());
            }
        }
        Some(resolved)
    }

    /// Lower classes deep-merged under higher ones.
    fn merged(&self) -> Map {
        let mut merged = Map::new();
        for layer in self.layers.values() {
            deep_merge(&mut merged, layer.clone());
        }
        merged
    }

    /// Merges `layer` into the class `precedence`.
    ///
    /// Overwritten values are logged; a mapping meeting a non-mapping at the
    /// same path is [`ConfigError::DuplicateLayer`]. Callers publish the
    /// snapshot only on success, so a failed merge changes nothing.
    fn merge_layer(&mut self, precedence: Precedence, layer: Layer) -> Result<usize, ConfigError> {
        let delimiter = self.delimiter.clone();
        let conflict = |path: Vec<String>| ConfigError::DuplicateLayer {
            precedence,
            key: path.join(delimiter.as_str()),
        };

        let mut report = MergeReport::default();
        let incoming = layer.normalize(&delimiter, &mut report).map_err(conflict)?;
        let keys = incoming.len();
        let class = self.layers.entry(precedence).or_default();
        try_deep_merge(class, incoming, &mut Vec::new(), &mut report).map_err(conflict)?;

        for path in &report.overwritten {
            warn!(
                precedence = %precedence,
                key = %path.join(delimiter.as_str()),
                "configuration value overwritten within its class"
            );
        }
        Ok(keys)
    }

    /// Replaces the file class with `map`.
    fn replace_file_layer(&mut self, map: Map) -> Result<(), ConfigError> {
        self.layers.remove(&Precedence::File);
        self.merge_layer(Precedence::File, Layer::from_map(map))?;
        Ok(())
    }
}

/// Layered configuration with case-insensitive, delimited key lookup.
///
/// Values are resolved across precedence classes, highest first:
/// override, flag, environment, file, remote-store, default. Layers for
/// environment variables, flags or remote stores are built by the caller and
/// registered with [`add_layer`](Self::add_layer).
///
/// All methods take `&self`: reads work on an immutable snapshot and may run
/// concurrently, while each mutation builds a new snapshot and publishes it
/// under a write lock.
///
/// ## Example
///
/// ```no_run
/// use layercfg::ConfigResolver;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Server {
///     host: String,
///     port: u16,
/// }
///
/// let config = ConfigResolver::new();
/// config.add_config_path("./configs");
/// config.add_config_path("$HOME/configs");
/// config.set_config_name("env");
/// config.read_in_config()?;
///
/// assert!(config.is_set("prod.port"));
/// let prod: Server = config.sub("prod")?.unmarshal()?;
/// # Ok::<(), layercfg::ConfigError>(())
/// ```
#[derive(Debug)]
pub struct ConfigResolver {
    state: RwLock<Arc<Snapshot>>,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ConfigResolver {
    /// Creates an independent resolver starting from the same state.
    fn clone(&self) -> Self {
        Self {
            state: RwLock::new(self.snapshot()),
        }
    }
}

impl ConfigResolver {
    /// Creates an empty resolver using `.` as the key delimiter.
    pub fn new() -> Self {
        Self::with_delimiter(DEFAULT_DELIMITER)
    }

    /// Creates an empty resolver splitting keys on `delimiter`.
    pub fn with_delimiter(delimiter: impl Into<String>) -> Self {
        let delimiter = delimiter.into();
        assert!(!delimiter.is_empty(), "delimiter must not be empty");
        Self {
            state: RwLock::new(Arc::new(Snapshot::new(delimiter))),
        }
    }

    /// The delimiter separating path segments in keys.
    pub fn delimiter(&self) -> String {
        self.snapshot().delimiter.clone()
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.state.read())
    }

    /// Applies `f` to a copy of the current snapshot and publishes it only
    /// if `f` succeeds.
    fn update<R>(
        &self,
        f: impl FnOnce(&mut Snapshot) -> Result<R, ConfigError>,
    ) -> Result<R, ConfigError> {
        let mut guard = self.state.write();
        let mut next = Snapshot::clone(&guard);
        let out = f(&mut next)?;
        *guard = Arc::new(next);
        Ok(out)
    }

    fn update_infallible(&self, f: impl FnOnce(&mut Snapshot)) {
        let mut guard = self.state.write();
        let mut next = Snapshot::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
    }

    /// Registers `layer` under `precedence`.
    ///
    /// If the class already holds data the new layer is merged over it:
    /// mappings merge recursively and other values are overwritten, with a
    /// warning per overwritten key. A key that is a mapping on one side and
    /// not on the other fails with [`ConfigError::DuplicateLayer`] and leaves
    /// the class unchanged. The same rule applies between keys of `layer`
    /// itself, e.g. `db` and `db.host`.
    pub fn add_layer(&self, layer: Layer, precedence: Precedence) -> Result<(), ConfigError> {
        let keys = self.update(|snapshot| snapshot.merge_layer(precedence, layer))?;
        debug!(precedence = %precedence, keys, "registered configuration layer");
        Ok(())
    }

    /// Sets `key` in the override class, above every other source.
    ///
    /// Follows the same merge rules as [`add_layer`](Self::add_layer).
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), ConfigError> {
        let layer = Layer::new().with(key, value);
        self.update(|snapshot| snapshot.merge_layer(Precedence::Override, layer))?;
        debug!(key, "set override");
        Ok(())
    }

    /// Sets `key` in the default class, below every other source.
    ///
    /// Follows the same merge rules as [`add_layer`](Self::add_layer).
    pub fn set_default(&self, key: &str, value: impl Into<Value>) -> Result<(), ConfigError> {
        let layer = Layer::new().with(key, value);
        self.update(|snapshot| snapshot.merge_layer(Precedence::Default, layer))?;
        debug!(key, "set default");
        Ok(())
    }

    /// Uses `path` instead of searching the registered directories.
    pub fn set_config_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.update_infallible(|snapshot| snapshot.config_file = Some(path));
    }

    /// Adds a directory to search for the config file. Directories are
    /// searched in registration order; `$VAR`, `${VAR}` and `~` are expanded.
    pub fn add_config_path(&self, dir: &str) {
        let dir = expand_path(dir);
        debug!(dir = %dir.display(), "adding config search path");
        self.update_infallible(|snapshot| {
            if !snapshot.search_paths.contains(&dir) {
                snapshot.search_paths.push(dir);
            }
        });
    }

    /// Base name, without extension, of the file to search for.
    pub fn set_config_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.update_infallible(|snapshot| snapshot.config_name = name);
    }

    /// Pins the file format instead of inferring it from the extension.
    pub fn set_config_type(&self, format: ConfigFormat) {
        self.update_infallible(|snapshot| snapshot.config_type = Some(format));
    }

    /// Finds, reads and parses the config file into the file class.
    ///
    /// The explicit file from [`set_config_file`](Self::set_config_file) wins;
    /// otherwise the registered directories are searched. The file class is
    /// replaced as a whole, so repeating the call yields the same view. On
    /// failure every registered layer is left as it was.
    pub fn read_in_config(&self) -> Result<(), ConfigError> {
        self.read_file(None)
    }

    /// Reads the config file at `path` and, on success, keeps it as the
    /// explicit file for later [`read_in_config`](Self::read_in_config)
    /// calls. A failed load leaves the resolver untouched.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        self.read_file(Some(path.as_ref().to_path_buf()))
    }

    fn read_file(&self, explicit: Option<PathBuf>) -> Result<(), ConfigError> {
        let current = self.snapshot();
        let pin = explicit.is_some();
        let path = match explicit.or_else(|| current.config_file.clone()) {
            Some(path) => path,
            None => find_config_file(
                &current.search_paths,
                &current.config_name,
                current.config_type,
            )?,
        };

        let map = read_config_file(&path, current.config_type)?;
        self.update(|snapshot| {
            snapshot.replace_file_layer(map)?;
            if pin {
                snapshot.config_file = Some(path.clone());
            }
            snapshot.file_used = Some(path.clone());
            Ok(())
        })?;
        info!(path = %path.display(), "using config file");
        Ok(())
    }

    /// Parses in-memory `contents` into the file class.
    pub fn read_config(&self, format: ConfigFormat, contents: &str) -> Result<(), ConfigError> {
        let map = format.parse(contents, "<memory>")?;
        self.update(|snapshot| {
            snapshot.replace_file_layer(map)?;
            snapshot.file_used = None;
            Ok(())
        })?;
        debug!(%format, "read config from memory");
        Ok(())
    }

    /// The file read by the last successful [`read_in_config`](Self::read_in_config).
    pub fn config_file_used(&self) -> Option<PathBuf> {
        self.snapshot().file_used.clone()
    }

    /// Returns the value at `key` from the highest class that defines it.
    ///
    /// Keys are case-insensitive. `None` means no layer defines the key, or a
    /// higher class holds a non-mapping at one of its prefixes; an explicit
    /// `null` is returned as [`Value::Null`]. Mappings are merged across
    /// classes, and the empty key returns the merged view of all layers.
    pub fn get(&self, key: &str) -> Option<Value> {
        let snapshot = self.snapshot();
        snapshot.resolve(&snapshot.segments(key))
    }

    /// Whether `key` resolves to a value. Explicit `null` counts as set.
    pub fn is_set(&self, key: &str) -> bool {
        let snapshot = self.snapshot();
        let segments = snapshot.segments(key);
        segments.is_empty() || !snapshot.contributions(&segments).is_empty()
    }

    /// Whether the config file defines `key`.
    pub fn in_config(&self, key: &str) -> bool {
        let snapshot = self.snapshot();
        let segments = snapshot.segments(key);
        snapshot
            .layers
            .get(&Precedence::File)
            .is_some_and(|layer| lookup_in_map(layer, &segments).is_some())
    }

    /// Returns the value at `key` converted to `T`.
    ///
    /// Fails with [`ConfigError::KeyNotFound`] when the key is not set and
    /// [`ConfigError::TypeConversion`] when the value cannot be converted.
    /// See [`FromValue`] for the conversion rules.
    pub fn get_as<T: FromValue>(&self, key: &str) -> Result<T, ConfigError> {
        let value = self
            .get(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;
        T::from_value(&value).map_err(|e| ConfigError::TypeConversion {
            key: key.to_string(),
            expected: e.expected(),
            found: e.found().to_string(),
        })
    }

    /// [`get_as`](Self::get_as) as a string.
    pub fn get_string(&self, key: &str) -> Result<String, ConfigError> {
        self.get_as(key)
    }

    /// [`get_as`](Self::get_as) as an `i64`.
    pub fn get_i64(&self, key: &str) -> Result<i64, ConfigError> {
        self.get_as(key)
    }

    /// [`get_as`](Self::get_as) as a `u64`.
    pub fn get_u64(&self, key: &str) -> Result<u64, ConfigError> {
        self.get_as(key)
    }

    /// [`get_as`](Self::get_as) as an `f64`.
    pub fn get_f64(&self, key: &str) -> Result<f64, ConfigError> {
        self.get_as(key)
    }

    /// [`get_as`](Self::get_as) as a boolean.
    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        self.get_as(key)
    }

    /// [`get_as`](Self::get_as) as a [`Duration`].
    pub fn get_duration(&self, key: &str) -> Result<Duration, ConfigError> {
        self.get_as(key)
    }

    /// [`get_as`](Self::get_as) as a list of strings.
    pub fn get_string_vec(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        self.get_as(key)
    }

    /// Returns a resolver rooted at the mapping found at `key`.
    ///
    /// Each contributing layer is re-rooted separately, so precedence between
    /// classes is unchanged and `sub(key).get(rest)` equals
    /// `get(key + delimiter + rest)`. Fails with [`ConfigError::KeyNotFound`]
    /// if `key` does not resolve to a mapping. The child keeps the delimiter
    /// but no file discovery settings.
    pub fn sub(&self, key: &str) -> Result<ConfigResolver, ConfigError> {
        let snapshot = self.snapshot();
        let segments = snapshot.segments(key);

        let layers: BTreeMap<Precedence, Map> = if segments.is_empty() {
            snapshot.layers.clone()
        } else {
            snapshot
                .contributions(&segments)
                .into_iter()
                .filter_map(|(precedence, value)| Some((precedence, value.as_map()?.clone())))
                .collect()
        };

        if layers.is_empty() {
            return Err(ConfigError::KeyNotFound(key.to_string()));
        }

        let mut child = Snapshot::new(snapshot.delimiter.clone());
        child.layers = layers;
        Ok(ConfigResolver {
            state: RwLock::new(Arc::new(child)),
        })
    }

    /// The merged view of all layers.
    pub fn all_settings(&self) -> Map {
        self.snapshot().merged()
    }

    /// Every leaf key of the merged view, joined with the delimiter.
    pub fn all_keys(&self) -> Vec<String> {
        let snapshot = self.snapshot();
        let mut keys = Vec::new();
        collect_keys(&snapshot.merged(), "", &snapshot.delimiter, &mut keys);
        keys
    }

    /// Decodes the merged view into `T`.
    pub fn unmarshal<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        self.decode_at("", false)
    }

    /// Decodes the merged sub-tree at `key` into `T`.
    pub fn unmarshal_key<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        self.decode_at(key, false)
    }

    /// Like [`unmarshal`](Self::unmarshal), but keys without a matching field
    /// are an error.
    pub fn unmarshal_exact<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        self.decode_at("", true)
    }

    /// Like [`unmarshal_key`](Self::unmarshal_key), but keys without a
    /// matching field are an error.
    pub fn unmarshal_key_exact<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        self.decode_at(key, true)
    }

    fn decode_at<T: DeserializeOwned>(&self, key: &str, exact: bool) -> Result<T, ConfigError> {
        let snapshot = self.snapshot();
        let value = snapshot
            .resolve(&snapshot.segments(key))
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;
        decode(value, exact).map_err(|source| ConfigError::Decode {
            key: key.to_string(),
            source,
        })
    }
}

fn collect_keys(map: &Map, prefix: &str, delimiter: &str, keys: &mut Vec<String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}{delimiter}{key}")
        };
        match value {
            Value::Map(nested) if !nested.is_empty() => {
                collect_keys(nested, &path, delimiter, keys);
            }
            _ => keys.push(path),
        }
    }
}

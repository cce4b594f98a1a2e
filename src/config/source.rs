//! Precedence classes, layers and the merge rules between them.

use std::fmt;

use serde::Serialize;

use super::value::{split_path, Map, Value};
use super::ConfigError;

/// The class a layer is registered under.
///
/// Ordering is lowest to highest: a value in a higher class always wins
/// over the same path in a lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precedence {
    Default,
    RemoteStore,
    File,
    Environment,
    Flag,
    Override,
}

impl Precedence {
    pub fn as_str(self) -> &'static str {
        match self {
            Precedence::Default => "default",
            Precedence::RemoteStore => "remote-store",
            Precedence::File => "file",
            Precedence::Environment => "environment",
            Precedence::Flag => "flag",
            Precedence::Override => "override",
        }
    }
}

impl fmt::Display for Precedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of key/value pairs to register with a resolver.
///
/// Keys are kept as given; the resolver lower-cases them and expands
/// delimited keys (`prod.port`) into nested mappings when the layer is
/// registered, using its own delimiter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layer {
    root: Map,
}

impl Layer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(root: Map) -> Self {
        Self { root }
    }

    /// Builds a layer from any serializable value whose top level is a
    /// mapping, e.g. a struct of defaults.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, ConfigError> {
        let json = serde_json::to_value(value).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        match Value::from(json) {
            Value::Map(root) => Ok(Self { root }),
            other => Err(ConfigError::TypeConversion {
                key: String::new(),
                expected: "mapping",
                found: other.kind().to_string(),
            }),
        }
    }

    /// Adds a key, which may be a delimited path.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.root.insert(key.into(), value.into());
        self
    }

    /// Lower-cases keys and expands delimited keys into nested mappings.
    ///
    /// Two keys landing on the same path follow the same-class rule of
    /// [`try_deep_merge`]: scalars are overwritten and reported, a mapping
    /// meeting a non-mapping is returned as the conflicting path.
    pub(crate) fn normalize(
        self,
        delimiter: &str,
        report: &mut MergeReport,
    ) -> Result<Map, Vec<String>> {
        normalize_map(self.root, delimiter, &mut Vec::new(), report)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Layer {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            root: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

fn normalize_map(
    map: Map,
    delimiter: &str,
    prefix: &mut Vec<String>,
    report: &mut MergeReport,
) -> Result<Map, Vec<String>> {
    let mut out = Map::new();
    for (key, value) in map {
        let path = split_path(&key, delimiter);
        prefix.extend(path.iter().cloned());
        let value = normalize_value(value, delimiter, prefix, report)?;
        prefix.truncate(prefix.len() - path.len());

        let nested = path
            .into_iter()
            .rev()
            .fold(value, |inner, segment| Value::Map(Map::from([(segment, inner)])));
        // A scalar under the empty key has no path to live at.
        if let Value::Map(nested) = nested {
            try_deep_merge(&mut out, nested, prefix, report)?;
        }
    }
    Ok(out)
}

fn normalize_value(
    value: Value,
    delimiter: &str,
    prefix: &mut Vec<String>,
    report: &mut MergeReport,
) -> Result<Value, Vec<String>> {
    Ok(match value {
        Value::Map(map) => Value::Map(normalize_map(map, delimiter, prefix, report)?),
        Value::Sequence(items) => {
            let mut normalized = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                prefix.push(index.to_string());
                normalized.push(normalize_value(item, delimiter, prefix, report)?);
                prefix.pop();
            }
            Value::Sequence(normalized)
        }
        other => other,
    })
}

/// Lenient merge: nested mappings merge, anything else from `overlay`
/// replaces what `base` holds.
pub(crate) fn deep_merge(base: &mut Map, overlay: Map) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Map(base_map)), Value::Map(overlay_map)) => {
                deep_merge(base_map, overlay_map);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Outcome of a strict merge between two layers of the same class.
#[derive(Debug, Default)]
pub(crate) struct MergeReport {
    /// Paths whose previous value was replaced by a different one.
    pub overwritten: Vec<Vec<String>>,
}

/// Strict merge used when a class already holds data.
///
/// Scalars and sequences are overwritten and reported; a path that is a
/// mapping on one side and something else on the other cannot be merged
/// and is returned as the error. `base` may be partially updated on error,
/// so callers merge into a copy.
pub(crate) fn try_deep_merge(
    base: &mut Map,
    overlay: Map,
    prefix: &mut Vec<String>,
    report: &mut MergeReport,
) -> Result<(), Vec<String>> {
    for (key, value) in overlay {
        prefix.push(key.clone());
        match (base.get_mut(&key), value) {
            (Some(Value::Map(base_map)), Value::Map(overlay_map)) => {
                try_deep_merge(base_map, overlay_map, prefix, report)?;
            }
            (Some(Value::Map(_)), _) | (Some(_), Value::Map(_)) => {
                return Err(prefix.clone());
            }
            (Some(existing), value) => {
                if *existing != value {
                    report.overwritten.push(prefix.clone());
                }
                *existing = value;
            }
            (None, value) => {
                base.insert(key, value);
            }
        }
        prefix.pop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_DELIMITER;

    fn map(pairs: &[(&str, Value)]) -> Map {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn normalize_layer(layer: Layer, delimiter: &str) -> Map {
        layer
            .normalize(delimiter, &mut MergeReport::default())
            .unwrap()
    }

    #[test]
    fn test_precedence_order() {
        assert!(Precedence::Override > Precedence::Flag);
        assert!(Precedence::Flag > Precedence::Environment);
        assert!(Precedence::Environment > Precedence::File);
        assert!(Precedence::File > Precedence::RemoteStore);
        assert!(Precedence::RemoteStore > Precedence::Default);
    }

    #[test]
    fn test_normalize_lowercases_and_expands() {
        let layer = Layer::new()
            .with("Prod.Port", "8080")
            .with("PROD", Value::Map(map(&[("Host", Value::from("localhost"))])));
        let normalized = normalize_layer(layer, DEFAULT_DELIMITER);

        let prod = normalized["prod"].as_map().unwrap();
        assert_eq!(prod["port"], Value::from("8080"));
        assert_eq!(prod["host"], Value::from("localhost"));
    }

    #[test]
    fn test_normalize_recurses_into_sequences() {
        let inner = Value::Map(map(&[("Name", Value::from("a"))]));
        let normalized = normalize_layer(
            Layer::new().with("items", Value::Sequence(vec![inner])),
            DEFAULT_DELIMITER,
        );
        let items = normalized["items"].as_sequence().unwrap();
        assert!(items[0].as_map().unwrap().contains_key("name"));
    }

    #[test]
    fn test_normalize_custom_delimiter() {
        let normalized = normalize_layer(
            Layer::new().with("db::port", 5432i64).with("a.b", true),
            "::",
        );
        assert_eq!(
            normalized["db"].as_map().unwrap()["port"],
            Value::Integer(5432)
        );
        assert_eq!(normalized["a.b"], Value::Bool(true));
    }

    #[test]
    fn test_normalize_rejects_scalar_and_nested_key_in_one_layer() {
        let conflict = Layer::new()
            .with("db", "flat")
            .with("db.host", "x")
            .normalize(DEFAULT_DELIMITER, &mut MergeReport::default())
            .unwrap_err();
        assert_eq!(conflict, vec!["db".to_string()]);

        let nested = Value::Map(map(&[("Host", Value::from("a")), ("host.name", Value::from("b"))]));
        let conflict = Layer::new()
            .with("prod", nested)
            .normalize(DEFAULT_DELIMITER, &mut MergeReport::default())
            .unwrap_err();
        assert_eq!(conflict, vec!["prod".to_string(), "host".to_string()]);
    }

    #[test]
    fn test_normalize_reports_keys_differing_only_in_case() {
        let mut report = MergeReport::default();
        let root = Layer::new()
            .with("Port", 1i64)
            .with("port", 2i64)
            .normalize(DEFAULT_DELIMITER, &mut report)
            .unwrap();
        assert_eq!(root["port"], Value::Integer(2));
        assert_eq!(report.overwritten, vec![vec!["port".to_string()]]);
    }

    #[test]
    fn test_try_deep_merge_reports_overwrites() {
        let mut base = map(&[
            ("port", Value::Integer(1)),
            ("host", Value::from("a")),
        ]);
        let overlay = map(&[("port", Value::Integer(2)), ("host", Value::from("a"))]);
        let mut report = MergeReport::default();

        try_deep_merge(&mut base, overlay, &mut Vec::new(), &mut report).unwrap();

        assert_eq!(base["port"], Value::Integer(2));
        assert_eq!(report.overwritten, vec![vec!["port".to_string()]]);
    }

    #[test]
    fn test_try_deep_merge_rejects_shape_conflict() {
        let mut base = map(&[("prod", Value::Map(map(&[("port", Value::Integer(1))])))]);
        let overlay = map(&[("prod", Value::from("flat"))]);

        let conflict =
            try_deep_merge(&mut base, overlay, &mut Vec::new(), &mut MergeReport::default())
                .unwrap_err();

        assert_eq!(conflict, vec!["prod".to_string()]);
    }

    #[test]
    fn test_layer_from_serialize() {
        #[derive(Serialize)]
        struct Defaults {
            port: u16,
            tags: Vec<&'static str>,
        }

        let layer = Layer::from_serialize(&Defaults {
            port: 80,
            tags: vec!["a"],
        })
        .unwrap();
        let root = normalize_layer(layer, DEFAULT_DELIMITER);
        assert_eq!(root["port"], Value::Integer(80));

        assert!(Layer::from_serialize(&5).is_err());
    }
}

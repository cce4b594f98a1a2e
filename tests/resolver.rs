use std::sync::Arc;
use std::thread;

use layercfg::{ConfigError, ConfigFormat, ConfigResolver, Layer, Precedence, Value};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

const ENV_JSON: &str = r#"{"prod":{"host":"localhost","port":"8080","enabled":true}}"#;

#[derive(Debug, Deserialize, Serialize, PartialEq)]
struct Server {
    host: String,
    port: i64,
}

fn write_config(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_env_json_scenario() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "env.json", ENV_JSON);

    let config = ConfigResolver::new();
    config.add_config_path(dir.path().to_str().unwrap());
    config.set_config_name("env");
    config.read_in_config().unwrap();

    assert_eq!(config.config_file_used(), Some(path));
    assert_eq!(config.get("prod.port"), Some(Value::String("8080".into())));
    assert!(config.is_set("prod.port"));
    assert!(!config.is_set("staging.port"));

    let prod: Server = config.sub("prod").unwrap().unmarshal().unwrap();
    assert_eq!(
        prod,
        Server {
            host: "localhost".into(),
            port: 8080
        }
    );
}

#[test]
fn test_unmarshal_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "server.toml", "[prod]\nhost = \"db.internal\"\nport = 5432\n");

    let config = ConfigResolver::new();
    config.load(&path).unwrap();

    let prod: Server = config.unmarshal_key("prod").unwrap();
    let encoded = serde_json::to_value(&prod).unwrap();

    assert_eq!(Value::from(encoded["host"].clone()), config.get("prod.host").unwrap());
    assert_eq!(Value::from(encoded["port"].clone()), config.get("prod.port").unwrap());
}

#[test]
fn test_highest_class_wins_for_every_class_pair() {
    let classes = [
        Precedence::Default,
        Precedence::RemoteStore,
        Precedence::File,
        Precedence::Environment,
        Precedence::Flag,
        Precedence::Override,
    ];

    for (i, low) in classes.iter().enumerate() {
        for high in &classes[i + 1..] {
            let config = ConfigResolver::new();
            config
                .add_layer(Layer::new().with("key", high.as_str()), *high)
                .unwrap();
            config
                .add_layer(Layer::new().with("key", low.as_str()), *low)
                .unwrap();
            assert_eq!(
                config.get_string("key").unwrap(),
                high.as_str(),
                "{high} should win over {low}"
            );
        }
    }
}

#[test]
fn test_sub_tree_lookup_matches_parent_for_nested_paths() {
    let config = ConfigResolver::new();
    config
        .read_config(
            ConfigFormat::Yaml,
            "prod:\n  db:\n    port: 5432\n    hosts: [a, b]\n",
        )
        .unwrap();

    let prod = config.sub("prod").unwrap();
    for key in ["db.port", "db.hosts", "db"] {
        assert_eq!(prod.get(key), config.get(&format!("prod.{key}")), "{key}");
    }

    let db = prod.sub("db").unwrap();
    assert_eq!(db.get("port"), config.get("prod.db.port"));
    assert_eq!(db.get_string_vec("hosts").unwrap(), vec!["a", "b"]);
}

#[test]
fn test_missing_file_and_unset_key_are_reported() {
    let dir = TempDir::new().unwrap();
    let config = ConfigResolver::new();
    config.add_config_path(dir.path().to_str().unwrap());
    config.set_config_name("env");

    let err = config.read_in_config().unwrap_err();
    assert!(matches!(err, ConfigError::ConfigFileNotFound { ref name, .. } if name == "env"));

    let err = config.get_i64("prod.port").unwrap_err();
    assert_eq!(err.to_string(), "key not found: prod.port");
}

#[test]
fn test_reloading_same_file_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "env.json", ENV_JSON);

    let config = ConfigResolver::new();
    config.load(&path).unwrap();
    let first = config.all_settings();
    config.load(&path).unwrap();

    assert_eq!(config.all_settings(), first);
}

#[test]
fn test_decode_error_exposes_field_path() {
    let config = ConfigResolver::new();
    config
        .read_config(ConfigFormat::Json, r#"{"prod": {"host": "h", "port": "http"}}"#)
        .unwrap();

    let err = config.unmarshal::<std::collections::BTreeMap<String, Server>>().unwrap_err();
    let ConfigError::Decode { source, .. } = err else {
        panic!("expected decode error");
    };
    assert_eq!(source.path(), "prod.port");
}

#[test]
fn test_concurrent_reads_see_whole_layers() {
    let config = Arc::new(ConfigResolver::new());
    config.set_default("a", 0i64).unwrap();
    config.set_default("b", 0i64).unwrap();

    let writer = {
        let config = Arc::clone(&config);
        thread::spawn(move || {
            for i in 1..=200i64 {
                config
                    .add_layer(Layer::new().with("a", i).with("b", i), Precedence::Flag)
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let config = Arc::clone(&config);
            thread::spawn(move || {
                for _ in 0..200 {
                    let settings = config.all_settings();
                    assert_eq!(settings.get("a"), settings.get("b"));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(config.get_i64("a").unwrap(), 200);
}

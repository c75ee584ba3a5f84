use std::io::Write;

use wyvern_core::config::{StoreBackend, WyvernConfig};
use wyvern_core::WyvernError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[scheduler]
interval_ms = 250

[store]
backend = "sqlite"
path = "/tmp/wyvern-test/state.db"

[[soars]]
name = "hello"

[[soars.flaps]]
name = "hello"
plugin = "print"
plugin_config = { msg = "hello " }
next_flaps = ["world"]

[[soars.flaps]]
name = "world"
plugin = "print"
plugin_config = { msg = "world" }

[[soars]]
name = "nightly"

[[soars.flaps]]
name = "backup"
plugin = "command"

[soars.flaps.plugin_config]
command = "echo backup"
timeout_secs = 30
max_retries = 5

[soars.flaps.plugin_config.active_hours]
start_hour = 22
end_hour = 6
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = WyvernConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.scheduler.interval_ms, 250);
    assert_eq!(config.store.backend, StoreBackend::Sqlite);
    assert_eq!(config.soar_names(), vec!["hello", "nightly"]);

    let hello = config.soar("hello").unwrap();
    assert_eq!(hello.flaps.len(), 2);
    assert_eq!(hello.flaps[0].next_flaps, vec!["world".to_string()]);
    assert_eq!(hello.flaps[1].plugin_config["msg"], "world");

    let backup = &config.soar("nightly").unwrap().flaps[0];
    assert_eq!(backup.plugin, "command");
    assert_eq!(backup.plugin_config["max_retries"], 5);
    assert_eq!(backup.plugin_config["active_hours"]["start_hour"], 22);
}

#[test]
fn test_defaults_for_empty_file() {
    let config = WyvernConfig::from_toml_str("").expect("parse empty");
    assert_eq!(config.scheduler.interval_ms, 500);
    assert_eq!(config.store.backend, StoreBackend::Memory);
    assert!(config.soars.is_empty());
    assert!(config.soar("anything").is_none());
}

#[test]
fn test_env_expansion_in_plugin_config() {
    std::env::set_var("WYVERN_IT_GREETING", "hi from env");
    let config = WyvernConfig::from_toml_str(
        r#"
[[soars]]
name = "env"

[[soars.flaps]]
name = "greet"
plugin = "print"
plugin_config = { msg = "${WYVERN_IT_GREETING}" }
"#,
    )
    .expect("parse");
    assert_eq!(
        config.soar("env").unwrap().flaps[0].plugin_config["msg"],
        "hi from env"
    );
}

#[test]
fn test_missing_file_and_bad_toml() {
    let err = WyvernConfig::load(std::path::Path::new("/nonexistent/wyvern.toml")).unwrap_err();
    assert!(matches!(err, WyvernError::ConfigNotFound(_)));

    let err = WyvernConfig::from_toml_str("[[soars]]\nflaps = 3").unwrap_err();
    assert!(matches!(err, WyvernError::Config(_)));
}

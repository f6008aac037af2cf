//! Coverage for config parsing and precedence.

use std::collections::HashMap;
use std::time::Duration;

use taskhive::config::{
    config_dir, default_prohibited_patterns, StorageBackend, TaskhiveConfig, CONFIG_PATH_ENV,
};

fn resolver(vars: Vec<(&'static str, String)>) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<&'static str, String> = vars.into_iter().collect();
    move |key| map.get(key).cloned()
}

#[test]
fn config_dir_resolves() {
    let path = match config_dir() {
        Ok(path) => path,
        Err(err) => panic!("config dir should resolve: {err}"),
    };
    assert!(path.ends_with(".taskhive"));
}

#[test]
fn parse_full_config() {
    let toml_str = r#"
[kernel]
log_level = "debug"
monitor_interval_ms = 250
worker_liveness_secs = 90

[safety]
prohibited_patterns = ["forbidden"]
max_tokens = 5000
max_timeout_seconds = 60
reject_unknown_safety_levels = true

[storage]
backend = "sqlite"
sqlite_path = "/var/lib/taskhive/kv.db"

[events]
handler_timeout_ms = 750

[audit]
scope = "audit_v2"
"#;
    let config = TaskhiveConfig::from_toml(toml_str).expect("config should parse");
    assert_eq!(config.kernel.log_level, "debug");
    assert_eq!(config.kernel.monitor_interval(), Duration::from_millis(250));
    assert_eq!(config.kernel.worker_liveness(), Some(Duration::from_secs(90)));
    assert_eq!(config.safety.prohibited_patterns, vec!["forbidden".to_owned()]);
    assert_eq!(config.safety.max_tokens, 5_000);
    assert_eq!(config.safety.max_timeout_seconds, 60);
    assert!(config.safety.reject_unknown_safety_levels);
    assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    assert_eq!(config.storage.sqlite_path, "/var/lib/taskhive/kv.db");
    assert_eq!(config.events.handler_timeout(), Duration::from_millis(750));
    assert_eq!(config.audit.scope, "audit_v2");
}

#[test]
fn partial_config_keeps_defaults() {
    let config = TaskhiveConfig::from_toml("[kernel]\nmonitor_interval_ms = 500\n")
        .expect("config should parse");
    assert_eq!(config.kernel.monitor_interval_ms, 500);
    assert_eq!(config.kernel.log_level, "info");
    assert_eq!(config.safety.prohibited_patterns, default_prohibited_patterns());
    assert_eq!(config.events.handler_timeout_ms, 5_000);
}

#[test]
fn zero_interval_is_clamped() {
    let config = TaskhiveConfig::from_toml("[kernel]\nmonitor_interval_ms = 0\n")
        .expect("config should parse");
    assert_eq!(config.kernel.monitor_interval(), Duration::from_millis(1));
}

#[test]
fn malformed_toml_is_an_error() {
    assert!(TaskhiveConfig::from_toml("[kernel\nlog_level = 1").is_err());
    assert!(TaskhiveConfig::from_toml("[kernel]\nmonitor_interval_ms = \"fast\"\n").is_err());
}

#[test]
fn unknown_backend_is_rejected() {
    assert!(TaskhiveConfig::from_toml("[storage]\nbackend = \"postgres\"\n").is_err());
    assert!("postgres".parse::<StorageBackend>().is_err());
    assert_eq!("SQLite".parse::<StorageBackend>(), Ok(StorageBackend::Sqlite));
}

#[test]
fn missing_file_yields_defaults() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let config =
        TaskhiveConfig::load_from_file(&tmp.path().join("absent.toml")).expect("defaults");
    assert_eq!(config.kernel.monitor_interval_ms, 1_000);
    assert_eq!(config.storage.backend, StorageBackend::Memory);
}

#[test]
fn env_beats_file_beats_defaults() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = tmp.path().join("taskhive.toml");
    std::fs::write(
        &path,
        "[safety]\nmax_tokens = 10\nmax_timeout_seconds = 20\n\n[events]\nhandler_timeout_ms = 30\n",
    )
    .expect("write config");

    let config = TaskhiveConfig::load_with(resolver(vec![
        (CONFIG_PATH_ENV, path.display().to_string()),
        ("TASKHIVE_MAX_TOKENS", "99".to_owned()),
        ("TASKHIVE_STORAGE_BACKEND", "sqlite".to_owned()),
        ("TASKHIVE_SQLITE_PATH", "/tmp/other.db".to_owned()),
        ("TASKHIVE_REJECT_UNKNOWN_SAFETY_LEVELS", "true".to_owned()),
    ]))
    .expect("load");

    // Env wins over the file.
    assert_eq!(config.safety.max_tokens, 99);
    // File wins over defaults.
    assert_eq!(config.safety.max_timeout_seconds, 20);
    assert_eq!(config.events.handler_timeout_ms, 30);
    // Env wins over defaults.
    assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    assert_eq!(config.storage.sqlite_path, "/tmp/other.db");
    assert!(config.safety.reject_unknown_safety_levels);
    // Untouched.
    assert_eq!(config.kernel.monitor_interval_ms, 1_000);
}

#[test]
fn unreadable_file_is_an_error() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = tmp.path().join("bad.toml");
    std::fs::write(&path, "not = [valid").expect("write config");

    let result = TaskhiveConfig::load_with(resolver(vec![(
        CONFIG_PATH_ENV,
        path.display().to_string(),
    )]));
    assert!(result.is_err());
}

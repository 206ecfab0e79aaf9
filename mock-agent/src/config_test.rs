use crate::{load_intercept_config_with, Args, Command};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn base_args() -> Args {
    Args {
        store: PathBuf::from("mockwire-store.json"),
        config: None,
        query_timeout_ms: None,
        enable_body_capture: None,
        max_body_size: None,
        read_timeout: None,
        log_level: "info".to_string(),
        command: Command::Index,
    }
}

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_load_config_defaults() {
    let config = load_intercept_config_with(&base_args(), env_of(&[])).unwrap();

    assert_eq!(config.query_timeout_ms, Some(5_000));
    assert!(config.body_capture.enabled);
    assert_eq!(config.body_capture.max_body_size, 10 * 1024 * 1024);
    assert_eq!(config.body_capture.read_timeout_secs, 30);
}

#[test]
fn test_load_config_from_cli() {
    let args = Args {
        query_timeout_ms: Some(250),
        enable_body_capture: Some(false),
        max_body_size: Some(5 * 1024 * 1024),
        read_timeout: Some(60),
        ..base_args()
    };

    let config = load_intercept_config_with(&args, env_of(&[])).unwrap();

    assert_eq!(config.query_timeout_ms, Some(250));
    assert!(!config.body_capture.enabled);
    assert_eq!(config.body_capture.max_body_size, 5 * 1024 * 1024);
    assert_eq!(config.body_capture.read_timeout_secs, 60);
}

#[test]
fn test_load_config_from_env() {
    let env = env_of(&[
        ("MOCKWIRE_QUERY_TIMEOUT_MS", "1200"),
        ("MOCKWIRE_BODY_CAPTURE_ENABLED", "false"),
        ("MOCKWIRE_MAX_BODY_SIZE", "2097152"),
        ("MOCKWIRE_READ_TIMEOUT", "45"),
    ]);

    let config = load_intercept_config_with(&base_args(), env).unwrap();

    assert_eq!(config.query_timeout_ms, Some(1200));
    assert!(!config.body_capture.enabled);
    assert_eq!(config.body_capture.max_body_size, 2097152);
    assert_eq!(config.body_capture.read_timeout_secs, 45);
}

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();
    let config_content = r#"{
        "query_timeout_ms": null,
        "body_capture": { "enabled": false, "max_body_size": 1048576 },
        "relay": { "max_tracked_queries": 16 }
    }"#;
    temp_file.write_all(config_content.as_bytes()).unwrap();

    let args = Args {
        config: Some(temp_file.path().to_path_buf()),
        ..base_args()
    };
    let config = load_intercept_config_with(&args, env_of(&[])).unwrap();

    assert_eq!(config.query_timeout_ms, None);
    assert!(!config.body_capture.enabled);
    assert_eq!(config.body_capture.max_body_size, 1048576);
    assert_eq!(config.body_capture.read_timeout_secs, 30);
    assert_eq!(config.relay.max_tracked_queries, 16);
}

#[test]
fn test_load_config_precedence() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(br#"{ "query_timeout_ms": 100, "body_capture": { "max_body_size": 1024 } }"#)
        .unwrap();

    let args = Args {
        config: Some(temp_file.path().to_path_buf()),
        query_timeout_ms: Some(300),
        ..base_args()
    };
    let env = env_of(&[("MOCKWIRE_QUERY_TIMEOUT_MS", "200"), ("MOCKWIRE_MAX_BODY_SIZE", "2048")]);

    let config = load_intercept_config_with(&args, env).unwrap();

    // CLI beats env, env beats file
    assert_eq!(config.query_timeout_ms, Some(300));
    assert_eq!(config.body_capture.max_body_size, 2048);
}

#[test]
fn test_zero_timeout_waits_forever() {
    let args = Args {
        query_timeout_ms: Some(0),
        ..base_args()
    };
    let config = load_intercept_config_with(&args, env_of(&[])).unwrap();
    assert_eq!(config.query_timeout(), None);
}

#[test]
fn test_invalid_env_values() {
    let result = load_intercept_config_with(&base_args(), env_of(&[("MOCKWIRE_BODY_CAPTURE_ENABLED", "invalid")]));
    assert!(result.is_err());

    let result = load_intercept_config_with(&base_args(), env_of(&[("MOCKWIRE_MAX_BODY_SIZE", "0")]));
    assert!(result.is_err());
}

#[test]
fn test_malformed_config_file() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"{ not json").unwrap();

    let args = Args {
        config: Some(temp_file.path().to_path_buf()),
        ..base_args()
    };
    assert!(load_intercept_config_with(&args, env_of(&[])).is_err());
}

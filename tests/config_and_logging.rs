//! Configuration file and logger start-up tests

use amqp_connector::core::config::{ConfigError, ConnectorConfig};
use amqp_connector::core::logging::{init_logging, reconfigure_log_level};
use amqp_connector::core::retry::ReconnectPolicy;
use serial_test::serial;
use std::io::Write;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_load_config_file_into_reconnect_policy() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
cluster_id = 3
definition_id = 12

[reconnect]
max_attempts = 4
initial_delay_ms = 100
max_delay_ms = 1000
multiplier = 3.0
"#
    )
    .unwrap();

    let config = ConnectorConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.cluster_id, 3);
    assert_eq!(config.definition_id, 12);

    let policy = ReconnectPolicy::from(&config.reconnect);
    assert_eq!(policy.delay_for(1), Duration::from_millis(100));
    assert_eq!(policy.delay_for(2), Duration::from_millis(300));
    assert_eq!(policy.delay_for(3), Duration::from_millis(900));
    assert_eq!(policy.delay_for(4), Duration::from_millis(1000));
    assert!(!policy.is_exhausted(3));
    assert!(policy.is_exhausted(4));
}

#[test]
fn test_missing_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("connector.toml");

    match ConnectorConfig::load(Some(&path)) {
        Err(ConfigError::NotFound { path: missing }) => assert_eq!(missing, path),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_unknown_keys_are_rejected() {
    let result =
        ConnectorConfig::from_toml_str("cluster_id = 1\ndefinition_id = 2\nhost = \"mq1\"\n");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
#[serial]
fn test_file_logger_starts_once() {
    let dir = TempDir::new().unwrap();
    let mut config = ConnectorConfig::new(1, 1).logging;
    config.level = "debug".to_string();
    config.format = "json".to_string();
    config.file = Some(dir.path().join("connector.log"));

    init_logging(&config).unwrap();
    log::info!("logger started");
    reconfigure_log_level("trace").unwrap();

    // A process has one logger
    assert!(init_logging(&config).is_err());
}

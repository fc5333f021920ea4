//! Integration tests for configuration loading

use queue_wallboard::domain::types::Granularity;
use queue_wallboard::infra::Config;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
id = "test-site"

[purecloud]
region = "mypurecloud.de"
client_id = "client"
client_secret = "s3cret"
timeout_ms = 2500

[polling]
granularity = "PT60M"
frequency_secs = 30
max_queue_predicates = 50

[queues]
ids = ["Q1", "Q2", "Q3"]

[database]
path = "/var/lib/wallboard/stats.db"
table = "WallboardStats"

[metrics]
interval_secs = 15
prometheus_port = 9091
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "test-site");
    assert_eq!(config.region(), "mypurecloud.de");
    assert_eq!(config.client_id(), "client");
    assert_eq!(config.client_secret(), "s3cret");
    assert_eq!(config.request_timeout(), Duration::from_millis(2500));
    assert_eq!(config.granularity(), Granularity::SixtyMinutes);
    assert_eq!(config.poll_frequency_secs(), 30);
    assert_eq!(config.max_queue_predicates(), 50);
    assert_eq!(config.queue_ids().len(), 3);
    assert_eq!(config.database_path(), "/var/lib/wallboard/stats.db");
    assert_eq!(config.table(), "WallboardStats");
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.prometheus_port(), 9091);
    assert_eq!(config.config_file(), temp_file.path().display().to_string());
}

#[test]
fn test_missing_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(dir.path().join("missing.toml")).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to read config file"));
}

#[test]
fn test_invalid_file_has_no_fallback() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[purecloud]\nregion = \"mypurecloud.com\"\n").unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("Invalid config file"));
    assert!(message.contains("Failed to parse TOML"));
}

#[test]
fn test_out_of_range_frequency_rejected() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(
            br#"
[purecloud]
region = "mypurecloud.com"
client_id = "client"
client_secret = "secret"

[polling]
granularity = "PT30M"
frequency_secs = 120

[queues]
ids = ["Q1"]

[database]
path = "stats.db"
"#,
        )
        .unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("Invalid frequency 120s"));
}

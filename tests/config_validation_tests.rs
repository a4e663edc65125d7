//! Config Validation Tests
//!
//! Loading `sorter_config.toml` from disk: search order, fallbacks, and the
//! validation errors an operator sees for a broken file.

use lane_sorter::config::{ConfigError, GpioBackend, SorterConfig, DEFAULT_CONFIG_FILE};
use std::io::Write;
use std::path::PathBuf;

fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(DEFAULT_CONFIG_FILE);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    (dir, path)
}

#[test]
fn full_config_file_loads() {
    let (_dir, path) = write_config(
        r#"
[timing]
cycle_delay_secs = 0.5
arrival_timeout_secs = 20

[[lanes]]
name = "Small"
code = "S"
push_pin = 11
pull_pin = 12
sensor_pin = 5

[[lanes]]
name = "Medium"
code = "M"
push_pin = 13
pull_pin = 8
sensor_pin = 29

[[lanes]]
name = "Large"
code = "L"
push_pin = 15
pull_pin = 7
sensor_pin = 31

[codes]
reject = "REJECT"

[gpio]
backend = "simulated"
relay_active_low = false

[server]
addr = "127.0.0.1:8080"
"#,
    );

    let config = SorterConfig::load_from_file(&path).unwrap();
    assert!((config.timing.cycle_delay_secs - 0.5).abs() < f64::EPSILON);
    assert_eq!(config.timing.arrival_timeout_secs, 20);
    assert_eq!(config.timing.settle_ms, 200, "unset keys keep defaults");
    assert_eq!(config.lanes[2].name, "Large");
    assert_eq!(config.codes.reject, "REJECT");
    assert_eq!(config.gpio.backend, GpioBackend::Simulated);
    assert!(!config.gpio.relay_active_low);
    assert!(config.gpio.sensor_active_low);
    assert_eq!(config.server.addr, "127.0.0.1:8080");
}

#[test]
fn invalid_file_reports_every_problem() {
    let (_dir, path) = write_config(
        r#"
[timing]
cycle_delay_secs = 0.0
scan_interval_ms = 0

[[lanes]]
name = "A"
code = "X"
push_pin = 11
pull_pin = 12
sensor_pin = 5

[[lanes]]
name = "B"
code = "x"
push_pin = 11
pull_pin = 8
sensor_pin = 29
"#,
    );

    match SorterConfig::load_from_file(&path) {
        Err(ConfigError::Validation(errors)) => {
            let joined = errors.join("\n");
            assert!(joined.contains("exactly 3 lanes"), "{joined}");
            assert!(joined.contains("lanes[1].code"), "{joined}");
            assert!(joined.contains("lanes[1].push_pin"), "{joined}");
            assert!(joined.contains("cycle_delay_secs"), "{joined}");
            assert!(joined.contains("scan_interval_ms"), "{joined}");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let (_dir, path) = write_config("[timing\ncycle_delay_secs = ");
    assert!(matches!(
        SorterConfig::load_from_file(&path),
        Err(ConfigError::Parse(..))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        SorterConfig::load_from_file(&dir.path().join("absent.toml")),
        Err(ConfigError::Io(..))
    ));
}

#[test]
fn load_falls_back_to_defaults_on_bad_explicit_file() {
    let (_dir, path) = write_config("[timing]\ncycle_delay_secs = -3.0\n");
    let config = SorterConfig::load(Some(path.as_path())).unwrap();
    assert!((config.timing.cycle_delay_secs - 0.3).abs() < f64::EPSILON);
}

#[test]
fn load_refuses_missing_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let typo = dir.path().join("sorter_cofig.toml");

    match SorterConfig::load(Some(typo.as_path())) {
        Err(ConfigError::Io(path, e)) => {
            assert_eq!(path, typo);
            assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected a missing-file error, got {other:?}"),
    }
}

#[test]
fn load_prefers_explicit_file() {
    let (_dir, path) = write_config("[timing]\ncycle_delay_secs = 1.25\n");
    let config = SorterConfig::load(Some(path.as_path())).unwrap();
    assert!((config.timing.cycle_delay_secs - 1.25).abs() < f64::EPSILON);
}

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("saved.toml");

    let mut config = SorterConfig::default();
    config.timing.cycle_delay_secs = 0.75;
    config.lanes[0].code = "ALPHA".to_string();
    config.save_to_file(&path).unwrap();

    let loaded = SorterConfig::load_from_file(&path).unwrap();
    assert!((loaded.timing.cycle_delay_secs - 0.75).abs() < f64::EPSILON);
    assert_eq!(loaded.lanes, config.lanes);
}

use lasergate_settings::{Config, ConfigError, SettingsError};
use tempfile::TempDir;

fn sample() -> Config {
    let mut config = Config::default();
    config.connection.port = "/dev/ttyACM0".to_string();
    config.streaming.status_poll_ms = 200;
    config.streaming.rx_buffer_size = 256;
    config
}

#[test]
fn test_toml_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    sample().save_to_file(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("[connection]"));
    assert!(text.contains("port = \"/dev/ttyACM0\""));

    assert_eq!(Config::load_from_file(&path).unwrap(), sample());
}

#[test]
fn test_json_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");

    sample().save_to_file(&path).unwrap();
    assert_eq!(Config::load_from_file(&path).unwrap(), sample());
}

#[test]
fn test_unsupported_extension_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");

    let err = sample().save_to_file(&path).unwrap_err();
    assert!(matches!(
        err,
        SettingsError::Config(ConfigError::UnsupportedFormat(_))
    ));
    assert!(!path.exists());
}

#[test]
fn test_invalid_values_rejected_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[streaming]\nrx_buffer_size = 0\n").unwrap();

    let err = Config::load_from_file(&path).unwrap_err();
    assert!(matches!(
        err,
        SettingsError::Config(ConfigError::ValueOutOfRange { .. })
    ));
}

#[test]
fn test_malformed_file_reports_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[connection\nport = ").unwrap();

    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::TomlError(_))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");

    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::IoError(_))
    ));
}

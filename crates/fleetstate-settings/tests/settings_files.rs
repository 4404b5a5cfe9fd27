//! File persistence for engine settings

use fleetstate_settings::{EngineSettings, SettingsError};

#[test]
fn test_toml_save_and_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("engine.toml");

    let settings = EngineSettings {
        poll_interval_ms: 1000,
        force_polling: true,
        ..Default::default()
    };
    settings.save_to_file(&path).expect("save");

    let loaded = EngineSettings::load_from_file(&path).expect("load");
    assert_eq!(loaded, settings);
}

#[test]
fn test_json_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("engine.json");
    std::fs::write(&path, r#"{ "pacing_interval_ms": 50 }"#).expect("write");

    let loaded = EngineSettings::load_from_file(&path).expect("load");
    assert_eq!(loaded.pacing_interval_ms, 50);
    assert_eq!(loaded.poll_interval_ms, 2000);
}

#[test]
fn test_unsupported_extension() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("engine.yaml");
    std::fs::write(&path, "poll_interval_ms: 5").expect("write");

    assert!(matches!(
        EngineSettings::load_from_file(&path),
        Err(SettingsError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_invalid_file_contents_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("engine.toml");
    std::fs::write(&path, "stop_timeout_ms = 0\n").expect("write");

    assert!(matches!(
        EngineSettings::load_from_file(&path),
        Err(SettingsError::InvalidSetting { .. })
    ));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("absent.toml");
    assert!(matches!(
        EngineSettings::load_from_file(&path),
        Err(SettingsError::LoadError(_))
    ));
}

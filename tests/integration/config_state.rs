// Config files feeding the engine

use crate::common::FakeEngine;
use muxolotl::ConvertError;
use muxolotl::config::Config;
use muxolotl::engine::{ConversionRequest, Converter, GpuProfile, Host};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_config_file_drives_the_converter() {
    let engine = FakeEngine::new(&[("libx264", 'V'), ("libx265", 'V'), ("aac", 'A')]);
    engine.set_streams(&[("video", "h264"), ("audio", "aac")]);
    engine.fail_encode(&["libx264", "libx265"]);

    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    let toml_text = format!(
        r#"
[engine]
ffmpeg = "{}"
ffprobe = "{}"

[conversion]
max_attempts = 1
"#,
        engine.ffmpeg().display(),
        engine.ffprobe().display()
    );
    fs::write(&path, toml_text).unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.conversion.max_attempts, 1);
    assert_eq!(config.batch.max_workers, 1, "unset sections keep defaults");

    let host = Host::new(config.engine.clone()).with_gpu_profile(GpuProfile::default());
    let converter = Converter::new(Arc::new(host), config.conversion.clone());
    let request = ConversionRequest::new(engine.input("in.mov"), engine.path(), "mkv");

    let err = converter.convert(&request, |_| {}).unwrap_err();
    assert!(
        matches!(err, ConvertError::AllAttemptsExhausted { attempts: 1, .. }),
        "{:?}",
        err
    );
    assert_eq!(engine.count_calls("-c:v libx265"), 0);
}

#[test]
fn test_invalid_config_is_reported_with_path() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, "[engine\nffmpeg = 3").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("Failed to parse config file"), "{}", message);
    assert!(message.contains("config.toml"), "{}", message);
}

#[test]
fn test_saved_config_reloads_identically() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("sub").join("config.toml");
    let mut config = Config::default();
    config.engine.vaapi_device = Some("/dev/dri/renderD129".to_string());
    config.engine.copy_trial_seconds = 1.5;
    config.batch.max_workers = 3;

    config.save_to(&path).unwrap();
    assert_eq!(Config::load_from(&path).unwrap(), config);
}

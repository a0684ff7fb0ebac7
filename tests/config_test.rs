//! Integration tests for configuration loading and validation.

use fragforge::config::{self, Config};
use fragforge_av::RotationPolicy;
use std::time::Duration;

fn write_config(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("fragforge.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn full_config_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[output]
dir = "/srv/segments"

[video]
codec = "hevc"
filter = "scale=1280:720"

[audio]
enabled = false
codec = "opus"

[segment]
seconds = 4.0
"#,
    );

    let config = config::load_config(&path).unwrap();
    assert_eq!(config.output.dir.to_str(), Some("/srv/segments"));
    assert_eq!(config.video.codec, "hevc");
    assert_eq!(config.video.filter, "scale=1280:720");
    assert!(!config.audio.enabled);
    assert_eq!(config.audio.codec, "opus");
    assert_eq!(config.segment.seconds, 4.0);

    let options = config.session_options().unwrap();
    assert!(!options.audio);
    assert_eq!(
        options.rotation,
        RotationPolicy::EveryDuration(Duration::from_secs(4))
    );
}

#[test]
fn empty_config_uses_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.video.codec, "h264");
    assert_eq!(config.video.filter, "null");
    assert_eq!(config.audio.codec, "aac");
    assert!(config.audio.enabled);
    assert_eq!(config.segment.seconds, 6.0);
    assert_eq!(config.segment.frames, None);

    config::validate_config(&config).unwrap();
}

#[test]
fn frame_count_takes_precedence_over_duration() {
    let config: Config = toml::from_str(
        r#"
[segment]
seconds = 6.0
frames = 250
"#,
    )
    .unwrap();

    assert_eq!(
        config.segment.rotation_policy().unwrap(),
        RotationPolicy::EveryFrames(250)
    );
}

#[test]
fn unknown_codec_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[video]
codec = "realvideo"
"#,
    );

    let err = config::load_config(&path).unwrap_err();
    assert!(format!("{err:#}").contains("realvideo"));
}

#[test]
fn zero_segment_frames_fails_validation() {
    let config: Config = toml::from_str(
        r#"
[segment]
frames = 0
"#,
    )
    .unwrap();

    assert!(config.segment.rotation_policy().is_err());
    assert!(config::validate_config(&config).is_err());
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(config::load_config(&dir.path().join("absent.toml")).is_err());
}

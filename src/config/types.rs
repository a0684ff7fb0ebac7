use anyhow::{ensure, Result};
use fragforge_av::{audio_codec_from_name, video_codec_from_name, RotationPolicy, SessionOptions};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub video: VideoConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub segment: SegmentConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Directory segment trees are written under, one subdirectory per
    /// source file.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoConfig {
    /// Target video codec (default: h264).
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Filter expression applied between decode and encode.
    #[serde(default = "default_video_filter")]
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// Transcode the best audio stream when the source has one.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Target audio codec (default: aac).
    #[serde(default = "default_audio_codec")]
    pub codec: String,

    /// Filter expression applied between decode and encode.
    #[serde(default = "default_audio_filter")]
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SegmentConfig {
    /// Rotate to a new segment after this much presentation time.
    #[serde(default = "default_segment_seconds")]
    pub seconds: f64,

    /// Rotate after a fixed frame count instead; takes precedence over
    /// `seconds` when set.
    #[serde(default)]
    pub frames: Option<u64>,
}

impl Config {
    /// Resolve the configuration into pipeline session options,
    /// surfacing codec and policy errors before any session starts.
    pub fn session_options(&self) -> Result<SessionOptions> {
        Ok(SessionOptions {
            video_codec: video_codec_from_name(&self.video.codec)?,
            audio_codec: audio_codec_from_name(&self.audio.codec)?,
            audio: self.audio.enabled,
            video_filter: self.video.filter.clone(),
            audio_filter: self.audio.filter.clone(),
            rotation: self.segment.rotation_policy()?,
        })
    }
}

impl SegmentConfig {
    pub fn rotation_policy(&self) -> Result<RotationPolicy> {
        if let Some(frames) = self.frames {
            ensure!(frames > 0, "segment.frames must be positive");
            return Ok(RotationPolicy::EveryFrames(frames));
        }
        ensure!(
            self.seconds.is_finite() && self.seconds > 0.0,
            "segment.seconds must be positive"
        );
        Ok(RotationPolicy::EveryDuration(Duration::from_secs_f64(
            self.seconds,
        )))
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./segments")
}
fn default_video_codec() -> String {
    "h264".to_string()
}
fn default_video_filter() -> String {
    "null".to_string()
}
fn default_enabled() -> bool {
    true
}
fn default_audio_codec() -> String {
    "aac".to_string()
}
fn default_audio_filter() -> String {
    "anull".to_string()
}
fn default_segment_seconds() -> f64 {
    6.0
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            codec: default_video_codec(),
            filter: default_video_filter(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            codec: default_audio_codec(),
            filter: default_audio_filter(),
        }
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            seconds: default_segment_seconds(),
            frames: None,
        }
    }
}

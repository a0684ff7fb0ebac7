//! Source container reading: open, probe, stream selection, and packet
//! demultiplexing in container interleave order.

use crate::error::{Error, Result};
use ffmpeg_the_third as ffmpeg;
use ffmpeg::{format, media, Packet};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// The media kinds the pipeline transcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub(crate) fn to_media(self) -> media::Type {
        match self {
            TrackKind::Video => media::Type::Video,
            TrackKind::Audio => media::Type::Audio,
        }
    }

    pub(crate) fn from_media(medium: media::Type) -> Option<Self> {
        match medium {
            media::Type::Video => Some(TrackKind::Video),
            media::Type::Audio => Some(TrackKind::Audio),
            _ => None,
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => write!(f, "video"),
            TrackKind::Audio => write!(f, "audio"),
        }
    }
}

/// One elementary stream discovered in the source container.
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    /// Index of the stream within the container.
    pub index: usize,
    /// Media kind, or `None` for kinds the pipeline does not transcode
    /// (subtitles, data, attachments).
    pub kind: Option<TrackKind>,
    /// Codec identifier as reported by the container.
    pub codec: String,
    /// Container timebase numerator/denominator.
    pub time_base: (i32, i32),
}

/// An opened source container.
///
/// Owns the demuxer context for the lifetime of the session and hands
/// out packets in container interleave order; callers dispatch by each
/// packet's stream index.
pub struct Source {
    path: PathBuf,
    input: format::context::Input,
}

impl Source {
    /// Open and probe a source container.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        crate::init();

        let path = path.as_ref();
        debug!(path = %path.display(), "opening source");

        let input = format::input(path).map_err(|e| Error::open(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            input,
        })
    }

    /// Path the container was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Short name of the detected container format.
    pub fn format_name(&self) -> String {
        self.input
            .format()
            .name()
            .split(',')
            .next()
            .unwrap_or("unknown")
            .to_string()
    }

    /// Total container duration, when the container declares one.
    pub fn duration(&self) -> Option<Duration> {
        let duration = self.input.duration();
        if duration > 0 {
            Some(Duration::from_micros(duration as u64))
        } else {
            None
        }
    }

    /// Describe every stream in the container.
    pub fn probe(&self) -> Vec<StreamInfo> {
        self.input
            .streams()
            .map(|stream| {
                let params = stream.parameters();
                let time_base = stream.time_base();
                StreamInfo {
                    index: stream.index(),
                    kind: TrackKind::from_media(params.medium()),
                    codec: format!("{:?}", params.id()),
                    time_base: (time_base.numerator(), time_base.denominator()),
                }
            })
            .collect()
    }

    /// Pick the best stream of a kind using the library's built-in
    /// selection heuristic.
    pub fn best_stream(&self, kind: TrackKind) -> Result<usize> {
        self.input
            .streams()
            .best(kind.to_media())
            .map(|stream| stream.index())
            .ok_or(Error::StreamNotFound { kind })
    }

    /// Read the next packet in container order. Returns `None` at end of
    /// input.
    pub fn read_packet(&mut self) -> Result<Option<Packet>> {
        match self.input.packets().next() {
            Some(Ok((_, packet))) => Ok(Some(packet)),
            Some(Err(e)) => Err(Error::Read(e)),
            None => Ok(None),
        }
    }

    pub(crate) fn input(&self) -> &format::context::Input {
        &self.input
    }
}

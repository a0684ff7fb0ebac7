//! Error types for fragforge-av.

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while transcoding a source into segments.
///
/// Capability and negotiation failures (`StreamNotFound`,
/// `UnsupportedStream`, `NoDecoder`, `EncoderUnavailable`,
/// `UnsupportedKind`, `Parameter`) are reported before any output is
/// produced. `Decode`/`Encode`/`Filter` are mid-stream failures; the
/// session still attempts a best-effort trailer write when the muxer
/// header is already on disk.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source container could not be opened or parsed.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: ffmpeg_the_third::Error,
    },

    /// No stream of the requested kind exists in the source.
    #[error("no {kind} stream found")]
    StreamNotFound { kind: crate::TrackKind },

    /// The selected stream is neither audio nor video.
    #[error("unsupported stream type: {0}")]
    UnsupportedStream(String),

    /// No decoder implementation matches the stream's codec.
    #[error("no decoder for codec {0}")]
    NoDecoder(String),

    /// The requested encoder is not built into the linked FFmpeg.
    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),

    /// The configured codec does not produce the requested media kind.
    #[error("unsupported media kind: {0}")]
    UnsupportedKind(String),

    /// Invalid caller-supplied options.
    #[error("invalid parameter: {0}")]
    Parameter(String),

    /// Reading a packet from the source failed mid-stream.
    #[error("read failed: {0}")]
    Read(#[source] ffmpeg_the_third::Error),

    /// The decode context rejected a packet or frame.
    #[error("decode failed: {0}")]
    Decode(#[source] ffmpeg_the_third::Error),

    /// The encode context or the muxer rejected a frame or packet.
    #[error("encode failed: {0}")]
    Encode(#[source] ffmpeg_the_third::Error),

    /// The filter graph rejected a frame.
    #[error("filter failed: {0}")]
    Filter(#[source] ffmpeg_the_third::Error),

    /// A programming defect in muxer configuration (e.g. options the
    /// muxer did not consume). Fails the session immediately.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other FFmpeg library error.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg_the_third::Error),
}

impl Error {
    /// Create an open error.
    pub fn open(path: impl Into<PathBuf>, source: ffmpeg_the_third::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }

    /// Create a parameter error.
    pub fn parameter(message: impl Into<String>) -> Self {
        Self::Parameter(message.into())
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Whether an FFmpeg error is the "try again / fully drained" control
/// signal rather than a genuine failure. Both terminate a drain loop.
pub(crate) fn is_drained(err: &ffmpeg_the_third::Error) -> bool {
    use libc::EAGAIN;
    matches!(
        err,
        ffmpeg_the_third::Error::Eof | ffmpeg_the_third::Error::Other { errno: EAGAIN }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drained_matches_control_signals_only() {
        use libc::EAGAIN;
        assert!(is_drained(&ffmpeg_the_third::Error::Eof));
        assert!(is_drained(&ffmpeg_the_third::Error::Other { errno: EAGAIN }));
        assert!(!is_drained(&ffmpeg_the_third::Error::InvalidData));
    }

    #[test]
    fn display_includes_context() {
        let err = Error::open("/missing.mp4", ffmpeg_the_third::Error::InvalidData);
        assert!(err.to_string().contains("/missing.mp4"));

        let err = Error::configuration("unconsumed muxer options: movflags");
        assert!(err.to_string().contains("movflags"));
    }
}

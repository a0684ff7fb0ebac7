//! # fragforge-av
//!
//! Transcoding pipeline that converts a source media file into a sequence
//! of fragmented, independently-playable MP4 segments (init segment plus
//! numbered media segments) suitable for adaptive streaming.
//!
//! The pipeline is a single synchronous pull loop driven by [`Session`]:
//! demux ([`Source`]) → decode ([`DecodeTrack`]) → filter ([`FilterStage`])
//! → encode ([`EncodeTrack`]) → mux ([`SegmentWriter`]). All codec and
//! container work goes through the FFmpeg libraries; this crate only
//! sequences the primitive operations and owns the native handles.
//!
//! ## Example
//!
//! ```no_run
//! use fragforge_av::Session;
//!
//! let mut session = Session::open("/path/to/source.mp4", "/path/to/out");
//! session.start()?;
//! let report = session.run()?;
//! println!("wrote {} media segments", report.segments);
//! # Ok::<(), fragforge_av::Error>(())
//! ```

mod decode;
mod encode;
mod error;
mod filter;
mod segment;
mod session;
mod source;
mod sys;

// Re-exports
pub use decode::DecodeTrack;
pub use encode::{
    audio_codec_from_name, video_codec_from_name, EncodeOptions, EncodeTrack,
};
pub use error::{Error, Result};
pub use filter::FilterStage;
pub use segment::{SegmentLayout, SegmentWriter, FRAGMENT_PREAMBLE};
pub use session::{
    RotationPolicy, Session, SessionOptions, SessionReport, TrackStats,
};
pub use source::{Source, StreamInfo, TrackKind};

use std::sync::Once;

static FFMPEG_INIT: Once = Once::new();

/// Initialize the underlying FFmpeg libraries.
///
/// Idempotent; the pipeline entry points call this on your behalf.
pub fn init() {
    FFMPEG_INIT.call_once(|| {
        ffmpeg_the_third::init().expect("Failed to initialize FFmpeg");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_ffmpeg() {
        // Just verify initialization doesn't panic
        init();
        init(); // Should be idempotent
    }
}

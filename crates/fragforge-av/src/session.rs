//! Session control: one source-to-segments conversion, driven as a
//! single synchronous pull loop.

use crate::decode::DecodeTrack;
use crate::encode::{EncodeOptions, EncodeTrack};
use crate::error::{Error, Result};
use crate::filter::FilterStage;
use crate::segment::{SegmentLayout, SegmentWriter};
use crate::source::{Source, TrackKind};
use crate::sys;
use ffmpeg_the_third as ffmpeg;
use ffmpeg::{codec, Packet, Rational};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// When to rotate to the next media segment. Evaluated on the lead
/// (video) track immediately before a filtered frame is encoded; audio
/// follows the video cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPolicy {
    /// Rotate after a fixed number of lead-track frames.
    EveryFrames(u64),
    /// Rotate after a fixed span of lead-track presentation time.
    EveryDuration(Duration),
}

impl Default for RotationPolicy {
    fn default() -> Self {
        RotationPolicy::EveryDuration(Duration::from_secs(6))
    }
}

impl RotationPolicy {
    fn fires(&self, lead: &LeadState, pts: Option<i64>, time_base: Rational) -> bool {
        match *self {
            RotationPolicy::EveryFrames(limit) => limit > 0 && lead.frames_in_segment >= limit,
            RotationPolicy::EveryDuration(target) => {
                let (Some(pts), Some(start)) = (pts, lead.segment_start_pts) else {
                    return false;
                };
                if time_base.numerator() <= 0 || time_base.denominator() <= 0 {
                    return false;
                }
                let elapsed_ms = sys::rescale_q(pts - start, time_base, Rational::new(1, 1000));
                elapsed_ms >= 0 && elapsed_ms as u128 >= target.as_millis()
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct LeadState {
    frames_in_segment: u64,
    segment_start_pts: Option<i64>,
}

impl LeadState {
    fn reset(&mut self) {
        self.frames_in_segment = 0;
        self.segment_start_pts = None;
    }

    fn on_frame(&mut self, pts: Option<i64>) {
        if self.segment_start_pts.is_none() {
            self.segment_start_pts = pts;
        }
        self.frames_in_segment += 1;
    }
}

/// Per-track counters reported by [`Session::run`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TrackStats {
    pub frames_decoded: u64,
    pub frames_filtered: u64,
    pub packets_encoded: u64,
}

/// Outcome of a completed session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub video: TrackStats,
    pub audio: Option<TrackStats>,
    /// Number of media segments written; the init segment is separate.
    pub segments: u64,
    /// True when the session ended on the cancellation signal rather
    /// than end of input.
    pub cancelled: bool,
}

/// Tunables for one session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub video_codec: codec::Id,
    pub audio_codec: codec::Id,
    /// Transcode the best audio stream when the source has one.
    pub audio: bool,
    pub video_filter: String,
    pub audio_filter: String,
    pub rotation: RotationPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            video_codec: codec::Id::H264,
            audio_codec: codec::Id::AAC,
            audio: true,
            video_filter: "null".to_string(),
            audio_filter: "anull".to_string(),
            rotation: RotationPolicy::default(),
        }
    }
}

struct TrackPipeline {
    input_index: usize,
    decoder: DecodeTrack,
    filter: FilterStage,
    encoder: EncodeTrack,
    force_keyframe: bool,
    stats: TrackStats,
}

struct Pipeline {
    source: Source,
    writer: SegmentWriter,
    video: TrackPipeline,
    audio: Option<TrackPipeline>,
    segment_index: u64,
    lead: LeadState,
}

/// Segment-boundary bookkeeping threaded through the lead track's
/// drain. Rotation state is per session and per track, never shared
/// across sessions.
struct Boundary<'a> {
    rotation: RotationPolicy,
    lead: &'a mut LeadState,
    layout: &'a SegmentLayout,
    segment_index: &'a mut u64,
    peer_force: Option<&'a mut bool>,
}

/// One source-to-segments conversion.
///
/// Owns every native handle of the pipeline; all of them are released
/// when the session is dropped, on success, error, or cancellation
/// alike.
pub struct Session {
    source_path: PathBuf,
    layout: SegmentLayout,
    options: SessionOptions,
    stop: Arc<AtomicBool>,
    pipeline: Option<Pipeline>,
}

impl Session {
    /// Create a session with default options.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(source: P, out_dir: Q) -> Self {
        Self::with_options(source, out_dir, SessionOptions::default())
    }

    pub fn with_options<P: AsRef<Path>, Q: AsRef<Path>>(
        source: P,
        out_dir: Q,
        options: SessionOptions,
    ) -> Self {
        Self {
            source_path: source.as_ref().to_path_buf(),
            layout: SegmentLayout::new(out_dir.as_ref()),
            options,
            stop: Arc::new(AtomicBool::new(false)),
            pipeline: None,
        }
    }

    /// Shared cancellation signal. Setting it to `true` makes
    /// [`run`](Self::run) stop at the next loop iteration, flush, and
    /// leave well-formed output behind.
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Adopt an external cancellation signal, e.g. one shared by every
    /// session of a runner.
    pub fn set_stop_signal(&mut self, signal: Arc<AtomicBool>) {
        self.stop = signal;
    }

    /// Output file naming for this session.
    pub fn layout(&self) -> &SegmentLayout {
        &self.layout
    }

    /// Open the source, negotiate every track, write the container
    /// header and the first segment boundary.
    ///
    /// All capability errors surface here, before any frame flows.
    pub fn start(&mut self) -> Result<()> {
        if self.pipeline.is_some() {
            return Err(Error::configuration("session already started"));
        }

        std::fs::create_dir_all(self.layout.dir())?;

        let source = Source::open(&self.source_path)?;

        let video_index = source.best_stream(TrackKind::Video)?;
        let video_dec = DecodeTrack::open(&source, video_index)?;

        let audio_dec = if self.options.audio {
            match source.best_stream(TrackKind::Audio) {
                Ok(index) => Some(DecodeTrack::open(&source, index)?),
                Err(Error::StreamNotFound { .. }) => {
                    debug!("source has no audio stream; transcoding video only");
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        let mut writer = SegmentWriter::open(self.layout.init_path(), true)?;

        let video_opts = EncodeOptions::video_from(&video_dec, self.options.video_codec)?;
        let mut video_enc = EncodeTrack::open(&mut writer, &video_opts)?;
        let mut audio_enc = match &audio_dec {
            Some(dec) => {
                let opts = EncodeOptions::audio_from(dec, self.options.audio_codec)?;
                Some(EncodeTrack::open(&mut writer, &opts)?)
            }
            None => None,
        };

        writer.write_header()?;

        // The muxer may have overridden the requested stream timebases;
        // all subsequent rescaling must use its values.
        if let Some(tb) = writer.stream_time_base(video_enc.stream_index()) {
            video_enc.set_output_time_base(tb);
        }
        if let Some(enc) = audio_enc.as_mut() {
            if let Some(tb) = writer.stream_time_base(enc.stream_index()) {
                enc.set_output_time_base(tb);
            }
        }

        writer.new_segment(self.layout.media_path(1))?;

        let video_filter = FilterStage::new(&video_dec, &video_enc, &self.options.video_filter)?;
        let video = TrackPipeline {
            input_index: video_dec.index(),
            decoder: video_dec,
            filter: video_filter,
            encoder: video_enc,
            force_keyframe: true,
            stats: TrackStats::default(),
        };

        let audio = match (audio_dec, audio_enc) {
            (Some(dec), Some(enc)) => {
                let filter = FilterStage::new(&dec, &enc, &self.options.audio_filter)?;
                Some(TrackPipeline {
                    input_index: dec.index(),
                    decoder: dec,
                    filter,
                    encoder: enc,
                    force_keyframe: true,
                    stats: TrackStats::default(),
                })
            }
            _ => None,
        };

        info!(
            source = %self.source_path.display(),
            out = %self.layout.dir().display(),
            "session started"
        );

        self.pipeline = Some(Pipeline {
            source,
            writer,
            video,
            audio,
            segment_index: 1,
            lead: LeadState::default(),
        });

        Ok(())
    }

    /// Run the pull loop until end of input or cancellation, then flush
    /// every stage and write the trailer.
    ///
    /// On a mid-stream failure with the header already on disk, a
    /// best-effort trailer write still runs so the output container
    /// stays parseable; the original error is returned.
    pub fn run(&mut self) -> Result<SessionReport> {
        let stop = Arc::clone(&self.stop);
        let rotation = self.options.rotation;
        let layout = self.layout.clone();
        let pipeline = self
            .pipeline
            .as_mut()
            .ok_or_else(|| Error::configuration("session not started"))?;

        match drive(pipeline, &layout, rotation, &stop) {
            Ok(cancelled) => {
                let report = SessionReport {
                    video: pipeline.video.stats,
                    audio: pipeline.audio.as_ref().map(|t| t.stats),
                    segments: pipeline.segment_index,
                    cancelled,
                };
                info!(
                    segments = report.segments,
                    frames = report.video.frames_decoded,
                    cancelled,
                    "session finished"
                );
                Ok(report)
            }
            Err(err) => {
                if pipeline.writer.header_written() && !pipeline.writer.trailer_written() {
                    if let Err(trailer_err) = pipeline.writer.write_trailer() {
                        warn!(error = %trailer_err, "best-effort trailer write failed");
                    }
                }
                Err(err)
            }
        }
    }
}

fn drive(
    pipeline: &mut Pipeline,
    layout: &SegmentLayout,
    rotation: RotationPolicy,
    stop: &AtomicBool,
) -> Result<bool> {
    let mut cancelled = false;

    loop {
        if stop.load(Ordering::Relaxed) {
            info!("cancellation requested; flushing session");
            cancelled = true;
            break;
        }

        let Some(packet) = pipeline.source.read_packet()? else {
            debug!("end of input");
            break;
        };

        let index = packet.stream();
        if index == pipeline.video.input_index {
            let mut boundary = Some(Boundary {
                rotation,
                lead: &mut pipeline.lead,
                layout,
                segment_index: &mut pipeline.segment_index,
                peer_force: pipeline.audio.as_mut().map(|t| &mut t.force_keyframe),
            });
            process_packet(
                &mut pipeline.video,
                &packet,
                &mut pipeline.writer,
                &mut boundary,
            )?;
        } else if let Some(audio) = pipeline.audio.as_mut() {
            if index == audio.input_index {
                process_packet(audio, &packet, &mut pipeline.writer, &mut None)?;
            }
        }
    }

    flush_track(&mut pipeline.video, &mut pipeline.writer)?;
    if let Some(audio) = pipeline.audio.as_mut() {
        flush_track(audio, &mut pipeline.writer)?;
    }
    pipeline.writer.write_trailer()?;

    Ok(cancelled)
}

fn process_packet(
    track: &mut TrackPipeline,
    packet: &Packet,
    writer: &mut SegmentWriter,
    boundary: &mut Option<Boundary>,
) -> Result<()> {
    track.decoder.send(packet)?;
    drain_decoder(track, writer, boundary)
}

fn drain_decoder(
    track: &mut TrackPipeline,
    writer: &mut SegmentWriter,
    boundary: &mut Option<Boundary>,
) -> Result<()> {
    while track.decoder.receive()? {
        track.stats.frames_decoded += 1;
        track.filter.write(track.decoder.frame())?;
        drain_filter(track, writer, boundary)?;
    }
    Ok(())
}

fn drain_filter(
    track: &mut TrackPipeline,
    writer: &mut SegmentWriter,
    boundary: &mut Option<Boundary>,
) -> Result<()> {
    while track.filter.read()? {
        track.stats.frames_filtered += 1;
        let pts = track.filter.frame_mut().pts();

        if let Some(b) = boundary.as_mut() {
            if b.rotation.fires(b.lead, pts, track.filter.time_base()) {
                *b.segment_index += 1;
                writer.new_segment(b.layout.media_path(*b.segment_index))?;
                track.force_keyframe = true;
                if let Some(peer) = b.peer_force.as_mut() {
                    **peer = true;
                }
                b.lead.reset();
            }
            b.lead.on_frame(pts);
        }

        // Every segment must open on an independently decodable frame.
        if track.force_keyframe {
            if track.decoder.kind() == TrackKind::Video {
                sys::force_key_frame(track.filter.frame_mut());
            }
            track.force_keyframe = false;
        }

        let written = track.encoder.write(Some(track.filter.frame_mut()), writer)?;
        track.stats.packets_encoded += written as u64;
    }
    Ok(())
}

/// Drain the decoder, the filter graph and the encoder in order, so no
/// buffered frame is lost at end of stream.
fn flush_track(track: &mut TrackPipeline, writer: &mut SegmentWriter) -> Result<()> {
    let mut no_boundary = None;

    track.decoder.send_eof()?;
    drain_decoder(track, writer, &mut no_boundary)?;

    track.filter.flush()?;
    drain_filter(track, writer, &mut no_boundary)?;

    let written = track.encoder.write(None, writer)?;
    track.stats.packets_encoded += written as u64;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_policy_fires_on_the_limit() {
        let policy = RotationPolicy::EveryFrames(250);
        let tb = Rational::new(1, 25);

        let mut lead = LeadState::default();
        for _ in 0..249 {
            lead.on_frame(Some(0));
        }
        assert!(!policy.fires(&lead, Some(249), tb));
        lead.on_frame(Some(249));
        assert!(policy.fires(&lead, Some(250), tb));

        lead.reset();
        assert!(!policy.fires(&lead, Some(251), tb));
    }

    #[test]
    fn zero_frame_limit_never_fires() {
        let policy = RotationPolicy::EveryFrames(0);
        let mut lead = LeadState::default();
        lead.on_frame(Some(0));
        assert!(!policy.fires(&lead, Some(1), Rational::new(1, 25)));
    }

    #[test]
    fn duration_policy_fires_after_elapsed_presentation_time() {
        let policy = RotationPolicy::EveryDuration(Duration::from_secs(6));
        let tb = Rational::new(1, 1000);

        let mut lead = LeadState::default();
        assert!(!policy.fires(&lead, Some(10_000), tb), "no segment start yet");

        lead.on_frame(Some(0));
        assert!(!policy.fires(&lead, Some(5_999), tb));
        assert!(policy.fires(&lead, Some(6_000), tb));

        // Frames without timestamps never trigger a cut.
        assert!(!policy.fires(&lead, None, tb));
    }

    #[test]
    fn default_options_target_h264_aac_passthrough() {
        let options = SessionOptions::default();
        assert_eq!(options.video_codec, codec::Id::H264);
        assert_eq!(options.audio_codec, codec::Id::AAC);
        assert!(options.audio);
        assert_eq!(options.video_filter, "null");
        assert_eq!(options.audio_filter, "anull");
        assert_eq!(
            options.rotation,
            RotationPolicy::EveryDuration(Duration::from_secs(6))
        );
    }
}

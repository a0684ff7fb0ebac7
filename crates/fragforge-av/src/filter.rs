//! Filter stages: the per-track-pair native filter graph that
//! normalizes decoded frames to the encoder's required format.
//!
//! The graph is parsed and validated once at construction from the
//! decode track's negotiated parameters; a source that changes format
//! mid-stream is unsupported. The graph's endpoints are the named
//! contexts `in` (source buffer) and `out` (sink buffer); the classic
//! linked in/out descriptor list exists only inside the bindings' parse
//! call.

use crate::decode::DecodeTrack;
use crate::encode::EncodeTrack;
use crate::error::{is_drained, Error, Result};
use crate::source::TrackKind;
use crate::sys;
use ffmpeg_the_third as ffmpeg;
use ffmpeg::{filter, frame, Rational};
use tracing::debug;

const SOURCE: &str = "in";
const SINK: &str = "out";

/// A filter graph bound to one decode/encode track pair, plus its
/// reusable filtered-frame buffer.
pub struct FilterStage {
    graph: filter::Graph,
    frame: frame::Frame,
    time_base: Rational,
}

impl FilterStage {
    /// Build and validate a graph for the track pair from a filter
    /// expression (`"null"`/`"anull"` for passthrough). Invalid
    /// expressions are a construction error, never a per-frame one.
    pub fn new(decode: &DecodeTrack, encode: &EncodeTrack, expr: &str) -> Result<Self> {
        let mut graph = filter::Graph::new();

        match decode.kind() {
            TrackKind::Video => build_video(&mut graph, decode, encode)?,
            TrackKind::Audio => build_audio(&mut graph, decode, encode)?,
        }

        graph
            .output(SOURCE, 0)?
            .input(SINK, 0)?
            .parse(expr)
            .map_err(|e| Error::parameter(format!("invalid filter expression {expr:?}: {e}")))?;
        graph.validate().map_err(Error::Filter)?;

        // Encoders with a fixed frame size (e.g. AAC) must never see a
        // partial or oversized frame.
        if let Some(size) = encode.frame_size() {
            if let Some(mut sink) = graph.get(SINK) {
                sink.sink().set_frame_size(size);
            }
        }

        let time_base = {
            let sink = graph
                .get(SINK)
                .ok_or_else(|| Error::configuration("filter graph lost its sink"))?;
            sys::buffersink_time_base(&sink)
        };

        debug!(kind = %decode.kind(), expr, "filter graph configured");

        Ok(Self {
            graph,
            frame: sys::empty_frame(),
            time_base,
        })
    }

    /// The timebase filtered frames are tagged with.
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Push one frame into the source buffer.
    pub fn write(&mut self, frame: &frame::Frame) -> Result<()> {
        let mut source = self
            .graph
            .get(SOURCE)
            .ok_or_else(|| Error::configuration("filter graph lost its source"))?;
        source.source().add(frame).map_err(Error::Filter)
    }

    /// Signal end of input to the source buffer.
    pub fn flush(&mut self) -> Result<()> {
        let mut source = self
            .graph
            .get(SOURCE)
            .ok_or_else(|| Error::configuration("filter graph lost its source"))?;
        source.source().flush().map_err(Error::Filter)
    }

    /// Pull the next filtered frame into the stage's frame buffer.
    ///
    /// Returns `Ok(true)` when a frame is available via
    /// [`frame_mut`](Self::frame_mut), tagged with the sink timebase and
    /// with any picture-type hint cleared. Returns `Ok(false)` when the
    /// graph has nothing more without new input; repeated calls keep
    /// returning `Ok(false)`.
    pub fn read(&mut self) -> Result<bool> {
        let Self {
            graph,
            frame,
            time_base,
        } = self;
        let mut sink = graph
            .get(SINK)
            .ok_or_else(|| Error::configuration("filter graph lost its sink"))?;

        match sink.sink().frame(frame) {
            Ok(()) => {
                sys::set_frame_time_base(frame, *time_base);
                sys::clear_picture_type(frame);
                Ok(true)
            }
            Err(e) if is_drained(&e) => Ok(false),
            Err(e) => Err(Error::Filter(e)),
        }
    }

    /// The most recently filtered frame.
    pub fn frame_mut(&mut self) -> &mut frame::Frame {
        &mut self.frame
    }
}

fn build_video(
    graph: &mut filter::Graph,
    decode: &DecodeTrack,
    encode: &EncodeTrack,
) -> Result<()> {
    let dec = decode
        .video()
        .ok_or_else(|| Error::parameter("decode track is not video"))?;
    let enc = encode
        .video()
        .ok_or_else(|| Error::parameter("encode track is not video"))?;

    let buffer = filter::find("buffer")
        .ok_or_else(|| Error::configuration("buffer filter not available"))?;
    let buffersink = filter::find("buffersink")
        .ok_or_else(|| Error::configuration("buffersink filter not available"))?;

    let tb = decode.time_base();
    let aspect = dec.aspect_ratio();
    let pix_fmt = dec
        .format()
        .descriptor()
        .map(|d| d.name())
        .ok_or_else(|| Error::parameter("source pixel format has no name"))?;

    let args = format!(
        "video_size={}x{}:pix_fmt={}:time_base={}/{}:pixel_aspect={}/{}",
        dec.width(),
        dec.height(),
        pix_fmt,
        tb.numerator(),
        tb.denominator(),
        aspect.numerator(),
        aspect.denominator().max(1),
    );

    graph.add(&buffer, SOURCE, &args).map_err(Error::Filter)?;
    graph.add(&buffersink, SINK, "").map_err(Error::Filter)?;

    let mut sink = graph
        .get(SINK)
        .ok_or_else(|| Error::configuration("filter graph lost its sink"))?;
    sink.set_pixel_format(enc.format());

    Ok(())
}

fn build_audio(
    graph: &mut filter::Graph,
    decode: &DecodeTrack,
    encode: &EncodeTrack,
) -> Result<()> {
    let dec = decode
        .audio()
        .ok_or_else(|| Error::parameter("decode track is not audio"))?;
    let enc = encode
        .audio()
        .ok_or_else(|| Error::parameter("encode track is not audio"))?;

    let abuffer = filter::find("abuffer")
        .ok_or_else(|| Error::configuration("abuffer filter not available"))?;
    let abuffersink = filter::find("abuffersink")
        .ok_or_else(|| Error::configuration("abuffersink filter not available"))?;

    let tb = decode.time_base();
    let args = format!(
        "time_base={}/{}:sample_rate={}:sample_fmt={}:channel_layout={}",
        tb.numerator(),
        tb.denominator(),
        dec.rate(),
        sys::sample_format_name(dec.format())?,
        sys::channel_layout_description(decode.context())?,
    );

    graph.add(&abuffer, SOURCE, &args).map_err(Error::Filter)?;
    graph.add(&abuffersink, SINK, "").map_err(Error::Filter)?;

    let mut sink = graph
        .get(SINK)
        .ok_or_else(|| Error::configuration("filter graph lost its sink"))?;
    sink.set_sample_format(enc.format());
    sink.set_sample_rate(enc.rate());
    sys::set_sink_channel_layouts(&mut sink, &sys::channel_layout_description(encode.context())?)?;

    Ok(())
}

//! Encode tracks: one output stream's encode context, its reusable
//! packet buffer, and the timestamp rescaling into the muxer's timebase.

use crate::decode::DecodeTrack;
use crate::error::{is_drained, Error, Result};
use crate::segment::SegmentWriter;
use crate::source::TrackKind;
use crate::sys;
use ffmpeg_the_third as ffmpeg;
use ffmpeg::{codec, encoder, format, frame, Packet, Rational};
use tracing::{debug, warn};

/// Map a configured video codec name to a codec identifier.
pub fn video_codec_from_name(name: &str) -> Result<codec::Id> {
    match name.to_ascii_lowercase().as_str() {
        "h264" | "avc" => Ok(codec::Id::H264),
        "hevc" | "h265" => Ok(codec::Id::HEVC),
        "vp9" => Ok(codec::Id::VP9),
        "av1" => Ok(codec::Id::AV1),
        "mpeg4" => Ok(codec::Id::MPEG4),
        other => Err(Error::parameter(format!("unknown video codec: {other}"))),
    }
}

/// Map a configured audio codec name to a codec identifier.
pub fn audio_codec_from_name(name: &str) -> Result<codec::Id> {
    match name.to_ascii_lowercase().as_str() {
        "aac" => Ok(codec::Id::AAC),
        "opus" => Ok(codec::Id::OPUS),
        "mp3" => Ok(codec::Id::MP3),
        "flac" => Ok(codec::Id::FLAC),
        "ac3" => Ok(codec::Id::AC3),
        other => Err(Error::parameter(format!("unknown audio codec: {other}"))),
    }
}

/// Parameters for opening an encode track, derived from the matching
/// decode track's negotiated parameters.
#[derive(Debug, Clone)]
pub enum EncodeOptions {
    Video {
        codec: codec::Id,
        width: u32,
        height: u32,
        aspect_ratio: Rational,
        frame_rate: Rational,
        /// Decode-side pixel format, used when the encoder advertises no
        /// preferred formats of its own.
        source_format: format::Pixel,
    },
    Audio {
        codec: codec::Id,
        sample_rate: u32,
        source_format: format::Sample,
        channels: u32,
    },
}

impl EncodeOptions {
    /// Derive video options from an opened video decode track.
    pub fn video_from(track: &DecodeTrack, codec: codec::Id) -> Result<Self> {
        let dec = track
            .video()
            .ok_or_else(|| Error::parameter("decode track is not video"))?;
        let frame_rate = track
            .frame_rate()
            .ok_or_else(|| Error::parameter("video track has no frame rate"))?;

        Ok(EncodeOptions::Video {
            codec,
            width: dec.width(),
            height: dec.height(),
            aspect_ratio: dec.aspect_ratio(),
            frame_rate,
            source_format: dec.format(),
        })
    }

    /// Derive audio options from an opened audio decode track.
    pub fn audio_from(track: &DecodeTrack, codec: codec::Id) -> Result<Self> {
        let dec = track
            .audio()
            .ok_or_else(|| Error::parameter("decode track is not audio"))?;

        Ok(EncodeOptions::Audio {
            codec,
            sample_rate: dec.rate(),
            source_format: dec.format(),
            channels: dec.ch_layout().channels() as u32,
        })
    }

    pub fn kind(&self) -> TrackKind {
        match self {
            EncodeOptions::Video { .. } => TrackKind::Video,
            EncodeOptions::Audio { .. } => TrackKind::Audio,
        }
    }

    pub fn codec(&self) -> codec::Id {
        match self {
            EncodeOptions::Video { codec, .. } | EncodeOptions::Audio { codec, .. } => *codec,
        }
    }
}

enum AnyEncoder {
    Video(encoder::video::Encoder),
    Audio(encoder::audio::Encoder),
}

/// An encode context bound to one output stream of the segment writer.
pub struct EncodeTrack {
    kind: TrackKind,
    ostream_index: usize,
    encoder: AnyEncoder,
    /// Encode context timebase (inverse frame rate for video, per-sample
    /// for audio).
    time_base: Rational,
    /// The timebase the muxer actually assigned to the output stream.
    /// Equal to `time_base` until the header is written.
    output_time_base: Rational,
    frame_size: Option<u32>,
    packet: Packet,
    last_dts: Option<i64>,
}

impl EncodeTrack {
    /// Open an encoder and bind a new output stream on the writer.
    ///
    /// Must happen before the writer's header is written; afterwards the
    /// session fixes the track's output timebase to whatever the muxer
    /// assigned via [`set_output_time_base`](Self::set_output_time_base).
    pub fn open(writer: &mut SegmentWriter, options: &EncodeOptions) -> Result<Self> {
        let codec = encoder::find(options.codec())
            .ok_or_else(|| Error::EncoderUnavailable(format!("{:?}", options.codec())))?;

        let kind = options.kind();
        if codec.medium() != kind.to_media() {
            return Err(Error::UnsupportedKind(format!(
                "codec {} does not produce {kind}",
                codec.name()
            )));
        }

        debug!(codec = codec.name(), %kind, "opening encoder");

        let global_header = sys::needs_global_header(writer.output());
        let mut stream = writer.output_mut().add_stream(codec)?;
        let ostream_index = stream.index();

        let ctx = codec::context::Context::new_with_codec(codec);
        let map_open = |e: ffmpeg::Error| {
            Error::parameter(format!("failed to open encoder {}: {e}", codec.name()))
        };

        let (encoder, time_base, frame_size) = match options {
            EncodeOptions::Video {
                width,
                height,
                aspect_ratio,
                frame_rate,
                source_format,
                ..
            } => {
                let mut enc = ctx.encoder().video()?;
                enc.set_width(*width);
                enc.set_height(*height);
                enc.set_aspect_ratio(*aspect_ratio);
                enc.set_format(sys::preferred_pixel_format(&codec).unwrap_or(*source_format));
                let time_base = frame_rate.invert();
                enc.set_time_base(time_base);
                enc.set_frame_rate(Some(*frame_rate));
                if global_header {
                    enc.set_flags(codec::Flags::GLOBAL_HEADER);
                }
                let opened = enc.open().map_err(map_open)?;
                (AnyEncoder::Video(opened), time_base, None)
            }
            EncodeOptions::Audio {
                sample_rate,
                source_format,
                channels,
                ..
            } => {
                let mut enc = ctx.encoder().audio()?;
                enc.set_rate(*sample_rate as i32);
                enc.set_format(sys::preferred_sample_format(&codec).unwrap_or(*source_format));
                let time_base = Rational::new(1, *sample_rate as i32);
                enc.set_time_base(time_base);
                sys::set_default_channel_layout(&mut enc, *channels);
                if global_header {
                    enc.set_flags(codec::Flags::GLOBAL_HEADER);
                }
                let opened = enc.open().map_err(map_open)?;
                let frame_size = sys::fixed_frame_size(&codec, &opened);
                (AnyEncoder::Audio(opened), time_base, frame_size)
            }
        };

        let track = Self {
            kind,
            ostream_index,
            encoder,
            time_base,
            output_time_base: time_base,
            frame_size,
            packet: Packet::empty(),
            last_dts: None,
        };

        sys::set_stream_parameters(&mut stream, track.context())?;
        stream.set_time_base(time_base);

        Ok(track)
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Index of the bound output stream.
    pub fn stream_index(&self) -> usize {
        self.ostream_index
    }

    /// Encode context timebase.
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Fixed frame size the encoder requires, if any (audio only).
    pub fn frame_size(&self) -> Option<u32> {
        self.frame_size
    }

    /// Fix the output timebase to the muxer-assigned value. Called once
    /// after the writer's header is written; the muxer may assign a
    /// different timebase than the one requested.
    pub fn set_output_time_base(&mut self, tb: Rational) {
        self.output_time_base = tb;
    }

    pub(crate) fn context(&self) -> &codec::context::Context {
        match &self.encoder {
            AnyEncoder::Video(e) => e,
            AnyEncoder::Audio(e) => e,
        }
    }

    /// Typed view of a video encode context, for filter negotiation.
    pub(crate) fn video(&self) -> Option<&encoder::video::Encoder> {
        match &self.encoder {
            AnyEncoder::Video(e) => Some(e),
            AnyEncoder::Audio(_) => None,
        }
    }

    /// Typed view of an audio encode context.
    pub(crate) fn audio(&self) -> Option<&encoder::audio::Encoder> {
        match &self.encoder {
            AnyEncoder::Audio(e) => Some(e),
            AnyEncoder::Video(_) => None,
        }
    }

    /// Encode one filtered frame (or flush with `None`) and forward every
    /// packet the encoder emits to the segment writer. Returns the number
    /// of packets written.
    ///
    /// The frame's presentation timestamp is rescaled from its own
    /// timebase into the encode context's timebase; packets are rescaled
    /// from the encode timebase into the output stream's assigned
    /// timebase before they reach the muxer.
    pub fn write(
        &mut self,
        frame: Option<&mut frame::Frame>,
        sink: &mut SegmentWriter,
    ) -> Result<usize> {
        let Self {
            encoder,
            packet,
            ostream_index,
            time_base,
            output_time_base,
            last_dts,
            ..
        } = self;
        let opened: &mut encoder::Encoder = match encoder {
            AnyEncoder::Video(e) => e,
            AnyEncoder::Audio(e) => e,
        };

        match frame {
            Some(frame) => {
                if let Some(pts) = frame.pts() {
                    let from = sys::frame_time_base(frame);
                    if from.numerator() > 0 && from.denominator() > 0 {
                        frame.set_pts(Some(sys::rescale_q(pts, from, *time_base)));
                    }
                }
                opened.send_frame(frame).map_err(Error::Encode)?;
            }
            None => opened.send_eof().map_err(Error::Encode)?,
        }

        let mut written = 0;
        loop {
            match opened.receive_packet(packet) {
                Ok(()) => {
                    packet.set_stream(*ostream_index);
                    packet.rescale_ts(*time_base, *output_time_base);
                    if let (Some(prev), Some(dts)) = (*last_dts, packet.dts()) {
                        if dts < prev {
                            warn!(
                                stream = *ostream_index,
                                dts, prev, "non-monotonic packet timestamp"
                            );
                        }
                    }
                    *last_dts = packet.dts().or(*last_dts);
                    sink.write(Some(&*packet))?;
                    written += 1;
                }
                Err(e) if is_drained(&e) => break,
                Err(e) => return Err(Error::Encode(e)),
            }
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_codec_names_map_to_ids() {
        assert_eq!(video_codec_from_name("h264").unwrap(), codec::Id::H264);
        assert_eq!(video_codec_from_name("HEVC").unwrap(), codec::Id::HEVC);
        assert_eq!(video_codec_from_name("mpeg4").unwrap(), codec::Id::MPEG4);
        assert!(video_codec_from_name("prores9000").is_err());
    }

    #[test]
    fn audio_codec_names_map_to_ids() {
        assert_eq!(audio_codec_from_name("aac").unwrap(), codec::Id::AAC);
        assert_eq!(audio_codec_from_name("Opus").unwrap(), codec::Id::OPUS);
        assert!(audio_codec_from_name("midi").is_err());
    }
}

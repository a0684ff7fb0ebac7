//! Decode tracks: one elementary stream's decode context plus its
//! reusable raw-frame buffer.

use crate::error::{is_drained, Error, Result};
use crate::source::{Source, TrackKind};
use crate::sys;
use ffmpeg_the_third as ffmpeg;
use ffmpeg::{codec, decoder, frame, Packet, Rational};
use tracing::debug;

enum AnyDecoder {
    Video(decoder::Video),
    Audio(decoder::Audio),
}

/// A decode context bound to exactly one input stream.
///
/// Feed packets with [`send`](Self::send), then drain frames with
/// [`receive`](Self::receive) until it reports that no more are
/// available. After [`send_eof`](Self::send_eof), draining continues
/// until the decoder's internal buffers are empty.
pub struct DecodeTrack {
    index: usize,
    kind: TrackKind,
    time_base: Rational,
    frame_rate: Option<Rational>,
    decoder: AnyDecoder,
    frame: frame::Frame,
}

impl DecodeTrack {
    /// Open a decoder for one stream of the source, negotiating the
    /// packet timebase (and, for video, the frame rate) from the
    /// container's declared parameters.
    pub fn open(source: &Source, stream_index: usize) -> Result<Self> {
        let stream = source
            .input()
            .stream(stream_index)
            .ok_or_else(|| Error::parameter(format!("no stream at index {stream_index}")))?;

        let params = stream.parameters();
        let codec_name = format!("{:?}", params.id());
        let kind = TrackKind::from_media(params.medium())
            .ok_or_else(|| Error::UnsupportedStream(format!("{:?}", params.medium())))?;

        debug!(stream = stream_index, %kind, codec = %codec_name, "opening decoder");

        let time_base = stream.time_base();
        let mut ctx = codec::context::Context::from_parameters(params)?;
        sys::set_pkt_time_base(&mut ctx, time_base);

        let map_open = |e: ffmpeg::Error| match e {
            ffmpeg::Error::DecoderNotFound => Error::NoDecoder(codec_name.clone()),
            other => Error::Ffmpeg(other),
        };

        let (decoder, frame_rate) = match kind {
            TrackKind::Video => {
                let mut rate = stream.avg_frame_rate();
                if rate.numerator() == 0 {
                    rate = stream.rate();
                }
                if rate.numerator() == 0 {
                    rate = Rational::new(25, 1);
                }
                sys::set_decoder_frame_rate(&mut ctx, rate);
                let opened = ctx.decoder().video().map_err(map_open)?;
                (AnyDecoder::Video(opened), Some(rate))
            }
            TrackKind::Audio => {
                let opened = ctx.decoder().audio().map_err(map_open)?;
                (AnyDecoder::Audio(opened), None)
            }
        };

        Ok(Self {
            index: stream_index,
            kind,
            time_base,
            frame_rate,
            decoder,
            frame: sys::empty_frame(),
        })
    }

    /// Index of the bound input stream.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// The packet timebase negotiated from the input stream.
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Source frame rate; present only for video tracks.
    pub fn frame_rate(&self) -> Option<Rational> {
        self.frame_rate
    }

    /// Typed view of a video decode context, for parameter negotiation.
    pub fn video(&self) -> Option<&decoder::Video> {
        match &self.decoder {
            AnyDecoder::Video(d) => Some(d),
            AnyDecoder::Audio(_) => None,
        }
    }

    /// Typed view of an audio decode context.
    pub fn audio(&self) -> Option<&decoder::Audio> {
        match &self.decoder {
            AnyDecoder::Audio(d) => Some(d),
            AnyDecoder::Video(_) => None,
        }
    }

    pub(crate) fn context(&self) -> &codec::context::Context {
        match &self.decoder {
            AnyDecoder::Video(d) => d,
            AnyDecoder::Audio(d) => d,
        }
    }

    fn opened_mut(&mut self) -> &mut decoder::Opened {
        match &mut self.decoder {
            AnyDecoder::Video(d) => d,
            AnyDecoder::Audio(d) => d,
        }
    }

    /// Feed one compressed packet into the decoder.
    pub fn send(&mut self, packet: &Packet) -> Result<()> {
        self.opened_mut().send_packet(packet).map_err(Error::Decode)
    }

    /// Signal end of input; subsequent [`receive`](Self::receive) calls
    /// drain the decoder's buffered frames.
    pub fn send_eof(&mut self) -> Result<()> {
        self.opened_mut().send_eof().map_err(Error::Decode)
    }

    /// Pull the next decoded frame into the track's frame buffer.
    ///
    /// Returns `Ok(true)` when a frame is available via
    /// [`frame`](Self::frame), and `Ok(false)` when the decoder needs
    /// more input or, after [`send_eof`](Self::send_eof), is fully
    /// drained. Repeated calls without new input keep returning
    /// `Ok(false)`.
    pub fn receive(&mut self) -> Result<bool> {
        let Self { decoder, frame, .. } = self;
        let opened: &mut decoder::Opened = match decoder {
            AnyDecoder::Video(d) => d,
            AnyDecoder::Audio(d) => d,
        };

        match opened.receive_frame(frame) {
            Ok(()) => {
                // Coded PTS may be absent or out of order; the decoder's
                // best-effort estimate resolves both.
                let best_effort = frame.timestamp();
                frame.set_pts(best_effort);
                Ok(true)
            }
            Err(e) if is_drained(&e) => Ok(false),
            Err(e) => Err(Error::Decode(e)),
        }
    }

    /// The most recently decoded frame.
    pub fn frame(&self) -> &frame::Frame {
        &self.frame
    }
}

//! Thin shims over native struct fields and calls the safe bindings do
//! not expose: packet timebase negotiation, frame timebase/picture-type
//! tags, buffersink metadata, channel-layout plumbing, and the output
//! sink swap at segment boundaries. Every raw pointer in the crate lives
//! behind one of these functions.

use crate::error::{Error, Result};
use ffmpeg_the_third as ffmpeg;
use ffmpeg::{codec, ffi, filter, format, frame, Rational};
use libc::c_int;
use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr;

/// Allocate an empty, kind-neutral frame buffer. The frame carries no
/// data until a decoder or filter sink fills it.
pub(crate) fn empty_frame() -> frame::Frame {
    unsafe { frame::Frame::empty() }
}

/// Set the packet timebase a decode context should assume for incoming
/// packets (the owning stream's container timebase).
pub(crate) fn set_pkt_time_base(ctx: &mut codec::context::Context, tb: Rational) {
    unsafe {
        (*ctx.as_mut_ptr()).pkt_timebase = tb.into();
    }
}

/// Hint the source frame rate to a video decode context.
pub(crate) fn set_decoder_frame_rate(ctx: &mut codec::context::Context, rate: Rational) {
    unsafe {
        (*ctx.as_mut_ptr()).framerate = rate.into();
    }
}

/// The timebase a frame's timestamps are expressed in.
pub(crate) fn frame_time_base(frame: &frame::Frame) -> Rational {
    unsafe { Rational::from((*frame.as_ptr()).time_base) }
}

pub(crate) fn set_frame_time_base(frame: &mut frame::Frame, tb: Rational) {
    unsafe {
        (*frame.as_mut_ptr()).time_base = tb.into();
    }
}

/// Clear the picture-type hint so the encoder is not biased by the
/// source's coding decisions.
pub(crate) fn clear_picture_type(frame: &mut frame::Frame) {
    unsafe {
        (*frame.as_mut_ptr()).pict_type = ffi::AVPictureType::AV_PICTURE_TYPE_NONE;
    }
}

/// Force the frame to be encoded as a keyframe.
pub(crate) fn force_key_frame(frame: &mut frame::Frame) {
    unsafe {
        (*frame.as_mut_ptr()).pict_type = ffi::AVPictureType::AV_PICTURE_TYPE_I;
    }
}

/// Rescale a timestamp between two rational timebases.
pub(crate) fn rescale_q(ts: i64, from: Rational, to: Rational) -> i64 {
    unsafe { ffi::av_rescale_q(ts, from.into(), to.into()) }
}

/// Copy an opened encode context's parameters onto its output stream.
pub(crate) fn set_stream_parameters(
    stream: &mut format::stream::StreamMut,
    ctx: &codec::context::Context,
) -> Result<()> {
    let ret = unsafe {
        ffi::avcodec_parameters_from_context((*stream.as_mut_ptr()).codecpar, ctx.as_ptr())
    };
    if ret < 0 {
        return Err(Error::Ffmpeg(ffmpeg::Error::from(ret)));
    }
    Ok(())
}

/// Whether the output container stores codec headers globally instead of
/// in-band, which the encode context must request before opening.
pub(crate) fn needs_global_header(output: &format::context::Output) -> bool {
    unsafe {
        ((*(*output.as_ptr()).oformat).flags & ffi::AVFMT_GLOBALHEADER as c_int) != 0
    }
}

/// First pixel format the encoder advertises, if it advertises any.
pub(crate) fn preferred_pixel_format(codec: &codec::Codec) -> Option<format::Pixel> {
    unsafe {
        let list = (*codec.as_ptr()).pix_fmts;
        if list.is_null() || *list == ffi::AVPixelFormat::AV_PIX_FMT_NONE {
            return None;
        }
        Some(format::Pixel::from(*list))
    }
}

/// First sample format the encoder advertises, if it advertises any.
pub(crate) fn preferred_sample_format(codec: &codec::Codec) -> Option<format::Sample> {
    unsafe {
        let list = (*codec.as_ptr()).sample_fmts;
        if list.is_null() || *list == ffi::AVSampleFormat::AV_SAMPLE_FMT_NONE {
            return None;
        }
        Some(format::Sample::from(*list))
    }
}

/// The fixed frame size an opened audio encode context requires, or
/// `None` when the encoder accepts frames of any size.
pub(crate) fn fixed_frame_size(
    codec: &codec::Codec,
    ctx: &codec::context::Context,
) -> Option<u32> {
    unsafe {
        let variable = ((*codec.as_ptr()).capabilities
            & ffi::AV_CODEC_CAP_VARIABLE_FRAME_SIZE as c_int)
            != 0;
        let size = (*ctx.as_ptr()).frame_size;
        if variable || size <= 0 {
            None
        } else {
            Some(size as u32)
        }
    }
}

/// Install the default channel layout for a channel count on an encode
/// context that has not been opened yet.
pub(crate) fn set_default_channel_layout(ctx: &mut codec::context::Context, channels: u32) {
    unsafe {
        ffi::av_channel_layout_default(&mut (*ctx.as_mut_ptr()).ch_layout, channels as c_int);
    }
}

/// Describe a codec context's channel layout as a filter-args string,
/// defaulting an unspecified layout to the standard layout for its
/// channel count.
pub(crate) fn channel_layout_description(ctx: &codec::context::Context) -> Result<String> {
    unsafe {
        let mut layout = std::mem::zeroed::<ffi::AVChannelLayout>();
        let ret = ffi::av_channel_layout_copy(&mut layout, &(*ctx.as_ptr()).ch_layout);
        if ret < 0 {
            return Err(Error::Ffmpeg(ffmpeg::Error::from(ret)));
        }

        if layout.order == ffi::AVChannelOrder::AV_CHANNEL_ORDER_UNSPEC {
            ffi::av_channel_layout_default(&mut layout, layout.nb_channels);
        }

        let mut buf = [0u8; 64];
        let ret =
            ffi::av_channel_layout_describe(&layout, buf.as_mut_ptr() as *mut _, buf.len());
        ffi::av_channel_layout_uninit(&mut layout);
        if ret < 0 {
            return Err(Error::Ffmpeg(ffmpeg::Error::from(ret)));
        }

        Ok(CStr::from_ptr(buf.as_ptr() as *const _)
            .to_string_lossy()
            .into_owned())
    }
}

/// Name of a sample format as the filter args expect it.
pub(crate) fn sample_format_name(format: format::Sample) -> Result<&'static str> {
    unsafe {
        let name = ffi::av_get_sample_fmt_name(format.into());
        if name.is_null() {
            return Err(Error::parameter("unnamed sample format"));
        }
        CStr::from_ptr(name)
            .to_str()
            .map_err(|_| Error::parameter("unnamed sample format"))
    }
}

/// The timebase the buffersink emits frames in. Valid once the graph is
/// configured.
pub(crate) fn buffersink_time_base(sink: &filter::Context) -> Rational {
    unsafe { Rational::from(ffi::av_buffersink_get_time_base(sink.as_ptr())) }
}

/// Constrain an audio buffersink to a channel-layout list (filter-args
/// string form, e.g. `"stereo"`).
pub(crate) fn set_sink_channel_layouts(sink: &mut filter::Context, layouts: &str) -> Result<()> {
    let value = CString::new(layouts)
        .map_err(|_| Error::parameter("channel layout contains a NUL byte"))?;
    let ret = unsafe {
        ffi::av_opt_set(
            sink.as_mut_ptr() as *mut libc::c_void,
            c"ch_layouts".as_ptr(),
            value.as_ptr(),
            ffi::AV_OPT_SEARCH_CHILDREN as c_int,
        )
    };
    if ret < 0 {
        return Err(Error::Ffmpeg(ffmpeg::Error::from(ret)));
    }
    Ok(())
}

/// Flush the muxer's pending fragment (`av_write_frame(ctx, NULL)`).
pub(crate) fn flush_muxer(output: &mut format::context::Output) -> Result<()> {
    let ret = unsafe { ffi::av_write_frame(output.as_mut_ptr(), ptr::null_mut()) };
    if ret < 0 {
        return Err(Error::Encode(ffmpeg::Error::from(ret)));
    }
    Ok(())
}

/// Drain the muxer's interleaving queue (`av_interleaved_write_frame(ctx, NULL)`).
pub(crate) fn flush_muxer_interleaved(output: &mut format::context::Output) -> Result<()> {
    let ret = unsafe { ffi::av_interleaved_write_frame(output.as_mut_ptr(), ptr::null_mut()) };
    if ret < 0 {
        return Err(Error::Encode(ffmpeg::Error::from(ret)));
    }
    Ok(())
}

/// Flush and close the output container's current sink, leaving the
/// container without an open file.
pub(crate) fn close_sink(output: &mut format::context::Output) -> Result<()> {
    unsafe {
        let ctx = output.as_mut_ptr();
        if (*ctx).pb.is_null() {
            return Ok(());
        }
        ffi::avio_flush((*ctx).pb);
        let ret = ffi::avio_closep(&mut (*ctx).pb);
        if ret < 0 {
            return Err(Error::Ffmpeg(ffmpeg::Error::from(ret)));
        }
    }
    Ok(())
}

/// Open a new output sink at `path` and install it on the container.
pub(crate) fn open_sink(output: &mut format::context::Output, path: &Path) -> Result<()> {
    let cpath = CString::new(path.to_string_lossy().as_bytes())
        .map_err(|_| Error::parameter("output path contains a NUL byte"))?;
    unsafe {
        let mut pb: *mut ffi::AVIOContext = ptr::null_mut();
        let ret = ffi::avio_open(&mut pb, cpath.as_ptr(), ffi::AVIO_FLAG_WRITE as c_int);
        if ret < 0 {
            return Err(Error::open(path, ffmpeg::Error::from(ret)));
        }
        (*output.as_mut_ptr()).pb = pb;
    }
    Ok(())
}

/// Write raw bytes to the container's current sink.
pub(crate) fn write_sink(output: &mut format::context::Output, data: &[u8]) -> Result<()> {
    unsafe {
        let pb = (*output.as_mut_ptr()).pb;
        if pb.is_null() {
            return Err(Error::configuration("no open output sink"));
        }
        ffi::avio_write(pb, data.as_ptr(), data.len() as c_int);
    }
    Ok(())
}

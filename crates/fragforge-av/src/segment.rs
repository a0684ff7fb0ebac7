//! Segment writing: the output muxer context, the init segment, and the
//! per-fragment sink swap with its boundary marker preamble.

use crate::error::{Error, Result};
use crate::sys;
use ffmpeg_the_third as ffmpeg;
use ffmpeg::{format, Packet, Rational};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The boundary marker written at the head of every media segment: a
/// `styp` box with major brand `msdh` and compatible brands
/// `msdh`/`msix`. A fixed byte template, not business logic.
pub const FRAGMENT_PREAMBLE: [u8; 24] = [
    0x00, 0x00, 0x00, 0x18, // box size
    b's', b't', b'y', b'p', // box type
    b'm', b's', b'd', b'h', // major brand
    0x00, 0x00, 0x00, 0x00, // minor version
    b'm', b's', b'd', b'h', // compatible brands
    b'm', b's', b'i', b'x',
];

/// Output file naming for one session: an init segment plus numbered
/// media segments under a single directory.
#[derive(Debug, Clone)]
pub struct SegmentLayout {
    dir: PathBuf,
}

impl SegmentLayout {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the init segment (segment index 0).
    pub fn init_path(&self) -> PathBuf {
        self.dir.join("init.mp4")
    }

    /// Path of a media segment. Indexes start at 1.
    pub fn media_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("seg{index}.m4s"))
    }
}

/// The output container context.
///
/// The container's identity persists for the whole session while the
/// underlying sink is swapped at every segment boundary; stream
/// descriptors survive the swap.
pub struct SegmentWriter {
    output: format::context::Output,
    segmented: bool,
    header_written: bool,
    trailer_written: bool,
}

impl SegmentWriter {
    /// Allocate the output container (MP4 family) and open the first
    /// sink at `path`. When `segmented`, the muxer produces
    /// fragmented/DASH-style output and packets are written without
    /// cross-track interleaving.
    pub fn open<P: AsRef<Path>>(path: P, segmented: bool) -> Result<Self> {
        crate::init();

        let path = path.as_ref();
        debug!(path = %path.display(), segmented, "opening output container");

        let output = format::output_as(path, "mp4").map_err(|e| Error::open(path, e))?;

        Ok(Self {
            output,
            segmented,
            header_written: false,
            trailer_written: false,
        })
    }

    pub(crate) fn output(&self) -> &format::context::Output {
        &self.output
    }

    pub(crate) fn output_mut(&mut self) -> &mut format::context::Output {
        &mut self.output
    }

    pub fn is_segmented(&self) -> bool {
        self.segmented
    }

    pub(crate) fn header_written(&self) -> bool {
        self.header_written
    }

    pub(crate) fn trailer_written(&self) -> bool {
        self.trailer_written
    }

    /// Finalize the muxer header.
    ///
    /// Disables automatic bitstream filtering and, when segmented,
    /// enables fragmented output with delayed moov. Options the muxer
    /// does not consume indicate a configuration bug and fail the
    /// session.
    pub fn write_header(&mut self) -> Result<()> {
        let mut opts = ffmpeg::Dictionary::new();
        opts.set("fflags", "-autobsf");
        if self.segmented {
            opts.set("movflags", "+frag_custom+dash+delay_moov");
        }

        let leftover = self.output.write_header_with(opts)?;
        let leftover: Vec<&str> = leftover.iter().map(|(key, _)| key).collect();
        if !leftover.is_empty() {
            return Err(Error::configuration(format!(
                "unconsumed muxer options: {}",
                leftover.join(", ")
            )));
        }

        self.header_written = true;
        Ok(())
    }

    /// The timebase the muxer assigned to an output stream. Meaningful
    /// after [`write_header`](Self::write_header), which may change the
    /// requested value.
    pub fn stream_time_base(&self, index: usize) -> Option<Rational> {
        self.output.stream(index).map(|s| s.time_base())
    }

    /// Flush and close the current sink, then open a new one at `path`
    /// and stamp it with the fragment boundary preamble.
    pub fn new_segment<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        debug!(path = %path.display(), "starting segment");

        self.write(None)?;
        sys::close_sink(&mut self.output)?;
        sys::open_sink(&mut self.output, path)?;
        sys::write_sink(&mut self.output, &FRAGMENT_PREAMBLE)
    }

    /// Write one packet, or flush the muxer with `None`.
    pub fn write(&mut self, packet: Option<&Packet>) -> Result<()> {
        match packet {
            Some(packet) if self.segmented => {
                packet.write(&mut self.output).map_err(Error::Encode)?;
            }
            Some(packet) => {
                packet
                    .write_interleaved(&mut self.output)
                    .map_err(Error::Encode)?;
            }
            None if self.segmented => sys::flush_muxer(&mut self.output)?,
            None => sys::flush_muxer_interleaved(&mut self.output)?,
        }
        Ok(())
    }

    /// Flush, write the container trailer, and close the sink.
    pub fn write_trailer(&mut self) -> Result<()> {
        if self.trailer_written {
            return Ok(());
        }
        if !self.header_written {
            return Err(Error::configuration("trailer requested before header"));
        }

        self.write(None)?;
        self.output.write_trailer().map_err(Error::Encode)?;
        sys::close_sink(&mut self.output)?;
        self.trailer_written = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_is_a_styp_box() {
        assert_eq!(FRAGMENT_PREAMBLE.len(), 24);
        // Big-endian size covers the whole box.
        assert_eq!(&FRAGMENT_PREAMBLE[0..4], &[0, 0, 0, 24]);
        assert_eq!(&FRAGMENT_PREAMBLE[4..8], b"styp");
        assert_eq!(&FRAGMENT_PREAMBLE[8..12], b"msdh");
        assert_eq!(&FRAGMENT_PREAMBLE[12..16], &[0, 0, 0, 0]);
        assert_eq!(&FRAGMENT_PREAMBLE[16..20], b"msdh");
        assert_eq!(&FRAGMENT_PREAMBLE[20..24], b"msix");
    }

    #[test]
    fn layout_names_init_and_media_segments() {
        let layout = SegmentLayout::new("/tmp/out");
        assert_eq!(layout.init_path(), PathBuf::from("/tmp/out/init.mp4"));
        assert_eq!(layout.media_path(1), PathBuf::from("/tmp/out/seg1.m4s"));
        assert_eq!(layout.media_path(12), PathBuf::from("/tmp/out/seg12.m4s"));
    }
}

//! End-to-end pipeline tests.
//!
//! Rather than shipping binary fixtures, these tests synthesize a small
//! MPEG-4 source file through the crate's own non-segmented writer path,
//! then run full sessions over it. MPEG-4 is used throughout so the
//! suite does not depend on a GPL-enabled FFmpeg build.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::{codec, format::Pixel, frame, Rational};
use fragforge_av::{
    DecodeTrack, EncodeOptions, EncodeTrack, Error, FilterStage, RotationPolicy, SegmentWriter,
    Session, SessionOptions, Source, TrackKind, FRAGMENT_PREAMBLE,
};
use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Duration;

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;
const FPS: i32 = 25;

/// Write a small MPEG-4 video file with one frame per timestamp tick.
fn synthesize_source(path: &Path, frames: usize) {
    fragforge_av::init();

    let mut writer = SegmentWriter::open(path, false).expect("open fixture container");
    let options = EncodeOptions::Video {
        codec: codec::Id::MPEG4,
        width: WIDTH,
        height: HEIGHT,
        aspect_ratio: Rational::new(1, 1),
        frame_rate: Rational::new(FPS, 1),
        source_format: Pixel::YUV420P,
    };
    let mut track = EncodeTrack::open(&mut writer, &options).expect("open fixture encoder");
    writer.write_header().expect("write fixture header");
    if let Some(tb) = writer.stream_time_base(track.stream_index()) {
        track.set_output_time_base(tb);
    }

    let mut frame = frame::Video::new(Pixel::YUV420P, WIDTH, HEIGHT);
    for i in 0..frames {
        // A moving gradient keeps the encoder from degenerating while
        // staying cheap to produce.
        let luma = ((i * 3) % 220 + 16) as u8;
        for plane in 0..frame.planes() {
            let fill = if plane == 0 { luma } else { 128 };
            for byte in frame.data_mut(plane) {
                *byte = fill;
            }
        }
        frame.set_pts(Some(i as i64));
        track
            .write(Some(&mut *frame), &mut writer)
            .expect("encode fixture frame");
    }

    track.write(None, &mut writer).expect("flush fixture encoder");
    writer.write_trailer().expect("finish fixture");
}

fn session_options(rotation: RotationPolicy) -> SessionOptions {
    SessionOptions {
        video_codec: codec::Id::MPEG4,
        rotation,
        ..SessionOptions::default()
    }
}

#[test]
fn transcodes_into_independently_addressable_segments() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.mp4");
    synthesize_source(&src, 100);

    let out = dir.path().join("out");
    let mut session =
        Session::with_options(&src, &out, session_options(RotationPolicy::EveryFrames(25)));
    session.start().expect("start session");
    let report = session.run().expect("run session");

    // No frame silently dropped, none duplicated.
    assert_eq!(report.video.frames_decoded, 100);
    assert_eq!(report.video.frames_filtered, 100);
    assert_eq!(report.video.packets_encoded, 100);
    assert!(!report.cancelled);
    // The fixture has no audio; the session degrades to video-only.
    assert!(report.audio.is_none());

    // ceil(100 / 25) media segments plus the init segment.
    assert_eq!(report.segments, 4);

    let init = fs::read(out.join("init.mp4")).expect("init segment exists");
    assert!(!init.is_empty());
    assert_eq!(&init[4..8], b"ftyp", "init segment starts with ftyp");

    for index in 1..=4u64 {
        let seg = fs::read(out.join(format!("seg{index}.m4s"))).expect("media segment exists");
        assert!(
            seg.len() > FRAGMENT_PREAMBLE.len(),
            "segment {index} carries frame data"
        );
        assert_eq!(
            &seg[..FRAGMENT_PREAMBLE.len()],
            &FRAGMENT_PREAMBLE[..],
            "segment {index} starts with the styp preamble"
        );
    }
    assert!(!out.join("seg5.m4s").exists());
}

#[test]
fn duration_policy_rotates_on_presentation_time() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.mp4");
    // 4 seconds at 25 fps.
    synthesize_source(&src, 100);

    let out = dir.path().join("out");
    let mut session = Session::with_options(
        &src,
        &out,
        session_options(RotationPolicy::EveryDuration(Duration::from_secs(1))),
    );
    session.start().expect("start session");
    let report = session.run().expect("run session");

    assert_eq!(report.video.frames_decoded, 100);
    assert_eq!(report.segments, 4);
}

#[test]
fn open_fails_for_missing_source() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.mp4");

    match Source::open(&missing) {
        Err(Error::Open { path, .. }) => assert_eq!(path, missing),
        Err(other) => panic!("expected an open error, got {other}"),
        Ok(_) => panic!("opening a missing file succeeded"),
    }
}

#[test]
fn probe_describes_streams_and_best_stream_selection() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.mp4");
    synthesize_source(&src, 10);

    let source = Source::open(&src).unwrap();
    let streams = source.probe();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].kind, Some(TrackKind::Video));

    assert_eq!(source.best_stream(TrackKind::Video).unwrap(), 0);
    assert!(matches!(
        source.best_stream(TrackKind::Audio),
        Err(Error::StreamNotFound {
            kind: TrackKind::Audio
        })
    ));
}

#[test]
fn receive_after_no_more_available_stays_empty() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.mp4");
    synthesize_source(&src, 10);

    let source = Source::open(&src).unwrap();
    let index = source.best_stream(TrackKind::Video).unwrap();
    let mut decoder = DecodeTrack::open(&source, index).unwrap();

    // Nothing sent yet: no frame available, repeatedly.
    assert!(!decoder.receive().unwrap());
    assert!(!decoder.receive().unwrap());

    // Fully drained after end of input: still no frame, no error.
    decoder.send_eof().unwrap();
    while decoder.receive().unwrap() {}
    assert!(!decoder.receive().unwrap());
}

#[test]
fn filter_read_without_input_reports_no_more_available() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.mp4");
    synthesize_source(&src, 10);

    let source = Source::open(&src).unwrap();
    let index = source.best_stream(TrackKind::Video).unwrap();
    let decoder = DecodeTrack::open(&source, index).unwrap();

    let mut writer = SegmentWriter::open(dir.path().join("init.mp4"), true).unwrap();
    let options = EncodeOptions::video_from(&decoder, codec::Id::MPEG4).unwrap();
    let encoder = EncodeTrack::open(&mut writer, &options).unwrap();

    let mut stage = FilterStage::new(&decoder, &encoder, "null").unwrap();
    assert!(!stage.read().unwrap());
    assert!(!stage.read().unwrap());
}

#[test]
fn invalid_filter_expression_fails_at_construction() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.mp4");
    synthesize_source(&src, 10);

    let source = Source::open(&src).unwrap();
    let index = source.best_stream(TrackKind::Video).unwrap();
    let decoder = DecodeTrack::open(&source, index).unwrap();

    let mut writer = SegmentWriter::open(dir.path().join("init.mp4"), true).unwrap();
    let options = EncodeOptions::video_from(&decoder, codec::Id::MPEG4).unwrap();
    let encoder = EncodeTrack::open(&mut writer, &options).unwrap();

    assert!(FilterStage::new(&decoder, &encoder, "definitely/not=a@filter").is_err());
}

#[test]
fn cancelled_session_still_writes_wellformed_output() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.mp4");
    synthesize_source(&src, 50);

    let out = dir.path().join("out");
    let mut session =
        Session::with_options(&src, &out, session_options(RotationPolicy::EveryFrames(25)));
    session.start().expect("start session");

    session.stop_signal().store(true, Ordering::Relaxed);
    let report = session.run().expect("cancelled run still succeeds");

    assert!(report.cancelled);
    assert_eq!(report.video.frames_decoded, 0);
    assert_eq!(report.segments, 1);
    assert!(out.join("init.mp4").exists());
    assert!(out.join("seg1.m4s").exists());
}

#[test]
fn run_before_start_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::open(dir.path().join("src.mp4"), dir.path().join("out"));
    assert!(matches!(session.run(), Err(Error::Configuration(_))));
}

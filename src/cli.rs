use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fragforge")]
#[command(author, version, about = "Fragmented-MP4 transcoding pipeline")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcode source files into fragmented MP4 segment trees
    Transcode {
        /// Input files to transcode
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Directory segments are written under (one subdirectory per input)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Video filter expression (default: passthrough)
        #[arg(long)]
        filter: Option<String>,

        /// Rotate segments every N frames
        #[arg(long, conflicts_with = "segment_seconds")]
        segment_frames: Option<u64>,

        /// Rotate segments every S seconds of presentation time
        #[arg(long)]
        segment_seconds: Option<f64>,

        /// Video codec name (h264, hevc, vp9, av1, mpeg4)
        #[arg(long)]
        video_codec: Option<String>,

        /// Audio codec name (aac, opus, mp3, flac, ac3)
        #[arg(long)]
        audio_codec: Option<String>,

        /// Skip audio tracks entirely
        #[arg(long)]
        no_audio: bool,
    },

    /// Probe a media file and display its stream table
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

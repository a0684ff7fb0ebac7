//! Fragforge: fragmented-MP4 transcoding for adaptive streaming.
//!
//! The heavy lifting lives in the `fragforge-av` crate; this crate adds
//! the operator surface around it: configuration, the CLI, and the
//! worker-thread session runner.

pub mod config;
pub mod runner;

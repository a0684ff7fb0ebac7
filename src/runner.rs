//! Transcode session runner.
//!
//! Each session owns disjoint native resources, so sessions run in
//! parallel on plain worker threads; one shared stop signal cancels
//! them all cooperatively.

use anyhow::{Context, Result};
use fragforge_av::{Session, SessionOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, info};

/// One queued transcode: a source file and the directory its segments
/// land in.
#[derive(Debug, Clone)]
pub struct Job {
    pub input: PathBuf,
    pub out_dir: PathBuf,
}

impl Job {
    /// Derive the per-input output directory under a common root.
    pub fn for_input(input: &Path, out_root: &Path) -> Result<Self> {
        let stem = input
            .file_stem()
            .with_context(|| format!("input path has no file name: {:?}", input))?;
        Ok(Self {
            input: input.to_path_buf(),
            out_dir: out_root.join(stem),
        })
    }
}

/// Runs transcode jobs to completion, one worker thread per session.
pub struct TranscodeRunner {
    options: SessionOptions,
    stop_signal: Arc<AtomicBool>,
}

impl TranscodeRunner {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            stop_signal: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a clone of the stop signal for external control.
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    /// Run every job, blocking until all sessions finish. Returns the
    /// number of failed sessions.
    pub fn run(&self, jobs: &[Job]) -> usize {
        std::thread::scope(|scope| {
            let handles: Vec<_> = jobs
                .iter()
                .map(|job| {
                    let options = self.options.clone();
                    let stop = Arc::clone(&self.stop_signal);
                    scope.spawn(move || run_job(job, options, stop))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or(false))
                .filter(|succeeded| !succeeded)
                .count()
        })
    }
}

fn run_job(job: &Job, options: SessionOptions, stop: Arc<AtomicBool>) -> bool {
    info!(input = %job.input.display(), out = %job.out_dir.display(), "transcoding");

    let mut session = Session::with_options(&job.input, &job.out_dir, options);
    session.set_stop_signal(stop);

    match session.start().and_then(|()| session.run()) {
        Ok(report) => {
            info!(
                input = %job.input.display(),
                segments = report.segments,
                frames = report.video.frames_decoded,
                cancelled = report.cancelled,
                "session complete"
            );
            true
        }
        Err(e) => {
            error!(input = %job.input.display(), error = %e, "session failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_get_per_input_directories() {
        let job = Job::for_input(Path::new("/media/movie.mkv"), Path::new("/srv/out")).unwrap();
        assert_eq!(job.out_dir, PathBuf::from("/srv/out/movie"));
    }

    #[test]
    fn rootless_inputs_are_rejected() {
        assert!(Job::for_input(Path::new("/"), Path::new("/srv/out")).is_err());
    }
}

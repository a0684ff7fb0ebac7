mod cli;

use anyhow::{bail, Result};
use clap::Parser;
use cli::{Cli, Commands};
use fragforge::{config, runner};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "fragforge=trace,fragforge_av=trace".to_string()
        } else {
            "fragforge=info,fragforge_av=info".to_string()
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();

    match cli.command {
        Commands::Transcode {
            inputs,
            out_dir,
            filter,
            segment_frames,
            segment_seconds,
            video_codec,
            audio_codec,
            no_audio,
        } => {
            let mut config = config::load_config_or_default(cli.config.as_deref())?;

            // CLI flags override the config file
            if let Some(dir) = out_dir {
                config.output.dir = dir;
            }
            if let Some(expr) = filter {
                config.video.filter = expr;
            }
            if let Some(frames) = segment_frames {
                config.segment.frames = Some(frames);
            }
            if let Some(seconds) = segment_seconds {
                config.segment.seconds = seconds;
                config.segment.frames = None;
            }
            if let Some(codec) = video_codec {
                config.video.codec = codec;
            }
            if let Some(codec) = audio_codec {
                config.audio.codec = codec;
            }
            if no_audio {
                config.audio.enabled = false;
            }

            let options = config.session_options()?;
            let jobs = inputs
                .iter()
                .map(|input| runner::Job::for_input(input, &config.output.dir))
                .collect::<Result<Vec<_>>>()?;

            let runner = runner::TranscodeRunner::new(options);
            let failed = runner.run(&jobs);
            if failed > 0 {
                bail!("{failed} of {} sessions failed", jobs.len());
            }
            Ok(())
        }

        Commands::Probe { file, json } => run_probe(&file, json),

        Commands::Validate { config: path } => {
            let path = path.or(cli.config);
            let config = config::load_config_or_default(path.as_deref())?;
            config::validate_config(&config)?;
            match path {
                Some(p) => println!("Configuration OK: {}", p.display()),
                None => println!("Configuration OK"),
            }
            Ok(())
        }

        Commands::Version => {
            println!("fragforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_probe(file: &Path, json: bool) -> Result<()> {
    let source = fragforge_av::Source::open(file)?;
    let streams = source.probe();

    if json {
        #[derive(serde::Serialize)]
        struct ProbeOutput<'a> {
            path: &'a Path,
            format: String,
            duration_secs: Option<f64>,
            streams: &'a [fragforge_av::StreamInfo],
        }

        let output = ProbeOutput {
            path: file,
            format: source.format_name(),
            duration_secs: source.duration().map(|d| d.as_secs_f64()),
            streams: &streams,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("File:     {}", file.display());
    println!("Format:   {}", source.format_name());
    if let Some(duration) = source.duration() {
        println!("Duration: {:.2}s", duration.as_secs_f64());
    }
    println!("Streams:");
    for stream in &streams {
        let kind = stream
            .kind
            .map(|k| k.to_string())
            .unwrap_or_else(|| "other".to_string());
        println!(
            "  #{} {:<6} {} (timebase {}/{})",
            stream.index, kind, stream.codec, stream.time_base.0, stream.time_base.1
        );
    }
    Ok(())
}

//! Command-line front end — batch WAV denoising.
//!
//! # Usage
//!
//! ```text
//! stream-denoise <input.wav> <output.wav> [--algorithm rnnoise|noise-gate]
//! ```
//!
//! Reads a PCM16 mono WAV, runs it through the engine frame by frame and
//! writes the denoised 48 kHz result.  Engine settings come from the
//! on-disk configuration file (a default one is used on first run);
//! `--algorithm` overrides the configured selector for this invocation.

use anyhow::{bail, Context, Result};

use stream_denoise::config::EngineConfig;
use stream_denoise::engine::NoiseEngine;

struct CliArgs {
    input: std::path::PathBuf,
    output: std::path::PathBuf,
    algorithm: Option<String>,
}

fn parse_args() -> Result<CliArgs> {
    let mut positional = Vec::new();
    let mut algorithm = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--algorithm" => {
                algorithm = Some(
                    args.next()
                        .context("--algorithm requires a value (rnnoise | noise-gate)")?,
                );
            }
            "--help" | "-h" => {
                println!(
                    "usage: stream-denoise <input.wav> <output.wav> [--algorithm rnnoise|noise-gate]"
                );
                std::process::exit(0);
            }
            _ if arg.starts_with('-') => bail!("unknown flag: {arg}"),
            _ => positional.push(arg),
        }
    }

    if positional.len() != 2 {
        bail!("expected <input.wav> <output.wav> (see --help)");
    }
    Ok(CliArgs {
        input: positional[0].clone().into(),
        output: positional[1].clone().into(),
        algorithm,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    let mut config = EngineConfig::load().context("failed to load configuration")?;
    if let Some(algorithm) = args.algorithm {
        config.algorithm = algorithm;
    }

    env_logger::Builder::new()
        .parse_filters(&config.log_level)
        .init();

    let input = std::fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let engine = NoiseEngine::new(config);
    engine
        .initialize()
        .await
        .context("engine initialization failed")?;
    if engine.is_degraded() {
        log::warn!("running in degraded mode (energy gate); output quality will be reduced");
    }

    let result = engine.process_file(&input).await;
    let metrics = engine.metrics();
    let destroy_result = engine.destroy(false).await;

    let output = result.context("file processing failed")?;
    destroy_result.context("engine teardown failed")?;

    std::fs::write(&args.output, &output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    log::info!(
        "done: {} frames, noise reduction {:.1} %, output {}",
        metrics.frames_processed,
        metrics.noise_reduction_pct,
        args.output.display()
    );
    Ok(())
}

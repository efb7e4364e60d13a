//! vq - perceptual quality of a degraded recording
//!
//! Usage:
//!   vq --reference ref.wav --degraded deg.wav            - audio mode (MOS-LQO)
//!   vq --reference ref.wav --degraded deg.wav --speech   - speech mode
//!   vq ... --json                                        - full result as JSON

mod loader;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use vq_engine::{Engine, EngineConfig};

#[derive(Parser, Debug)]
#[command(name = "vq", about = "Full-reference perceptual audio quality (MOS-LQO)")]
struct Cli {
    /// Clean reference recording
    #[arg(short, long, value_name = "FILE")]
    reference: PathBuf,

    /// Degraded recording to score
    #[arg(short, long, value_name = "FILE")]
    degraded: PathBuf,

    /// Use speech scoring
    #[arg(long)]
    speech: bool,

    /// Report the raw speech fit instead of scaling a perfect match to 5
    #[arg(long, requires = "speech")]
    unscaled: bool,

    /// Regression model for audio mode (libsvm text or JSON linear)
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Accept sample rates other than 48 kHz
    #[arg(long)]
    allow_unsupported_sample_rates: bool,

    /// Patch search half-width in frames
    #[arg(long, value_name = "FRAMES")]
    search_window: Option<usize>,

    /// Skip the cross-correlation pre-alignment
    #[arg(long)]
    no_global_alignment: bool,

    /// Engine configuration (JSON); flags override its fields
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,

    /// Per-band and per-patch report, debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let (reference, degraded) = loader::load_pair(&cli.reference, &cli.degraded)?;

    let mut config = engine_config(cli)?;
    if config.sample_rate.is_none() {
        config.sample_rate = Some(reference.sample_rate);
    }

    let engine = Engine::create(config)?;
    let score = engine.measure(&reference, &degraded)?;

    if cli.json {
        println!("{}", score.to_json().context("Failed to serialize result")?);
    } else if cli.verbose {
        print!("{}", score.detailed_report());
    } else {
        println!("{}", score.summary());
    }
    Ok(())
}

/// Config file (or defaults) with command-line overrides applied
fn engine_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            EngineConfig::from_json(&json)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    if cli.speech {
        config = config.with_speech_scoring(true);
    }
    if cli.unscaled {
        config = config.with_unscaled_speech_mapping(true);
    }
    if let Some(model) = &cli.model {
        config = config.with_model_path(model);
    }
    if cli.allow_unsupported_sample_rates {
        config = config.with_unsupported_sample_rates(true);
    }
    if let Some(frames) = cli.search_window {
        config = config.with_search_window(frames);
    }
    if cli.no_global_alignment {
        config = config.with_global_alignment(false);
    }
    Ok(config)
}

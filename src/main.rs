//! CLI wrapper (§6 "CLI surface"): reads typed `Part`/`Sheet`/`NestConfig`
//! JSON, drives [`nest_engine::engine::run`], and writes the resulting
//! `NestResult` as JSON. Vector-art parsing, unit conversion and the
//! desktop UI are out of scope (§1) — this binary only moves already-
//! typed data across the process boundary.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use nest_engine::cache::NfpCache;
use nest_engine::config::NestConfig;
use nest_engine::engine::{self, RunOptions};
use nest_engine::progress::{channel, CancellationToken, RunEvent};
use nest_engine::types::{Part, Sheet, TerminalState};

/// `nest --parts <file> --sheets <file> --config <file> [--out <file>]
/// [--seed N] [--cache-dir DIR] [--timeout SEC]` (§6).
#[derive(Parser, Debug)]
#[command(author, version, about = "Irregular 2D nesting engine")]
struct CliArgs {
    /// JSON array of `Part`.
    #[arg(long)]
    parts: PathBuf,

    /// JSON array of `Sheet`.
    #[arg(long)]
    sheets: PathBuf,

    /// JSON `NestConfig`; defaults per §6 when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where to write the resulting `NestResult` JSON; stdout if absent.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Overrides `NestConfig::rng_seed`.
    #[arg(long)]
    seed: Option<u64>,

    /// Durable NFP cache directory (§6 persisted layout); in-memory only
    /// when absent.
    #[arg(long = "cache-dir")]
    cache_dir: Option<PathBuf>,

    /// Cancels the run after this many seconds, expressed internally as
    /// cancellation (§5 "an external timeout is expressed as a
    /// cancellation").
    #[arg(long)]
    timeout: Option<u64>,

    /// Hard cap on generations; not part of the §6 CLI surface, but the
    /// optimiser otherwise runs until externally stopped (§5) and a
    /// non-interactive invocation needs a default bound.
    #[arg(long)]
    generations: Option<u64>,
}

fn load_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> anyhow::Result<T> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = CliArgs::parse();
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(args: CliArgs) -> anyhow::Result<ExitCode> {
    let parts: Vec<Part> = load_json(&args.parts)?;
    let sheets: Vec<Sheet> = load_json(&args.sheets)?;
    let mut config: NestConfig = match &args.config {
        Some(path) => load_json(path)?,
        None => NestConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.rng_seed = Some(seed);
    }

    let cache = match &args.cache_dir {
        Some(dir) => NfpCache::open(dir).context("opening NFP cache directory")?,
        None => NfpCache::new(),
    };

    let cancel = CancellationToken::new();
    if let Some(secs) = args.timeout {
        let cancel_clone = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            cancel_clone.cancel();
        });
    }

    let (tx, rx) = channel(64);
    let drain = std::thread::spawn(move || {
        while let Ok(event) = rx.recv() {
            match event {
                RunEvent::Progress(p) => {
                    tracing::debug!(
                        generation = p.generation,
                        placed_fraction = p.placed_fraction,
                        "progress"
                    );
                }
                RunEvent::Result(r) => {
                    tracing::info!(
                        fitness = r.fitness,
                        utilisation = r.utilisation,
                        sheets = r.sheets.len(),
                        "improved result"
                    );
                }
            }
        }
    });

    let options = RunOptions {
        max_generations: args.generations.or(Some(50)),
    };
    let outcome = engine::run(&parts, &sheets, &config, &cache, &cancel, options, tx);
    let _ = drain.join();

    if let Some(dir) = &args.cache_dir {
        if let Err(e) = cache.write_trailer(dir) {
            tracing::warn!(error = %e, "failed to write NFP cache trailer");
        }
    }

    match outcome {
        Ok((result, terminal)) => {
            let json = serde_json::to_string_pretty(&result)?;
            match &args.out {
                Some(path) => std::fs::write(path, &json)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{json}"),
            }
            Ok(ExitCode::from(match terminal {
                TerminalState::Completed => 0,
                TerminalState::Cancelled => 1,
                TerminalState::Fatal => 3,
            }))
        }
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::json!({ "kind": format!("{:?}", e.kind()), "message": e.to_string() })
            );
            Ok(ExitCode::from(e.exit_code() as u8))
        }
    }
}

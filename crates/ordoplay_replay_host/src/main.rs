// SPDX-License-Identifier: MIT OR Apache-2.0
//! `OrdoPlay` Replay Host - scrubs a demo timeline through the replay engine.
//!
//! Usage: `ordoplay_replay_host [--config <replay.ron>] [TIME...]`
//!
//! Each TIME becomes one host tick. The scene state reached after every
//! tick is printed, so forward scrubs, backward jumps and rewinds to the
//! baseline can be compared by eye.

mod authored;
mod scene;
mod timeline;

use clap::Parser;
use ordoplay_replay::{ConfigError, Orchestrator, ReplayConfig};
use std::path::PathBuf;
use thiserror::Error;
use timeline::Timeline;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Playhead script used when no times are given
const DEFAULT_SCRIPT: &[f64] = &[0.5, 2.75, 4.2, 1.25, -1.0, 5.0];

/// Host errors
#[derive(Debug, Error)]
enum HostError {
    /// Config could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Timeline setup failed
    #[error(transparent)]
    Replay(#[from] ordoplay_replay::ReplayError),

    /// Runtime could not start
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "ordoplay_replay_host", version, about = "Scrub the demo timeline through the replay engine")]
struct HostArgs {
    /// Replay config (RON). Defaults to `replay.ron` in the working directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Playhead times in seconds, one tick each.
    #[arg(allow_negative_numbers = true)]
    times: Vec<f64>,
}

impl HostArgs {
    /// Times to tick, falling back to the default script
    fn script(&self) -> Vec<f64> {
        if self.times.is_empty() {
            DEFAULT_SCRIPT.to_vec()
        } else {
            self.times.clone()
        }
    }
}

fn main() {
    let args = HostArgs::parse();

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("ordoplay_replay_host=info".parse().unwrap())
        .add_directive("ordoplay_replay=info".parse().unwrap());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting OrdoPlay Replay Host v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        tracing::error!("Replay host failed: {e}");
        std::process::exit(1);
    }
}

fn run(args: &HostArgs) -> Result<(), HostError> {
    let config = match &args.config {
        Some(path) => ReplayConfig::load(path)?,
        None => ReplayConfig::load_or_default(&std::env::current_dir()?)?,
    };

    // Single logical thread: every drive interleaves cooperatively.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        let orchestrator = Orchestrator::new(config);
        let timeline = Timeline::build(&orchestrator).await?;
        println!("timeline length {:.2}s", timeline.duration());

        for time in args.script() {
            let report = orchestrator.tick(time, timeline.declarations()).await;
            for err in report.errors() {
                tracing::error!(tick = report.tick, "{err}");
            }
            println!("t={time:>6.2}  {}", timeline.scene());
        }

        orchestrator.reset().await;
        println!("reset      {}", timeline.scene());
        Ok::<(), HostError>(())
    })
}

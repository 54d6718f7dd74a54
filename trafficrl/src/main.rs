use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use trafficrl::config::ExperimentConfig;
use trafficrl::runner::{run_all, Strategy};

/// Traffic-signal control experiments against a sumo-http bridge.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Experiment configuration file (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bridge base URL override.
    #[arg(long)]
    api_url: Option<String>,

    /// Simulated horizon override, in seconds.
    #[arg(long)]
    seconds: Option<u32>,

    /// Open the simulator's own GUI (server-side).
    #[arg(long)]
    gui: bool,

    /// Output directory override.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Strategy to run; repeat to run several in order. Defaults to all
    /// three.
    #[arg(long = "strategy", value_enum)]
    strategies: Vec<Strategy>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut cfg = match &cli.config {
        Some(path) => ExperimentConfig::load(path)?,
        None => ExperimentConfig::default(),
    };

    if let Some(api_url) = cli.api_url {
        cfg.api_url = api_url;
    }
    if let Some(seconds) = cli.seconds {
        cfg.scenario.num_seconds = seconds;
    }
    if cli.gui {
        cfg.scenario.use_gui = true;
    }
    if let Some(out_dir) = cli.out_dir {
        cfg.out_dir = out_dir;
    }

    let strategies = if cli.strategies.is_empty() {
        vec![Strategy::Fixed, Strategy::QLearning, Strategy::Dqn]
    } else {
        cli.strategies
    };

    run_all(&cfg, &strategies)
}

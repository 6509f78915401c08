//! lvt-replay: feed recorded tree updates through the engine.
//!
//! Reads one JSON update per line from a file (or stdin) and prints the
//! `changed` flag and reconstructed HTML after each one. Handy for
//! reproducing rendering problems from captured server traffic.

mod replay;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use clap::Parser;
use log::info;
use lvt_engine::{EngineConfig, EngineError, TreeEngine};

#[derive(Debug, Parser)]
#[command(version, about = "Replay JSON tree updates and print the rendered HTML", long_about = None)]
struct Cli {
    /// Engine config file (JSON)
    #[clap(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Updates file, one JSON object per line; stdin when omitted
    #[clap(value_name = "UPDATES")]
    updates: Option<PathBuf>,
}

fn main() -> Result<(), EngineError> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let mut engine = TreeEngine::with_config(config);
    info!("Replay session {}", engine.session_id());

    let stdout = io::stdout().lock();
    let summary = match &cli.updates {
        Some(path) => replay::replay(&mut engine, BufReader::new(File::open(path)?), stdout)?,
        None => replay::replay(&mut engine, io::stdin().lock(), stdout)?,
    };

    info!(
        "Replayed {} update(s), skipped {}, {} diagnostic(s)",
        summary.applied, summary.skipped, summary.diagnostics
    );
    Ok(())
}

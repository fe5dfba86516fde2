//! # strata: layered image builder
//!
//! Builds container root filesystems from a `Stratafile`, caching one btrfs
//! snapshot per instruction so unchanged steps are never re-run.

mod commands;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json, cli.verbose);
    commands::execute(cli)
}

/// Installs the global subscriber. `RUST_LOG` overrides the level picked
/// by `-v`.
fn init_tracing(json: bool, verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

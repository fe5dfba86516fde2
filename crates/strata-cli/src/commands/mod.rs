//! CLI command definitions and dispatch.

pub mod bootstrap;
pub mod build;
pub mod images;
pub mod import;
pub mod layers;
pub mod rmi;

use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use strata_common::config::StrataConfig;
use strata_common::constants::STORAGE_ROOT_ENV;
use strata_core::store::BtrfsStore;

/// Strata: incremental container image builds on btrfs.
///
/// Concurrent builds of the same image, or a removal racing a build, are
/// not coordinated; run them one at a time.
#[derive(Parser, Debug)]
#[command(name = "strata", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Storage root holding `images/` and `layers/`.
    #[arg(long, global = true, env = STORAGE_ROOT_ENV)]
    pub root: Option<PathBuf>,

    /// JSON configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs and results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (repeatable).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build an image from a Stratafile or Dockerfile.
    Build(build::BuildArgs),
    /// Create a base image by installing packages with pacstrap.
    Bootstrap(bootstrap::BootstrapArgs),
    /// Create a base image from a root filesystem archive.
    Import(import::ImportArgs),
    /// Remove an image and the layer chain below it.
    Rmi(rmi::RmiArgs),
    /// List images, or describe one.
    Images(images::ImagesArgs),
    /// List cached layers.
    Layers(layers::LayersArgs),
}

impl Cli {
    /// Resolves the effective configuration: defaults, then the `--config`
    /// file, then `--root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the result is
    /// invalid.
    pub fn load_config(&self) -> anyhow::Result<StrataConfig> {
        let mut config = match &self.config {
            Some(path) => StrataConfig::load(path)
                .with_context(|| format!("loading configuration {}", path.display()))?,
            None => StrataConfig::default(),
        };
        if let Some(root) = &self.root {
            config = config.with_storage_root(root);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Opens the btrfs store named by `config`.
pub(crate) fn open_store(config: &StrataConfig) -> anyhow::Result<BtrfsStore> {
    BtrfsStore::open(config).with_context(|| {
        format!(
            "opening volume store at {}",
            config.storage_root.display()
        )
    })
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the command fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.load_config()?;
    tracing::debug!(root = %config.storage_root.display(), "configuration resolved");
    match cli.command {
        Command::Build(args) => build::execute(args, &config, cli.json),
        Command::Bootstrap(args) => bootstrap::execute(&args, &config, cli.json),
        Command::Import(args) => import::execute(&args, &config, cli.json),
        Command::Rmi(args) => rmi::execute(&args, &config, cli.json),
        Command::Images(args) => images::execute(&args, &config, cli.json),
        Command::Layers(args) => layers::execute(&args, &config, cli.json),
    }
}

//! `strata build`: Build an image from a manifest.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use strata_common::config::StrataConfig;
use strata_core::exec::NspawnExecutor;
use strata_image::build::{BuildConfig, BuildReport, Pipeline};
use strata_image::manifest::Manifest;

use crate::output;

/// Arguments for the `build` command.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Name of the image to produce.
    pub name: String,

    /// Manifest to build from. Defaults to `Stratafile`, then `Dockerfile`,
    /// in the build directory.
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Directory searched for a manifest when `--file` is not given.
    #[arg(short = 'C', long, default_value = ".")]
    pub dir: PathBuf,

    /// Reuse cached layers even when they were never marked complete.
    #[arg(long)]
    pub no_verify: bool,
}

impl BuildArgs {
    fn manifest_path(&self) -> anyhow::Result<PathBuf> {
        match &self.file {
            Some(file) => Ok(file.clone()),
            None => Ok(Manifest::discover(&self.dir)?),
        }
    }
}

/// Executes the `build` command.
///
/// # Errors
///
/// Returns an error if the manifest cannot be read, the store cannot be
/// opened, or any build step fails.
pub fn execute(args: BuildArgs, config: &StrataConfig, json: bool) -> anyhow::Result<()> {
    let path = args.manifest_path()?;
    let manifest = Manifest::from_file(&path)?;
    let base = manifest
        .base_image()
        .with_context(|| format!("reading {}", path.display()))?;
    tracing::info!(manifest = %path.display(), image = %args.name, base, "building");

    let store = super::open_store(config)?;
    let exec = NspawnExecutor::new(&config.nspawn);
    let mut build_config = BuildConfig::from(config);
    if args.no_verify {
        build_config.verify_layers = false;
    }

    let report = Pipeline::new(&store, &exec, build_config)
        .build(&manifest.instructions, base, &args.name)
        .with_context(|| format!("building image {}", args.name))?;

    if json {
        return output::print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &BuildReport) {
    println!("{:<6} {:<14} {:<8} INSTRUCTION", "STEP", "LAYER", "STATUS");
    for step in &report.steps {
        println!(
            "{:<6} {:<14} {:<8} {}",
            format!("#{}", step.index),
            step.hash.short(),
            step.outcome.to_string(),
            output::truncate(&step.instruction.to_string(), 60),
        );
    }
    println!(
        "built {} ({} cached, {} executed)",
        report.image,
        report.cache_hits(),
        report.executed()
    );
}

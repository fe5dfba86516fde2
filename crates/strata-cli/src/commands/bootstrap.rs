//! `strata bootstrap`: Install a base image with pacstrap.

use anyhow::Context;
use clap::Args;
use strata_common::config::StrataConfig;
use strata_core::exec::Pacstrap;
use strata_image::base::create_base;
use strata_image::registry;

use crate::output;

/// Arguments for the `bootstrap` command.
#[derive(Args, Debug)]
pub struct BootstrapArgs {
    /// Name of the image to create.
    pub name: String,

    /// Package to install instead of the configured list (repeatable).
    #[arg(short, long = "package", value_name = "PACKAGE")]
    pub packages: Vec<String>,
}

/// Executes the `bootstrap` command.
///
/// # Errors
///
/// Returns an error if the image already exists or `pacstrap` fails. A
/// failed install leaves no volume behind.
pub fn execute(args: &BootstrapArgs, config: &StrataConfig, json: bool) -> anyhow::Result<()> {
    let mut bootstrap = config.bootstrap.clone();
    if !args.packages.is_empty() {
        bootstrap.packages.clone_from(&args.packages);
    }
    let pacstrap = Pacstrap::new(&bootstrap);

    let store = super::open_store(config)?;
    let _ = create_base(&store, &args.name, |root| pacstrap.install(root))
        .with_context(|| format!("bootstrapping image {}", args.name))?;

    if json {
        return output::print_json(&registry::inspect_image(&store, &args.name)?);
    }
    println!("created image {}", args.name);
    Ok(())
}

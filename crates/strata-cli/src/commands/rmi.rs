//! `strata rmi`: Remove an image and its layer chain.

use anyhow::Context;
use clap::Args;
use strata_common::config::StrataConfig;
use strata_image::gc::remove_image;

use crate::output;

/// Arguments for the `rmi` command.
#[derive(Args, Debug)]
pub struct RmiArgs {
    /// Image to remove.
    pub name: String,
}

/// Executes the `rmi` command.
///
/// Layers shared with another image are removed too; rebuild that image
/// afterwards if needed.
///
/// # Errors
///
/// Returns an error if the image does not exist or a volume cannot be
/// removed.
pub fn execute(args: &RmiArgs, config: &StrataConfig, json: bool) -> anyhow::Result<()> {
    let store = super::open_store(config)?;
    let report =
        remove_image(&store, &args.name).with_context(|| format!("removing image {}", args.name))?;

    if json {
        return output::print_json(&report);
    }
    for volume in &report.removed {
        println!("removed {volume}");
    }
    Ok(())
}

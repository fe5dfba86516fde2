//! `strata layers`: List the layer cache.

use clap::Args;
use strata_common::config::StrataConfig;
use strata_image::registry;

use crate::output;

/// Arguments for the `layers` command.
#[derive(Args, Debug)]
pub struct LayersArgs {
    /// Only show layers without a completion marker.
    #[arg(long)]
    pub incomplete: bool,
}

/// Executes the `layers` command.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn execute(args: &LayersArgs, config: &StrataConfig, json: bool) -> anyhow::Result<()> {
    let store = super::open_store(config)?;
    let layers: Vec<_> = registry::list_layers(&store)?
        .into_iter()
        .filter(|l| !args.incomplete || !l.complete)
        .collect();

    if json {
        return output::print_json(&layers);
    }
    if layers.is_empty() {
        println!("No layers found.");
        return Ok(());
    }
    println!("{:<14} {:<10} PARENT", "LAYER", "COMPLETE");
    for layer in &layers {
        let parent = layer.parent.as_ref().map(ToString::to_string);
        println!(
            "{:<14} {:<10} {}",
            layer.hash.short(),
            if layer.complete { "yes" } else { "no" },
            output::or_dash(parent.as_deref())
        );
    }
    Ok(())
}

//! `strata images`: List or describe local images.

use clap::Args;
use strata_common::config::StrataConfig;
use strata_image::registry::{self, ImageEntry};

use crate::output;

/// Arguments for the `images` command.
#[derive(Args, Debug)]
pub struct ImagesArgs {
    /// Describe a single image, including its layer chain.
    pub name: Option<String>,
}

/// Executes the `images` command.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn execute(args: &ImagesArgs, config: &StrataConfig, json: bool) -> anyhow::Result<()> {
    let store = super::open_store(config)?;

    if let Some(name) = &args.name {
        let entry = registry::inspect_image(&store, name)?;
        if json {
            return output::print_json(&entry);
        }
        print_details(&entry);
        return Ok(());
    }

    let entries = registry::list_images(&store)?;
    if json {
        return output::print_json(&entries);
    }
    if entries.is_empty() {
        println!("No images found.");
        return Ok(());
    }
    println!("{:<24} {:<8} {:<24} UUID", "NAME", "LAYERS", "BASE");
    for entry in &entries {
        println!(
            "{:<24} {:<8} {:<24} {}",
            entry.name,
            entry.layers.len(),
            output::or_dash(entry.base.as_deref()),
            entry.uuid
        );
    }
    Ok(())
}

fn print_details(entry: &ImageEntry) {
    println!("Name:   {}", entry.name);
    println!("UUID:   {}", entry.uuid);
    println!("Base:   {}", output::or_dash(entry.base.as_deref()));
    println!("Layers:");
    for hash in &entry.layers {
        println!("  {}", hash.short());
    }
}

//! `strata import`: Create a base image from a root filesystem archive.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use strata_common::config::StrataConfig;
use strata_image::base::{create_base, unpack_archive};
use strata_image::registry;

use crate::output;

/// Arguments for the `import` command.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Name of the image to create.
    pub name: String,

    /// Root filesystem archive: `.tar`, `.tar.gz`/`.tgz` or `.tar.bz2`.
    pub archive: PathBuf,
}

/// Executes the `import` command.
///
/// # Errors
///
/// Returns an error if the archive is missing, the image already exists or
/// the archive cannot be unpacked. A failed unpack leaves no volume behind.
pub fn execute(args: &ImportArgs, config: &StrataConfig, json: bool) -> anyhow::Result<()> {
    anyhow::ensure!(
        args.archive.is_file(),
        "archive not found: {}",
        args.archive.display()
    );

    let store = super::open_store(config)?;
    let _ = create_base(&store, &args.name, |root| {
        unpack_archive(&args.archive, root, true).map(|_| ())
    })
    .with_context(|| {
        format!(
            "importing {} as image {}",
            args.archive.display(),
            args.name
        )
    })?;

    if json {
        return output::print_json(&registry::inspect_image(&store, &args.name)?);
    }
    println!("imported image {}", args.name);
    Ok(())
}

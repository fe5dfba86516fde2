//! Read-only views of the local images and layer cache.
//!
//! Nothing is indexed on disk: an image's layers are recovered by walking
//! parent UUIDs, exactly the chain [`crate::gc::remove_image`] would delete.

use std::collections::HashSet;

use serde::Serialize;
use strata_common::error::{Result, StrataError};
use strata_common::types::{LayerHash, VolumeKind, VolumePath};
use strata_core::store::VolumeStore;

use crate::gc::owner_of;

/// A named image and the layers it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageEntry {
    /// Image name.
    pub name: String,
    /// Volume UUID.
    pub uuid: String,
    /// Layer hashes, top (most recent) first.
    pub layers: Vec<LayerHash>,
    /// Named image the chain bottoms out on, if it still exists.
    pub base: Option<String>,
}

/// A cached layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerEntry {
    /// Layer hash.
    pub hash: LayerHash,
    /// Whether the layer's build step is known to have finished.
    pub complete: bool,
    /// Volume the layer was snapshotted from, if it still exists.
    pub parent: Option<VolumePath>,
}

/// Describes a single image.
///
/// # Errors
///
/// Returns `StrataError::NotFound` if the image does not exist and
/// `StrataError::StoreQuery` if lineage metadata cannot be read.
pub fn inspect_image<S>(store: &S, name: &str) -> Result<ImageEntry>
where
    S: VolumeStore + ?Sized,
{
    let image = VolumePath::image(name)?;
    if !store.exists(&image) {
        return Err(StrataError::NotFound {
            kind: "image",
            id: name.to_owned(),
        });
    }

    let mut layers = Vec::new();
    let mut base = None;
    let mut seen = HashSet::from([image.clone()]);
    let mut cursor = owner_of(store, &image)?;
    while let Some(volume) = cursor {
        if !seen.insert(volume.clone()) {
            break;
        }
        if volume.kind() == VolumeKind::Image {
            base = Some(volume.name().to_owned());
            break;
        }
        layers.push(LayerHash::from_hex(volume.name())?);
        cursor = owner_of(store, &volume)?;
    }

    Ok(ImageEntry {
        name: name.to_owned(),
        uuid: store.uuid(&image)?,
        layers,
        base,
    })
}

/// Describes every image in the store, sorted by name.
///
/// # Errors
///
/// Returns an error if the image namespace cannot be listed or an image
/// cannot be inspected.
pub fn list_images<S>(store: &S) -> Result<Vec<ImageEntry>>
where
    S: VolumeStore + ?Sized,
{
    store
        .list(VolumeKind::Image)?
        .iter()
        .map(|image| inspect_image(store, image.name()))
        .collect()
}

/// Describes every cached layer, sorted by hash. Entries of the layer
/// namespace whose name is not a hash are skipped.
///
/// # Errors
///
/// Returns an error if the layer namespace cannot be listed or a layer's
/// lineage cannot be read.
pub fn list_layers<S>(store: &S) -> Result<Vec<LayerEntry>>
where
    S: VolumeStore + ?Sized,
{
    store
        .list(VolumeKind::Layer)?
        .into_iter()
        .filter_map(|layer| match LayerHash::from_hex(layer.name()) {
            Ok(hash) => Some((layer, hash)),
            Err(e) => {
                tracing::warn!(path = %layer, error = %e, "skipping stray layer volume");
                None
            }
        })
        .map(|(layer, hash)| {
            Ok(LayerEntry {
                hash,
                complete: store.is_complete(&layer),
                parent: owner_of(store, &layer)?,
            })
        })
        .collect()
}

//! Content-addressed build layers.
//!
//! A layer is the volume `layers/<hash>` holding the result of one
//! instruction applied on top of a parent volume. The hash covers the
//! parent's identity rather than its path, so the same parent state and
//! instruction always land on the same cache entry whatever the image
//! under construction is called.

use strata_common::error::{Result, StrataError};
use strata_common::types::{Instruction, LayerHash, Verb, VolumePath};
use strata_core::store::VolumeStore;

use crate::hash::layer_hash;

/// One instruction's layer, either reused from the cache or freshly
/// materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    /// Cache key.
    pub hash: LayerHash,
    /// Instruction this layer applies.
    pub instruction: Instruction,
    /// Identity of the parent the hash was derived from.
    pub parent_id: String,
    /// Volume the layer was (or would be) snapshotted from.
    pub parent_path: VolumePath,
    /// Volume holding this layer.
    pub path: VolumePath,
    /// Whether the volume was already cached and needs no execution.
    pub exists: bool,
}

impl Layer {
    /// Resolves the cache entry for `instruction` on top of `parent` and
    /// materializes it on a miss.
    ///
    /// With `verify_complete`, a cached volume that was never marked
    /// complete is treated as debris from an interrupted build and
    /// rebuilt.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::StoreQuery` if the parent identity cannot be
    /// resolved, `StrataError::SourceUnreadable` if an `ADD` source cannot be
    /// hashed and `StrataError::Materialization` if the snapshot fails.
    pub fn create<S>(
        store: &S,
        instruction: &Instruction,
        parent: &VolumePath,
        verify_complete: bool,
    ) -> Result<Self>
    where
        S: VolumeStore + ?Sized,
    {
        let parent_id = parent_id(store, parent)?;
        let hash = layer_hash(&parent_id, instruction)?;
        let path = VolumePath::layer(&hash);
        let mut layer = Self {
            hash,
            instruction: instruction.clone(),
            parent_id,
            parent_path: parent.clone(),
            path,
            exists: false,
        };

        if store.exists(&layer.path) {
            if instruction.verb == Verb::RunNoCache {
                tracing::info!(layer = %layer.path, "invalidating cached layer for RUN_NOCACHE");
                layer.remove(store)?;
            } else if verify_complete && !store.is_complete(&layer.path) {
                tracing::warn!(layer = %layer.path, "discarding incomplete layer");
                layer.remove(store)?;
            } else {
                tracing::debug!(layer = %layer.path, "layer cache hit");
                layer.exists = true;
                return Ok(layer);
            }
        }

        store
            .snapshot(parent, &layer.path, false)
            .map_err(|e| StrataError::Materialization {
                from: parent.to_string(),
                to: layer.path.to_string(),
                message: e.to_string(),
            })?;
        tracing::debug!(layer = %layer.path, parent = %parent, "materialized layer");
        Ok(layer)
    }

    /// Deletes the layer's volume.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot remove the volume.
    pub fn remove<S>(&self, store: &S) -> Result<()>
    where
        S: VolumeStore + ?Sized,
    {
        store.remove(&self.path)
    }

    /// Records that the layer's instruction ran to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    pub fn mark_complete<S>(&self, store: &S) -> Result<()>
    where
        S: VolumeStore + ?Sized,
    {
        store.mark_complete(&self.path)
    }
}

/// Identity a layer built on top of `parent` is keyed on.
///
/// A named image answers with its own parent's UUID, which anchors the
/// first layer above an image to the image's lineage point. An image that
/// was never snapshotted from anything falls back to its own UUID.
///
/// # Errors
///
/// Returns `StrataError::StoreQuery` if the store cannot answer.
pub fn parent_id<S>(store: &S, parent: &VolumePath) -> Result<String>
where
    S: VolumeStore + ?Sized,
{
    if parent.is_image() {
        if let Some(uuid) = store.parent_uuid(parent)? {
            return Ok(uuid);
        }
    }
    store.uuid(parent)
}

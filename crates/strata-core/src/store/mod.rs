//! Copy-on-write volume store abstraction.
//!
//! Volumes are addressed by [`VolumePath`]. A volume may contain nested
//! sub-volumes; snapshot and removal always carry them along.

pub mod btrfs;
pub mod memory;

use std::path::PathBuf;

use strata_common::error::Result;
use strata_common::types::{VolumeKind, VolumePath};

pub use self::btrfs::BtrfsStore;
pub use self::memory::MemoryStore;

/// Copy-on-write volume primitives the layer cache relies on.
///
/// Implementors are not expected to serialize concurrent callers; two
/// builds targeting the same image must be serialized by the caller.
pub trait VolumeStore: Send + Sync {
    /// Returns whether a volume exists at `path`.
    fn exists(&self, path: &VolumePath) -> bool;

    /// Creates an empty volume.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::Conflict` if `path` already exists.
    fn create_empty(&self, path: &VolumePath) -> Result<()>;

    /// Snapshots `from` to `to`, including every nested sub-volume.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::NotFound` if `from` is missing and
    /// `StrataError::Conflict` if `to` already exists.
    fn snapshot(&self, from: &VolumePath, to: &VolumePath, readonly: bool) -> Result<()>;

    /// Removes a volume and its nested sub-volumes, deepest first.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::NotFound` if `path` is missing.
    fn remove(&self, path: &VolumePath) -> Result<()>;

    /// UUID the store assigned to the volume.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::StoreQuery` if the store has no identity
    /// metadata for `path`.
    fn uuid(&self, path: &VolumePath) -> Result<String>;

    /// UUID of the volume `path` was snapshotted from, `None` for a volume
    /// that was created empty.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::StoreQuery` if the store has no identity
    /// metadata for `path`.
    fn parent_uuid(&self, path: &VolumePath) -> Result<Option<String>>;

    /// Top-level volume currently carrying `uuid`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::StoreQuery` if the store cannot be searched.
    fn find_path_by_uuid(&self, uuid: &str) -> Result<Option<VolumePath>>;

    /// All volumes of a namespace, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace cannot be enumerated.
    fn list(&self, kind: VolumeKind) -> Result<Vec<VolumePath>>;

    /// Host path where the volume's tree is visible.
    fn mount_point(&self, path: &VolumePath) -> PathBuf;

    /// Records that the volume's build step finished successfully.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    fn mark_complete(&self, path: &VolumePath) -> Result<()>;

    /// Returns whether [`VolumeStore::mark_complete`] was called for the
    /// volume currently at `path`.
    fn is_complete(&self, path: &VolumePath) -> bool;
}

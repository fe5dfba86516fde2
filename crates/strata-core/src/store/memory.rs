//! In-process volume store.
//!
//! Models the copy-on-write contract without touching the host: every
//! volume is a record with a UUID, an optional parent UUID, a readonly
//! flag and a small file table. UUIDs come from a counter, so two stores
//! fed the same sequence of operations assign the same identities.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use strata_common::error::{Result, StrataError};
use strata_common::types::{VolumeKind, VolumePath};

use super::VolumeStore;

/// Prefix of the mount points handed out by [`MemoryStore`].
const MEMORY_ROOT: &str = "/memory";

#[derive(Debug, Clone)]
struct VolumeRecord {
    uuid: String,
    parent_uuid: Option<String>,
    readonly: bool,
    complete: bool,
    files: BTreeMap<PathBuf, Vec<u8>>,
}

#[derive(Debug, Default)]
struct State {
    /// Keyed by store-relative path; nested sub-volumes have longer keys.
    volumes: BTreeMap<PathBuf, VolumeRecord>,
    next_id: u128,
}

impl State {
    fn allocate_uuid(&mut self) -> String {
        self.next_id += 1;
        uuid::Uuid::from_u128(self.next_id).to_string()
    }

    fn record(&self, key: &Path) -> Result<&VolumeRecord> {
        self.volumes.get(key).ok_or_else(|| StrataError::StoreQuery {
            path: key.display().to_string(),
            message: "no such volume".into(),
        })
    }

    /// The volume at `key` followed by all of its nested sub-volumes.
    fn tree(&self, key: &Path) -> Vec<PathBuf> {
        self.volumes
            .keys()
            .filter(|k| k.starts_with(key))
            .cloned()
            .collect()
    }
}

/// Volume store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates an empty sub-volume nested inside `owner` at `relative`.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::NotFound` if `owner` is missing and
    /// `StrataError::Conflict` if the nested path is taken.
    pub fn add_subvolume(&self, owner: &VolumePath, relative: impl AsRef<Path>) -> Result<()> {
        let mut state = self.state();
        let owner_key = owner.relative();
        if !state.volumes.contains_key(&owner_key) {
            return Err(StrataError::NotFound {
                kind: "volume",
                id: owner.to_string(),
            });
        }
        let key = owner_key.join(relative);
        if state.volumes.contains_key(&key) {
            return Err(StrataError::Conflict {
                kind: "volume",
                id: key.display().to_string(),
            });
        }
        let uuid = state.allocate_uuid();
        let _ = state.volumes.insert(
            key,
            VolumeRecord {
                uuid,
                parent_uuid: None,
                readonly: false,
                complete: false,
                files: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Nested sub-volumes of `owner`, relative to it.
    #[must_use]
    pub fn subvolumes(&self, owner: &VolumePath) -> Vec<PathBuf> {
        let state = self.state();
        let owner_key = owner.relative();
        state
            .tree(&owner_key)
            .into_iter()
            .filter_map(|k| {
                k.strip_prefix(&owner_key)
                    .ok()
                    .filter(|rel| !rel.as_os_str().is_empty())
                    .map(Path::to_path_buf)
            })
            .collect()
    }

    /// Readonly flag of a volume.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::StoreQuery` if the volume is missing.
    pub fn is_readonly(&self, path: &VolumePath) -> Result<bool> {
        Ok(self.state().record(&path.relative())?.readonly)
    }

    /// Writes a file into a volume.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::NotFound` if the volume is missing and
    /// `StrataError::Io` if it is readonly.
    pub fn write_file(
        &self,
        path: &VolumePath,
        relative: impl Into<PathBuf>,
        contents: impl Into<Vec<u8>>,
    ) -> Result<()> {
        let mut state = self.state();
        let key = path.relative();
        let record = state
            .volumes
            .get_mut(&key)
            .ok_or_else(|| StrataError::NotFound {
                kind: "volume",
                id: path.to_string(),
            })?;
        if record.readonly {
            return Err(StrataError::io(
                key,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "readonly volume"),
            ));
        }
        let _ = record.files.insert(relative.into(), contents.into());
        Ok(())
    }

    /// Files written into a volume.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::StoreQuery` if the volume is missing.
    pub fn files(&self, path: &VolumePath) -> Result<BTreeMap<PathBuf, Vec<u8>>> {
        Ok(self.state().record(&path.relative())?.files.clone())
    }

    /// Maps a mount point returned by [`VolumeStore::mount_point`] back to
    /// its volume.
    #[must_use]
    pub fn volume_at(&self, mount_point: &Path) -> Option<VolumePath> {
        let relative = mount_point.strip_prefix(MEMORY_ROOT).ok()?;
        VolumePath::parse(relative.to_str()?).ok()
    }

    /// Number of top-level volumes in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state()
            .volumes
            .keys()
            .filter(|k| k.components().count() == 2)
            .count()
    }

    /// Returns whether the store holds no volumes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state().volumes.is_empty()
    }
}

impl VolumeStore for MemoryStore {
    fn exists(&self, path: &VolumePath) -> bool {
        self.state().volumes.contains_key(&path.relative())
    }

    fn create_empty(&self, path: &VolumePath) -> Result<()> {
        let mut state = self.state();
        let key = path.relative();
        if state.volumes.contains_key(&key) {
            return Err(StrataError::Conflict {
                kind: "volume",
                id: path.to_string(),
            });
        }
        let uuid = state.allocate_uuid();
        tracing::debug!(path = %path, uuid = %uuid, "created empty volume");
        let _ = state.volumes.insert(
            key,
            VolumeRecord {
                uuid,
                parent_uuid: None,
                readonly: false,
                complete: false,
                files: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn snapshot(&self, from: &VolumePath, to: &VolumePath, readonly: bool) -> Result<()> {
        let mut state = self.state();
        let from_key = from.relative();
        let to_key = to.relative();
        if !state.volumes.contains_key(&from_key) {
            return Err(StrataError::NotFound {
                kind: "volume",
                id: from.to_string(),
            });
        }
        if state.volumes.contains_key(&to_key) {
            return Err(StrataError::Conflict {
                kind: "volume",
                id: to.to_string(),
            });
        }

        for source_key in state.tree(&from_key) {
            let Ok(relative) = source_key.strip_prefix(&from_key) else {
                continue;
            };
            let target_key = to_key.join(relative);
            let source = state.record(&source_key)?.clone();
            let uuid = state.allocate_uuid();
            let _ = state.volumes.insert(
                target_key,
                VolumeRecord {
                    uuid,
                    parent_uuid: Some(source.uuid),
                    readonly,
                    complete: false,
                    files: source.files,
                },
            );
        }
        tracing::debug!(from = %from, to = %to, readonly, "snapshotted volume");
        Ok(())
    }

    fn remove(&self, path: &VolumePath) -> Result<()> {
        let mut state = self.state();
        let key = path.relative();
        if !state.volumes.contains_key(&key) {
            return Err(StrataError::NotFound {
                kind: "volume",
                id: path.to_string(),
            });
        }
        let mut doomed = state.tree(&key);
        doomed.sort_by_key(|k| std::cmp::Reverse(k.components().count()));
        for k in doomed {
            let _ = state.volumes.remove(&k);
        }
        tracing::debug!(path = %path, "removed volume");
        Ok(())
    }

    fn uuid(&self, path: &VolumePath) -> Result<String> {
        Ok(self.state().record(&path.relative())?.uuid.clone())
    }

    fn parent_uuid(&self, path: &VolumePath) -> Result<Option<String>> {
        Ok(self.state().record(&path.relative())?.parent_uuid.clone())
    }

    fn find_path_by_uuid(&self, uuid: &str) -> Result<Option<VolumePath>> {
        let state = self.state();
        let found = state
            .volumes
            .iter()
            .find(|(key, record)| record.uuid == uuid && key.components().count() == 2)
            .and_then(|(key, _)| key.to_str().and_then(|k| VolumePath::parse(k).ok()));
        Ok(found)
    }

    fn list(&self, kind: VolumeKind) -> Result<Vec<VolumePath>> {
        let state = self.state();
        let mut paths: Vec<VolumePath> = state
            .volumes
            .keys()
            .filter(|k| k.components().count() == 2 && k.starts_with(kind.dir()))
            .filter_map(|k| k.to_str().and_then(|k| VolumePath::parse(k).ok()))
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn mount_point(&self, path: &VolumePath) -> PathBuf {
        Path::new(MEMORY_ROOT).join(path.relative())
    }

    fn mark_complete(&self, path: &VolumePath) -> Result<()> {
        let mut state = self.state();
        let record = state
            .volumes
            .get_mut(&path.relative())
            .ok_or_else(|| StrataError::NotFound {
                kind: "volume",
                id: path.to_string(),
            })?;
        record.complete = true;
        Ok(())
    }

    fn is_complete(&self, path: &VolumePath) -> bool {
        self.state()
            .volumes
            .get(&path.relative())
            .is_some_and(|r| r.complete)
    }
}

//! Image removal.
//!
//! Removing an image also removes the anonymous layers below it, following
//! parent UUIDs down the chain until another named image (or the end of
//! the recorded lineage) is reached.
//!
//! Layers are assumed to feed a single image. Two images forked from a
//! common layer share that layer, and removing either one deletes it.

use std::collections::HashSet;

use serde::Serialize;
use strata_common::error::{Result, StrataError};
use strata_common::types::{VolumeKind, VolumePath};
use strata_core::store::VolumeStore;

/// Volumes deleted by [`remove_image`], in deletion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    /// Removed volumes, the image first.
    pub removed: Vec<VolumePath>,
}

/// Removes the image `name` and walks its ancestor chain, removing every
/// anonymous layer until a named image is reached.
///
/// # Errors
///
/// Returns `StrataError::NotFound` if the image does not exist and
/// `StrataError::StoreQuery` if a volume's lineage cannot be read. Volumes
/// removed before the failure stay removed.
pub fn remove_image<S>(store: &S, name: &str) -> Result<RemovalReport>
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

    let mut report = RemovalReport::default();
    let mut visited = HashSet::new();
    let mut current = image;
    loop {
        let owner = owner_of(store, &current)?;
        store.remove(&current)?;
        tracing::info!(volume = %current, "removed");
        let _ = visited.insert(current.clone());
        report.removed.push(current);

        match owner {
            Some(next) if next.kind() == VolumeKind::Layer && !visited.contains(&next) => {
                current = next;
            }
            Some(next) => {
                tracing::debug!(stop = %next, "chain walk reached a kept volume");
                break;
            }
            None => break,
        }
    }
    Ok(report)
}

/// Volume the one at `path` was snapshotted from, if it still exists.
pub(crate) fn owner_of<S>(store: &S, path: &VolumePath) -> Result<Option<VolumePath>>
where
    S: VolumeStore + ?Sized,
{
    match store.parent_uuid(path)? {
        Some(uuid) => store.find_path_by_uuid(&uuid),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use strata_core::store::MemoryStore;

    use super::*;

    fn layer(name: char) -> VolumePath {
        VolumePath::new(VolumeKind::Layer, name.to_string().repeat(64)).expect("path")
    }

    /// `images/base -> layers/a -> layers/b -> images/app`.
    fn chain() -> (MemoryStore, VolumePath) {
        let store = MemoryStore::new();
        let base = VolumePath::image("base").expect("path");
        store.create_empty(&base).expect("create");
        store.snapshot(&base, &layer('a'), false).expect("snapshot");
        store.snapshot(&layer('a'), &layer('b'), false).expect("snapshot");
        let app = VolumePath::image("app").expect("path");
        store.snapshot(&layer('b'), &app, true).expect("snapshot");
        (store, base)
    }

    #[test]
    fn removes_image_and_its_layers_but_not_the_base() {
        let (store, base) = chain();
        let report = remove_image(&store, "app").expect("remove");
        assert_eq!(
            report.removed,
            vec![VolumePath::image("app").expect("path"), layer('b'), layer('a')]
        );
        assert!(store.exists(&base));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_image_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            remove_image(&store, "ghost"),
            Err(StrataError::NotFound { kind: "image", .. })
        ));
    }

    #[test]
    fn image_without_lineage_removes_only_itself() {
        let store = MemoryStore::new();
        let lone = VolumePath::image("lone").expect("path");
        store.create_empty(&lone).expect("create");
        let report = remove_image(&store, "lone").expect("remove");
        assert_eq!(report.removed, vec![lone]);
        assert!(store.is_empty());
    }

    #[test]
    fn walk_stops_when_ancestor_is_gone() {
        let (store, _) = chain();
        store.remove(&layer('a')).expect("remove");
        let report = remove_image(&store, "app").expect("remove");
        assert_eq!(report.removed.len(), 2);
    }

    #[test]
    fn image_built_on_image_keeps_the_lower_image() {
        let (store, _) = chain();
        let derived = VolumePath::image("derived").expect("path");
        let app = VolumePath::image("app").expect("path");
        store.snapshot(&app, &layer('c'), false).expect("snapshot");
        store.snapshot(&layer('c'), &derived, true).expect("snapshot");

        let report = remove_image(&store, "derived").expect("remove");
        assert_eq!(report.removed, vec![derived, layer('c')]);
        assert!(store.exists(&app));
    }

    #[test]
    fn owner_of_follows_parent_uuid() {
        let (store, base) = chain();
        assert_eq!(owner_of(&store, &layer('a')).expect("owner"), Some(base.clone()));
        assert_eq!(owner_of(&store, &base).expect("owner"), None);
    }
}

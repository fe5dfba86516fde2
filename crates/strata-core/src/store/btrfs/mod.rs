//! btrfs-backed volume store.
//!
//! Every volume is a btrfs subvolume below the storage root. Volumes are
//! manipulated through the `btrfs` CLI; its output is read by the typed
//! parsers in [`parse`].

pub mod parse;

use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use strata_common::config::StrataConfig;
use strata_common::constants::COMPLETE_MARKER_SUFFIX;
use strata_common::error::{Result, StrataError};
use strata_common::types::{VolumeKind, VolumePath};

use self::parse::SubvolumeInfo;
use super::VolumeStore;

/// Contents of a completion marker file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CompletionMarker {
    volume: String,
    uuid: String,
    completed_at: chrono::DateTime<chrono::Utc>,
}

/// Volume store on btrfs subvolumes.
#[derive(Debug)]
pub struct BtrfsStore {
    root: PathBuf,
    program: PathBuf,
}

impl BtrfsStore {
    /// Opens the store at the configured storage root, creating the
    /// namespace directories if needed.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::Config` if the root is not on btrfs or the
    /// `btrfs` executable cannot be found, and `StrataError::Io` if the
    /// directories cannot be created.
    pub fn open(config: &StrataConfig) -> Result<Self> {
        config.validate()?;
        let root = config.storage_root.clone();
        tracing::info!(path = %root.display(), "opening btrfs volume store");

        std::fs::create_dir_all(&root).map_err(|e| StrataError::io(&root, e))?;
        ensure_btrfs(&root)?;
        for kind in [VolumeKind::Image, VolumeKind::Layer] {
            let dir = root.join(kind.dir());
            std::fs::create_dir_all(&dir).map_err(|e| StrataError::io(&dir, e))?;
        }

        let program = match &config.btrfs_program {
            Some(program) => program.clone(),
            None => which::which("btrfs").map_err(|e| StrataError::Config {
                message: format!("btrfs executable not found: {e}"),
            })?,
        };
        Ok(Self { root, program })
    }

    fn absolute(&self, path: &VolumePath) -> PathBuf {
        self.root.join(path.relative())
    }

    fn marker_path(&self, path: &VolumePath) -> PathBuf {
        self.root
            .join(path.kind().dir())
            .join(format!(".{}{COMPLETE_MARKER_SUFFIX}", path.name()))
    }

    /// Runs `btrfs` with the given arguments and returns its stdout.
    fn run<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let rendered = std::iter::once(self.program.as_os_str())
            .chain(args.iter().map(OsString::as_os_str))
            .map(OsStr::to_string_lossy)
            .collect::<Vec<_>>()
            .join(" ");
        tracing::debug!(command = %rendered, "running btrfs");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| StrataError::io(&self.program, e))?;
        if !output.status.success() {
            return Err(StrataError::StoreCommand {
                command: rendered,
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn show_at(&self, subject: &str, absolute: &Path) -> Result<SubvolumeInfo> {
        let output = self
            .run([OsStr::new("subvolume"), OsStr::new("show"), absolute.as_os_str()])
            .map_err(|e| StrataError::StoreQuery {
                path: subject.to_owned(),
                message: e.to_string(),
            })?;
        parse::subvolume_show(subject, &output)
    }

    fn show(&self, path: &VolumePath) -> Result<SubvolumeInfo> {
        self.show_at(&path.to_string(), &self.absolute(path))
    }

    /// Sub-volumes nested directly below `absolute`, relative to it.
    fn children(&self, absolute: &Path) -> Result<Vec<PathBuf>> {
        let subject = absolute.display().to_string();
        let own = self.show_at(&subject, absolute)?.path;
        let output = self
            .run([
                OsStr::new("subvolume"),
                OsStr::new("list"),
                OsStr::new("-o"),
                absolute.as_os_str(),
            ])
            .map_err(|e| StrataError::StoreQuery {
                path: subject.clone(),
                message: e.to_string(),
            })?;

        let mut nested: Vec<PathBuf> = parse::subvolume_list(&subject, &output)?
            .into_iter()
            .filter_map(|row| {
                Path::new(&row.path)
                    .strip_prefix(&own)
                    .ok()
                    .filter(|rel| !rel.as_os_str().is_empty())
                    .map(Path::to_path_buf)
            })
            .collect();
        nested.sort_by_key(|p| p.components().count());
        Ok(nested)
    }

    /// `absolute` and every sub-volume below it, ancestors before
    /// descendants.
    fn tree(&self, absolute: &Path) -> Result<Vec<PathBuf>> {
        let mut order = vec![absolute.to_path_buf()];
        let mut seen = BTreeSet::new();
        let mut next = 0;
        while let Some(current) = order.get(next).cloned() {
            for child in self.children(&current)? {
                let nested = current.join(child);
                if seen.insert(nested.clone()) {
                    order.push(nested);
                }
            }
            next += 1;
        }
        Ok(order)
    }

    fn is_readonly(&self, absolute: &Path) -> Result<bool> {
        let subject = absolute.display().to_string();
        let output = self
            .run([
                OsStr::new("property"),
                OsStr::new("get"),
                OsStr::new("-ts"),
                absolute.as_os_str(),
                OsStr::new("ro"),
            ])
            .map_err(|e| StrataError::StoreQuery {
                path: subject.clone(),
                message: e.to_string(),
            })?;
        parse::readonly_property(&subject, &output)
    }

    fn set_readonly(&self, absolute: &Path, readonly: bool) -> Result<()> {
        let _ = self.run([
            OsStr::new("property"),
            OsStr::new("set"),
            OsStr::new("-ts"),
            absolute.as_os_str(),
            OsStr::new("ro"),
            OsStr::new(if readonly { "true" } else { "false" }),
        ])?;
        Ok(())
    }

    fn delete_tree(&self, absolute: &Path) -> Result<()> {
        let order = self.tree(absolute)?;
        if self.is_readonly(absolute)? {
            for path in &order {
                self.set_readonly(path, false)?;
            }
        }
        for path in order.iter().rev() {
            let _ = self.run([OsStr::new("subvolume"), OsStr::new("delete"), path.as_os_str()])?;
        }
        Ok(())
    }

    /// Snapshots the top-level volume writable, then each nested sub-volume
    /// into the placeholder directory the outer snapshot left behind.
    fn snapshot_tree(&self, source: &Path, target: &Path, readonly: bool) -> Result<()> {
        let _ = self.run([
            OsStr::new("subvolume"),
            OsStr::new("snapshot"),
            source.as_os_str(),
            target.as_os_str(),
        ])?;

        let mut created = vec![target.to_path_buf()];
        let mut done = BTreeSet::new();
        let mut worklist = vec![PathBuf::new()];
        while let Some(relative) = worklist.pop() {
            for child in self.children(&source.join(&relative))? {
                let nested = relative.join(child);
                if !done.insert(nested.clone()) {
                    continue;
                }
                let nested_target = target.join(&nested);
                if nested_target.is_dir() {
                    std::fs::remove_dir(&nested_target)
                        .map_err(|e| StrataError::io(&nested_target, e))?;
                }
                let _ = self.run([
                    OsStr::new("subvolume"),
                    OsStr::new("snapshot"),
                    source.join(&nested).as_os_str(),
                    nested_target.as_os_str(),
                ])?;
                created.push(nested_target);
                worklist.push(nested);
            }
        }

        if readonly {
            for path in created.iter().rev() {
                self.set_readonly(path, true)?;
            }
        }
        Ok(())
    }
}

impl VolumeStore for BtrfsStore {
    fn exists(&self, path: &VolumePath) -> bool {
        self.absolute(path).exists()
    }

    fn create_empty(&self, path: &VolumePath) -> Result<()> {
        let absolute = self.absolute(path);
        if absolute.exists() {
            return Err(StrataError::Conflict {
                kind: "volume",
                id: path.to_string(),
            });
        }
        let _ = self.run([
            OsStr::new("subvolume"),
            OsStr::new("create"),
            absolute.as_os_str(),
        ])?;
        tracing::info!(path = %path, "created empty volume");
        Ok(())
    }

    fn snapshot(&self, from: &VolumePath, to: &VolumePath, readonly: bool) -> Result<()> {
        let source = self.absolute(from);
        let target = self.absolute(to);
        if !source.exists() {
            return Err(StrataError::NotFound {
                kind: "volume",
                id: from.to_string(),
            });
        }
        if target.exists() {
            return Err(StrataError::Conflict {
                kind: "volume",
                id: to.to_string(),
            });
        }

        if let Err(err) = self.snapshot_tree(&source, &target, readonly) {
            if target.exists() {
                if let Err(cleanup) = self.delete_tree(&target) {
                    tracing::warn!(path = %to, error = %cleanup, "cannot remove partial snapshot");
                }
            }
            return Err(err);
        }
        tracing::info!(from = %from, to = %to, readonly, "snapshotted volume");
        Ok(())
    }

    fn remove(&self, path: &VolumePath) -> Result<()> {
        let absolute = self.absolute(path);
        if !absolute.exists() {
            return Err(StrataError::NotFound {
                kind: "volume",
                id: path.to_string(),
            });
        }
        self.delete_tree(&absolute)?;

        let marker = self.marker_path(path);
        if marker.exists() {
            std::fs::remove_file(&marker).map_err(|e| StrataError::io(&marker, e))?;
        }
        tracing::info!(path = %path, "removed volume");
        Ok(())
    }

    fn uuid(&self, path: &VolumePath) -> Result<String> {
        Ok(self.show(path)?.uuid)
    }

    fn parent_uuid(&self, path: &VolumePath) -> Result<Option<String>> {
        Ok(self.show(path)?.parent_uuid)
    }

    fn find_path_by_uuid(&self, uuid: &str) -> Result<Option<VolumePath>> {
        let subject = self.root.display().to_string();
        let output = self
            .run([
                OsStr::new("subvolume"),
                OsStr::new("list"),
                OsStr::new("-u"),
                self.root.as_os_str(),
            ])
            .map_err(|e| StrataError::StoreQuery {
                path: subject.clone(),
                message: e.to_string(),
            })?;

        for row in parse::subvolume_list(&subject, &output)? {
            if row.uuid.as_deref() != Some(uuid) {
                continue;
            }
            let mut tail = row.path.rsplitn(3, '/');
            let (Some(name), Some(dir)) = (tail.next(), tail.next()) else {
                continue;
            };
            let Ok(candidate) = VolumePath::parse(&format!("{dir}/{name}")) else {
                continue;
            };
            // The list covers the whole filesystem; confirm the row is ours.
            if self.exists(&candidate) && self.uuid(&candidate)? == uuid {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn list(&self, kind: VolumeKind) -> Result<Vec<VolumePath>> {
        let dir = self.root.join(kind.dir());
        let entries = std::fs::read_dir(&dir).map_err(|e| StrataError::io(&dir, e))?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StrataError::io(&dir, e))?;
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_dir || name.starts_with('.') {
                continue;
            }
            if let Ok(path) = VolumePath::new(kind, name) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn mount_point(&self, path: &VolumePath) -> PathBuf {
        self.absolute(path)
    }

    fn mark_complete(&self, path: &VolumePath) -> Result<()> {
        let marker = CompletionMarker {
            volume: path.to_string(),
            uuid: self.uuid(path)?,
            completed_at: chrono::Utc::now(),
        };
        let target = self.marker_path(path);
        std::fs::write(&target, serde_json::to_vec_pretty(&marker)?)
            .map_err(|e| StrataError::io(&target, e))?;
        tracing::debug!(path = %path, "marked volume complete");
        Ok(())
    }

    fn is_complete(&self, path: &VolumePath) -> bool {
        let Ok(content) = std::fs::read(self.marker_path(path)) else {
            return false;
        };
        // A marker left behind by an earlier volume at the same path does not count.
        serde_json::from_slice::<CompletionMarker>(&content)
            .ok()
            .zip(self.uuid(path).ok())
            .is_some_and(|(marker, uuid)| marker.uuid == uuid)
    }
}

#[cfg(target_os = "linux")]
fn ensure_btrfs(root: &Path) -> Result<()> {
    use nix::sys::statfs::{BTRFS_SUPER_MAGIC, statfs};

    let stat = statfs(root).map_err(|e| StrataError::io(root, std::io::Error::from(e)))?;
    if stat.filesystem_type() != BTRFS_SUPER_MAGIC {
        return Err(StrataError::Config {
            message: format!("storage root {} is not on a btrfs filesystem", root.display()),
        });
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn ensure_btrfs(_root: &Path) -> Result<()> {
    Err(StrataError::Config {
        message: "the btrfs volume store requires Linux".into(),
    })
}

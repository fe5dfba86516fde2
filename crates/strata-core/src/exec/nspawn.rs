//! `systemd-nspawn` execution environment.
//!
//! Commands run inside the volume through a throwaway `/.stratabuildstep`
//! shell script. The volume gets a fresh machine id for the duration of the
//! step and the placeholder id afterwards, so images never ship a real one.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::process::Command;

use strata_common::config::NspawnConfig;
use strata_common::constants::{BUILDSTEP_FILE, MACHINE_ID_PLACEHOLDER};
use strata_common::error::{Result, StrataError};
use strata_common::types::{Instruction, Verb};

use super::ExecutionEnvironment;

/// Environment every build step runs with.
pub(super) const BUILD_ENV: [(&str, &str); 7] = [
    ("TERM", "vt102"),
    ("SHELL", "/bin/bash"),
    ("USER", "root"),
    ("LANG", "C"),
    ("HOME", "/root"),
    ("PWD", "/root"),
    (
        "PATH",
        "/usr/local/sbin:/usr/local/bin:/usr/bin:/usr/bin/core_perl",
    ),
];

/// Symlinks followed while resolving one path inside a volume.
const MAX_SYMLINK_HOPS: usize = 40;

/// Runs build steps in a `systemd-nspawn` container rooted at the volume.
#[derive(Debug, Clone)]
pub struct NspawnExecutor {
    program: PathBuf,
    binds: Vec<String>,
}

impl NspawnExecutor {
    /// Creates an executor from its configuration.
    #[must_use]
    pub fn new(config: &NspawnConfig) -> Self {
        Self {
            program: config.program.clone(),
            binds: config.binds.clone(),
        }
    }

    /// Runs `script` as a shell script inside the container.
    fn run_script(&self, root: &Path, instruction: &Instruction, script: &str) -> Result<()> {
        tracing::info!(root = %root.display(), script, "running build step");
        prepare(root, script)
            .map_err(|e| failure(instruction, format!("cannot prepare build step: {e}")))?;

        let status = Command::new(&self.program)
            .arg("--quiet")
            .arg(format!("--directory={}", root.display()))
            .args(self.binds.iter().map(|b| format!("--bind={b}")))
            .arg(format!("/{BUILDSTEP_FILE}"))
            .env_clear()
            .envs(BUILD_ENV)
            .status();
        let cleaned = cleanup(root);

        let status = status.map_err(|e| {
            failure(
                instruction,
                format!("cannot start {}: {e}", self.program.display()),
            )
        })?;
        if !status.success() {
            return Err(failure(instruction, format!("container {status}")));
        }
        cleaned.map_err(|e| failure(instruction, format!("cannot clean up build step: {e}")))
    }

    /// Copies the host source of an `ADD` into the volume.
    fn add(root: &Path, instruction: &Instruction) -> Result<()> {
        let Some((source, Some(destination))) = instruction.add_paths() else {
            return Err(failure(
                instruction,
                "ADD needs a source and a destination".into(),
            ));
        };

        let destination_path = Path::new(destination);
        if destination_path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(failure(
                instruction,
                format!("ADD destination must not contain '..': {destination}"),
            ));
        }

        let resolve = |path: &Path| {
            resolve_in_root(root, path).map_err(|e| {
                failure(instruction, format!("cannot resolve {}: {e}", path.display()))
            })
        };
        let mut target = resolve(destination_path)?;
        if destination.ends_with('/') || target.is_dir() {
            let file_name = Path::new(source).file_name().ok_or_else(|| {
                failure(instruction, format!("ADD source has no file name: {source}"))
            })?;
            target = resolve(&destination_path.join(file_name))?;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                failure(instruction, format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let copied = std::fs::copy(source, &target).map_err(|e| {
            failure(
                instruction,
                format!("cannot copy {source} to {}: {e}", target.display()),
            )
        })?;
        tracing::info!(source, target = %target.display(), bytes = copied, "added file");
        Ok(())
    }
}

impl ExecutionEnvironment for NspawnExecutor {
    fn execute(&self, root: &Path, instruction: &Instruction) -> Result<()> {
        match instruction.verb {
            Verb::From => {
                tracing::debug!("FROM selects the base image; nothing to execute");
                Ok(())
            }
            Verb::Run | Verb::RunNoCache => {
                self.run_script(root, instruction, &instruction.payload)
            }
            Verb::Pkg => {
                self.run_script(root, instruction, "pacman -Sy --noconfirm")?;
                self.run_script(
                    root,
                    instruction,
                    &format!("pacman -S --noconfirm {}", instruction.payload),
                )
            }
            Verb::Enable => self.run_script(
                root,
                instruction,
                &format!("systemctl enable {}", instruction.payload),
            ),
            Verb::Add => Self::add(root, instruction),
        }
    }
}

fn failure(instruction: &Instruction, message: String) -> StrataError {
    StrataError::Execution {
        step: instruction.to_string(),
        message,
    }
}

/// Resolves `path` inside `root` the way a process chrooted at `root`
/// would: absolute symlink targets restart at `root` and `..` never climbs
/// above it.
fn resolve_in_root(root: &Path, path: &Path) -> std::io::Result<PathBuf> {
    let mut pending = Vec::new();
    push_components(&mut pending, path);
    let mut resolved = PathBuf::new();
    let mut hops = 0;

    while let Some(part) = pending.pop() {
        if part == ".." {
            resolved.pop();
            continue;
        }
        let candidate = resolved.join(&part);
        let on_host = root.join(&candidate);
        match std::fs::symlink_metadata(&on_host) {
            Ok(meta) if meta.file_type().is_symlink() => {
                hops += 1;
                if hops > MAX_SYMLINK_HOPS {
                    return Err(std::io::Error::other(format!(
                        "too many levels of symbolic links at {}",
                        on_host.display()
                    )));
                }
                let link = std::fs::read_link(&on_host)?;
                if link.is_absolute() {
                    resolved = PathBuf::new();
                }
                push_components(&mut pending, &link);
            }
            _ => resolved = candidate,
        }
    }
    Ok(root.join(resolved))
}

/// Pushes the walkable components of `path` so that `pop` yields them in
/// order.
fn push_components(pending: &mut Vec<OsString>, path: &Path) {
    let parts: Vec<OsString> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_owned()),
            Component::ParentDir => Some(OsString::from("..")),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
        })
        .collect();
    pending.extend(parts.into_iter().rev());
}

pub(super) fn write_machine_id(root: &Path, machine_id: &str) -> std::io::Result<()> {
    let etc = root.join("etc");
    std::fs::create_dir_all(&etc)?;
    std::fs::write(etc.join("machine-id"), format!("{machine_id}\n"))
}

fn prepare(root: &Path, script: &str) -> std::io::Result<()> {
    write_machine_id(root, &uuid::Uuid::new_v4().simple().to_string())?;

    let path = root.join(BUILDSTEP_FILE);
    std::fs::write(&path, format!("#!/bin/sh\n\n{script}\n\nrc=$?\n\nexit $rc\n"))?;
    make_executable(&path)
}

fn cleanup(root: &Path) -> std::io::Result<()> {
    write_machine_id(root, MACHINE_ID_PLACEHOLDER)?;
    match std::fs::remove_file(root.join(BUILDSTEP_FILE)) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

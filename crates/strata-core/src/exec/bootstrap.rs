//! Base image installation with `pacstrap`.

use std::path::{Path, PathBuf};
use std::process::Command;

use strata_common::config::BootstrapConfig;
use strata_common::constants::MACHINE_ID_PLACEHOLDER;
use strata_common::error::{Result, StrataError};

use super::nspawn::{BUILD_ENV, write_machine_id};

/// Installs an Arch Linux root filesystem into an empty volume.
#[derive(Debug, Clone)]
pub struct Pacstrap {
    program: PathBuf,
    packages: Vec<String>,
}

impl Pacstrap {
    /// Creates an installer from its configuration.
    #[must_use]
    pub fn new(config: &BootstrapConfig) -> Self {
        Self {
            program: config.program.clone(),
            packages: config.packages.clone(),
        }
    }

    /// Installs the configured packages below `root`.
    ///
    /// Runs `pacstrap -c -d`: packages come from the host's cache and
    /// `root` does not have to be a mount point.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::Execution` if `pacstrap` cannot be started or
    /// exits non-zero, and `StrataError::Io` if the machine id cannot be
    /// reset afterwards.
    pub fn install(&self, root: &Path) -> Result<()> {
        tracing::info!(
            root = %root.display(),
            packages = self.packages.len(),
            "installing base system"
        );
        let status = Command::new(&self.program)
            .arg("-c")
            .arg("-d")
            .arg(root)
            .args(&self.packages)
            .env_clear()
            .envs(BUILD_ENV)
            .status()
            .map_err(|e| failure(format!("cannot start {}: {e}", self.program.display())))?;
        if !status.success() {
            return Err(failure(format!("{} {status}", self.program.display())));
        }

        write_machine_id(root, MACHINE_ID_PLACEHOLDER)
            .map_err(|e| StrataError::io(root.join("etc/machine-id"), e))?;
        tracing::info!(root = %root.display(), "base system installed");
        Ok(())
    }
}

fn failure(message: String) -> StrataError {
    StrataError::Execution {
        step: "bootstrap".into(),
        message,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    /// Stand-in for `pacstrap` that records its arguments and `PATH` in the
    /// target root, then exits with `code`.
    fn fake_pacstrap(dir: &Path, code: i32) -> PathBuf {
        let path = dir.join("fake-pacstrap");
        std::fs::write(
            &path,
            format!(
                "#!/bin/sh\nroot=\"$3\"\necho \"$@\" > \"$root/args\"\necho \"$PATH\" > \"$root/path\"\nexit {code}\n"
            ),
        )
        .expect("write fake");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        path
    }

    fn installer(program: PathBuf, packages: &[&str]) -> Pacstrap {
        Pacstrap::new(&BootstrapConfig {
            program,
            packages: packages.iter().map(|p| (*p).to_owned()).collect(),
        })
    }

    #[test]
    fn install_passes_packages_and_build_env() {
        let tools = tempfile::tempdir().expect("tempdir");
        let root = tempfile::tempdir().expect("tempdir");
        let pacstrap = installer(fake_pacstrap(tools.path(), 0), &["bash", "pacman"]);

        pacstrap.install(root.path()).expect("install");

        let args = std::fs::read_to_string(root.path().join("args")).expect("read");
        assert_eq!(
            args.trim(),
            format!("-c -d {} bash pacman", root.path().display())
        );
        let path = std::fs::read_to_string(root.path().join("path")).expect("read");
        assert_eq!(
            path.trim(),
            "/usr/local/sbin:/usr/local/bin:/usr/bin:/usr/bin/core_perl"
        );
        let machine_id =
            std::fs::read_to_string(root.path().join("etc/machine-id")).expect("read");
        assert_eq!(machine_id, "REPLACE_ME\n");
    }

    #[test]
    fn failing_pacstrap_is_execution_error() {
        let tools = tempfile::tempdir().expect("tempdir");
        let root = tempfile::tempdir().expect("tempdir");
        let pacstrap = installer(fake_pacstrap(tools.path(), 1), &["bash"]);

        let err = pacstrap.install(root.path()).expect_err("install fails");
        match err {
            StrataError::Execution { step, .. } => assert_eq!(step, "bootstrap"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!root.path().join("etc/machine-id").exists());
    }

    #[test]
    fn missing_pacstrap_is_execution_error() {
        let root = tempfile::tempdir().expect("tempdir");
        let pacstrap = installer(PathBuf::from("/nonexistent/pacstrap"), &["bash"]);
        let err = pacstrap.install(root.path()).expect_err("cannot start");
        assert!(err.to_string().contains("cannot start"), "{err}");
    }
}

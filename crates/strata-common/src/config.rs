//! Configuration model for the Strata builder.
//!
//! A single [`StrataConfig`] value is built by the CLI and handed to the
//! volume store and execution environment constructors. Nothing is read from
//! process-wide state after that point.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

/// Root configuration for the Strata builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Directory holding the `images/` and `layers/` namespaces.
    pub storage_root: PathBuf,
    /// Only reuse layers that were marked complete after their build step.
    pub verify_layers: bool,
    /// `btrfs` executable; looked up on `PATH` when unset.
    pub btrfs_program: Option<PathBuf>,
    /// Settings of the `systemd-nspawn` execution environment.
    pub nspawn: NspawnConfig,
    /// Settings used when bootstrapping a base image.
    pub bootstrap: BootstrapConfig,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(crate::constants::DEFAULT_STORAGE_ROOT),
            verify_layers: true,
            btrfs_program: None,
            nspawn: NspawnConfig::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl StrataConfig {
    /// Loads a configuration from a JSON file. Missing fields take their
    /// default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| StrataError::io(path, e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns a copy using `root` as storage root.
    #[must_use]
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    /// Checks invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::Config` if the storage root is relative.
    pub fn validate(&self) -> Result<()> {
        if !self.storage_root.is_absolute() {
            return Err(StrataError::Config {
                message: format!(
                    "storage root must be absolute: {}",
                    self.storage_root.display()
                ),
            });
        }
        Ok(())
    }
}

/// Settings of the `systemd-nspawn` execution environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NspawnConfig {
    /// `systemd-nspawn` executable.
    pub program: PathBuf,
    /// Extra `--bind=` arguments passed to every build step.
    pub binds: Vec<String>,
}

impl Default for NspawnConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("/usr/bin/systemd-nspawn"),
            binds: Vec::new(),
        }
    }
}

/// Packages installed into a freshly bootstrapped base image.
const BASE_PACKAGES: [&str; 31] = [
    "bash",
    "bzip2",
    "coreutils",
    "diffutils",
    "file",
    "filesystem",
    "findutils",
    "gawk",
    "gcc-libs",
    "gettext",
    "glibc",
    "grep",
    "gzip",
    "iproute2",
    "iputils",
    "less",
    "libutil-linux",
    "licenses",
    "logrotate",
    "nano",
    "pacman",
    "procps-ng",
    "psmisc",
    "sed",
    "shadow",
    "sysfsutils",
    "tar",
    "texinfo",
    "util-linux",
    "vi",
    "which",
];

/// Settings used by `strata bootstrap` to install a base image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// `pacstrap` executable.
    pub program: PathBuf,
    /// Packages installed into the new image.
    pub packages: Vec<String>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("/usr/bin/pacstrap"),
            packages: BASE_PACKAGES.iter().map(|p| (*p).to_owned()).collect(),
        }
    }
}

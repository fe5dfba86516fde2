//! System-wide constants and default paths.

/// Default storage root for volumes. Must live on a btrfs filesystem.
pub const DEFAULT_STORAGE_ROOT: &str = "/var/lib/strata";

/// Environment variable overriding the storage root.
pub const STORAGE_ROOT_ENV: &str = "STRATA_ROOT";

/// Namespace directory holding named, readonly images.
pub const IMAGES_DIR: &str = "images";

/// Namespace directory holding anonymous, content-addressed layers.
pub const LAYERS_DIR: &str = "layers";

/// Manifest file names tried in order when none is given explicitly.
pub const MANIFEST_FILES: [&str; 2] = ["Stratafile", "Dockerfile"];

/// Suffix of the completion marker written next to a finished layer.
pub const COMPLETE_MARKER_SUFFIX: &str = ".complete";

/// Script name (relative to the volume root) holding a build step payload.
pub const BUILDSTEP_FILE: &str = ".stratabuildstep";

/// Machine id written into an image once a build step finished.
pub const MACHINE_ID_PLACEHOLDER: &str = "REPLACE_ME";

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;


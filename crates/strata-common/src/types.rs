//! Domain primitive types used across the Strata workspace.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{IMAGES_DIR, LAYERS_DIR, SHA256_HEX_LENGTH};
use crate::error::{Result, StrataError};

/// Namespace a volume lives in.
///
/// The namespace decides how a volume takes part in the layer cache: images
/// are named and readonly, layers are anonymous and keyed by their hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VolumeKind {
    /// Named, readonly build output.
    Image,
    /// Anonymous, content-addressed build layer.
    Layer,
}

impl VolumeKind {
    /// Directory of this namespace relative to the storage root.
    #[must_use]
    pub const fn dir(self) -> &'static str {
        match self {
            Self::Image => IMAGES_DIR,
            Self::Layer => LAYERS_DIR,
        }
    }
}

impl fmt::Display for VolumeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Layer => write!(f, "layer"),
        }
    }
}

/// Store-relative address of a top-level volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VolumePath {
    kind: VolumeKind,
    name: String,
}

impl VolumePath {
    /// Creates a path in the given namespace.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::Config` if the name is empty, contains a path
    /// separator or starts with `.`. Dot names are reserved for completion
    /// markers and would also admit `.` and `..`.
    pub fn new(kind: VolumeKind, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.starts_with('.') || name.contains('/') {
            return Err(StrataError::Config {
                message: format!("invalid {kind} name: {name:?}"),
            });
        }
        Ok(Self { kind, name })
    }

    /// Path of the named image `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a valid volume name.
    pub fn image(name: impl Into<String>) -> Result<Self> {
        Self::new(VolumeKind::Image, name)
    }

    /// Path of the layer keyed by `hash`.
    #[must_use]
    pub fn layer(hash: &LayerHash) -> Self {
        Self {
            kind: VolumeKind::Layer,
            name: hash.as_hex().to_owned(),
        }
    }

    /// Parses a store-relative path such as `images/base` or `layers/<hash>`.
    ///
    /// This is the only place where namespace prefixes are interpreted.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::Config` if the prefix is not a known namespace.
    pub fn parse(relative: &str) -> Result<Self> {
        let relative = relative.trim_matches('/');
        let (dir, name) = relative.split_once('/').ok_or_else(|| StrataError::Config {
            message: format!("volume path without namespace: {relative}"),
        })?;
        let kind = match dir {
            IMAGES_DIR => VolumeKind::Image,
            LAYERS_DIR => VolumeKind::Layer,
            other => {
                return Err(StrataError::Config {
                    message: format!("unknown volume namespace: {other}"),
                });
            }
        };
        Self::new(kind, name)
    }

    /// Namespace of this volume.
    #[must_use]
    pub const fn kind(&self) -> VolumeKind {
        self.kind
    }

    /// Name of this volume within its namespace.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is a named image.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.kind == VolumeKind::Image
    }

    /// Path relative to the storage root.
    #[must_use]
    pub fn relative(&self) -> PathBuf {
        PathBuf::from(self.kind.dir()).join(&self.name)
    }
}

impl fmt::Display for VolumePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.dir(), self.name)
    }
}

/// SHA-256 digest keying a layer in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerHash(String);

impl LayerHash {
    /// Creates a hash from a hex-encoded string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid 64-character lowercase
    /// hex string.
    pub fn from_hex(hex: impl Into<String>) -> Result<Self> {
        let hex = hex.into();
        if hex.len() != SHA256_HEX_LENGTH
            || !hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(StrataError::Config {
                message: format!("invalid SHA-256 hex string: {hex}"),
            });
        }
        Ok(Self(hex))
    }

    /// Returns the hex-encoded hash string.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for human-readable output.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for LayerHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

/// Instruction verb of a build manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    /// Selects the base image; never produces a layer.
    From,
    /// Runs a shell command inside the volume.
    Run,
    /// Like `Run`, but always invalidates a cached layer with the same hash.
    RunNoCache,
    /// Copies a host file into the volume.
    Add,
    /// Installs a package.
    Pkg,
    /// Enables a service unit.
    Enable,
}

impl Verb {
    /// Keyword as written in a manifest.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::From => "FROM",
            Self::Run => "RUN",
            Self::RunNoCache => "RUN_NOCACHE",
            Self::Add => "ADD",
            Self::Pkg => "PKG",
            Self::Enable => "ENABLE",
        }
    }
}

impl FromStr for Verb {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "FROM" => Ok(Self::From),
            "RUN" => Ok(Self::Run),
            "RUN_NOCACHE" => Ok(Self::RunNoCache),
            "ADD" => Ok(Self::Add),
            "PKG" => Ok(Self::Pkg),
            "ENABLE" => Ok(Self::Enable),
            other => Err(StrataError::Config {
                message: format!("unknown instruction verb: {other}"),
            }),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One manifest line: a verb and its opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    /// Instruction verb.
    pub verb: Verb,
    /// Everything after the verb.
    pub payload: String,
}

impl Instruction {
    /// Creates an instruction.
    pub fn new(verb: Verb, payload: impl Into<String>) -> Self {
        Self {
            verb,
            payload: payload.into(),
        }
    }

    /// Host source and in-volume destination of an `ADD` payload.
    ///
    /// Returns `None` for other verbs. The destination is `None` when the
    /// payload only names a source.
    #[must_use]
    pub fn add_paths(&self) -> Option<(&str, Option<&str>)> {
        if self.verb != Verb::Add {
            return None;
        }
        let mut parts = self.payload.split_whitespace();
        let source = parts.next()?;
        Some((source, parts.next()))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_path_renders_namespace() {
        let image = VolumePath::image("base").unwrap();
        assert_eq!(image.to_string(), "images/base");
        assert_eq!(image.relative(), PathBuf::from("images/base"));
        assert!(image.is_image());
    }

    #[test]
    fn volume_path_parse_recognizes_namespaces() {
        let layer = VolumePath::parse("layers/abc").unwrap();
        assert_eq!(layer.kind(), VolumeKind::Layer);
        assert_eq!(layer.name(), "abc");

        let image = VolumePath::parse("/images/myapp/").unwrap();
        assert_eq!(image.kind(), VolumeKind::Image);
        assert_eq!(image.name(), "myapp");
    }

    #[test]
    fn volume_path_parse_rejects_unknown_namespace() {
        assert!(VolumePath::parse("machines/web").is_err());
        assert!(VolumePath::parse("images").is_err());
        assert!(VolumePath::parse("images/a/b").is_err());
    }

    #[test]
    fn volume_path_rejects_traversal_names() {
        assert!(VolumePath::image("..").is_err());
        assert!(VolumePath::image("").is_err());
        assert!(VolumePath::image("a/b").is_err());
    }

    #[test]
    fn volume_path_rejects_dot_names() {
        assert!(VolumePath::image(".").is_err());
        assert!(VolumePath::image(".app.complete").is_err());
        assert!(VolumePath::parse("layers/.hidden").is_err());
        assert!(VolumePath::image("app.v2").is_ok());
    }

    #[test]
    fn layer_hash_validates_hex() {
        let hex = "a".repeat(64);
        let hash = LayerHash::from_hex(hex.clone()).unwrap();
        assert_eq!(hash.as_hex(), hex);
        assert_eq!(hash.short().len(), 12);
        assert!(LayerHash::from_hex("abc").is_err());
        assert!(LayerHash::from_hex("G".repeat(64)).is_err());
        assert!(LayerHash::from_hex("A".repeat(64)).is_err());
    }

    #[test]
    fn verb_round_trips_through_keyword() {
        for verb in [
            Verb::From,
            Verb::Run,
            Verb::RunNoCache,
            Verb::Add,
            Verb::Pkg,
            Verb::Enable,
        ] {
            assert_eq!(verb.as_str().parse::<Verb>().unwrap(), verb);
        }
        assert!("COPY".parse::<Verb>().is_err());
    }

    #[test]
    fn add_paths_splits_source_and_destination() {
        let add = Instruction::new(Verb::Add, "app.bin /srv/app");
        assert_eq!(add.add_paths(), Some(("app.bin", Some("/srv/app"))));

        let bare = Instruction::new(Verb::Add, "app.bin");
        assert_eq!(bare.add_paths(), Some(("app.bin", None)));

        let run = Instruction::new(Verb::Run, "true");
        assert_eq!(run.add_paths(), None);
    }
}

//! Build manifest parsing.
//!
//! A manifest is line oriented: `VERB payload`. Lines starting with `#` are
//! comments. `FROM` names the base image (the last one wins); `RUN`,
//! `RUN_NOCACHE`, `ADD`, `PKG` and `ENABLE` become instructions in file
//! order. Anything else is ignored.

use std::path::{Path, PathBuf};

use nom::{
    IResult, Parser,
    bytes::complete::take_till1,
    character::complete::char,
    combinator::rest,
    sequence::separated_pair,
};
use strata_common::constants::MANIFEST_FILES;
use strata_common::error::{Result, StrataError};
use strata_common::types::{Instruction, Verb};

/// A parsed manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Base image named by `FROM`.
    pub from: Option<String>,
    /// Layer-producing instructions in file order.
    pub instructions: Vec<Instruction>,
}

/// Splits a line into its verb token and payload.
fn verb_and_payload(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(take_till1(|c: char| c == ' '), char(' '), rest).parse(input)
}

impl Manifest {
    /// Parses manifest text. Unrecognized lines are dropped.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let mut manifest = Self::default();
        for line in input.lines() {
            let line = line.trim_end_matches('\r');
            if line.starts_with('#') {
                continue;
            }
            let Ok((_, (keyword, payload))) = verb_and_payload(line) else {
                continue;
            };
            if payload.trim().is_empty() {
                continue;
            }
            match keyword.parse::<Verb>() {
                Ok(Verb::From) => manifest.from = Some(payload.trim().to_owned()),
                Ok(verb) => manifest.instructions.push(Instruction::new(verb, payload)),
                Err(_) => tracing::debug!(keyword, "ignoring unknown manifest verb"),
            }
        }
        manifest
    }

    /// Reads and parses a manifest file.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::Io` if the file cannot be read.
    pub fn from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "reading manifest");
        let content = std::fs::read_to_string(path).map_err(|e| StrataError::io(path, e))?;
        Ok(Self::parse(&content))
    }

    /// Finds the manifest in `dir`, preferring `Stratafile` over
    /// `Dockerfile`.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::NotFound` if neither file exists.
    pub fn discover(dir: &Path) -> Result<PathBuf> {
        MANIFEST_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| StrataError::NotFound {
                kind: "manifest",
                id: format!("{} in {}", MANIFEST_FILES.join(" or "), dir.display()),
            })
    }

    /// The base image to build from.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::Config` if the manifest has no `FROM` line.
    pub fn base_image(&self) -> Result<&str> {
        self.from.as_deref().ok_or_else(|| StrataError::Config {
            message: "manifest has no FROM line".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_collects_instructions_in_order() {
        let manifest = Manifest::parse(
            "# sample\nFROM base\nRUN apt-get update\nADD app.bin /srv/app\nPKG vim\nENABLE app.service\nRUN_NOCACHE date > /built\n",
        );
        assert_eq!(manifest.from.as_deref(), Some("base"));
        assert_eq!(
            manifest.instructions,
            vec![
                Instruction::new(Verb::Run, "apt-get update"),
                Instruction::new(Verb::Add, "app.bin /srv/app"),
                Instruction::new(Verb::Pkg, "vim"),
                Instruction::new(Verb::Enable, "app.service"),
                Instruction::new(Verb::RunNoCache, "date > /built"),
            ]
        );
    }

    #[test]
    fn parse_drops_comments_unknown_verbs_and_bare_keywords() {
        let manifest = Manifest::parse("#RUN hidden\nCOPY a b\nRUN\nRUN \nrun lower\n\nENABLE sshd\n");
        assert_eq!(
            manifest.instructions,
            vec![Instruction::new(Verb::Enable, "sshd")]
        );
        assert!(manifest.from.is_none());
    }

    #[test]
    fn parse_keeps_last_from_and_strips_carriage_returns() {
        let manifest = Manifest::parse("FROM first\r\nFROM second\r\nRUN make install\r\n");
        assert_eq!(manifest.from.as_deref(), Some("second"));
        assert_eq!(manifest.instructions[0].payload, "make install");
    }

    #[test]
    fn parse_keeps_payload_spacing() {
        let manifest = Manifest::parse("RUN echo  'a  b'\n");
        assert_eq!(manifest.instructions[0].payload, "echo  'a  b'");
    }

    #[test]
    fn base_image_requires_from() {
        assert!(Manifest::parse("RUN true\n").base_image().is_err());
        assert_eq!(
            Manifest::parse("FROM arch\n").base_image().expect("base"),
            "arch"
        );
    }

    #[test]
    fn discover_prefers_stratafile() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("Dockerfile"), "FROM a\n").expect("write");
        assert_eq!(
            Manifest::discover(dir.path()).expect("discover"),
            dir.path().join("Dockerfile")
        );

        std::fs::write(dir.path().join("Stratafile"), "FROM b\n").expect("write");
        let found = Manifest::discover(dir.path()).expect("discover");
        assert_eq!(found, dir.path().join("Stratafile"));
        assert_eq!(
            Manifest::from_file(&found).expect("read").from.as_deref(),
            Some("b")
        );
    }

    #[test]
    fn discover_without_manifest_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            Manifest::discover(dir.path()),
            Err(StrataError::NotFound { .. })
        ));
    }
}

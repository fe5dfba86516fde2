//! Layer cache keys.
//!
//! A layer key is the SHA-256 over the parent volume identity, the verb
//! keyword and the payload, each NUL-terminated, followed by the bytes of
//! the host source file for `ADD`.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use sha2::{Digest, Sha256};
use strata_common::error::{Result, StrataError};
use strata_common::types::{Instruction, LayerHash, Verb};

/// Computes the cache key of `instruction` applied on top of `parent_id`.
///
/// # Errors
///
/// Returns `StrataError::SourceUnreadable` if the source of an `ADD` cannot
/// be opened or read.
pub fn layer_hash(parent_id: &str, instruction: &Instruction) -> Result<LayerHash> {
    let mut hasher = Sha256::new();
    for field in [parent_id, instruction.verb.as_str(), &instruction.payload] {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }

    if instruction.verb == Verb::Add {
        let (source, _) = instruction
            .add_paths()
            .ok_or_else(|| StrataError::SourceUnreadable {
                path: PathBuf::from(&instruction.payload),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "ADD names no source file",
                ),
            })?;
        let unreadable = |e| StrataError::SourceUnreadable {
            path: PathBuf::from(source),
            source: e,
        };
        let mut reader = BufReader::new(File::open(source).map_err(unreadable)?);
        let bytes = std::io::copy(&mut reader, &mut hasher).map_err(unreadable)?;
        tracing::debug!(source, bytes, "hashed ADD source");
    }

    LayerHash::from_hex(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARENT: &str = "0b8c52d4-77e1-ef4b-8d43-03b0f3f2a9c7";

    #[test]
    fn same_inputs_give_same_hash() {
        let run = Instruction::new(Verb::Run, "apt-get update");
        let first = layer_hash(PARENT, &run).expect("hash");
        let second = layer_hash(PARENT, &run).expect("hash");
        assert_eq!(first, second);
        assert_eq!(first.as_hex().len(), 64);
    }

    #[test]
    fn hash_depends_on_parent_verb_and_payload() {
        let run = Instruction::new(Verb::Run, "make");
        let base = layer_hash(PARENT, &run).expect("hash");
        assert_ne!(base, layer_hash("other-parent", &run).expect("hash"));
        assert_ne!(
            base,
            layer_hash(PARENT, &Instruction::new(Verb::RunNoCache, "make")).expect("hash")
        );
        assert_ne!(
            base,
            layer_hash(PARENT, &Instruction::new(Verb::Run, "make install")).expect("hash")
        );
    }

    #[test]
    fn field_boundaries_do_not_alias() {
        let a = layer_hash("abc", &Instruction::new(Verb::Run, "x")).expect("hash");
        let b = layer_hash("ab", &Instruction::new(Verb::Run, "cx")).expect("hash");
        assert_ne!(a, b);
    }

    #[test]
    fn add_hash_follows_file_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("app.bin");
        let add = Instruction::new(Verb::Add, format!("{} /srv/app", source.display()));

        std::fs::write(&source, b"v1").expect("write");
        let first = layer_hash(PARENT, &add).expect("hash");
        assert_eq!(first, layer_hash(PARENT, &add).expect("hash"));

        std::fs::write(&source, b"v2").expect("write");
        assert_ne!(first, layer_hash(PARENT, &add).expect("hash"));
    }

    #[test]
    fn add_with_missing_source_is_unreadable() {
        let add = Instruction::new(Verb::Add, "/nonexistent/app.bin /srv/app");
        assert!(matches!(
            layer_hash(PARENT, &add),
            Err(StrataError::SourceUnreadable { .. })
        ));
    }

    #[test]
    fn add_without_source_is_unreadable() {
        let add = Instruction::new(Verb::Add, "   ");
        assert!(matches!(
            layer_hash(PARENT, &add),
            Err(StrataError::SourceUnreadable { .. })
        ));
    }
}

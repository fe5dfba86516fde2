//! Base images.
//!
//! A base image is a named volume that is not built from a manifest. It is
//! created empty and filled by a population step, such as a `pacstrap` run
//! or an unpacked archive. When population fails the half-written volume is
//! removed so the name can be used again.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use strata_common::error::{Result, StrataError};
use strata_common::types::VolumePath;
use strata_core::store::VolumeStore;

/// Creates the image `name` and populates it with `populate`, which
/// receives the volume's mount point.
///
/// # Errors
///
/// Returns `StrataError::Conflict` if the image already exists,
/// `StrataError::Config` for an invalid name, store errors from creating
/// the volume, and whatever `populate` returned if it failed. In the last
/// case the volume has been removed again.
pub fn create_base<S, F>(store: &S, name: &str, populate: F) -> Result<VolumePath>
where
    S: VolumeStore + ?Sized,
    F: FnOnce(&Path) -> Result<()>,
{
    let image = VolumePath::image(name)?;
    if store.exists(&image) {
        return Err(StrataError::Conflict {
            kind: "image",
            id: name.to_owned(),
        });
    }

    store.create_empty(&image)?;
    let root = store.mount_point(&image);
    tracing::info!(image = %image, root = %root.display(), "populating base image");
    if let Err(err) = populate(&root) {
        if let Err(cleanup) = store.remove(&image) {
            tracing::warn!(image = %image, error = %cleanup, "cannot remove unpopulated image");
        }
        return Err(err);
    }
    tracing::info!(image = %image, "base image created");
    Ok(image)
}

/// Compression of an image archive, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Plain `.tar`.
    None,
    /// `.tar.gz` or `.tgz`.
    Gzip,
    /// `.tar.bz2` or `.tbz2`.
    Bzip2,
}

impl Compression {
    /// Picks the decoder for `path`.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension() else {
            return Self::None;
        };
        if ext.eq_ignore_ascii_case("gz") || ext.eq_ignore_ascii_case("tgz") {
            Self::Gzip
        } else if ext.eq_ignore_ascii_case("bz2") || ext.eq_ignore_ascii_case("tbz2") {
            Self::Bzip2
        } else {
            Self::None
        }
    }
}

/// Unpacks the tar archive at `archive` into `root` and returns the
/// archive's size in bytes.
///
/// Ownership is restored from the archive only when `preserve_ownerships`
/// is set, which needs root privileges.
///
/// # Errors
///
/// Returns `StrataError::Io` if the archive cannot be read or an entry
/// cannot be written.
pub fn unpack_archive(archive: &Path, root: &Path, preserve_ownerships: bool) -> Result<u64> {
    let compression = Compression::from_path(archive);
    tracing::info!(
        archive = %archive.display(),
        root = %root.display(),
        ?compression,
        "unpacking archive"
    );

    let file = File::open(archive).map_err(|e| StrataError::io(archive, e))?;
    let size = file
        .metadata()
        .map_err(|e| StrataError::io(archive, e))?
        .len();
    let reader: Box<dyn Read> = match compression {
        Compression::None => Box::new(file),
        Compression::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
        Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(file)),
    };

    let mut entries = tar::Archive::new(reader);
    entries.set_preserve_permissions(true);
    entries.set_preserve_ownerships(preserve_ownerships);
    entries.set_unpack_xattrs(true);
    entries
        .unpack(root)
        .map_err(|e| StrataError::io(root, e))?;
    tracing::info!(archive = %archive.display(), bytes = size, "archive unpacked");
    Ok(size)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use strata_core::store::MemoryStore;

    use super::*;

    fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, *contents)
                .expect("append");
        }
        builder.into_inner().expect("finish tar")
    }

    fn write_archive(dir: &Path, name: &str, files: &[(&str, &[u8])]) -> std::path::PathBuf {
        let tar = tar_bytes(files);
        let path = dir.join(name);
        let bytes = match Compression::from_path(&path) {
            Compression::None => tar,
            Compression::Gzip => {
                let mut encoder =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(&tar).expect("gzip");
                encoder.finish().expect("finish gzip")
            }
            Compression::Bzip2 => {
                let mut encoder =
                    bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
                encoder.write_all(&tar).expect("bzip2");
                encoder.finish().expect("finish bzip2")
            }
        };
        std::fs::write(&path, bytes).expect("write archive");
        path
    }

    // ── create_base ─────────────────────────────────────────────────

    #[test]
    fn create_base_populates_a_new_image() {
        let store = MemoryStore::new();
        let image = create_base(&store, "base", |root| {
            let volume = store.volume_at(root).expect("mount point maps back");
            store.write_file(&volume, "etc/os-release", "ID=arch\n")
        })
        .expect("create");

        assert_eq!(image, VolumePath::image("base").expect("path"));
        let files = store.files(&image).expect("files");
        assert_eq!(
            files.get(Path::new("etc/os-release")).map(Vec::as_slice),
            Some(&b"ID=arch\n"[..])
        );
        assert_eq!(store.parent_uuid(&image).expect("parent"), None);
    }

    #[test]
    fn failed_population_removes_the_volume() {
        let store = MemoryStore::new();
        let err = create_base(&store, "base", |_| {
            Err(StrataError::Execution {
                step: "bootstrap".into(),
                message: "exit status: 1".into(),
            })
        })
        .expect_err("population fails");

        assert!(matches!(err, StrataError::Execution { .. }));
        assert!(!store.exists(&VolumePath::image("base").expect("path")));
        assert!(store.is_empty());
    }

    #[test]
    fn existing_image_conflicts_without_populating() {
        let store = MemoryStore::new();
        let base = VolumePath::image("base").expect("path");
        store.create_empty(&base).expect("create");
        store.write_file(&base, "keep", "me").expect("write");

        let mut called = false;
        let err = create_base(&store, "base", |_| {
            called = true;
            Ok(())
        })
        .expect_err("conflict");

        assert!(matches!(err, StrataError::Conflict { .. }));
        assert!(!called);
        assert!(store.files(&base).expect("files").contains_key(Path::new("keep")));
    }

    #[test]
    fn invalid_name_is_rejected_before_creating_anything() {
        let store = MemoryStore::new();
        let err = create_base(&store, ".hidden", |_| Ok(())).expect_err("invalid");
        assert!(matches!(err, StrataError::Config { .. }));
        assert!(store.is_empty());
    }

    // ── unpack_archive ──────────────────────────────────────────────

    #[test]
    fn compression_follows_extension() {
        assert_eq!(Compression::from_path(Path::new("base.tar")), Compression::None);
        assert_eq!(Compression::from_path(Path::new("base.tar.gz")), Compression::Gzip);
        assert_eq!(Compression::from_path(Path::new("base.TGZ")), Compression::Gzip);
        assert_eq!(Compression::from_path(Path::new("base.tar.bz2")), Compression::Bzip2);
        assert_eq!(Compression::from_path(Path::new("base")), Compression::None);
    }

    #[test]
    fn unpacks_every_supported_compression() {
        for name in ["base.tar", "base.tar.gz", "base.tar.bz2"] {
            let dir = tempfile::tempdir().expect("tempdir");
            let root = dir.path().join("root");
            std::fs::create_dir(&root).expect("mkdir");
            let archive = write_archive(
                dir.path(),
                name,
                &[("etc/os-release", b"ID=arch\n"), ("usr/bin/true", b"")],
            );

            let size = unpack_archive(&archive, &root, false).expect("unpack");

            assert_eq!(size, std::fs::metadata(&archive).expect("stat").len());
            assert_eq!(
                std::fs::read_to_string(root.join("etc/os-release")).expect("read"),
                "ID=arch\n",
                "{name}"
            );
            assert!(root.join("usr/bin/true").is_file(), "{name}");
        }
    }

    #[test]
    fn missing_archive_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = unpack_archive(&dir.path().join("absent.tar"), dir.path(), false)
            .expect_err("missing");
        assert!(matches!(err, StrataError::Io { .. }));
    }

    #[test]
    fn corrupt_archive_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = dir.path().join("broken.tar.gz");
        std::fs::write(&archive, b"not gzip at all").expect("write");
        let root = dir.path().join("root");
        std::fs::create_dir(&root).expect("mkdir");

        let err = unpack_archive(&archive, &root, false).expect_err("corrupt");
        assert!(matches!(err, StrataError::Io { .. }));
    }
}

//! Typed readers for `btrfs` command output.
//!
//! Everything that depends on the textual layout of `btrfs subvolume show`,
//! `btrfs subvolume list` and `btrfs property get` lives here.

use strata_common::error::{Result, StrataError};

/// Identity of one subvolume as reported by `btrfs subvolume show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubvolumeInfo {
    /// Path relative to the filesystem's top-level subvolume.
    pub path: String,
    /// Subvolume UUID.
    pub uuid: String,
    /// UUID of the snapshot source, if any.
    pub parent_uuid: Option<String>,
}

/// One row of `btrfs subvolume list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubvolumeEntry {
    /// Subvolume id.
    pub id: u64,
    /// Subvolume UUID, present when listed with `-u`.
    pub uuid: Option<String>,
    /// Path relative to the filesystem's top-level subvolume.
    pub path: String,
}

/// `btrfs` prints `-` for absent UUIDs.
fn optional_uuid(value: &str) -> Option<String> {
    match value {
        "" | "-" => None,
        v => Some(v.to_owned()),
    }
}

/// Parses `btrfs subvolume show <path>`.
///
/// # Errors
///
/// Returns `StrataError::StoreQuery` if the output carries no UUID.
pub fn subvolume_show(subject: &str, output: &str) -> Result<SubvolumeInfo> {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty());
    let path = lines
        .next()
        .map(|l| l.trim().trim_start_matches('/').to_owned())
        .ok_or_else(|| StrataError::StoreQuery {
            path: subject.to_owned(),
            message: "empty `subvolume show` output".into(),
        })?;

    let mut uuid = None;
    let mut parent_uuid = None;
    for line in lines {
        let Some((key, value)) = line.trim().split_once(':') else {
            continue;
        };
        match key.trim() {
            "UUID" => uuid = optional_uuid(value.trim()),
            "Parent UUID" => parent_uuid = optional_uuid(value.trim()),
            _ => {}
        }
    }

    let uuid = uuid.ok_or_else(|| StrataError::StoreQuery {
        path: subject.to_owned(),
        message: "`subvolume show` reported no UUID".into(),
    })?;
    Ok(SubvolumeInfo {
        path,
        uuid,
        parent_uuid,
    })
}

/// Parses `btrfs subvolume list [-u] [-o] <path>`.
///
/// # Errors
///
/// Returns `StrataError::StoreQuery` on a row without `ID` or `path`.
pub fn subvolume_list(subject: &str, output: &str) -> Result<Vec<SubvolumeEntry>> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| subvolume_list_row(subject, line))
        .collect()
}

fn subvolume_list_row(subject: &str, line: &str) -> Result<SubvolumeEntry> {
    let malformed = || StrataError::StoreQuery {
        path: subject.to_owned(),
        message: format!("malformed `subvolume list` row: {line}"),
    };

    // The path is the last column and may itself contain spaces.
    let (head, path) = line.split_once(" path ").ok_or_else(malformed)?;
    let tokens: Vec<&str> = head.split_whitespace().collect();
    let value_of = |key: &str| {
        tokens
            .iter()
            .position(|t| *t == key)
            .and_then(|i| tokens.get(i + 1))
            .copied()
    };

    let id = value_of("ID")
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(malformed)?;
    Ok(SubvolumeEntry {
        id,
        uuid: value_of("uuid").and_then(optional_uuid),
        path: path.trim().trim_start_matches("<FS_TREE>/").to_owned(),
    })
}

/// Parses `btrfs property get -ts <path> ro`.
///
/// # Errors
///
/// Returns `StrataError::StoreQuery` if no `ro=` line is present.
pub fn readonly_property(subject: &str, output: &str) -> Result<bool> {
    output
        .lines()
        .find_map(|l| l.trim().strip_prefix("ro="))
        .map(|v| v.trim() == "true")
        .ok_or_else(|| StrataError::StoreQuery {
            path: subject.to_owned(),
            message: "`property get` reported no ro flag".into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOW_SNAPSHOT: &str = "\
@/var/lib/strata/layers/4f2a
\tName: \t\t\t4f2a
\tUUID: \t\t\t6c3f1b0e-2d7e-a04a-9b7e-1f1d4d0c2a11
\tParent UUID: \t\t0b8c52d4-77e1-ef4b-8d43-03b0f3f2a9c7
\tReceived UUID: \t\t-
\tCreation time: \t\t2026-10-15 09:12:01 +0000
\tSubvolume ID: \t\t291
\tGeneration: \t\t1204
\tFlags: \t\t\t-
";

    const SHOW_ORIGINAL: &str = "\
var/lib/strata/images/base
\tName: \t\t\tbase
\tUUID: \t\t\t0b8c52d4-77e1-ef4b-8d43-03b0f3f2a9c7
\tParent UUID: \t\t-
";

    #[test]
    fn show_reads_uuid_and_parent() {
        let info = subvolume_show("layers/4f2a", SHOW_SNAPSHOT).expect("parse");
        assert_eq!(info.path, "@/var/lib/strata/layers/4f2a");
        assert_eq!(info.uuid, "6c3f1b0e-2d7e-a04a-9b7e-1f1d4d0c2a11");
        assert_eq!(
            info.parent_uuid.as_deref(),
            Some("0b8c52d4-77e1-ef4b-8d43-03b0f3f2a9c7")
        );
    }

    #[test]
    fn show_maps_dash_to_no_parent() {
        let info = subvolume_show("images/base", SHOW_ORIGINAL).expect("parse");
        assert_eq!(info.path, "var/lib/strata/images/base");
        assert!(info.parent_uuid.is_none());
    }

    #[test]
    fn show_without_uuid_is_query_error() {
        let result = subvolume_show("images/base", "images/base\n\tName: base\n");
        assert!(matches!(result, Err(StrataError::StoreQuery { .. })));
        assert!(subvolume_show("images/base", "").is_err());
    }

    #[test]
    fn list_reads_rows_with_and_without_uuid() {
        let output = "\
ID 291 gen 1204 top level 5 path @/var/lib/strata/layers/4f2a
ID 292 gen 1205 top level 291 uuid 9d0e-11 path @/var/lib/strata/layers/4f2a/var/cache
";
        let rows = subvolume_list("layers", output).expect("parse");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, 291);
        assert_eq!(rows[0].uuid, None);
        assert_eq!(rows[1].uuid.as_deref(), Some("9d0e-11"));
        assert_eq!(rows[1].path, "@/var/lib/strata/layers/4f2a/var/cache");
    }

    #[test]
    fn list_keeps_spaces_in_paths() {
        let output = "ID 300 gen 7 top level 5 path srv/my data\n";
        let rows = subvolume_list("srv", output).expect("parse");
        assert_eq!(rows[0].path, "srv/my data");
    }

    #[test]
    fn list_strips_fs_tree_marker() {
        let output = "ID 300 gen 7 top level 5 path <FS_TREE>/strata/images/base\n";
        let rows = subvolume_list("images", output).expect("parse");
        assert_eq!(rows[0].path, "strata/images/base");
    }

    #[test]
    fn list_rejects_malformed_rows() {
        assert!(subvolume_list("x", "garbage\n").is_err());
        assert!(subvolume_list("x", "ID abc gen 1 path foo\n").is_err());
        assert!(subvolume_list("x", "").expect("empty").is_empty());
    }

    #[test]
    fn readonly_property_reads_flag() {
        assert!(readonly_property("images/a", "ro=true\n").expect("parse"));
        assert!(!readonly_property("images/a", "ro=false\n").expect("parse"));
        assert!(readonly_property("images/a", "").is_err());
    }
}

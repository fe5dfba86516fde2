//! # strata-core
//!
//! The two collaborators the Strata layer cache is built on:
//! - **Volume store**: copy-on-write volumes with nested sub-volumes,
//!   identity queries and UUID lookup. Backed by btrfs subvolumes, with an
//!   in-memory implementation for tests.
//! - **Execution environment**: runs one build instruction against a
//!   materialized volume, backed by `systemd-nspawn`. Base images are
//!   installed with `pacstrap`.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod exec;
pub mod store;

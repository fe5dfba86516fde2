//! # strata-image
//!
//! Incremental image builds on top of a copy-on-write volume store.
//!
//! Handles:
//! - **Base images**: creating named images from scratch or an archive.
//! - **Manifest**: parsing the line-oriented instruction file.
//! - **Hashing**: deterministic SHA-256 layer keys.
//! - **Layers**: cache hit/miss decision and layer materialization.
//! - **Build**: the sequential build pipeline with rollback.
//! - **GC**: image removal walking the ancestor chain.
//! - **Registry**: listing images and cached layers.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod base;
pub mod build;
pub mod gc;
pub mod hash;
pub mod layer;
pub mod manifest;
pub mod registry;

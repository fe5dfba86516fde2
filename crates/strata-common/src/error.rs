//! Unified error types for the Strata workspace.
//!
//! Every fallible operation of the volume store, the layer cache, the build
//! pipeline and image removal reports one of these variants. The CLI wraps
//! them with `anyhow` context before printing.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum StrataError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// The volume store could not answer an identity or lookup query.
    #[error("volume store query failed for {path}: {message}")]
    StoreQuery {
        /// Store-relative path the query was about.
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// A volume store command could not complete.
    #[error("`{command}` failed: {message}")]
    StoreCommand {
        /// Command line that was run.
        command: String,
        /// Exit status and captured stderr.
        message: String,
    },

    /// The source file referenced by an `ADD` instruction could not be read.
    #[error("cannot read ADD source {path}: {source}")]
    SourceUnreadable {
        /// Source file path as written in the instruction.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Creating a volume by snapshot failed.
    #[error("cannot materialize {to} from {from}: {message}")]
    Materialization {
        /// Snapshot source.
        from: String,
        /// Snapshot target.
        to: String,
        /// Description of the failure.
        message: String,
    },

    /// A build step exited non-zero or could not be started.
    #[error("build step {step} failed: {message}")]
    Execution {
        /// Human-readable step description (`#3 RUN make`).
        step: String,
        /// Description of the failure.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// Attempted to create something that already exists.
    #[error("{kind} already exists: {id}")]
    Conflict {
        /// Type of the conflicting resource.
        kind: &'static str,
        /// Identifier of the conflicting resource.
        id: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl StrataError {
    /// Builds a [`StrataError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, StrataError>;

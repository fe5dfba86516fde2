//! Execution environment abstraction.
//!
//! An execution environment applies one build instruction to the
//! filesystem tree of a freshly materialized layer volume. [`Pacstrap`]
//! installs the root filesystem of a base image in the same environment.

pub mod bootstrap;
pub mod nspawn;

use std::path::Path;

use strata_common::error::Result;
use strata_common::types::Instruction;

pub use self::bootstrap::Pacstrap;
pub use self::nspawn::NspawnExecutor;

/// Applies build instructions to a volume's tree.
pub trait ExecutionEnvironment: Send + Sync {
    /// Executes `instruction` with `root` as the filesystem root.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::Execution` if the step exits non-zero or
    /// cannot be started.
    fn execute(&self, root: &Path, instruction: &Instruction) -> Result<()>;
}

//! Sequential image build pipeline.
//!
//! Walks the instructions in order, reusing cached layers and executing
//! the rest, then freezes the last layer into a readonly named image. A
//! failed step removes its own fresh layer; everything built before it
//! stays in the cache so a fixed manifest resumes where it stopped.

use std::fmt;

use serde::Serialize;
use strata_common::config::StrataConfig;
use strata_common::error::{Result, StrataError};
use strata_common::types::{Instruction, LayerHash, Verb, VolumePath};
use strata_core::exec::ExecutionEnvironment;
use strata_core::store::VolumeStore;

use crate::layer::Layer;

/// Options of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildConfig {
    /// Only reuse layers carrying a completion marker.
    pub verify_layers: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            verify_layers: true,
        }
    }
}

impl From<&StrataConfig> for BuildConfig {
    fn from(config: &StrataConfig) -> Self {
        Self {
            verify_layers: config.verify_layers,
        }
    }
}

/// How a step's layer was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    /// Reused from the cache without execution.
    Cached,
    /// Materialized and executed.
    Built,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cached => write!(f, "cached"),
            Self::Built => write!(f, "built"),
        }
    }
}

/// Result of one instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// 1-based position in the instruction list.
    pub index: usize,
    /// The instruction.
    pub instruction: Instruction,
    /// Layer cache key.
    pub hash: LayerHash,
    /// Whether the layer came from the cache.
    pub outcome: StepOutcome,
}

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// The finalized image.
    pub image: VolumePath,
    /// Per-instruction results in order.
    pub steps: Vec<StepReport>,
}

impl BuildReport {
    /// Number of steps served from the cache.
    #[must_use]
    pub fn cache_hits(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome == StepOutcome::Cached)
            .count()
    }

    /// Number of steps that ran in the execution environment.
    #[must_use]
    pub fn executed(&self) -> usize {
        self.steps.len() - self.cache_hits()
    }
}

/// Drives a build against a volume store and an execution environment.
///
/// Builds are not serialized against each other; callers building the
/// same image name concurrently must lock externally.
#[derive(Debug)]
pub struct Pipeline<'a, S: ?Sized, E: ?Sized> {
    store: &'a S,
    exec: &'a E,
    config: BuildConfig,
}

impl<'a, S, E> Pipeline<'a, S, E>
where
    S: VolumeStore + ?Sized,
    E: ExecutionEnvironment + ?Sized,
{
    /// Creates a pipeline.
    pub const fn new(store: &'a S, exec: &'a E, config: BuildConfig) -> Self {
        Self {
            store,
            exec,
            config,
        }
    }

    /// Builds `image` from `base` by applying `instructions` in order.
    ///
    /// An existing image with the same name is removed first; the rebuild
    /// is not atomic.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::NotFound` if the base image is missing,
    /// `StrataError::Execution` naming the failing step, and any error of
    /// [`Layer::create`] or of finalizing the image.
    pub fn build(
        &self,
        instructions: &[Instruction],
        base: &str,
        image: &str,
    ) -> Result<BuildReport> {
        let base = VolumePath::image(base)?;
        let target = VolumePath::image(image)?;
        if base == target {
            return Err(StrataError::Config {
                message: format!("image {image} cannot be built from itself"),
            });
        }
        if !self.store.exists(&base) {
            return Err(StrataError::NotFound {
                kind: "image",
                id: base.name().to_owned(),
            });
        }
        if self.store.exists(&target) {
            tracing::info!(image = %target, "replacing existing image");
            self.store.remove(&target)?;
        }

        tracing::info!(base = %base, image = %target, steps = instructions.len(), "starting build");
        let mut current = base;
        let mut steps = Vec::with_capacity(instructions.len());
        for (position, instruction) in instructions.iter().enumerate() {
            if instruction.verb == Verb::From {
                continue;
            }
            let index = position + 1;
            let layer =
                Layer::create(self.store, instruction, &current, self.config.verify_layers)?;

            let outcome = if layer.exists {
                tracing::info!(step = index, %instruction, layer = layer.hash.short(), "using cache");
                StepOutcome::Cached
            } else {
                tracing::info!(step = index, %instruction, layer = layer.hash.short(), "executing");
                self.execute(index, &layer)?;
                StepOutcome::Built
            };

            steps.push(StepReport {
                index,
                instruction: instruction.clone(),
                hash: layer.hash.clone(),
                outcome,
            });
            current = layer.path;
        }

        self.store
            .snapshot(&current, &target, true)
            .map_err(|e| StrataError::Materialization {
                from: current.to_string(),
                to: target.to_string(),
                message: e.to_string(),
            })?;

        let report = BuildReport {
            image: target,
            steps,
        };
        tracing::info!(
            image = %report.image,
            cached = report.cache_hits(),
            executed = report.executed(),
            "build finished"
        );
        Ok(report)
    }

    /// Runs a freshly materialized layer's instruction, removing the layer
    /// again if it fails.
    fn execute(&self, index: usize, layer: &Layer) -> Result<()> {
        let root = self.store.mount_point(&layer.path);
        if let Err(err) = self.exec.execute(&root, &layer.instruction) {
            if let Err(rollback) = layer.remove(self.store) {
                tracing::warn!(layer = %layer.path, error = %rollback, "cannot remove failed layer");
            }
            return Err(step_failure(index, &layer.instruction, err));
        }
        layer.mark_complete(self.store)
    }
}

/// Rewrites an execution failure so that it names the step's position.
fn step_failure(index: usize, instruction: &Instruction, err: StrataError) -> StrataError {
    let step = format!("#{index} {instruction}");
    match err {
        StrataError::Execution { message, .. } => StrataError::Execution { step, message },
        other => StrataError::Execution {
            step,
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_failure_names_position() {
        let run = Instruction::new(Verb::Run, "make");
        let err = step_failure(
            3,
            &run,
            StrataError::Execution {
                step: "RUN make".into(),
                message: "container exit status: 2".into(),
            },
        );
        assert_eq!(
            err.to_string(),
            "build step #3 RUN make failed: container exit status: 2"
        );
    }

    #[test]
    fn step_failure_wraps_other_errors() {
        let add = Instruction::new(Verb::Add, "a /b");
        let err = step_failure(
            1,
            &add,
            StrataError::Config {
                message: "boom".into(),
            },
        );
        assert!(matches!(err, StrataError::Execution { ref step, .. } if step == "#1 ADD a /b"));
    }

    #[test]
    fn report_counts_outcomes() {
        let hash = LayerHash::from_hex("0".repeat(64)).expect("hash");
        let step = |index, outcome| StepReport {
            index,
            instruction: Instruction::new(Verb::Run, "true"),
            hash: hash.clone(),
            outcome,
        };
        let report = BuildReport {
            image: VolumePath::image("app").expect("path"),
            steps: vec![
                step(1, StepOutcome::Cached),
                step(2, StepOutcome::Built),
                step(3, StepOutcome::Cached),
            ],
        };
        assert_eq!(report.cache_hits(), 2);
        assert_eq!(report.executed(), 1);
    }
}

//! Integration tests for the image build pipeline.
//!
//! These tests are implemented in:
//! `crates/strata-image/tests/pipeline_test.rs`
//!
//! Covered scenarios:
//! - `second_build_is_served_from_cache`: No execution on an unchanged rebuild
//! - `identical_stores_derive_identical_hash_chains`: Layer keys are deterministic
//! - `run_nocache_always_executes_once`: RUN_NOCACHE invalidates its layer
//! - `failed_step_is_rolled_back_and_earlier_layers_are_reused`: Rollback and resume
//! - `remove_image_deletes_layers_down_to_base`: Chain walk removes n+1 volumes
//! - `editing_add_source_only_rebuilds_the_add_layer`: ADD keys follow file content
//! - `orphan_layer_is_rebuilt`: Layers without completion marker are not trusted
//! - `nested_subvolumes_are_carried_into_layers_and_image`: Recursive snapshot/removal
//! - `rollback_remove_failure_still_reports_the_step`: Rollback errors never mask the step error
//! - `failed_final_snapshot_keeps_the_layers_for_a_retry`: Finalization failure keeps the cache

//! Stage trait and name-keyed stage registry.
//!
//! A [`Stage`] is one named, composable processing step with declared
//! input/output [`ValueType`]s and declared resource needs.  The
//! [`StageRegistry`] maps names to stage objects and validates pipeline
//! definitions before any execution begins — unknown names, empty pipelines
//! and adjacent type mismatches are load-time failures, never runtime ones.
//!
//! Because a stage's declared types and its executable body live on the same
//! trait object, the "declaration matches signature" registration check of a
//! dynamically-typed system holds here by construction.  The executor still
//! re-checks each returned variant tag against the declared output type as a
//! runtime backstop.
//!
//! The registry is built once at startup (see `stages::builtin`), then shared
//! immutably behind an `Arc` — write-once, read-only thereafter.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use thiserror::Error;

use crate::audio::CaptureError;
use crate::inject::InjectError;
use crate::stt::SttError;

use super::context::StageContext;
use super::resource::Resource;
use super::value::{Value, ValueType};

// ---------------------------------------------------------------------------
// StageError
// ---------------------------------------------------------------------------

/// A stage could not complete.
///
/// Terminates the run with a `Failed` outcome; never crashes the process or
/// sibling runs.
#[derive(Debug, Error)]
pub enum StageError {
    /// Audio capture failed (device missing, stream error, WAV write).
    #[error("audio capture failed: {0}")]
    Capture(#[from] CaptureError),

    /// Speech-to-text transcription failed.
    #[error("transcription failed: {0}")]
    Stt(#[from] SttError),

    /// Text injection failed.
    #[error("text injection failed: {0}")]
    Inject(#[from] InjectError),

    /// A required collaborator backend is not available.
    #[error("backend unavailable: {0}")]
    Backend(String),

    /// Anything a stage wants to report that has no dedicated variant.
    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Stage trait
// ---------------------------------------------------------------------------

/// One composable pipeline step.
///
/// Implementations must be `Send + Sync`: the same stage object is shared by
/// every run of every pipeline referencing it, and `execute` runs on worker
/// threads.  `execute` is synchronous and may block for seconds to tens of
/// seconds (recording, inference, simulated typing); a stage that can block
/// for long must poll [`StageContext::cancelled`] at short intervals (~100 ms)
/// and return early when set — the executor only checks cancellation between
/// stages.
pub trait Stage: Send + Sync {
    /// Unique stage name used in pipeline configuration.
    fn name(&self) -> &'static str;

    /// One-line human description.
    fn description(&self) -> &'static str;

    /// Declared input type.  Validated against the previous stage's output
    /// at load time.
    fn input_type(&self) -> ValueType;

    /// Declared output type.  Re-checked against the actual returned variant
    /// by the executor.
    fn output_type(&self) -> ValueType;

    /// Exclusive resources this stage needs while running.
    fn required_resources(&self) -> BTreeSet<Resource> {
        BTreeSet::new()
    }

    /// Run the stage with the previous stage's output.
    fn execute(&self, input: Value, ctx: &mut StageContext) -> Result<Value, StageError>;
}

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

/// Configuration errors detected by the registry.
///
/// All of these are startup-fatal: the process refuses to serve triggers
/// until the configuration is corrected.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("stage '{0}' is already registered")]
    DuplicateStage(String),

    #[error("unknown stage: '{name}'. Available stages: {known:?}")]
    UnknownStage { name: String, known: Vec<String> },

    #[error("pipeline must have at least one stage")]
    EmptyPipeline,

    #[error(
        "first stage '{stage}' expects {expects} input but a pipeline starts with no value"
    )]
    FirstStageInput { stage: String, expects: ValueType },

    #[error(
        "type mismatch: stage '{from}' outputs {output} but stage '{to}' expects {input}"
    )]
    TypeMismatch {
        from: String,
        output: ValueType,
        to: String,
        input: ValueType,
    },
}

// ---------------------------------------------------------------------------
// StageRegistry
// ---------------------------------------------------------------------------

/// Name-keyed registry of every known stage.
pub struct StageRegistry {
    stages: HashMap<String, Arc<dyn Stage>>,
}

impl StageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            stages: HashMap::new(),
        }
    }

    /// Register `stage` under its own name.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateStage`] if the name is taken — registering
    /// the same stage twice is a configuration bug, not a runtime condition.
    pub fn register(&mut self, stage: Arc<dyn Stage>) -> Result<(), RegistryError> {
        let name = stage.name();
        if self.stages.contains_key(name) {
            return Err(RegistryError::DuplicateStage(name.to_string()));
        }
        log::debug!(
            "registry: registered stage '{}' ({} -> {}, resources {:?})",
            name,
            stage.input_type(),
            stage.output_type(),
            stage.required_resources()
        );
        self.stages.insert(name.to_string(), stage);
        Ok(())
    }

    /// Look up a stage by name.
    ///
    /// The error enumerates every known stage name so a config typo is easy
    /// to spot.
    pub fn get(&self, name: &str) -> Result<&Arc<dyn Stage>, RegistryError> {
        self.stages
            .get(name)
            .ok_or_else(|| RegistryError::UnknownStage {
                name: name.to_string(),
                known: self.list_stages(),
            })
    }

    /// Every registered stage name, sorted.
    pub fn list_stages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stages.keys().cloned().collect();
        names.sort();
        names
    }

    /// Validate an ordered stage list: non-empty, every name known, first
    /// stage takes no input, every adjacent output/input pair matches.
    ///
    /// Pure validation — no side effects on success.
    pub fn validate_pipeline(&self, stage_names: &[String]) -> Result<(), RegistryError> {
        if stage_names.is_empty() {
            return Err(RegistryError::EmptyPipeline);
        }

        let stages: Vec<&Arc<dyn Stage>> = stage_names
            .iter()
            .map(|n| self.get(n))
            .collect::<Result<_, _>>()?;

        let first = &stages[0];
        if first.input_type() != ValueType::Unit {
            return Err(RegistryError::FirstStageInput {
                stage: first.name().to_string(),
                expects: first.input_type(),
            });
        }

        for pair in stages.windows(2) {
            let (cur, next) = (&pair[0], &pair[1]);
            if cur.output_type() != next.input_type() {
                return Err(RegistryError::TypeMismatch {
                    from: cur.name().to_string(),
                    output: cur.output_type(),
                    to: next.name().to_string(),
                    input: next.input_type(),
                });
            }
        }

        log::debug!("registry: pipeline validated: {}", stage_names.join(" -> "));
        Ok(())
    }

    /// Union of the declared resource sets of `stage_names`.
    pub fn required_resources(
        &self,
        stage_names: &[String],
    ) -> Result<BTreeSet<Resource>, RegistryError> {
        let mut all = BTreeSet::new();
        for name in stage_names {
            all.extend(self.get(name)?.required_resources());
        }
        Ok(all)
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::FnStage;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// A registry with the shape of the built-in dictation pipeline:
    /// record (unit->audio, mic) -> stt (audio->text) -> type (text->unit, kbd).
    fn sample_registry() -> StageRegistry {
        let mut reg = StageRegistry::new();
        reg.register(FnStage::passthrough(
            "record",
            ValueType::Unit,
            ValueType::Audio,
            &[Resource::AudioInput],
        ))
        .unwrap();
        reg.register(FnStage::passthrough(
            "stt",
            ValueType::Audio,
            ValueType::Text,
            &[],
        ))
        .unwrap();
        reg.register(FnStage::passthrough(
            "type",
            ValueType::Text,
            ValueType::Unit,
            &[Resource::Keyboard, Resource::Clipboard],
        ))
        .unwrap();
        reg
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut reg = sample_registry();
        let err = reg
            .register(FnStage::passthrough(
                "record",
                ValueType::Unit,
                ValueType::Audio,
                &[],
            ))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateStage(n) if n == "record"));
    }

    #[test]
    fn unknown_stage_error_lists_known_names() {
        let reg = sample_registry();
        let Err(err) = reg.get("transcrib") else {
            panic!("lookup of an unknown stage must fail");
        };
        match err {
            RegistryError::UnknownStage { name, known } => {
                assert_eq!(name, "transcrib");
                assert_eq!(known, vec!["record", "stt", "type"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn valid_pipeline_passes() {
        let reg = sample_registry();
        reg.validate_pipeline(&names(&["record", "stt", "type"]))
            .unwrap();
    }

    #[test]
    fn empty_pipeline_is_rejected() {
        let reg = sample_registry();
        assert!(matches!(
            reg.validate_pipeline(&[]),
            Err(RegistryError::EmptyPipeline)
        ));
    }

    #[test]
    fn adjacent_type_mismatch_is_rejected() {
        let reg = sample_registry();
        let err = reg
            .validate_pipeline(&names(&["record", "type"]))
            .unwrap_err();
        match err {
            RegistryError::TypeMismatch { from, output, to, input } => {
                assert_eq!(from, "record");
                assert_eq!(output, ValueType::Audio);
                assert_eq!(to, "type");
                assert_eq!(input, ValueType::Text);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn first_stage_must_take_no_input() {
        let reg = sample_registry();
        let err = reg.validate_pipeline(&names(&["stt", "type"])).unwrap_err();
        assert!(matches!(err, RegistryError::FirstStageInput { .. }));
    }

    #[test]
    fn required_resources_unions_declared_sets() {
        let reg = sample_registry();
        let set = reg
            .required_resources(&names(&["record", "stt", "type"]))
            .unwrap();
        let expected: BTreeSet<Resource> = [
            Resource::AudioInput,
            Resource::Clipboard,
            Resource::Keyboard,
        ]
        .into_iter()
        .collect();
        assert_eq!(set, expected);
    }

    #[test]
    fn required_resources_propagates_unknown_stage() {
        let reg = sample_registry();
        assert!(reg.required_resources(&names(&["ghost"])).is_err());
    }
}

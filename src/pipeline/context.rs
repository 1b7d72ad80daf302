//! Per-run execution context handed to every stage.
//!
//! [`StageContext`] bundles everything a stage may need while it runs: its
//! own configuration parameters, the trigger that started the run, the
//! cooperative cancel flag, a scratch metadata map shared along the
//! pipeline, the tray icon sink, and the typed [`Backends`] bag.  The
//! executor creates one context per run and swaps [`StageContext::params`]
//! before each stage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audio::Recorder;
use crate::inject::TextInjector;
use crate::llm::LlmCorrector;
use crate::stt::Transcriber;
use crate::tray::IconSink;

use super::trigger::Trigger;
use super::value::TransientResource;

// ---------------------------------------------------------------------------
// StageParams
// ---------------------------------------------------------------------------

/// Configuration parameters for one stage instance, as declared in the
/// pipeline's TOML (everything in a `[[pipelines.stages]]` table besides
/// the `stage` key itself).
///
/// Accessors are total: a missing or wrongly-typed key yields the supplied
/// default, so stages never fail on configuration shape.
#[derive(Debug, Clone, Default)]
pub struct StageParams(toml::value::Table);

impl StageParams {
    pub fn new(table: toml::value::Table) -> Self {
        Self(table)
    }

    /// Numeric parameter; integers are widened to `f64`.
    pub fn f64_or(&self, key: &str, default: f64) -> f64 {
        match self.0.get(key) {
            Some(toml::Value::Float(f)) => *f,
            Some(toml::Value::Integer(i)) => *i as f64,
            _ => default,
        }
    }

    /// String parameter.
    pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.0.get(key) {
            Some(toml::Value::String(s)) => s.as_str(),
            _ => default,
        }
    }

    /// Array parameter; an empty slice when missing or not an array.
    pub fn array(&self, key: &str) -> &[toml::Value] {
        match self.0.get(key) {
            Some(toml::Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// Boolean parameter.
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.0.get(key) {
            Some(toml::Value::Boolean(b)) => *b,
            _ => default,
        }
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// Typed bag of collaborators shared by all built-in stages.
///
/// Held behind an `Arc` and cloned into every run.  `runtime` is a handle
/// to the app's tokio runtime so blocking stage code can drive async
/// backends (the LLM corrector) with `Handle::block_on`.
pub struct Backends {
    pub recorder: Arc<dyn Recorder>,
    pub transcriber: Arc<dyn Transcriber>,
    pub corrector: Arc<dyn LlmCorrector>,
    pub injector: Arc<dyn TextInjector>,
    pub runtime: tokio::runtime::Handle,
    /// Default ISO-639-1 language for transcription and correction; stage
    /// params may override it per pipeline.
    pub language: String,
}

// ---------------------------------------------------------------------------
// StageContext
// ---------------------------------------------------------------------------

/// Mutable state threaded through one pipeline run.
pub struct StageContext {
    /// Parameters of the stage currently executing.  Replaced by the
    /// executor before each stage.
    pub params: StageParams,
    /// The trigger that started this run.  Stages that record wait on it
    /// to know when to stop.
    pub trigger: Trigger,
    /// Scratch map for stages to pass small string facts downstream
    /// (e.g. clip duration).
    pub metadata: HashMap<String, String>,
    /// Tray icon sink for user-visible state changes.
    pub icon: Arc<dyn IconSink>,
    /// Hardware and model backends.
    pub backends: Arc<Backends>,
    cancel: Arc<AtomicBool>,
    cleanup: Vec<Arc<dyn TransientResource>>,
}

impl StageContext {
    pub fn new(
        trigger: Trigger,
        cancel: Arc<AtomicBool>,
        icon: Arc<dyn IconSink>,
        backends: Arc<Backends>,
    ) -> Self {
        Self {
            params: StageParams::default(),
            trigger,
            metadata: HashMap::new(),
            icon,
            backends,
            cancel,
            cleanup: Vec::new(),
        }
    }

    /// True once the run has been asked to stop.  Long-running stages must
    /// poll this at short intervals and return early.
    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// The shared cancel flag, for handing to wait helpers.
    pub fn cancel_flag(&self) -> &Arc<AtomicBool> {
        &self.cancel
    }

    /// Add a transient resource to the run's cleanup ledger.  The executor
    /// releases every registered resource exactly once when the run ends,
    /// in registration order, regardless of outcome.  Registering the same
    /// resource twice is a no-op.
    pub fn register_cleanup(&mut self, resource: Arc<dyn TransientResource>) {
        if !self.cleanup.iter().any(|r| Arc::ptr_eq(r, &resource)) {
            self.cleanup.push(resource);
        }
    }

    /// Take the cleanup ledger, leaving it empty.
    #[cfg(test)]
    pub(super) fn take_cleanup(&mut self) -> Vec<Arc<dyn TransientResource>> {
        std::mem::take(&mut self.cleanup)
    }
}

/// The ledger is settled when the context dies, so registered resources are
/// released exactly once, in registration order, even if a stage panics.
impl Drop for StageContext {
    fn drop(&mut self) {
        for resource in self.cleanup.drain(..) {
            match resource.release() {
                Ok(()) => log::debug!("pipeline: released {}", resource.describe()),
                Err(e) => log::warn!("pipeline: cleanup of {} failed: {e}", resource.describe()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

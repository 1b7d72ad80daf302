//! Test doubles for the pipeline core.
//!
//! [`FnStage`] builds a [`Stage`] from a closure so executor/manager tests
//! can script arbitrary stage behaviour (sleeps, temp-file creation,
//! failures) without touching real hardware backends.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use crate::audio::MockRecorder;
use crate::inject::MockInjector;
use crate::llm::MockCorrector;
use crate::stt::MockTranscriber;
use crate::tray::{IconSink, IconState};

use super::context::{Backends, StageContext};
use super::registry::{Stage, StageError};
use super::resource::Resource;
use super::value::{Value, ValueType};

/// Fully mocked backend bag for executor and stage tests.
///
/// The runtime handle points at a process-wide test runtime so the helper
/// works from both sync and async tests.
pub fn test_backends() -> Arc<Backends> {
    Arc::new(Backends {
        recorder: Arc::new(MockRecorder::new(1.0)),
        transcriber: Arc::new(MockTranscriber::ok("hello")),
        corrector: Arc::new(MockCorrector::echo_upper()),
        injector: Arc::new(MockInjector::new()),
        runtime: test_runtime(),
        language: "en".into(),
    })
}

/// Handle to a lazily started multi-thread runtime shared by all tests.
pub fn test_runtime() -> tokio::runtime::Handle {
    static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
    RUNTIME
        .get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .expect("failed to build test runtime")
        })
        .handle()
        .clone()
}

/// Icon sink that records every state pushed to it, so tests can assert
/// on the user-visible cues a code path emits.
#[derive(Default)]
pub struct RecordingIcon {
    states: Mutex<Vec<IconState>>,
}

impl RecordingIcon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every state seen so far, in push order.
    pub fn states(&self) -> Vec<IconState> {
        self.states.lock().unwrap().clone()
    }
}

impl IconSink for RecordingIcon {
    fn set_state(&self, state: IconState) {
        self.states.lock().unwrap().push(state);
    }

    fn set_state_for(&self, state: IconState, _revert_after: Duration) {
        self.states.lock().unwrap().push(state);
    }

    fn start_flashing(&self, state: IconState) {
        self.states.lock().unwrap().push(state);
    }

    fn stop_flashing(&self) {}
}

type StageBody = dyn Fn(Value, &mut StageContext) -> Result<Value, StageError> + Send + Sync;

/// A stage whose body is a closure.
pub struct FnStage {
    name: &'static str,
    input: ValueType,
    output: ValueType,
    resources: BTreeSet<Resource>,
    body: Box<StageBody>,
}

impl FnStage {
    /// Build a stage from a closure.
    pub fn new(
        name: &'static str,
        input: ValueType,
        output: ValueType,
        resources: &[Resource],
        body: impl Fn(Value, &mut StageContext) -> Result<Value, StageError> + Send + Sync + 'static,
    ) -> Arc<dyn Stage> {
        Arc::new(Self {
            name,
            input,
            output,
            resources: resources.iter().copied().collect(),
            body: Box::new(body),
        })
    }

    /// A stage that ignores its input and returns the absent value of its
    /// declared output type.
    pub fn passthrough(
        name: &'static str,
        input: ValueType,
        output: ValueType,
        resources: &[Resource],
    ) -> Arc<dyn Stage> {
        Self::new(name, input, output, resources, move |_, _| {
            Ok(match output {
                ValueType::Unit => Value::Unit,
                ValueType::Audio => Value::Audio(None),
                ValueType::Text => Value::Text(None),
            })
        })
    }
}

impl Stage for FnStage {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        "test stage"
    }

    fn input_type(&self) -> ValueType {
        self.input
    }

    fn output_type(&self) -> ValueType {
        self.output
    }

    fn required_resources(&self) -> BTreeSet<Resource> {
        self.resources.clone()
    }

    fn execute(&self, input: Value, ctx: &mut StageContext) -> Result<Value, StageError> {
        (self.body)(input, ctx)
    }
}

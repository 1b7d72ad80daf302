//! Single-run pipeline executor.
//!
//! [`PipelineExecutor::execute`] drives one run from resource acquisition
//! through the stage chain to teardown:
//!
//! ```text
//!  acquire resources ──▶ stage 1 ──▶ stage 2 ──▶ … ──▶ outcome
//!        │                  │ cancel checked before every stage
//!        ▼                  ▼
//!   all-or-nothing     values flow stage to stage;
//!   (bounded wait)     temp files land in the cleanup ledger
//! ```
//!
//! Teardown is unconditional: the cleanup ledger is settled (registration
//! order, exactly once), every acquired resource is released, and the tray
//! icon returns to idle.  Both are Drop-guarded so a panicking stage cannot
//! leak resources or temp files.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::tray::{IconSink, IconState};

use super::context::{Backends, StageContext, StageParams};
use super::registry::{Stage, StageError};
use super::resource::{Resource, ResourceTable};
use super::trigger::Trigger;
use super::value::{Value, ValueType};
use super::RunId;

// ---------------------------------------------------------------------------
// StagePlan
// ---------------------------------------------------------------------------

/// One stage of a loaded pipeline: the implementation plus its parameters
/// from configuration.  Resolved once at load time so runs never consult
/// the registry.
#[derive(Clone)]
pub struct StagePlan {
    pub stage: Arc<dyn Stage>,
    pub params: StageParams,
}

// ---------------------------------------------------------------------------
// RunError / RunOutcome
// ---------------------------------------------------------------------------

/// Why a run failed.
#[derive(Debug, Error)]
pub enum RunError {
    /// The resource set could not be acquired within the admission window.
    #[error("resources busy: {}", format_resources(.0))]
    ResourcesBusy(Vec<Resource>),

    /// A stage returned an error.
    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageError,
    },

    /// A stage returned a value whose type does not match its declaration.
    #[error("stage '{stage}' declared output {declared} but returned {actual}")]
    WrongOutput {
        stage: String,
        declared: ValueType,
        actual: ValueType,
    },
}

fn format_resources(resources: &[Resource]) -> String {
    resources
        .iter()
        .map(Resource::name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Terminal state of one run.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every stage completed.
    Succeeded,
    /// The run was cancelled before or between stages.
    Cancelled,
    /// The run stopped early with an error.
    Failed(RunError),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }
}

// ---------------------------------------------------------------------------
// PipelineExecutor
// ---------------------------------------------------------------------------

/// How long a run waits for its resource set before giving up.  Covers the
/// race between the manager's admission probe and actual acquisition.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);

/// How long the error icon stays up after a failed run.
const ERROR_ICON_FOR: Duration = Duration::from_secs(2);

/// Executes pipeline runs on the calling (blocking) thread.
pub struct PipelineExecutor {
    resources: Arc<ResourceTable>,
    icon: Arc<dyn IconSink>,
    backends: Arc<Backends>,
    acquire_timeout: Duration,
}

impl PipelineExecutor {
    pub fn new(
        resources: Arc<ResourceTable>,
        icon: Arc<dyn IconSink>,
        backends: Arc<Backends>,
    ) -> Self {
        Self {
            resources,
            icon,
            backends,
            acquire_timeout: ACQUIRE_TIMEOUT,
        }
    }

    /// Shorten the admission wait; used by tests that provoke contention.
    #[cfg(test)]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Run `plan` to completion.  Blocks the calling thread for the whole
    /// run; the manager invokes this from `spawn_blocking`.
    pub fn execute(
        &self,
        run: RunId,
        pipeline: &str,
        plan: &[StagePlan],
        trigger: Trigger,
        cancel: Arc<AtomicBool>,
    ) -> RunOutcome {
        if cancel.load(std::sync::atomic::Ordering::SeqCst) {
            log::info!("pipeline: {run} ({pipeline}) cancelled before start");
            return RunOutcome::Cancelled;
        }

        // All-or-nothing acquisition of the union of declared resources.
        let wanted: std::collections::BTreeSet<Resource> = plan
            .iter()
            .flat_map(|p| p.stage.required_resources())
            .collect();

        if !self.resources.acquire_all(run, &wanted, self.acquire_timeout) {
            let blocked = self.resources.blocked_by(run, &wanted);
            log::warn!(
                "pipeline: {run} ({pipeline}) gave up waiting for [{}]",
                format_resources(&blocked)
            );
            self.icon.set_state_for(IconState::Error, ERROR_ICON_FOR);
            return RunOutcome::Failed(RunError::ResourcesBusy(blocked));
        }

        // Guards drop in reverse declaration order: the context (cleanup
        // ledger) settles first, then the resources release.
        let resources_guard = ReleaseGuard {
            table: &self.resources,
            run,
        };
        let mut ctx = StageContext::new(
            trigger,
            cancel,
            Arc::clone(&self.icon),
            Arc::clone(&self.backends),
        );

        log::info!(
            "pipeline: {run} ({pipeline}) started, {} stages, holding [{}]",
            plan.len(),
            format_resources(&wanted.iter().copied().collect::<Vec<_>>())
        );

        let outcome = self.run_stages(run, pipeline, plan, &mut ctx);

        // Teardown before the icon settles: the idle (or error) state is
        // the signal that the run is truly over, ledger emptied and
        // resources back in the table.
        drop(ctx);
        drop(resources_guard);

        match &outcome {
            RunOutcome::Succeeded => {
                log::info!("pipeline: {run} ({pipeline}) succeeded");
                self.icon.set_state(IconState::Idle);
            }
            RunOutcome::Cancelled => {
                log::info!("pipeline: {run} ({pipeline}) cancelled");
                self.icon.set_state(IconState::Idle);
            }
            RunOutcome::Failed(err) => {
                log::error!("pipeline: {run} ({pipeline}) failed: {err}");
                self.icon.set_state_for(IconState::Error, ERROR_ICON_FOR);
            }
        }

        outcome
    }

    fn run_stages(
        &self,
        run: RunId,
        pipeline: &str,
        plan: &[StagePlan],
        ctx: &mut StageContext,
    ) -> RunOutcome {
        let mut value = Value::Unit;

        for (i, step) in plan.iter().enumerate() {
            if ctx.cancelled() {
                return RunOutcome::Cancelled;
            }

            let name = step.stage.name();
            log::debug!(
                "pipeline: {run} ({pipeline}) stage {}/{} '{name}'",
                i + 1,
                plan.len()
            );
            ctx.params = step.params.clone();

            let output = match step.stage.execute(value, ctx) {
                Ok(output) => output,
                Err(source) => {
                    return RunOutcome::Failed(RunError::Stage {
                        stage: name.to_string(),
                        source,
                    });
                }
            };

            // A stage cannot smuggle a value past its declaration.
            let declared = step.stage.output_type();
            if output.value_type() != declared {
                return RunOutcome::Failed(RunError::WrongOutput {
                    stage: name.to_string(),
                    declared,
                    actual: output.value_type(),
                });
            }

            if let Some(transient) = output.transient() {
                ctx.register_cleanup(transient);
            }
            value = output;
        }

        RunOutcome::Succeeded
    }
}

/// Releases a run's resources when dropped, panic or not.
struct ReleaseGuard<'a> {
    table: &'a ResourceTable,
    run: RunId,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.table.release_all(self.run);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{test_backends, FnStage};
    use crate::pipeline::value::TempAudioFile;
    use crate::tray::NullIconSink;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn executor(resources: &Arc<ResourceTable>) -> PipelineExecutor {
        PipelineExecutor::new(
            Arc::clone(resources),
            Arc::new(NullIconSink),
            test_backends(),
        )
    }

    fn plan_of(stages: Vec<Arc<dyn Stage>>) -> Vec<StagePlan> {
        stages
            .into_iter()
            .map(|stage| StagePlan {
                stage,
                params: StageParams::default(),
            })
            .collect()
    }

    fn run_now(exec: &PipelineExecutor, plan: &[StagePlan]) -> RunOutcome {
        exec.execute(
            RunId(1),
            "test",
            plan,
            Trigger::Programmatic,
            Arc::new(AtomicBool::new(false)),
        )
    }

    /// A full chain runs in order and the outcome is success.
    #[test]
    fn stages_run_in_order_and_succeed() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (o1, o2, o3) = (order.clone(), order.clone(), order.clone());

        let plan = plan_of(vec![
            FnStage::new(
                "record",
                ValueType::Unit,
                ValueType::Audio,
                &[Resource::AudioInput],
                move |_, _| {
                    o1.lock().unwrap().push("record");
                    Ok(Value::Audio(None))
                },
            ),
            FnStage::new("stt", ValueType::Audio, ValueType::Text, &[], move |_, _| {
                o2.lock().unwrap().push("stt");
                Ok(Value::Text(Some("hi".into())))
            }),
            FnStage::new(
                "type",
                ValueType::Text,
                ValueType::Unit,
                &[Resource::Keyboard],
                move |input, _| {
                    assert!(matches!(input, Value::Text(Some(_))));
                    o3.lock().unwrap().push("type");
                    Ok(Value::Unit)
                },
            ),
        ]);

        let resources = Arc::new(ResourceTable::new());
        let outcome = run_now(&executor(&resources), &plan);

        assert!(outcome.is_success(), "got {outcome:?}");
        assert_eq!(*order.lock().unwrap(), vec!["record", "stt", "type"]);
        assert!(resources.holder(Resource::AudioInput).is_none());
        assert!(resources.holder(Resource::Keyboard).is_none());
    }

    /// A failing stage stops the run; later stages never execute and the
    /// resources come back.
    #[test]
    fn failure_stops_the_chain_and_releases_resources() {
        let ran_last = Arc::new(AtomicBool::new(false));
        let ran = ran_last.clone();

        let plan = plan_of(vec![
            FnStage::new(
                "record",
                ValueType::Unit,
                ValueType::Audio,
                &[Resource::AudioInput],
                |_, _| Err(StageError::Backend("mic unplugged".into())),
            ),
            FnStage::new("stt", ValueType::Audio, ValueType::Text, &[], move |_, _| {
                ran.store(true, Ordering::SeqCst);
                Ok(Value::Text(None))
            }),
        ]);

        let resources = Arc::new(ResourceTable::new());
        let outcome = run_now(&executor(&resources), &plan);

        match outcome {
            RunOutcome::Failed(RunError::Stage { stage, .. }) => assert_eq!(stage, "record"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!ran_last.load(Ordering::SeqCst));
        assert!(resources.holder(Resource::AudioInput).is_none());
    }

    /// A stage whose returned value contradicts its declared output type is
    /// a run failure.
    #[test]
    fn mismatched_output_type_fails_the_run() {
        let plan = plan_of(vec![FnStage::new(
            "liar",
            ValueType::Unit,
            ValueType::Text,
            &[],
            |_, _| Ok(Value::Unit),
        )]);

        let resources = Arc::new(ResourceTable::new());
        match run_now(&executor(&resources), &plan) {
            RunOutcome::Failed(RunError::WrongOutput {
                stage,
                declared,
                actual,
            }) => {
                assert_eq!(stage, "liar");
                assert_eq!(declared, ValueType::Text);
                assert_eq!(actual, ValueType::Unit);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    /// Cancellation before the first stage acquires nothing and runs nothing.
    #[test]
    fn cancel_before_start_short_circuits() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let plan = plan_of(vec![FnStage::new(
            "record",
            ValueType::Unit,
            ValueType::Audio,
            &[Resource::AudioInput],
            move |_, _| {
                flag.store(true, Ordering::SeqCst);
                Ok(Value::Audio(None))
            },
        )]);

        let resources = Arc::new(ResourceTable::new());
        let cancel = Arc::new(AtomicBool::new(true));
        let outcome = executor(&resources).execute(
            RunId(7),
            "test",
            &plan,
            Trigger::Programmatic,
            cancel,
        );

        assert!(matches!(outcome, RunOutcome::Cancelled));
        assert!(!ran.load(Ordering::SeqCst));
    }

    /// A stage that sets the cancel flag stops the run before the next
    /// stage.
    #[test]
    fn cancel_between_stages_is_observed() {
        let ran_second = Arc::new(AtomicBool::new(false));
        let flag = ran_second.clone();

        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_in_stage = cancel.clone();

        let plan = plan_of(vec![
            FnStage::new(
                "record",
                ValueType::Unit,
                ValueType::Audio,
                &[],
                move |_, _| {
                    cancel_in_stage.store(true, Ordering::SeqCst);
                    Ok(Value::Audio(None))
                },
            ),
            FnStage::new("stt", ValueType::Audio, ValueType::Text, &[], move |_, _| {
                flag.store(true, Ordering::SeqCst);
                Ok(Value::Text(None))
            }),
        ]);

        let resources = Arc::new(ResourceTable::new());
        let outcome = executor(&resources).execute(
            RunId(2),
            "test",
            &plan,
            Trigger::Programmatic,
            cancel,
        );

        assert!(matches!(outcome, RunOutcome::Cancelled));
        assert!(!ran_second.load(Ordering::SeqCst));
    }

    /// Temp files produced mid-run are deleted when the run ends, success
    /// or not.
    #[test]
    fn temp_files_are_cleaned_up_after_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.wav");
        std::fs::write(&clip, b"RIFF").unwrap();

        let clip_for_stage = clip.clone();
        let plan = plan_of(vec![
            FnStage::new("record", ValueType::Unit, ValueType::Audio, &[], move |_, _| {
                Ok(Value::Audio(Some(Arc::new(TempAudioFile::new(
                    clip_for_stage.clone(),
                    1.0,
                )))))
            }),
            FnStage::new("stt", ValueType::Audio, ValueType::Text, &[], |input, _| {
                assert!(matches!(input, Value::Audio(Some(_))));
                Ok(Value::Text(Some("ok".into())))
            }),
        ]);

        let resources = Arc::new(ResourceTable::new());
        let outcome = run_now(&executor(&resources), &plan);

        assert!(outcome.is_success(), "got {outcome:?}");
        assert!(!clip.exists(), "temp clip must be deleted after the run");
    }

    /// Transient that only flips a flag, so tests can observe the ledger.
    struct FlagTransient {
        released: AtomicBool,
    }

    impl crate::pipeline::TransientResource for FlagTransient {
        fn describe(&self) -> String {
            "flag transient".into()
        }

        fn release(&self) -> Result<(), crate::pipeline::CleanupError> {
            self.released.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Transients registered mid-run are settled even when a later stage
    /// fails.
    #[test]
    fn registered_transients_are_settled_on_failure() {
        let transient = Arc::new(FlagTransient {
            released: AtomicBool::new(false),
        });

        let registered = Arc::clone(&transient);
        let plan = plan_of(vec![
            FnStage::new("record", ValueType::Unit, ValueType::Audio, &[], move |_, ctx| {
                ctx.register_cleanup(registered.clone());
                Ok(Value::Audio(None))
            }),
            FnStage::new("stt", ValueType::Audio, ValueType::Text, &[], |_, _| {
                Err(StageError::Backend("model crashed".into()))
            }),
        ]);

        let resources = Arc::new(ResourceTable::new());
        let outcome = run_now(&executor(&resources), &plan);

        assert!(matches!(outcome, RunOutcome::Failed(_)));
        assert!(
            transient.released.load(Ordering::SeqCst),
            "ledger must settle registered transients on a failed run"
        );
    }

    /// The same holds for a run cancelled between stages.
    #[test]
    fn registered_transients_are_settled_on_cancel() {
        let transient = Arc::new(FlagTransient {
            released: AtomicBool::new(false),
        });

        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_in_stage = cancel.clone();
        let registered = Arc::clone(&transient);
        let plan = plan_of(vec![
            FnStage::new("record", ValueType::Unit, ValueType::Audio, &[], move |_, ctx| {
                ctx.register_cleanup(registered.clone());
                cancel_in_stage.store(true, Ordering::SeqCst);
                Ok(Value::Audio(None))
            }),
            FnStage::passthrough("stt", ValueType::Audio, ValueType::Text, &[]),
        ]);

        let resources = Arc::new(ResourceTable::new());
        let outcome = executor(&resources).execute(
            RunId(3),
            "test",
            &plan,
            Trigger::Programmatic,
            cancel,
        );

        assert!(matches!(outcome, RunOutcome::Cancelled));
        assert!(transient.released.load(Ordering::SeqCst));
    }

    /// Contended resources fail the run within the admission window instead
    /// of blocking forever.
    #[test]
    fn busy_resources_fail_within_the_window() {
        let resources = Arc::new(ResourceTable::new());
        let holder: std::collections::BTreeSet<Resource> =
            [Resource::AudioInput].into_iter().collect();
        assert!(resources.try_acquire_all(RunId(99), &holder));

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let plan = plan_of(vec![FnStage::new(
            "record",
            ValueType::Unit,
            ValueType::Audio,
            &[Resource::AudioInput],
            move |_, _| {
                flag.store(true, Ordering::SeqCst);
                Ok(Value::Audio(None))
            },
        )]);

        let exec = executor(&resources).with_acquire_timeout(Duration::from_millis(50));
        match run_now(&exec, &plan) {
            RunOutcome::Failed(RunError::ResourcesBusy(blocked)) => {
                assert_eq!(blocked, vec![Resource::AudioInput]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!ran.load(Ordering::SeqCst));
        // The original holder keeps its grant.
        assert_eq!(resources.holder(Resource::AudioInput), Some(RunId(99)));
    }

    /// The idle icon is the last externally visible effect of a run: when
    /// it shows, the ledger is settled and every resource is back.
    #[test]
    fn idle_icon_comes_after_resource_release() {
        struct SnapshotSink {
            resources: Arc<ResourceTable>,
            mic_free_at_idle: AtomicBool,
        }

        impl IconSink for SnapshotSink {
            fn set_state(&self, state: IconState) {
                if state == IconState::Idle {
                    self.mic_free_at_idle.store(
                        self.resources.holder(Resource::AudioInput).is_none(),
                        Ordering::SeqCst,
                    );
                }
            }
            fn set_state_for(&self, _state: IconState, _revert_after: Duration) {}
            fn start_flashing(&self, _state: IconState) {}
            fn stop_flashing(&self) {}
        }

        let resources = Arc::new(ResourceTable::new());
        let sink = Arc::new(SnapshotSink {
            resources: Arc::clone(&resources),
            mic_free_at_idle: AtomicBool::new(false),
        });

        let exec = PipelineExecutor::new(
            Arc::clone(&resources),
            sink.clone(),
            test_backends(),
        );
        let plan = plan_of(vec![FnStage::passthrough(
            "record",
            ValueType::Unit,
            ValueType::Audio,
            &[Resource::AudioInput],
        )]);

        assert!(run_now(&exec, &plan).is_success());
        assert!(
            sink.mic_free_at_idle.load(Ordering::SeqCst),
            "idle was signalled while the microphone was still held"
        );
    }

    /// An empty resource union still runs (nothing to acquire).
    #[test]
    fn no_resources_needed_runs_immediately() {
        let plan = plan_of(vec![FnStage::new(
            "noop",
            ValueType::Unit,
            ValueType::Unit,
            &[],
            |_, _| Ok(Value::Unit),
        )]);
        let resources = Arc::new(ResourceTable::new());
        assert!(run_now(&executor(&resources), &plan).is_success());
    }
}

//! Pipeline lifecycle: loading, admission, worker dispatch, shutdown.
//!
//! [`PipelineManager`] owns the loaded pipeline definitions, the resource
//! table, and the bookkeeping of in-flight runs.  Its central constraint is
//! that [`PipelineManager::on_trigger`] is called from the hotkey listener
//! thread and must return immediately: admission is a lock-probe, and the
//! run itself happens on a `spawn_blocking` thread gated by a semaphore.
//!
//! The admission probe acquires and instantly releases the run's resource
//! set, so two probes can race a worker to the same resource.  That race is
//! tolerated, not prevented: the executor re-acquires with a bounded wait
//! and fails the run cleanly if the window closes.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use crate::config::PipelineConfig;
use crate::tray::{IconSink, IconState};

use super::context::{Backends, StageParams};
use super::executor::{PipelineExecutor, StagePlan};
use super::registry::StageRegistry;
use super::resource::{Resource, ResourceTable};
use super::trigger::Trigger;
use super::RunId;

// ---------------------------------------------------------------------------
// LoadError
// ---------------------------------------------------------------------------

/// One problem found while loading a pipeline definition.
#[derive(Debug)]
pub struct LoadIssue {
    pub pipeline: String,
    pub problem: String,
}

impl fmt::Display for LoadIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipeline '{}': {}", self.pipeline, self.problem)
    }
}

/// Rejection of an entire configuration.  Loading is all-or-nothing; the
/// error carries every problem found, not just the first.
#[derive(Debug)]
pub struct LoadError {
    pub issues: Vec<LoadIssue>,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration rejected ({} problems):", self.issues.len())?;
        for issue in &self.issues {
            write!(f, "\n  - {issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for LoadError {}

// ---------------------------------------------------------------------------
// PipelineManager
// ---------------------------------------------------------------------------

/// How long the busy cue stays up after a rejected admission.
const BUSY_ICON_FOR: Duration = Duration::from_secs(2);

/// A pipeline definition after load-time validation and stage resolution.
struct LoadedPipeline {
    name: String,
    plan: Vec<StagePlan>,
}

/// Bookkeeping for one in-flight run.
struct ActiveRun {
    pipeline: String,
    cancel: Arc<AtomicBool>,
}

/// Owns loaded pipelines and dispatches runs to blocking workers.
pub struct PipelineManager {
    registry: StageRegistry,
    resources: Arc<ResourceTable>,
    executor: Arc<PipelineExecutor>,
    icon: Arc<dyn IconSink>,
    runtime: tokio::runtime::Handle,
    workers: Arc<Semaphore>,

    pipelines: RwLock<HashMap<String, Arc<LoadedPipeline>>>,
    /// Hotkey binding → pipeline name, for enabled pipelines only.
    hotkeys: RwLock<HashMap<String, String>>,

    active: Mutex<HashMap<RunId, ActiveRun>>,
    idle: Condvar,
    next_run: AtomicU64,
    shutting_down: AtomicBool,
}

impl PipelineManager {
    /// `workers` bounds the number of concurrently executing runs.
    pub fn new(
        registry: StageRegistry,
        backends: Arc<Backends>,
        icon: Arc<dyn IconSink>,
        runtime: tokio::runtime::Handle,
        workers: usize,
    ) -> Arc<Self> {
        let resources = Arc::new(ResourceTable::new());
        let executor = Arc::new(PipelineExecutor::new(
            Arc::clone(&resources),
            Arc::clone(&icon),
            backends,
        ));

        Arc::new(Self {
            registry,
            resources,
            executor,
            icon,
            runtime,
            workers: Arc::new(Semaphore::new(workers.max(1))),
            pipelines: RwLock::new(HashMap::new()),
            hotkeys: RwLock::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            idle: Condvar::new(),
            next_run: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
        })
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Validate and install `configs`, replacing any previously loaded set.
    ///
    /// All-or-nothing: if any pipeline is invalid, nothing changes and the
    /// returned [`LoadError`] lists every problem across the whole
    /// configuration.  Disabled pipelines are validated but get no hotkey.
    pub fn load(&self, configs: &[PipelineConfig]) -> Result<(), LoadError> {
        let mut issues = Vec::new();
        let mut pipelines: HashMap<String, Arc<LoadedPipeline>> = HashMap::new();
        let mut hotkeys: HashMap<String, String> = HashMap::new();

        for config in configs {
            let name = config.name.clone();

            if pipelines.contains_key(&name) {
                issues.push(LoadIssue {
                    pipeline: name.clone(),
                    problem: "duplicate pipeline name".into(),
                });
                continue;
            }

            // Binding bookkeeping runs before stage validation so a hotkey
            // collision is reported even when its first claimant is itself
            // invalid.
            if config.enabled {
                if let Some(binding) = &config.hotkey {
                    match hotkeys.get(binding) {
                        Some(other) => issues.push(LoadIssue {
                            pipeline: name.clone(),
                            problem: format!(
                                "hotkey '{binding}' already bound to pipeline '{other}'"
                            ),
                        }),
                        None => {
                            hotkeys.insert(binding.clone(), name.clone());
                        }
                    }
                }
            }

            let stage_names: Vec<String> =
                config.stages.iter().map(|s| s.stage.clone()).collect();
            if let Err(e) = self.registry.validate_pipeline(&stage_names) {
                issues.push(LoadIssue {
                    pipeline: name.clone(),
                    problem: e.to_string(),
                });
                continue;
            }

            let plan: Vec<StagePlan> = config
                .stages
                .iter()
                .map(|s| {
                    // validate_pipeline already proved every name resolves
                    let stage = self
                        .registry
                        .get(&s.stage)
                        .expect("validated stage must resolve")
                        .clone();
                    StagePlan {
                        stage,
                        params: StageParams::new(s.params.clone()),
                    }
                })
                .collect();

            pipelines.insert(name.clone(), Arc::new(LoadedPipeline { name, plan }));
        }

        if !issues.is_empty() {
            return Err(LoadError { issues });
        }

        log::info!(
            "manager: loaded {} pipelines, {} hotkey bindings",
            pipelines.len(),
            hotkeys.len()
        );
        *self.pipelines.write().unwrap() = pipelines;
        *self.hotkeys.write().unwrap() = hotkeys;
        Ok(())
    }

    /// Hotkey bindings of the currently loaded configuration.
    pub fn bindings(&self) -> Vec<String> {
        self.hotkeys.read().unwrap().keys().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Admission
    // -----------------------------------------------------------------------

    /// React to a trigger event for `binding`.
    ///
    /// Never blocks: returns the admitted [`RunId`], or `None` when the
    /// binding is unknown, the daemon is shutting down, or the pipeline's
    /// resources are busy.  Called from the hotkey listener thread.
    pub fn on_trigger(self: &Arc<Self>, binding: &str, trigger: Trigger) -> Option<RunId> {
        let name = self.hotkeys.read().unwrap().get(binding)?.clone();
        self.trigger_pipeline(&name, trigger)
    }

    /// Start the named pipeline directly (no hotkey involved).
    pub fn trigger_pipeline(self: &Arc<Self>, name: &str, trigger: Trigger) -> Option<RunId> {
        if self.shutting_down.load(Ordering::SeqCst) {
            log::debug!("manager: ignoring trigger for '{name}' during shutdown");
            return None;
        }

        let loaded = self.pipelines.read().unwrap().get(name)?.clone();
        let run = RunId(self.next_run.fetch_add(1, Ordering::SeqCst));

        // Admission probe: can the full resource set be held right now?
        // Acquire and release immediately; the executor re-acquires with a
        // bounded wait, tolerating races with other fresh admissions.
        let wanted: std::collections::BTreeSet<Resource> = loaded
            .plan
            .iter()
            .flat_map(|p| p.stage.required_resources())
            .collect();
        if !self.resources.try_acquire_all(run, &wanted) {
            let busy = self.resources.blocked_by(run, &wanted);
            log::info!(
                "manager: '{name}' not admitted, busy resources: {:?}",
                busy.iter().map(Resource::name).collect::<Vec<_>>()
            );
            self.icon.set_state_for(IconState::Error, BUSY_ICON_FOR);
            return None;
        }
        self.resources.release_all(run);

        let cancel = Arc::new(AtomicBool::new(false));
        self.active.lock().unwrap().insert(
            run,
            ActiveRun {
                pipeline: name.to_string(),
                cancel: Arc::clone(&cancel),
            },
        );
        log::debug!("manager: {run} admitted for pipeline '{name}'");

        let manager = Arc::clone(self);
        self.runtime.spawn(async move {
            manager.drive_run(run, loaded, trigger, cancel).await;
        });

        Some(run)
    }

    /// Async side of one run: wait for a worker slot, execute on a blocking
    /// thread, then settle the active-run bookkeeping.
    async fn drive_run(
        self: Arc<Self>,
        run: RunId,
        loaded: Arc<LoadedPipeline>,
        trigger: Trigger,
        cancel: Arc<AtomicBool>,
    ) {
        let permit = match Arc::clone(&self.workers).acquire_owned().await {
            Ok(permit) => permit,
            // Semaphore closed: shutdown won the race.
            Err(_) => {
                self.finish_run(run);
                return;
            }
        };

        let executor = Arc::clone(&self.executor);
        let result = tokio::task::spawn_blocking(move || {
            executor.execute(run, &loaded.name, &loaded.plan, trigger, cancel)
        })
        .await;

        if let Err(join_err) = result {
            // A panicking stage: resources and temp files were reclaimed by
            // the executor's guards, only the bookkeeping is left to us.
            log::error!("manager: {run} worker panicked: {join_err}");
            self.icon.set_state_for(IconState::Error, BUSY_ICON_FOR);
        }

        drop(permit);
        self.finish_run(run);
    }

    fn finish_run(&self, run: RunId) {
        let mut active = self.active.lock().unwrap();
        active.remove(&run);
        self.idle.notify_all();
    }

    // -----------------------------------------------------------------------
    // Cancellation and shutdown
    // -----------------------------------------------------------------------

    /// Ask one run to stop.  Returns `false` when the run is not active
    /// (already finished or never admitted).
    pub fn cancel(&self, run: RunId) -> bool {
        let active = self.active.lock().unwrap();
        match active.get(&run) {
            Some(entry) => {
                entry.cancel.store(true, Ordering::SeqCst);
                log::info!("manager: cancel requested for {run} ('{}')", entry.pipeline);
                true
            }
            None => false,
        }
    }

    /// Ask every in-flight run to stop.
    pub fn cancel_all(&self) {
        let active = self.active.lock().unwrap();
        for (run, entry) in active.iter() {
            entry.cancel.store(true, Ordering::SeqCst);
            log::info!("manager: cancel requested for {run} ('{}')", entry.pipeline);
        }
    }

    /// Number of runs currently admitted but not finished.
    pub fn active_runs(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    /// Block until no runs are in flight, or `timeout` elapses.  Returns
    /// `true` when idle was reached.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut active = self.active.lock().unwrap();
        while !active.is_empty() {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => return false,
            };
            let (guard, wait) = self.idle.wait_timeout(active, remaining).unwrap();
            active = guard;
            if wait.timed_out() && !active.is_empty() {
                return false;
            }
        }
        true
    }

    /// Stop admitting, cancel everything in flight, and wait up to
    /// `timeout` for workers to drain.  Returns `false` when runs were
    /// abandoned still in flight.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.icon.set_state(IconState::Disabled);
        self.workers.close();
        self.cancel_all();

        let drained = self.wait_idle(timeout);
        if !drained {
            let active = self.active.lock().unwrap();
            for (run, entry) in active.iter() {
                log::warn!(
                    "manager: abandoning {run} ('{}') still in flight at shutdown",
                    entry.pipeline
                );
            }
        }
        drained
    }

    /// The shared resource table (admission state), mainly for tests and
    /// diagnostics.
    #[cfg(test)]
    pub fn resources(&self) -> &Arc<ResourceTable> {
        &self.resources
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Concurrent pipeline engine: the core of the daemon.
//!
//! A *pipeline* is a named chain of typed stages; a *run* is one execution
//! of that chain, admitted only when every hardware resource the chain
//! declares can be held exclusively for the whole run.
//!
//! # Architecture
//!
//! ```text
//! hotkey press (rdev thread)
//!        │  on_trigger — never blocks
//!        ▼
//! PipelineManager ──▶ admission probe ──▶ tokio task (semaphore)
//!                                              │ spawn_blocking
//!                                              ▼
//!                                      PipelineExecutor
//!                                              │
//!                         acquire ResourceTable (all-or-nothing)
//!                                              │
//!                              stage 1 ─▶ stage 2 ─▶ … ─▶ outcome
//!                                              │
//!                         cleanup ledger + release + icon reset
//! ```
//!
//! Stage implementations and the registry of built-ins live in
//! [`crate::stages`]; everything here is domain-agnostic machinery.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voxflow::config::AppConfig;
//! use voxflow::pipeline::{PipelineManager, Trigger};
//! use voxflow::tray::NullIconSink;
//! # fn make_backends() -> Arc<voxflow::pipeline::Backends> { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::load().expect("unreadable settings");
//!     let registry = voxflow::stages::builtin();
//!
//!     let manager = PipelineManager::new(
//!         registry,
//!         make_backends(),
//!         Arc::new(NullIconSink),
//!         tokio::runtime::Handle::current(),
//!         config.workers,
//!     );
//!     manager.load(&config.pipelines).expect("invalid pipeline config");
//!
//!     // hotkey listener calls manager.on_trigger("F9", ...) on key press
//!     let run = manager.on_trigger("F9", Trigger::Programmatic);
//!     println!("admitted: {run:?}");
//! }
//! ```

pub mod context;
pub mod executor;
pub mod manager;
pub mod registry;
pub mod resource;
pub mod trigger;
pub mod value;

#[cfg(test)]
pub mod testing;

use std::fmt;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// Identity of one pipeline run, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use context::{Backends, StageContext, StageParams};
pub use executor::{PipelineExecutor, RunError, RunOutcome, StagePlan};
pub use manager::{LoadError, LoadIssue, PipelineManager};
pub use registry::{RegistryError, Stage, StageError, StageRegistry};
pub use resource::{Resource, ResourceTable};
pub use trigger::{EdgeTrigger, Trigger, TriggerWait};
pub use value::{CleanupError, TempAudioFile, TransientResource, Value, ValueType};

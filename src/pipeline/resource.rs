//! Exclusive-resource lock table.
//!
//! A [`Resource`] names a hardware or software capability that must never be
//! used by two runs at the same time (microphone, virtual keyboard, system
//! clipboard).  The set is closed — extending it means adding an enumerator.
//!
//! [`ResourceTable`] tracks which run currently holds each resource.  All
//! mutation goes through its atomic acquire/release operations; it is the
//! only piece of state shared between concurrent runs.
//!
//! # Deadlock avoidance
//!
//! Two pipelines may declare the same two resources in different orders, so
//! multi-resource requests must follow one global total order.  Resource sets
//! are carried as `BTreeSet<Resource>` (iteration follows the `Ord` derive),
//! and the whole set is checked and taken under a single table lock — partial
//! acquisition is never observable to other callers.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use super::RunId;

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// A named exclusive-use capability guarded by the lock table.
///
/// The `Ord` derive defines the global acquisition order used for every
/// multi-resource request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resource {
    /// The microphone / audio input device.
    AudioInput,
    /// The system clipboard.
    Clipboard,
    /// The virtual keyboard (simulated key events).
    Keyboard,
}

impl Resource {
    /// Every resource, in acquisition order.
    pub const ALL: [Resource; 3] = [
        Resource::AudioInput,
        Resource::Clipboard,
        Resource::Keyboard,
    ];

    /// Stable lowercase name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Resource::AudioInput => "audio_input",
            Resource::Clipboard => "clipboard",
            Resource::Keyboard => "keyboard",
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// ResourceTable
// ---------------------------------------------------------------------------

/// Tracks exclusive ownership of every [`Resource`].
///
/// Created once at startup with all resources free and shared behind an
/// `Arc`.  A resource is held by at most one [`RunId`] at a time.
pub struct ResourceTable {
    /// resource → holding run.  Absent key = free.
    held: Mutex<HashMap<Resource, RunId>>,
    /// Notified whenever any resource is released.
    freed: Condvar,
}

impl ResourceTable {
    /// Create a table with every resource free.
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            freed: Condvar::new(),
        }
    }

    /// Attempt to atomically lock every resource in `wanted` for `run`.
    ///
    /// Returns `false` — without taking anything — if any single resource is
    /// already held by another run.  Never blocks beyond the table mutex.
    pub fn try_acquire_all(&self, run: RunId, wanted: &BTreeSet<Resource>) -> bool {
        let mut held = self.held.lock().unwrap();
        if Self::blocked(&held, run, wanted) {
            return false;
        }
        for r in wanted {
            held.insert(*r, run);
        }
        true
    }

    /// Like [`try_acquire_all`](Self::try_acquire_all) but waits up to
    /// `timeout` for contended resources to become free.
    ///
    /// Only called from worker threads — never from the trigger-detection
    /// thread, which must not block.
    pub fn acquire_all(
        &self,
        run: RunId,
        wanted: &BTreeSet<Resource>,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock().unwrap();

        while Self::blocked(&held, run, wanted) {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => return false,
            };
            let (guard, wait) = self.freed.wait_timeout(held, remaining).unwrap();
            held = guard;
            if wait.timed_out() && Self::blocked(&held, run, wanted) {
                return false;
            }
        }

        for r in wanted {
            held.insert(*r, run);
        }
        true
    }

    /// Release everything held by `run` and wake any blocked acquirers.
    ///
    /// A no-op when `run` holds nothing, so it is safe to call from cleanup
    /// paths after a failed or partial acquisition.
    pub fn release_all(&self, run: RunId) {
        let mut held = self.held.lock().unwrap();
        let before = held.len();
        held.retain(|_, holder| *holder != run);
        if held.len() != before {
            self.freed.notify_all();
        }
    }

    /// The run currently holding `resource`, if any.
    pub fn holder(&self, resource: Resource) -> Option<RunId> {
        self.held.lock().unwrap().get(&resource).copied()
    }

    /// The subset of `wanted` currently held by other runs.
    pub fn blocked_by(&self, run: RunId, wanted: &BTreeSet<Resource>) -> Vec<Resource> {
        let held = self.held.lock().unwrap();
        wanted
            .iter()
            .filter(|r| matches!(held.get(r), Some(holder) if *holder != run))
            .copied()
            .collect()
    }

    /// `true` when any resource in `wanted` is held by a run other than
    /// `run`.  Caller holds the table mutex.
    fn blocked(held: &HashMap<Resource, RunId>, run: RunId, wanted: &BTreeSet<Resource>) -> bool {
        wanted
            .iter()
            .any(|r| matches!(held.get(r), Some(holder) if *holder != run))
    }
}

impl Default for ResourceTable {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

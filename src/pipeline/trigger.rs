//! Run triggers — "what started this run and how do we know it's done".
//!
//! Every run owns one [`Trigger`].  Stages that block on user action (audio
//! recording waits for the hotkey release) consult it through
//! [`Trigger::wait_for_completion`].
//!
//! Variants:
//! * **Edge** — constructed on a hotkey press edge; completes when the
//!   hotkey listener observes the release edge and calls
//!   [`EdgeTrigger::signal_release`].  That call is the one surface through
//!   which external code pushes state into the core.
//! * **Timer** — a fixed recording duration; the wait *is* the duration, so
//!   it always reports `Completed`.
//! * **Programmatic** — already complete; used by tests and API-driven
//!   invocation.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// TriggerWait
// ---------------------------------------------------------------------------

/// How a [`Trigger::wait_for_completion`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerWait {
    /// The completion signal arrived (or the trigger needs no signal).
    Completed,
    /// The timeout elapsed before the signal.
    TimedOut,
}

// ---------------------------------------------------------------------------
// EdgeTrigger
// ---------------------------------------------------------------------------

/// Completion signal for a hotkey-style press/release pair.
///
/// Cheap to clone; the hotkey listener keeps one clone to signal the release
/// edge while the run owns the other.
#[derive(Clone)]
pub struct EdgeTrigger {
    inner: Arc<EdgeInner>,
}

struct EdgeInner {
    released: Mutex<bool>,
    cond: Condvar,
}

impl EdgeTrigger {
    /// A fresh, unsignalled edge (press observed, release pending).
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EdgeInner {
                released: Mutex::new(false),
                cond: Condvar::new(),
            }),
        }
    }

    /// Mark the release edge as observed and wake any waiter.
    pub fn signal_release(&self) {
        let mut released = self.inner.released.lock().unwrap();
        *released = true;
        self.inner.cond.notify_all();
    }

    /// `true` once the release edge has been signalled.
    pub fn is_released(&self) -> bool {
        *self.inner.released.lock().unwrap()
    }

    /// Block until the release edge fires or `timeout` elapses.
    fn wait(&self, timeout: Duration) -> TriggerWait {
        let deadline = Instant::now() + timeout;
        let mut released = self.inner.released.lock().unwrap();
        while !*released {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => return TriggerWait::TimedOut,
            };
            let (guard, _) = self.inner.cond.wait_timeout(released, remaining).unwrap();
            released = guard;
        }
        TriggerWait::Completed
    }
}

impl Default for EdgeTrigger {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// The event source and completion-signal abstraction bound to one run.
#[derive(Clone)]
pub enum Trigger {
    /// Hotkey press/release pair.
    Edge(EdgeTrigger),
    /// Fixed recording duration.
    Timer(Duration),
    /// Explicit call — already complete.
    Programmatic,
}

impl Trigger {
    /// Block until this trigger's completion condition is met or `timeout`
    /// elapses, whichever comes first.
    ///
    /// A timer trigger sleeps its own duration capped by `timeout` and always
    /// reports [`TriggerWait::Completed`] — the duration itself is the wait,
    /// not a failure.
    pub fn wait_for_completion(&self, timeout: Duration) -> TriggerWait {
        match self {
            Trigger::Edge(edge) => edge.wait(timeout),
            Trigger::Timer(duration) => {
                std::thread::sleep((*duration).min(timeout));
                TriggerWait::Completed
            }
            Trigger::Programmatic => TriggerWait::Completed,
        }
    }

    /// Cancellation-aware wait: like [`wait_for_completion`] but sliced into
    /// `poll`-sized pieces so `cancel` is observed within one poll interval.
    ///
    /// Returns early with the wait state reached so far when `cancel` is set;
    /// the caller is expected to check the flag afterwards and stop its work.
    ///
    /// [`wait_for_completion`]: Self::wait_for_completion
    pub fn wait_cancellable(
        &self,
        timeout: Duration,
        cancel: &AtomicBool,
        poll: Duration,
    ) -> TriggerWait {
        // The timer's own duration bounds its wait; reaching that bound is
        // completion, not a timeout.
        let (deadline_wait, effective) = match self {
            Trigger::Programmatic => return TriggerWait::Completed,
            Trigger::Edge(_) => (TriggerWait::TimedOut, timeout),
            Trigger::Timer(duration) => (TriggerWait::Completed, (*duration).min(timeout)),
        };

        let deadline = Instant::now() + effective;
        loop {
            if cancel.load(Ordering::Relaxed) {
                return TriggerWait::TimedOut;
            }
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => return deadline_wait,
            };
            let slice = remaining.min(poll);
            match self {
                Trigger::Edge(edge) => {
                    if edge.wait(slice) == TriggerWait::Completed {
                        return TriggerWait::Completed;
                    }
                }
                Trigger::Timer(_) => std::thread::sleep(slice),
                Trigger::Programmatic => unreachable!("handled above"),
            }
        }
    }
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Edge(edge) => f
                .debug_struct("Edge")
                .field("released", &edge.is_released())
                .finish(),
            Trigger::Timer(d) => f.debug_tuple("Timer").field(d).finish(),
            Trigger::Programmatic => f.write_str("Programmatic"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn programmatic_completes_immediately() {
        let start = Instant::now();
        let wait = Trigger::Programmatic.wait_for_completion(Duration::from_secs(10));
        assert_eq!(wait, TriggerWait::Completed);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn timer_sleeps_its_duration_and_completes() {
        let start = Instant::now();
        let wait =
            Trigger::Timer(Duration::from_millis(60)).wait_for_completion(Duration::from_secs(10));
        assert_eq!(wait, TriggerWait::Completed);
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn timer_is_capped_by_the_passed_timeout() {
        let start = Instant::now();
        let wait =
            Trigger::Timer(Duration::from_secs(60)).wait_for_completion(Duration::from_millis(40));
        // Still reports completion — the timeout only caps the sleep.
        assert_eq!(wait, TriggerWait::Completed);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn edge_times_out_without_signal() {
        let edge = EdgeTrigger::new();
        let wait = Trigger::Edge(edge).wait_for_completion(Duration::from_millis(40));
        assert_eq!(wait, TriggerWait::TimedOut);
    }

    #[test]
    fn edge_completes_on_signal_from_another_thread() {
        let edge = EdgeTrigger::new();
        let signaller = edge.clone();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            signaller.signal_release();
        });

        let wait = Trigger::Edge(edge.clone()).wait_for_completion(Duration::from_secs(5));
        assert_eq!(wait, TriggerWait::Completed);
        assert!(edge.is_released());
        handle.join().unwrap();
    }

    #[test]
    fn edge_signalled_before_wait_completes_immediately() {
        let edge = EdgeTrigger::new();
        edge.signal_release();
        let wait = Trigger::Edge(edge).wait_for_completion(Duration::from_secs(5));
        assert_eq!(wait, TriggerWait::Completed);
    }

    #[test]
    fn cancellable_wait_observes_cancel_within_a_poll_interval() {
        let edge = EdgeTrigger::new();
        let cancel = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&cancel);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::Relaxed);
        });

        let start = Instant::now();
        Trigger::Edge(edge).wait_cancellable(
            Duration::from_secs(30),
            &cancel,
            Duration::from_millis(20),
        );
        // Must return well before the 30 s timeout: cancel + one poll slice.
        assert!(start.elapsed() < Duration::from_secs(1));
        handle.join().unwrap();
    }
}

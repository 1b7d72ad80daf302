//! Tray-icon state sink.
//!
//! Icon *rendering* is an external concern; the core only needs a place to
//! push state updates from any worker thread without locking.  The update
//! path is a multi-producer single-consumer queue: workers push
//! [`IconCommand`]s through a cheap [`ChannelIconSink`]; one dedicated
//! consumer thread applies them to a caller-supplied render callback.
//!
//! Every [`IconSink`] method is required to be safe (and non-blocking) to
//! call from any worker thread — the channel send never blocks because the
//! queue is unbounded.

use std::sync::mpsc;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// IconState
// ---------------------------------------------------------------------------

/// Visual states of the tray icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconState {
    /// Waiting for a trigger.
    Idle,
    /// A run is capturing audio.
    Recording,
    /// A run is transcribing / post-processing.
    Processing,
    /// A run failed or was rejected (busy resources).
    Error,
    /// The daemon is not serving triggers.
    Disabled,
}

impl IconState {
    /// Stable lowercase name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            IconState::Idle => "idle",
            IconState::Recording => "recording",
            IconState::Processing => "processing",
            IconState::Error => "error",
            IconState::Disabled => "disabled",
        }
    }
}

// ---------------------------------------------------------------------------
// IconSink
// ---------------------------------------------------------------------------

/// Thread-safe sink for icon state updates.
///
/// Implementations must never block the caller; workers hit this from the
/// middle of pipeline runs.
pub trait IconSink: Send + Sync {
    /// Switch the icon to `state`.
    fn set_state(&self, state: IconState);

    /// Switch to `state`, then revert to idle after `revert_after`.
    fn set_state_for(&self, state: IconState, revert_after: Duration);

    /// Begin alternating between `state` and idle until
    /// [`stop_flashing`](Self::stop_flashing).
    fn start_flashing(&self, state: IconState);

    /// Stop a running flash and settle on idle.
    fn stop_flashing(&self);
}

// ---------------------------------------------------------------------------
// IconCommand
// ---------------------------------------------------------------------------

/// Message pushed from workers to the icon consumer thread.
#[derive(Debug, Clone, Copy)]
enum IconCommand {
    Set {
        state: IconState,
        revert_after: Option<Duration>,
    },
    StartFlashing(IconState),
    StopFlashing,
}

// ---------------------------------------------------------------------------
// ChannelIconSink
// ---------------------------------------------------------------------------

/// Producer half of the icon-update queue.  Cheap to clone.
#[derive(Clone)]
pub struct ChannelIconSink {
    tx: mpsc::Sender<IconCommand>,
}

impl IconSink for ChannelIconSink {
    fn set_state(&self, state: IconState) {
        let _ = self.tx.send(IconCommand::Set {
            state,
            revert_after: None,
        });
    }

    fn set_state_for(&self, state: IconState, revert_after: Duration) {
        let _ = self.tx.send(IconCommand::Set {
            state,
            revert_after: Some(revert_after),
        });
    }

    fn start_flashing(&self, state: IconState) {
        let _ = self.tx.send(IconCommand::StartFlashing(state));
    }

    fn stop_flashing(&self) {
        let _ = self.tx.send(IconCommand::StopFlashing);
    }
}

// ---------------------------------------------------------------------------
// IconThread
// ---------------------------------------------------------------------------

/// Flash half-period.
const FLASH_INTERVAL: Duration = Duration::from_millis(400);

/// Handle to the consumer thread.  The thread exits when every
/// [`ChannelIconSink`] clone has been dropped.
pub struct IconThread {
    _thread: std::thread::JoinHandle<()>,
}

/// Spawn the icon consumer thread.
///
/// `render` is called with every state the icon should show, in order, from
/// the consumer thread only — the render surface itself never needs
/// cross-thread locking.
pub fn spawn(render: impl Fn(IconState) + Send + 'static) -> (ChannelIconSink, IconThread) {
    let (tx, rx) = mpsc::channel::<IconCommand>();

    let thread = std::thread::Builder::new()
        .name("icon-sink".into())
        .spawn(move || consume(rx, render))
        .expect("failed to spawn icon-sink thread");

    (ChannelIconSink { tx }, IconThread { _thread: thread })
}

/// Consumer loop: applies commands, drives revert timers and flashing.
fn consume(rx: mpsc::Receiver<IconCommand>, render: impl Fn(IconState)) {
    let mut current = IconState::Idle;
    let mut revert_at: Option<Instant> = None;
    let mut flashing: Option<IconState> = None;
    let mut flash_on = false;

    render(current);

    loop {
        // Wake early enough for the nearest timer (revert or flash toggle).
        let timeout = if flashing.is_some() {
            FLASH_INTERVAL
        } else if let Some(at) = revert_at {
            at.saturating_duration_since(Instant::now())
                .max(Duration::from_millis(10))
        } else {
            Duration::from_secs(3600)
        };

        match rx.recv_timeout(timeout) {
            Ok(IconCommand::Set {
                state,
                revert_after,
            }) => {
                flashing = None;
                current = state;
                revert_at = revert_after.map(|d| Instant::now() + d);
                render(current);
            }
            Ok(IconCommand::StartFlashing(state)) => {
                revert_at = None;
                flashing = Some(state);
                flash_on = true;
                render(state);
            }
            Ok(IconCommand::StopFlashing) => {
                flashing = None;
                current = IconState::Idle;
                render(current);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if let Some(state) = flashing {
                    flash_on = !flash_on;
                    render(if flash_on { state } else { IconState::Idle });
                } else if revert_at.is_some_and(|at| Instant::now() >= at) {
                    revert_at = None;
                    current = IconState::Idle;
                    render(current);
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

// ---------------------------------------------------------------------------
// NullIconSink
// ---------------------------------------------------------------------------

/// Sink that discards every update — for headless runs and tests.
pub struct NullIconSink;

impl IconSink for NullIconSink {
    fn set_state(&self, _state: IconState) {}
    fn set_state_for(&self, _state: IconState, _revert_after: Duration) {}
    fn start_flashing(&self, _state: IconState) {}
    fn stop_flashing(&self) {}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Collects rendered states so tests can assert on the sequence.
    fn recording_render() -> (Arc<Mutex<Vec<IconState>>>, impl Fn(IconState) + Send) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |state| sink.lock().unwrap().push(state))
    }

    fn wait_for(seen: &Arc<Mutex<Vec<IconState>>>, pred: impl Fn(&[IconState]) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if pred(&seen.lock().unwrap()) {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("icon render sequence not observed: {:?}", seen.lock().unwrap());
    }

    #[test]
    fn set_state_reaches_the_render_callback() {
        let (seen, render) = recording_render();
        let (sink, _thread) = spawn(render);

        sink.set_state(IconState::Recording);
        wait_for(&seen, |s| s.contains(&IconState::Recording));
    }

    #[test]
    fn set_state_for_reverts_to_idle() {
        let (seen, render) = recording_render();
        let (sink, _thread) = spawn(render);

        sink.set_state_for(IconState::Error, Duration::from_millis(50));
        wait_for(&seen, |s| {
            // error first, then back to idle
            let err = s.iter().position(|x| *x == IconState::Error);
            match err {
                Some(i) => s[i + 1..].contains(&IconState::Idle),
                None => false,
            }
        });
    }

    #[test]
    fn stop_flashing_settles_on_idle() {
        let (seen, render) = recording_render();
        let (sink, _thread) = spawn(render);

        sink.start_flashing(IconState::Error);
        sink.stop_flashing();
        wait_for(&seen, |s| {
            s.contains(&IconState::Error) && *s.last().unwrap() == IconState::Idle
        });
    }

    /// The producer side must never block, even with no consumer progress.
    #[test]
    fn sends_are_non_blocking() {
        let (_seen, render) = recording_render();
        let (sink, _thread) = spawn(render);

        let start = Instant::now();
        for _ in 0..10_000 {
            sink.set_state(IconState::Processing);
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}

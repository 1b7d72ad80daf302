//! Dedicated OS-thread hotkey listener using `rdev::listen`.
//!
//! `rdev::listen` is a blocking call that must live on its own OS thread.
//! [`HotkeyListener`] owns that thread and a stop flag; dropping it sets the
//! flag so the callback silently ignores further events.
//!
//! # Press / release handling
//!
//! A key press looks up the binding name and hands the pipeline manager an
//! [`EdgeTrigger`] clone via [`PipelineManager::on_trigger`].  While a run
//! admitted on that key is still holding its edge, OS key-repeat presses of
//! the same key are ignored.  The matching key release signals the edge so a
//! recording stage blocked on it can stop.
//!
//! # Shutdown caveat
//!
//! `rdev::listen` has **no graceful shutdown API**.  Setting the stop flag
//! prevents events from being forwarded, but the OS thread itself will remain
//! blocked in the rdev event loop until the process exits.  This is safe and
//! expected — rdev holds no resources that need explicit cleanup.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use crate::pipeline::{EdgeTrigger, PipelineManager, Trigger};

// ---------------------------------------------------------------------------
// HotkeyListener
// ---------------------------------------------------------------------------

/// Handle to a running hotkey listener thread.
///
/// Construct one with [`HotkeyListener::start`].  Drop it to stop forwarding
/// events.
///
/// The underlying OS thread will continue to exist until the process exits
/// because `rdev::listen` cannot be interrupted, but it will silently discard
/// all events once the stop flag is set.
pub struct HotkeyListener {
    /// Shared stop flag — set `true` on [`Drop`].
    stop: Arc<AtomicBool>,
    /// The thread handle.  Kept alive so the thread is not detached
    /// prematurely; we never `join` it because `rdev::listen` never returns.
    _thread: std::thread::JoinHandle<()>,
}

impl HotkeyListener {
    /// Spawn a dedicated OS thread that listens for global key events and
    /// starts the bound pipeline whenever one of `keys` is pressed.
    ///
    /// # Arguments
    ///
    /// * `keys` — Map from [`rdev::Key`] to the binding name the manager
    ///   knows it by (the config's hotkey string).  Use
    ///   [`crate::hotkey::parse_key`] to build this from
    ///   [`PipelineManager::bindings`].
    /// * `manager` — The pipeline manager driven by the key events.
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses to create the thread (extremely unlikely).
    pub fn start(keys: HashMap<rdev::Key, String>, manager: Arc<PipelineManager>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || {
                // Edges for keys whose press was admitted and whose release
                // has not yet been seen.  Guards against OS key-repeat.
                let held: Mutex<HashMap<rdev::Key, EdgeTrigger>> = Mutex::new(HashMap::new());

                let result = rdev::listen(move |event| {
                    // Bail out if the listener has been stopped.
                    if stop_clone.load(Ordering::Relaxed) {
                        return;
                    }

                    match event.event_type {
                        rdev::EventType::KeyPress(k) => {
                            let Some(binding) = keys.get(&k) else { return };
                            let mut held = held.lock().unwrap();
                            if held.contains_key(&k) {
                                // Key-repeat while the run is in flight.
                                return;
                            }
                            let edge = EdgeTrigger::new();
                            if manager
                                .on_trigger(binding, Trigger::Edge(edge.clone()))
                                .is_some()
                            {
                                held.insert(k, edge);
                            }
                        }
                        rdev::EventType::KeyRelease(k) => {
                            if let Some(edge) = held.lock().unwrap().remove(&k) {
                                edge.signal_release();
                            }
                        }
                        _ => {}
                    }
                });

                if let Err(e) = result {
                    log::error!("hotkey-listener: rdev::listen exited with error: {:?}", e);
                }
            })
            .expect("failed to spawn hotkey-listener thread");

        Self {
            stop,
            _thread: thread,
        }
    }
}

impl Drop for HotkeyListener {
    /// Set the stop flag so the rdev callback stops forwarding events.
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // The OS thread continues to exist blocked inside rdev::listen until
        // the process exits.
    }
}

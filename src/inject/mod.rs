//! Text injection — clipboard-based typing into the focused window.
//!
//! # Overview
//!
//! Raw key-event injection mangles text in many apps (IME interference,
//! layout differences, combining characters), so injection goes through the
//! clipboard instead:
//!
//! 1. **Save** the original clipboard content.
//! 2. **Set** the transcript into the clipboard.
//! 3. **Simulate** Ctrl+V (or ⌘V on macOS) to paste into the focused window.
//! 4. **Restore** the original clipboard content (best-effort).
//!
//! # Usage
//!
//! ```no_run
//! use voxflow::inject::{ClipboardInjector, TextInjector};
//!
//! let injector = ClipboardInjector::new();
//! injector.inject("hello world").expect("injection failed");
//! ```

pub mod clipboard;
pub mod keyboard;

pub use clipboard::{restore_clipboard, save_clipboard, set_clipboard};
pub use keyboard::simulate_paste;

use thiserror::Error;

// ---------------------------------------------------------------------------
// InjectError
// ---------------------------------------------------------------------------

/// All errors that can surface during text injection.
#[derive(Debug, Error)]
pub enum InjectError {
    /// Could not open or read the system clipboard.
    #[error("cannot access clipboard: {0}")]
    ClipboardAccess(String),

    /// Could not write text to the system clipboard.
    #[error("cannot set clipboard text: {0}")]
    ClipboardSet(String),

    /// Could not simulate a key press/release event.
    #[error("cannot simulate key press: {0}")]
    KeySimulation(String),
}

// ---------------------------------------------------------------------------
// TextInjector trait
// ---------------------------------------------------------------------------

/// Object-safe interface for delivering text to the focused window.
///
/// Implementations must be `Send + Sync` so they can be held behind an
/// `Arc<dyn TextInjector>` and called from blocking worker threads.
pub trait TextInjector: Send + Sync {
    /// Deliver `text` to the currently focused window.
    fn inject(&self, text: &str) -> Result<(), InjectError>;
}

// ---------------------------------------------------------------------------
// ClipboardInjector
// ---------------------------------------------------------------------------

/// Clipboard-paste injector with configurable inter-step delays.
///
/// Raise the delays on slow systems or for apps with sluggish clipboard
/// handling.
#[derive(Debug, Clone)]
pub struct ClipboardInjector {
    /// Milliseconds to wait after setting the clipboard before simulating
    /// paste.
    pub delay_ms: u64,
    /// Milliseconds to wait after simulating paste before restoring the
    /// original clipboard.
    pub restore_delay_ms: u64,
}

impl Default for ClipboardInjector {
    fn default() -> Self {
        Self {
            delay_ms: 50,
            restore_delay_ms: 100,
        }
    }
}

impl ClipboardInjector {
    /// Create a `ClipboardInjector` with the default delays (50 ms / 100 ms).
    pub fn new() -> Self {
        Self::default()
    }
}

impl TextInjector for ClipboardInjector {
    /// Full clipboard-paste sequence.
    ///
    /// Steps (in order):
    /// 1. Save the current clipboard plain-text content.
    /// 2. Write `text` into the clipboard.
    /// 3. Wait `delay_ms` (clipboard flush).
    /// 4. Simulate Ctrl+V / ⌘V.
    /// 5. Wait `restore_delay_ms` (let the target app complete the paste).
    /// 6. Restore the original clipboard content (best-effort; errors
    ///    ignored).
    ///
    /// # Errors
    ///
    /// Returns the first [`InjectError`] encountered in steps 1–4.  The
    /// restore in step 6 is always attempted but its result is discarded.
    fn inject(&self, text: &str) -> Result<(), InjectError> {
        let saved = save_clipboard()?;
        set_clipboard(text)?;
        std::thread::sleep(std::time::Duration::from_millis(self.delay_ms));
        simulate_paste()?;
        std::thread::sleep(std::time::Duration::from_millis(self.restore_delay_ms));
        let _ = restore_clipboard(saved);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockInjector  (test-only)
// ---------------------------------------------------------------------------

/// Test double that records injected text instead of touching the OS.
#[cfg(test)]
pub struct MockInjector {
    /// Everything passed to [`TextInjector::inject`], in call order.
    pub injected: std::sync::Mutex<Vec<String>>,
    /// When `true`, every call fails with [`InjectError::KeySimulation`].
    pub fail: bool,
}

#[cfg(test)]
impl MockInjector {
    pub fn new() -> Self {
        Self {
            injected: std::sync::Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            injected: std::sync::Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[cfg(test)]
impl TextInjector for MockInjector {
    fn inject(&self, text: &str) -> Result<(), InjectError> {
        if self.fail {
            return Err(InjectError::KeySimulation("mock failure".into()));
        }
        self.injected.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delays_are_sane() {
        let injector = ClipboardInjector::new();
        assert_eq!(injector.delay_ms, 50);
        assert_eq!(injector.restore_delay_ms, 100);
    }

    #[test]
    fn mock_records_injected_text_in_order() {
        let injector = MockInjector::new();
        injector.inject("first").unwrap();
        injector.inject("second").unwrap();
        assert_eq!(
            *injector.injected.lock().unwrap(),
            vec!["first".to_string(), "second".to_string()]
        );
    }

    #[test]
    fn failing_mock_returns_key_simulation_error() {
        let injector = MockInjector::failing();
        let err = injector.inject("text").unwrap_err();
        assert!(matches!(err, InjectError::KeySimulation(_)));
        assert!(injector.injected.lock().unwrap().is_empty());
    }

    /// If this test compiles, the trait is object-safe.
    #[test]
    fn injector_is_object_safe() {
        let injector: Box<dyn TextInjector> = Box::new(MockInjector::new());
        let _ = injector.inject("text");
    }
}

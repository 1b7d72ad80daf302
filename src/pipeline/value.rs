//! Stage value model and transient resources.
//!
//! Stages are user-composable, so the data flowing between them is a closed
//! tagged set: [`Value`] with one variant per payload kind, and [`ValueType`]
//! as the type tag the registry validates against at load time.
//!
//! # Skip vs. failure
//!
//! A stage signals *skip* by returning its declared absent value
//! (`Value::Audio(None)` / `Value::Text(None)`); downstream stages pass the
//! absence along.  A stage signals *failure* only through
//! `Err(StageError)`.  The two are distinguishable at the type level and
//! must never be conflated.
//!
//! # Transient resources
//!
//! A [`TransientResource`] is a short-lived owned object (a temp audio file)
//! with a single idempotent [`release`](TransientResource::release)
//! operation.  The executor is the sole owner of the obligation to release
//! every transient created during a run; stages never call `release`
//! themselves.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

// ---------------------------------------------------------------------------
// ValueType
// ---------------------------------------------------------------------------

/// Type tag for the values threaded between stages.
///
/// Declared by every stage for its input and output; the registry checks
/// adjacent pairs at load time and the executor re-checks the returned
/// variant at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// No payload — the input of a first stage and the output of a terminal
    /// stage.
    Unit,
    /// A recorded audio clip (or its declared absence).
    Audio,
    /// A text transcript (or its declared absence).
    Text,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ValueType::Unit => "unit",
            ValueType::Audio => "audio",
            ValueType::Text => "text",
        })
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A value passed from one stage to the next.
///
/// The audio payload is an `Arc` because the same clip is both handed
/// downstream and appended to the executor's cleanup ledger.
#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Audio(Option<Arc<TempAudioFile>>),
    Text(Option<String>),
}

impl Value {
    /// The type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Unit => ValueType::Unit,
            Value::Audio(_) => ValueType::Audio,
            Value::Text(_) => ValueType::Text,
        }
    }

    /// The transient resource carried by this value, if any.
    pub fn transient(&self) -> Option<Arc<dyn TransientResource>> {
        match self {
            Value::Audio(Some(clip)) => Some(Arc::clone(clip) as Arc<dyn TransientResource>),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// CleanupError
// ---------------------------------------------------------------------------

/// A release operation on a transient resource failed.
///
/// Logged as a warning by the executor; never changes a run's terminal
/// status and never stops remaining cleanups.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("failed to remove {path}: {source}")]
    RemoveFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// TransientResource
// ---------------------------------------------------------------------------

/// A short-lived owned object requiring explicit release.
///
/// `release` must be idempotent: the first call performs the cleanup, every
/// later call is a no-op.  Implementations must be `Send + Sync` because the
/// release runs on whichever worker thread finishes the run.
pub trait TransientResource: Send + Sync {
    /// Human-readable identity for logs.
    fn describe(&self) -> String;

    /// Release the resource.  Idempotent.
    fn release(&self) -> Result<(), CleanupError>;
}

// ---------------------------------------------------------------------------
// TempAudioFile
// ---------------------------------------------------------------------------

/// A recorded WAV file in the temp directory, deleted by the executor's
/// cleanup ledger when the run reaches a terminal state.
#[derive(Debug)]
pub struct TempAudioFile {
    path: PathBuf,
    duration_secs: f32,
    released: AtomicBool,
}

impl TempAudioFile {
    pub fn new(path: PathBuf, duration_secs: f32) -> Self {
        Self {
            path,
            duration_secs,
            released: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn duration_secs(&self) -> f32 {
        self.duration_secs
    }
}

impl TransientResource for TempAudioFile {
    fn describe(&self) -> String {
        format!(
            "temp audio file {} ({:.2}s)",
            self.path.display(),
            self.duration_secs
        )
    }

    /// Delete the file.  The first call wins; a file already gone (or never
    /// written) is not an error.
    fn release(&self) -> Result<(), CleanupError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                log::debug!("cleaned up temp file: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CleanupError::RemoveFile {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn value_type_tags_match_variants() {
        assert_eq!(Value::Unit.value_type(), ValueType::Unit);
        assert_eq!(Value::Audio(None).value_type(), ValueType::Audio);
        assert_eq!(Value::Text(None).value_type(), ValueType::Text);
        assert_eq!(
            Value::Text(Some("hello".into())).value_type(),
            ValueType::Text
        );
    }

    #[test]
    fn transient_only_on_present_audio() {
        assert!(Value::Unit.transient().is_none());
        assert!(Value::Audio(None).transient().is_none());
        assert!(Value::Text(Some("t".into())).transient().is_none());

        let clip = Arc::new(TempAudioFile::new("/nonexistent/a.wav".into(), 1.0));
        assert!(Value::Audio(Some(clip)).transient().is_some());
    }

    #[test]
    fn release_removes_file_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let clip = TempAudioFile::new(path.clone(), 0.5);
        clip.release().unwrap();
        assert!(!path.exists());

        // Second release is a no-op, not an error.
        clip.release().unwrap();
    }

    #[test]
    fn release_of_missing_file_is_ok() {
        let dir = tempdir().unwrap();
        let clip = TempAudioFile::new(dir.path().join("never-written.wav"), 0.0);
        clip.release().unwrap();
    }
}

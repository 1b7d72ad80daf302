//! `record_audio` — capture microphone audio until the trigger completes.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::{
    Resource, Stage, StageContext, StageError, TempAudioFile, TriggerWait, Value, ValueType,
};
use crate::tray::IconState;

/// Hard ceiling and floor for clip length, overridable per pipeline.
const DEFAULT_MAX_SECS: f64 = 30.0;
const DEFAULT_MIN_SECS: f64 = 0.5;

/// How often the recording wait re-checks the cancel flag.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Records from the default input device for as long as the trigger is
/// active (hotkey held, timer running), bounded by `max_duration` seconds.
///
/// Parameters:
/// * `max_duration` — clip ceiling in seconds (default 30).
/// * `min_duration` — clips shorter than this are dropped and the run
///   continues with `audio(none)` (default 0.5).
pub struct RecordAudioStage;

impl Stage for RecordAudioStage {
    fn name(&self) -> &'static str {
        "record_audio"
    }

    fn description(&self) -> &'static str {
        "capture microphone audio until the trigger completes"
    }

    fn input_type(&self) -> ValueType {
        ValueType::Unit
    }

    fn output_type(&self) -> ValueType {
        ValueType::Audio
    }

    fn required_resources(&self) -> BTreeSet<Resource> {
        [Resource::AudioInput].into_iter().collect()
    }

    fn execute(&self, _input: Value, ctx: &mut StageContext) -> Result<Value, StageError> {
        let max_secs = ctx.params.f64_or("max_duration", DEFAULT_MAX_SECS);
        let min_secs = ctx.params.f64_or("min_duration", DEFAULT_MIN_SECS);

        let recorder = Arc::clone(&ctx.backends.recorder);
        recorder.start()?;
        ctx.icon.set_state(IconState::Recording);

        let wait = ctx.trigger.wait_cancellable(
            Duration::from_secs_f64(max_secs),
            ctx.cancel_flag(),
            CANCEL_POLL,
        );
        if wait == TriggerWait::TimedOut && !ctx.cancelled() {
            log::warn!("record_audio: clip truncated at {max_secs:.0}s ceiling");
        }

        // Always stop the device, even when cancelled mid-wait.
        let clip = recorder.stop()?;
        ctx.icon.set_state(IconState::Processing);

        ctx.metadata
            .insert("clip_secs".into(), format!("{:.2}", clip.duration_secs));

        let file = Arc::new(TempAudioFile::new(clip.path, clip.duration_secs));
        if f64::from(clip.duration_secs) < min_secs {
            log::info!(
                "record_audio: clip too short ({:.2}s < {min_secs:.2}s), skipping",
                clip.duration_secs
            );
            // The file never flows downstream, so park it in the ledger.
            ctx.register_cleanup(file);
            return Ok(Value::Audio(None));
        }

        log::debug!(
            "record_audio: captured {:.2}s clip at {}",
            file.duration_secs(),
            file.path().display()
        );
        Ok(Value::Audio(Some(file)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! `transcribe` — turn a recorded clip into raw text via the STT backend.

use std::collections::BTreeSet;

use crate::pipeline::{Resource, Stage, StageContext, StageError, Value, ValueType};
use crate::tray::IconState;

/// Runs Whisper inference on the clip produced upstream.
///
/// Parameters:
/// * `language` — ISO-639-1 override for this pipeline; defaults to the
///   app-wide language.
///
/// `audio(none)` passes straight through as `text(none)`.  An empty
/// transcript (silence, breath noise) is also a skip, not a failure.
pub struct TranscribeStage;

impl Stage for TranscribeStage {
    fn name(&self) -> &'static str {
        "transcribe"
    }

    fn description(&self) -> &'static str {
        "speech-to-text over the recorded clip"
    }

    fn input_type(&self) -> ValueType {
        ValueType::Audio
    }

    fn output_type(&self) -> ValueType {
        ValueType::Text
    }

    fn required_resources(&self) -> BTreeSet<Resource> {
        BTreeSet::new()
    }

    fn execute(&self, input: Value, ctx: &mut StageContext) -> Result<Value, StageError> {
        let clip = match input {
            Value::Audio(Some(clip)) => clip,
            _ => return Ok(Value::Text(None)),
        };

        ctx.icon.set_state(IconState::Processing);

        let language = ctx
            .params
            .str_or("language", &ctx.backends.language)
            .to_string();
        let history = ctx.metadata.get("history").cloned();

        let text = ctx.backends.transcriber.transcribe(
            clip.path(),
            &language,
            history.as_deref(),
        )?;

        let text = text.trim().to_string();
        if text.is_empty() {
            log::info!("transcribe: empty transcript, skipping rest of run");
            return Ok(Value::Text(None));
        }

        log::debug!("transcribe: {} chars ({language})", text.len());
        ctx.metadata.insert("raw_text".into(), text.clone());
        Ok(Value::Text(Some(text)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::test_backends;
    use crate::pipeline::{StageParams, TempAudioFile, Trigger};
    use crate::tray::NullIconSink;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn context() -> StageContext {
        StageContext::new(
            Trigger::Programmatic,
            Arc::new(AtomicBool::new(false)),
            Arc::new(NullIconSink),
            test_backends(),
        )
    }

    fn clip_value() -> Value {
        Value::Audio(Some(Arc::new(TempAudioFile::new(
            "/tmp/absent-clip.wav".into(),
            1.0,
        ))))
    }

    #[test]
    fn transcript_flows_downstream() {
        let mut ctx = context();
        let value = TranscribeStage.execute(clip_value(), &mut ctx).unwrap();
        assert!(matches!(value, Value::Text(Some(ref t)) if t == "hello"));
        assert_eq!(ctx.metadata.get("raw_text").unwrap(), "hello");
    }

    #[test]
    fn absent_audio_passes_through_as_absent_text() {
        let mut ctx = context();
        let value = TranscribeStage
            .execute(Value::Audio(None), &mut ctx)
            .unwrap();
        assert!(matches!(value, Value::Text(None)));
        assert!(ctx.metadata.get("raw_text").is_none());
    }

    #[test]
    fn empty_transcript_becomes_a_skip() {
        use crate::stt::MockTranscriber;

        // Whitespace-only output from the engine counts as silence.
        let mut backends = crate::pipeline::testing::test_backends();
        Arc::get_mut(&mut backends)
            .map(|b| b.transcriber = Arc::new(MockTranscriber::ok("   ")))
            .unwrap();
        let mut ctx = StageContext::new(
            Trigger::Programmatic,
            Arc::new(AtomicBool::new(false)),
            Arc::new(NullIconSink),
            backends,
        );

        let value = TranscribeStage.execute(clip_value(), &mut ctx).unwrap();
        assert!(matches!(value, Value::Text(None)));
    }

    #[test]
    fn language_param_overrides_app_default() {
        let mut ctx = context();
        ctx.params =
            StageParams::new("language = \"de\"".parse::<toml::Table>().unwrap());
        // MockTranscriber ignores language; this only checks the stage does
        // not choke on the override path.
        let value = TranscribeStage.execute(clip_value(), &mut ctx).unwrap();
        assert!(matches!(value, Value::Text(Some(_))));
    }
}

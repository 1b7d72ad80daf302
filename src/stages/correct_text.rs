//! `correct_text` — best-effort LLM cleanup of the raw transcript.

use std::collections::BTreeSet;

use crate::pipeline::{Resource, Stage, StageContext, StageError, Value, ValueType};

/// Sends the transcript to the configured LLM endpoint for punctuation and
/// homophone fixes.
///
/// Correction is advisory: any LLM failure (endpoint down, timeout, empty
/// reply) logs a warning and the raw transcript continues downstream
/// unchanged.  The stage drives the async corrector from this blocking
/// worker thread via the runtime handle.
pub struct CorrectTextStage;

impl Stage for CorrectTextStage {
    fn name(&self) -> &'static str {
        "correct_text"
    }

    fn description(&self) -> &'static str {
        "LLM cleanup of the raw transcript"
    }

    fn input_type(&self) -> ValueType {
        ValueType::Text
    }

    fn output_type(&self) -> ValueType {
        ValueType::Text
    }

    fn required_resources(&self) -> BTreeSet<Resource> {
        BTreeSet::new()
    }

    fn execute(&self, input: Value, ctx: &mut StageContext) -> Result<Value, StageError> {
        let raw = match input {
            Value::Text(Some(text)) => text,
            _ => return Ok(Value::Text(None)),
        };

        let corrector = std::sync::Arc::clone(&ctx.backends.corrector);
        let corrected = ctx
            .backends
            .runtime
            .block_on(async { corrector.correct(&raw, None).await });

        let text = match corrected {
            Ok(text) => {
                log::debug!("correct_text: {} -> {} chars", raw.len(), text.len());
                text
            }
            Err(e) => {
                log::warn!("correct_text: correction failed ({e}), keeping raw text");
                raw
            }
        };

        ctx.metadata.insert("corrected_text".into(), text.clone());
        Ok(Value::Text(Some(text)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockCorrector;
    use crate::pipeline::testing::test_backends;
    use crate::pipeline::Trigger;
    use crate::tray::NullIconSink;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn context_with(corrector: MockCorrector) -> StageContext {
        let mut backends = test_backends();
        Arc::get_mut(&mut backends)
            .map(|b| b.corrector = Arc::new(corrector))
            .unwrap();
        StageContext::new(
            Trigger::Programmatic,
            Arc::new(AtomicBool::new(false)),
            Arc::new(NullIconSink),
            backends,
        )
    }

    #[test]
    fn corrected_text_replaces_the_raw_text() {
        let mut ctx = context_with(MockCorrector::echo_upper());
        let value = CorrectTextStage
            .execute(Value::Text(Some("hello".into())), &mut ctx)
            .unwrap();
        assert!(matches!(value, Value::Text(Some(ref t)) if t == "HELLO"));
        assert_eq!(ctx.metadata.get("corrected_text").unwrap(), "HELLO");
    }

    /// A dead LLM endpoint must not fail the run.
    #[test]
    fn failure_falls_back_to_the_raw_text() {
        let mut ctx = context_with(MockCorrector::failing());
        let value = CorrectTextStage
            .execute(Value::Text(Some("hello".into())), &mut ctx)
            .unwrap();
        assert!(matches!(value, Value::Text(Some(ref t)) if t == "hello"));
    }

    #[test]
    fn absent_text_passes_through() {
        let mut ctx = context_with(MockCorrector::echo_upper());
        let value = CorrectTextStage
            .execute(Value::Text(None), &mut ctx)
            .unwrap();
        assert!(matches!(value, Value::Text(None)));
    }
}

//! `type_text` — deliver the final transcript to the focused window.

use std::collections::BTreeSet;

use crate::pipeline::{Resource, Stage, StageContext, StageError, Value, ValueType};

/// Pastes the transcript into whatever window has focus, holding both the
/// clipboard and the keyboard for the run so concurrent pipelines cannot
/// interleave their output.
pub struct TypeTextStage;

impl Stage for TypeTextStage {
    fn name(&self) -> &'static str {
        "type_text"
    }

    fn description(&self) -> &'static str {
        "paste the transcript into the focused window"
    }

    fn input_type(&self) -> ValueType {
        ValueType::Text
    }

    fn output_type(&self) -> ValueType {
        ValueType::Unit
    }

    fn required_resources(&self) -> BTreeSet<Resource> {
        [Resource::Clipboard, Resource::Keyboard]
            .into_iter()
            .collect()
    }

    fn execute(&self, input: Value, ctx: &mut StageContext) -> Result<Value, StageError> {
        let text = match input {
            Value::Text(Some(text)) => text,
            _ => {
                log::debug!("type_text: nothing to inject");
                return Ok(Value::Unit);
            }
        };

        ctx.backends.injector.inject(&text)?;
        log::info!("type_text: injected {} chars", text.chars().count());
        Ok(Value::Unit)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::MockInjector;
    use crate::pipeline::testing::test_backends;
    use crate::pipeline::Trigger;
    use crate::tray::NullIconSink;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn context_with(injector: Arc<MockInjector>) -> StageContext {
        let mut backends = test_backends();
        Arc::get_mut(&mut backends)
            .map(|b| b.injector = injector)
            .unwrap();
        StageContext::new(
            Trigger::Programmatic,
            Arc::new(AtomicBool::new(false)),
            Arc::new(NullIconSink),
            backends,
        )
    }

    #[test]
    fn injects_the_transcript() {
        let injector = Arc::new(MockInjector::new());
        let mut ctx = context_with(injector.clone());

        let value = TypeTextStage
            .execute(Value::Text(Some("hello world".into())), &mut ctx)
            .unwrap();
        assert!(matches!(value, Value::Unit));
        assert_eq!(*injector.injected.lock().unwrap(), vec!["hello world"]);
    }

    #[test]
    fn absent_text_injects_nothing() {
        let injector = Arc::new(MockInjector::new());
        let mut ctx = context_with(injector.clone());

        let value = TypeTextStage.execute(Value::Text(None), &mut ctx).unwrap();
        assert!(matches!(value, Value::Unit));
        assert!(injector.injected.lock().unwrap().is_empty());
    }

    #[test]
    fn injector_failure_fails_the_stage() {
        let mut ctx = context_with(Arc::new(MockInjector::failing()));
        let err = TypeTextStage
            .execute(Value::Text(Some("hello".into())), &mut ctx)
            .unwrap_err();
        assert!(matches!(err, StageError::Inject(_)));
    }
}

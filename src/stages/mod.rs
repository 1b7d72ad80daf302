//! Built-in pipeline stages.
//!
//! | stage           | input | output | resources            |
//! |-----------------|-------|--------|----------------------|
//! | `record_audio`  | unit  | audio  | audio-input          |
//! | `transcribe`    | audio | text   | —                    |
//! | `correct_typos` | text  | text   | —                    |
//! | `correct_text`  | text  | text   | —                    |
//! | `type_text`     | text  | unit   | clipboard, keyboard  |
//!
//! Every stage treats an absent value (`audio(none)` / `text(none)`) as
//! "nothing to do" and passes the absence along; an `Err` is reserved for
//! real faults.

pub mod correct_text;
pub mod correct_typos;
pub mod record_audio;
pub mod transcribe;
pub mod type_text;

pub use correct_text::CorrectTextStage;
pub use correct_typos::CorrectTyposStage;
pub use record_audio::RecordAudioStage;
pub use transcribe::TranscribeStage;
pub use type_text::TypeTextStage;

use crate::pipeline::StageRegistry;

/// Registry with every built-in stage registered.
pub fn builtin() -> StageRegistry {
    let mut registry = StageRegistry::new();
    // Built-in names are distinct by construction.
    registry
        .register(std::sync::Arc::new(RecordAudioStage))
        .expect("builtin registration");
    registry
        .register(std::sync::Arc::new(TranscribeStage))
        .expect("builtin registration");
    registry
        .register(std::sync::Arc::new(CorrectTyposStage))
        .expect("builtin registration");
    registry
        .register(std::sync::Arc::new(CorrectTextStage))
        .expect("builtin registration");
    registry
        .register(std::sync::Arc::new(TypeTextStage))
        .expect("builtin registration");
    registry
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! STT (Speech-to-Text) engine module.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 Transcriber (trait)                  │
//! │                                                      │
//! │              ┌────────────────────┐                  │
//! │              │ WhisperTranscriber │                  │
//! │              │ - ctx              │                  │
//! │              │ - params           │                  │
//! │              └─────────┬──────────┘                  │
//! │                        │                             │
//! │                        ▼                             │
//! │              ┌──────────────────┐                    │
//! │              │  transcribe()    │                    │
//! │              │  WAV clip → text │                    │
//! │              └──────────────────┘                    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use voxflow::stt::{WhisperTranscriber, TranscribeParams, Transcriber};
//!
//! let params = TranscribeParams::default(); // language = "en", Greedy { best_of: 1 }
//! let engine = WhisperTranscriber::load("models/ggml-base.en.bin", params)
//!     .expect("model not found — download one first");
//!
//! let text = engine
//!     .transcribe("clip.wav".as_ref(), "en", None)
//!     .unwrap();
//! println!("{text}");
//! ```

pub mod engine;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use engine::{
    SamplingStrategy, Segment, SttError, TranscribeParams, TranscriptionResult, Transcriber,
    WhisperTranscriber,
};

// test-only re-export so pipeline test modules can import the mock without
// reaching into `engine` directly.
#[cfg(test)]
pub use engine::MockTranscriber;

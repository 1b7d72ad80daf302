//! voxflow — local push-to-talk dictation built on a concurrent pipeline
//! engine.
//!
//! A global hotkey press records audio, Whisper transcribes it locally, an
//! optional LLM pass cleans the transcript, and the result is typed into the
//! focused application.  Each of those steps is a [`pipeline::Stage`]; the
//! [`pipeline::PipelineManager`] runs configured stage chains concurrently
//! while a resource table keeps runs that need the same microphone or
//! clipboard from trampling each other.
//!
//! # Module map
//!
//! | Module       | Responsibility                                          |
//! |--------------|---------------------------------------------------------|
//! | [`audio`]    | cpal capture, downmix/resample, WAV clips               |
//! | [`config`]   | `settings.toml` (pipelines, STT, LLM), app paths        |
//! | [`hotkey`]   | global key listener (rdev) driving the manager          |
//! | [`inject`]   | clipboard-paste text injection (arboard + enigo)        |
//! | [`llm`]      | OpenAI-compatible transcript correction                 |
//! | [`pipeline`] | the engine: stages, resources, triggers, executor       |
//! | [`stages`]   | the built-in stages wired to the backends               |
//! | [`stt`]      | whisper-rs transcription                                |
//! | [`tray`]     | status icon state machine                               |

pub mod audio;
pub mod config;
pub mod hotkey;
pub mod inject;
pub mod llm;
pub mod pipeline;
pub mod stages;
pub mod stt;
pub mod tray;

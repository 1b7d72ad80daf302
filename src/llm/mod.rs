//! LLM post-correction of raw transcripts.
//!
//! This module provides:
//! * [`LlmCorrector`] — async trait implemented by all corrector backends.
//! * [`ApiCorrector`] — OpenAI-compatible REST API corrector.
//! * [`PromptBuilder`] — builds the correction chat prompts.
//! * [`LlmError`] — error variants for LLM operations.
//!
//! Correction is best-effort: the stage that calls into this module falls
//! back to the raw transcript when the endpoint is unreachable or times
//! out, so a dead local LLM never blocks dictation.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use voxflow::config::AppConfig;
//! use voxflow::llm::{ApiCorrector, LlmCorrector};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let corrector = ApiCorrector::from_config(&config.llm);
//!
//!     let raw = "um the deploy uh finished";
//!     match corrector.correct(raw, None).await {
//!         Ok(fixed) => println!("{fixed}"),
//!         Err(e) => println!("correction failed ({e}), keeping raw text"),
//!     }
//! }
//! ```

pub mod corrector;
pub mod prompt;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use corrector::{ApiCorrector, LlmCorrector, LlmError};
pub use prompt::PromptBuilder;

#[cfg(test)]
pub use corrector::MockCorrector;

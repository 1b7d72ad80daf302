//! Configuration module for voxflow.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! pipeline definitions, `AppPaths` for cross-platform data directories, and
//! TOML persistence via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AudioConfig, LlmConfig, LlmProvider, PipelineConfig, SttConfig, StageConfig,
};

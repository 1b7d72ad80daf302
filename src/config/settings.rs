//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// LlmProvider
// ---------------------------------------------------------------------------

/// Selects which LLM backend handles post-correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LlmProvider {
    /// Ollama running locally — no authentication required.
    Ollama,
    /// Any OpenAI-compatible REST API (OpenAI, Groq, Together.ai, LM Studio …).
    OpenAiCompatible,
    /// LLM disabled — transcripts are injected uncorrected.
    Disabled,
}

impl Default for LlmProvider {
    fn default() -> Self {
        Self::Ollama
    }
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Settings for the LLM post-correction step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Whether the default pipeline includes the correction stage.
    pub enabled: bool,
    /// Which backend to use.
    pub provider: LlmProvider,
    /// Base URL of the API endpoint.
    ///
    /// - Ollama default: `http://localhost:11434`
    /// - OpenAI: `https://api.openai.com`
    pub base_url: String,
    /// API key — `None` for local providers.
    pub api_key: Option<String>,
    /// Model identifier sent to the API (e.g. `"qwen2.5:3b"`, `"gpt-4o-mini"`).
    pub model: String,
    /// Language the correction prompt should preserve.
    pub language: String,
    /// Sampling temperature (0.0 – 1.0).  Lower = more deterministic.
    pub temperature: f32,
    /// Maximum seconds to wait for an LLM response before timing out.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: LlmProvider::default(),
            base_url: "http://localhost:11434".into(),
            api_key: None,
            model: "qwen2.5:3b".into(),
            language: "en".into(),
            temperature: 0.3,
            timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Settings for the Whisper STT engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// GGML model name / file stem (e.g. `"base.en"`, `"small"`).  The
    /// model file is expected at `<models_dir>/ggml-<model>.bin`.
    pub model: String,
    /// Primary speech language as an ISO-639-1 code, or `"auto"` for
    /// Whisper's built-in language detection.
    pub language: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: "base.en".into(),
            language: "en".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Clip-length bounds applied to the default dictation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Clips shorter than this are dropped (accidental key taps).
    pub min_clip_secs: f64,
    /// Recording stops automatically after this many seconds.
    pub max_clip_secs: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            min_clip_secs: 0.5,
            max_clip_secs: 30.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline definitions
// ---------------------------------------------------------------------------

/// One stage entry inside a pipeline definition.  Every key besides
/// `stage` is collected into `params` and handed to the stage untouched:
///
/// ```toml
/// [[pipelines.stages]]
/// stage = "record_audio"
/// max_duration = 10.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Registered stage name.
    pub stage: String,
    #[serde(flatten)]
    pub params: toml::value::Table,
}

/// A named stage chain bound to a hotkey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Key name understood by the hotkey listener (e.g. `"F9"`).  `None`
    /// means the pipeline can only be started programmatically.
    #[serde(default)]
    pub hotkey: Option<String>,
    pub stages: Vec<StageConfig>,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voxflow::config::AppConfig;
///
/// // Load (returns the default configuration when the file is missing)
/// let config = AppConfig::load().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// STT engine settings.
    pub stt: SttConfig,
    /// LLM post-correction settings.
    pub llm: LlmConfig,
    /// Clip-length bounds for the default pipeline.
    pub audio: AudioConfig,
    /// Maximum number of pipeline runs executing at once.
    pub workers: usize,
    /// Pipeline definitions.  When the file declares none, the default
    /// `dictate` pipeline on F9 is synthesized.
    pub pipelines: Vec<PipelineConfig>,
}

impl Default for AppConfig {
    /// `pipelines` stays empty here: the default `dictate` chain depends on
    /// the effective `llm.enabled` and `audio` values, so it is synthesized
    /// only in [`AppConfig::load_from`], after deserialization.
    fn default() -> Self {
        Self {
            stt: SttConfig::default(),
            llm: LlmConfig::default(),
            audio: AudioConfig::default(),
            workers: 4,
            pipelines: Vec::new(),
        }
    }
}

/// The built-in push-to-talk dictation pipeline on F9.
fn default_dictate_pipeline(audio: &AudioConfig, with_correction: bool) -> PipelineConfig {
    let mut record_params = toml::value::Table::new();
    record_params.insert("min_duration".into(), toml::Value::Float(audio.min_clip_secs));
    record_params.insert("max_duration".into(), toml::Value::Float(audio.max_clip_secs));

    let mut stages = vec![
        StageConfig {
            stage: "record_audio".into(),
            params: record_params,
        },
        StageConfig {
            stage: "transcribe".into(),
            params: toml::value::Table::new(),
        },
    ];
    if with_correction {
        stages.push(StageConfig {
            stage: "correct_text".into(),
            params: toml::value::Table::new(),
        });
    }
    stages.push(StageConfig {
        stage: "type_text".into(),
        params: toml::value::Table::new(),
    });

    PipelineConfig {
        name: "dictate".into(),
        enabled: true,
        hotkey: Some("F9".into()),
        stages,
    }
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        if config.pipelines.is_empty() {
            config.pipelines =
                vec![default_dictate_pipeline(&config.audio, config.llm.enabled)];
        }
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

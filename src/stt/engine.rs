//! Core STT engine trait and implementations.
//!
//! # Overview
//!
//! [`Transcriber`] is the interface the pipeline stages call.  It is
//! object-safe and `Send + Sync` so it can be held behind an
//! `Arc<dyn Transcriber>` and used from blocking worker threads.
//!
//! [`WhisperTranscriber`] is the production implementation that wraps a
//! `whisper_rs::WhisperContext`.  Construct it with
//! [`WhisperTranscriber::load`].  It reads clips from disk (16 kHz mono WAV
//! as written by the recorder; other rates and channel counts are converted
//! on the fly).
//!
//! [`TranscribeParams`] bundles the inference settings fixed at load time;
//! [`TranscriptionResult`] is what [`WhisperTranscriber::transcribe_full`]
//! returns when the caller wants per-segment timing.
//!
//! [`MockTranscriber`] (available under `#[cfg(test)]`) returns a
//! pre-configured response — useful for unit-testing the pipeline without a
//! real GGML model file.

use std::path::Path;

use thiserror::Error;
use whisper_rs::{FullParams, WhisperContext, WhisperContextParameters};

use crate::audio::{resample_to_16k, stereo_to_mono};

// ---------------------------------------------------------------------------
// Inference parameters
// ---------------------------------------------------------------------------

/// Decoding strategy, owned and `Clone` (unlike the whisper-rs enum).
///
/// Dictation wants latency, so the default is single-pass
/// [`Greedy`](SamplingStrategy::Greedy) decoding.  Beam search trades
/// a few times the latency for slightly better accuracy.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingStrategy {
    /// Single-pass decoding; `best_of` candidate tokens per step, 1 is
    /// fastest.
    Greedy { best_of: i32 },
    /// Beam search with `beam_size` parallel beams.  `patience` ≥ 1.0
    /// is standard beam search.
    BeamSearch { beam_size: i32, patience: f32 },
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self::Greedy { best_of: 1 }
    }
}

/// Settings for a single inference run, fixed when the engine is loaded.
///
/// ```
/// use voxflow::stt::TranscribeParams;
///
/// let params = TranscribeParams {
///     language: "de".into(),
///     ..TranscribeParams::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct TranscribeParams {
    /// Fallback ISO-639-1 language code, or `"auto"` for detection.
    /// The per-call `language` argument of [`Transcriber::transcribe`]
    /// takes precedence.
    pub language: String,

    /// Decoding strategy.
    pub strategy: SamplingStrategy,

    /// CPU threads handed to Whisper.  Defaults to the machine's
    /// parallelism capped at 8, past which Whisper stops scaling.
    pub n_threads: i32,

    /// Silence Whisper's progress chatter on stderr.
    pub suppress_progress: bool,
}

impl Default for TranscribeParams {
    fn default() -> Self {
        Self {
            language: "en".into(),
            strategy: SamplingStrategy::default(),
            n_threads: optimal_threads(),
            suppress_progress: true,
        }
    }
}

fn optimal_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Output of a successful inference pass.
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    /// Concatenated transcript, trimmed.
    pub text: String,

    /// Time-aligned segments as emitted by Whisper.
    pub segments: Vec<Segment>,

    /// Wall-clock inference time in milliseconds.
    pub duration_ms: u128,
}

/// One time-aligned chunk of transcript.
#[derive(Debug, Clone)]
pub struct Segment {
    pub text: String,
    /// Offset from the start of the clip, milliseconds.
    pub start_ms: u64,
    pub end_ms: u64,
}

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

/// All errors that can arise from the STT subsystem.
#[derive(Debug, Clone, Error)]
pub enum SttError {
    /// The GGML model file was not found at the given path.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// `whisper_rs` failed to initialise a `WhisperContext` or `WhisperState`.
    #[error("Whisper context initialisation failed: {0}")]
    ContextInit(String),

    /// The clip file could not be read or decoded.
    #[error("Failed to read audio file {path}: {message}")]
    AudioRead { path: String, message: String },

    /// An error occurred during the inference pass.
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// The supplied audio is shorter than the minimum 0.5 s
    /// (8 000 samples at 16 kHz).
    #[error("Audio too short — minimum 0.5 s (8 000 samples at 16 kHz)")]
    AudioTooShort,

    /// The supplied audio exceeds the maximum 60 s
    /// (960 000 samples at 16 kHz).
    #[error("Audio too long — maximum 60 s (960 000 samples at 16 kHz)")]
    AudioTooLong,
}

// ---------------------------------------------------------------------------
// Transcriber trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface for speech-to-text engines.
///
/// # Contract
///
/// - `path` names a WAV clip on disk.
/// - `language` is an ISO-639-1 code, or `"auto"` for detection.
/// - `history`, when present, is recent transcript text used to prime the
///   decoder for continuity across consecutive clips.
/// - Returns `Err(SttError::AudioTooShort)` for clips under 0.5 s and
///   `Err(SttError::AudioTooLong)` for clips over 60 s.
pub trait Transcriber: Send + Sync {
    /// Transcribe the clip at `path` and return the text transcript.
    fn transcribe(
        &self,
        path: &Path,
        language: &str,
        history: Option<&str>,
    ) -> Result<String, SttError>;
}

// Compile-time assertion: Box<dyn Transcriber> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Transcriber>) {}
};

// ---------------------------------------------------------------------------
// Audio length constants (16 kHz mono f32)
// ---------------------------------------------------------------------------

/// Minimum audio length: 0.5 s × 16 000 Hz = 8 000 samples.
const MIN_AUDIO_SAMPLES: usize = 8_000;
/// Maximum audio length: 60 s × 16 000 Hz = 960 000 samples.
const MAX_AUDIO_SAMPLES: usize = 960_000;

// ---------------------------------------------------------------------------
// WhisperTranscriber
// ---------------------------------------------------------------------------

/// Production STT engine that wraps a `whisper_rs::WhisperContext`.
///
/// A new `WhisperState` is created for every [`transcribe`] call so the
/// engine can be shared across threads without any locking.
///
/// [`transcribe`]: Transcriber::transcribe
pub struct WhisperTranscriber {
    ctx: WhisperContext,
    params: TranscribeParams,
}

impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

// `WhisperContext` holds a raw pointer internally but declares
// `unsafe impl Send` and `unsafe impl Sync` in whisper-rs — the model
// weights are read-only after loading.  `TranscribeParams` is fully owned
// and trivially Send+Sync.
// SAFETY: WhisperContext is Send+Sync as declared by whisper-rs.
unsafe impl Send for WhisperTranscriber {}
unsafe impl Sync for WhisperTranscriber {}

impl WhisperTranscriber {
    /// Load a GGML model from `model_path` and prepare it for inference.
    ///
    /// # Errors
    ///
    /// - [`SttError::ModelNotFound`] — `model_path` does not exist.
    /// - [`SttError::ContextInit`]  — whisper-rs failed to load the file.
    pub fn load(
        model_path: impl AsRef<Path>,
        params: TranscribeParams,
    ) -> Result<Self, SttError> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(SttError::ModelNotFound(path.display().to_string()));
        }

        let path_str = path.to_str().ok_or_else(|| {
            SttError::ModelNotFound(format!(
                "model path contains non-UTF-8 characters: {}",
                path.display()
            ))
        })?;

        let ctx_params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(path_str, ctx_params)
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        Ok(Self { ctx, params })
    }

    /// Transcribe 16 kHz mono samples and return a [`TranscriptionResult`]
    /// with per-segment timing information.
    ///
    /// Prefer [`Transcriber::transcribe`] when only the text is needed.
    pub fn transcribe_full(
        &self,
        audio: &[f32],
        language: &str,
        history: Option<&str>,
    ) -> Result<TranscriptionResult, SttError> {
        // ── Audio length guards ───────────────────────────────────────────
        if audio.len() < MIN_AUDIO_SAMPLES {
            return Err(SttError::AudioTooShort);
        }
        if audio.len() > MAX_AUDIO_SAMPLES {
            return Err(SttError::AudioTooLong);
        }

        // ── Build FullParams ──────────────────────────────────────────────
        // Convert our SamplingStrategy → whisper-rs's SamplingStrategy.
        use whisper_rs::SamplingStrategy as WS;
        let ws = match self.params.strategy {
            SamplingStrategy::Greedy { best_of } => WS::Greedy { best_of },
            SamplingStrategy::BeamSearch { beam_size, patience } => {
                WS::BeamSearch { beam_size, patience }
            }
        };

        let mut fp = FullParams::new(ws);

        // set_language takes an Option<&str> whose lifetime is tied to fp.
        // Both `fp` and the borrow of `language` remain alive until
        // state.full() returns, so the borrow is valid.
        let lang: Option<&str> = if language == "auto" {
            None
        } else {
            Some(language)
        };
        fp.set_language(lang);
        fp.set_n_threads(self.params.n_threads);

        if let Some(history) = history {
            fp.set_initial_prompt(history);
        }

        if self.params.suppress_progress {
            fp.set_print_progress(false);
            fp.set_print_realtime(false);
        }

        // ── Create per-call state and run inference ───────────────────────
        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        let wall_start = std::time::Instant::now();

        state
            .full(fp, audio)
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        // ── Collect segments ──────────────────────────────────────────────
        let n_segments = state
            .full_n_segments()
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let mut text = String::new();
        let mut segments: Vec<Segment> = Vec::with_capacity(n_segments as usize);

        for i in 0..n_segments {
            let seg_text = state
                .full_get_segment_text(i)
                .map_err(|e| SttError::Transcription(format!("segment {i}: {e}")))?;

            // Timestamps are in centiseconds → multiply by 10 for ms.
            let t0 = state.full_get_segment_t0(i).unwrap_or(0).max(0) as u64 * 10;
            let t1 = state.full_get_segment_t1(i).unwrap_or(0).max(0) as u64 * 10;

            text.push_str(&seg_text);
            segments.push(Segment {
                text: seg_text,
                start_ms: t0,
                end_ms: t1,
            });
        }

        Ok(TranscriptionResult {
            text: text.trim().to_string(),
            segments,
            duration_ms: wall_start.elapsed().as_millis(),
        })
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(
        &self,
        path: &Path,
        language: &str,
        history: Option<&str>,
    ) -> Result<String, SttError> {
        let audio = read_wav_samples(path)?;
        self.transcribe_full(&audio, language, history)
            .map(|r| r.text)
    }
}

// ---------------------------------------------------------------------------
// WAV loading
// ---------------------------------------------------------------------------

/// Read a WAV file into 16 kHz mono `f32` samples.
///
/// Accepts 16-bit integer or 32-bit float PCM; multi-channel audio is
/// downmixed and other sample rates are resampled to 16 kHz.
fn read_wav_samples(path: &Path) -> Result<Vec<f32>, SttError> {
    let audio_err = |message: String| SttError::AudioRead {
        path: path.display().to_string(),
        message,
    };

    let mut reader = hound::WavReader::open(path).map_err(|e| audio_err(e.to_string()))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| audio_err(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| audio_err(e.to_string()))?
        }
    };

    let mono = stereo_to_mono(&samples, spec.channels);
    Ok(resample_to_16k(&mono, spec.sample_rate))
}

// ---------------------------------------------------------------------------
// MockTranscriber  (test-only)
// ---------------------------------------------------------------------------

/// A test double that returns a pre-configured response without loading any
/// model file.
#[cfg(test)]
pub struct MockTranscriber {
    response: Result<String, SttError>,
    /// Clip paths seen by [`Transcriber::transcribe`], in call order.
    pub calls: std::sync::Mutex<Vec<std::path::PathBuf>>,
}

#[cfg(test)]
impl MockTranscriber {
    /// Create a mock that always returns `Ok(text)`.
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns `Err(error)`.
    pub fn err(error: SttError) -> Self {
        Self {
            response: Err(error),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
impl Transcriber for MockTranscriber {
    fn transcribe(
        &self,
        path: &Path,
        _language: &str,
        _history: Option<&str>,
    ) -> Result<String, SttError> {
        self.calls.lock().unwrap().push(path.to_path_buf());
        self.response.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_wav(samples: &[f32], sample_rate: u32) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "stt-test-{}-{sample_rate}.wav",
            std::process::id()
        ));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &s in samples {
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    // --- MockTranscriber ---

    #[test]
    fn mock_ok_returns_configured_text() {
        let engine = MockTranscriber::ok("hello world");
        let text = engine
            .transcribe(Path::new("/tmp/clip.wav"), "en", None)
            .unwrap();
        assert_eq!(text, "hello world");
        assert_eq!(engine.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn mock_err_returns_configured_error() {
        let engine = MockTranscriber::err(SttError::Transcription("boom".into()));
        let err = engine
            .transcribe(Path::new("/tmp/clip.wav"), "en", None)
            .unwrap_err();
        assert!(matches!(err, SttError::Transcription(_)));
    }

    // --- WAV loading ---

    #[test]
    fn read_wav_handles_16bit_16k() {
        let path = write_test_wav(&vec![0.25_f32; 16_000], 16_000);
        let samples = read_wav_samples(&path).unwrap();
        assert_eq!(samples.len(), 16_000);
        assert!((samples[0] - 0.25).abs() < 0.01);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn read_wav_resamples_48k() {
        let path = write_test_wav(&vec![0.1_f32; 48_000], 48_000);
        let samples = read_wav_samples(&path).unwrap();
        assert_eq!(samples.len(), 16_000);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn read_wav_missing_file_is_audio_read_error() {
        let err = read_wav_samples(Path::new("/nonexistent/clip.wav")).unwrap_err();
        assert!(matches!(err, SttError::AudioRead { .. }));
    }

    // --- WhisperTranscriber::load missing path ---

    #[test]
    fn load_missing_model_returns_model_not_found() {
        let params = TranscribeParams::default();
        let result = WhisperTranscriber::load("/nonexistent/model.bin", params);
        assert!(
            matches!(result, Err(SttError::ModelNotFound(_))),
            "expected ModelNotFound, got: {result:?}"
        );
    }

    // --- Transcriber object safety ---

    #[test]
    fn box_dyn_transcriber_compiles() {
        // If this test compiles, the trait is object-safe.
        let engine: Box<dyn Transcriber> = Box::new(MockTranscriber::ok("ok"));
        let _ = engine.transcribe(Path::new("/tmp/clip.wav"), "en", None);
    }

    // --- SttError display ---

    #[test]
    fn stt_error_display_model_not_found() {
        let e = SttError::ModelNotFound("/some/path.bin".into());
        assert!(e.to_string().contains("/some/path.bin"));
    }

    #[test]
    fn stt_error_display_audio_too_short() {
        let e = SttError::AudioTooShort;
        assert!(e.to_string().contains("short"));
    }

    // --- optimal_threads sanity check ---

    #[test]
    fn optimal_threads_is_positive_and_at_most_8() {
        let t = optimal_threads();
        assert!(t >= 1 && t <= 8);
    }
}

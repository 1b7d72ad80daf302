//! Application entry point — voxflow dictation daemon.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime.
//! 4. Spawn the tray-icon consumer thread.
//! 5. Build the backends (recorder, Whisper, LLM corrector, injector) —
//!    missing hardware or model files degrade to stubs that fail their own
//!    runs instead of aborting startup.
//! 6. Create the [`PipelineManager`] and load the configured pipelines.
//! 7. Spawn the hotkey listener thread with the manager's bindings.
//! 8. Block on Ctrl-C, then drain in-flight runs and exit.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use voxflow::{
    audio::{CaptureError, CpalRecorder, RecordedClip, Recorder},
    config::{AppConfig, AppPaths},
    hotkey::{parse_key, HotkeyListener},
    inject::ClipboardInjector,
    llm::ApiCorrector,
    pipeline::{Backends, PipelineManager},
    stages,
    stt::{SttError, TranscribeParams, Transcriber, WhisperTranscriber},
    tray,
};

// ---------------------------------------------------------------------------
// Fallback backends
// ---------------------------------------------------------------------------

/// Recorder stub used when no capture device could be opened at startup.
/// Runs that try to record fail with the original error; everything else
/// keeps working.
struct UnavailableRecorder {
    reason: String,
}

impl Recorder for UnavailableRecorder {
    fn start(&self) -> Result<(), CaptureError> {
        Err(CaptureError::Worker(self.reason.clone()))
    }

    fn stop(&self) -> Result<RecordedClip, CaptureError> {
        Err(CaptureError::Worker(self.reason.clone()))
    }
}

/// Transcriber stub used when the Whisper model file is not present, so the
/// daemon still launches and reports the missing model per run.
struct NoModelTranscriber {
    path: String,
}

impl Transcriber for NoModelTranscriber {
    fn transcribe(
        &self,
        _path: &Path,
        _language: &str,
        _history: Option<&str>,
    ) -> Result<String, SttError> {
        Err(SttError::ModelNotFound(self.path.clone()))
    }
}

// ---------------------------------------------------------------------------
// Backend construction
// ---------------------------------------------------------------------------

fn build_recorder() -> Arc<dyn Recorder> {
    match CpalRecorder::new() {
        Ok(recorder) => Arc::new(recorder),
        Err(e) => {
            log::warn!("audio capture unavailable: {e}. Recording stages will fail.");
            Arc::new(UnavailableRecorder {
                reason: e.to_string(),
            })
        }
    }
}

fn build_transcriber(config: &AppConfig) -> Arc<dyn Transcriber> {
    let model_path = AppPaths::new().model_file(&config.stt.model);
    let params = TranscribeParams {
        language: config.stt.language.clone(),
        ..TranscribeParams::default()
    };

    match WhisperTranscriber::load(&model_path, params) {
        Ok(engine) => {
            log::info!("whisper model loaded: {}", model_path.display());
            Arc::new(engine)
        }
        Err(e) => {
            log::warn!(
                "could not load Whisper model ({}): {e}. Transcription stages will fail.",
                model_path.display()
            );
            Arc::new(NoModelTranscriber {
                path: model_path.display().to_string(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voxflow starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime — async work is only LLM requests and run admission;
    //    pipeline stages run on the blocking pool.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Tray icon. Rendering is a stub until a real tray integration lands;
    //    state changes still show up in the logs.
    let (icon_sink, _icon_thread) = tray::spawn(|state| {
        log::debug!("icon: {}", state.name());
    });
    let icon: Arc<dyn tray::IconSink> = Arc::new(icon_sink);

    // 5. Backends
    let backends = Arc::new(Backends {
        recorder: build_recorder(),
        transcriber: build_transcriber(&config),
        corrector: Arc::new(ApiCorrector::from_config(&config.llm)),
        injector: Arc::new(ClipboardInjector::new()),
        runtime: rt.handle().clone(),
        language: config.stt.language.clone(),
    });

    // 6. Pipeline manager
    let manager = PipelineManager::new(
        stages::builtin(),
        backends,
        Arc::clone(&icon),
        rt.handle().clone(),
        config.workers,
    );

    if let Err(e) = manager.load(&config.pipelines) {
        log::error!("{e}");
        anyhow::bail!("invalid pipeline configuration");
    }
    log::info!(
        "loaded {} pipeline(s), {} hotkey binding(s)",
        config.pipelines.iter().filter(|p| p.enabled).count(),
        manager.bindings().len()
    );

    // 7. Hotkey listener
    let mut keys = HashMap::new();
    for binding in manager.bindings() {
        match parse_key(&binding) {
            Some(key) => {
                keys.insert(key, binding);
            }
            None => log::warn!("unknown hotkey '{binding}', skipping"),
        }
    }
    let _listener = HotkeyListener::start(keys, Arc::clone(&manager));

    // 8. Wait for Ctrl-C, then drain.
    rt.block_on(tokio::signal::ctrl_c())
        .context("failed to wait for shutdown signal")?;
    log::info!("shutting down");

    if !manager.shutdown(Duration::from_secs(5)) {
        log::warn!("some runs did not finish within the shutdown deadline");
    }
    Ok(())
}

//! Microphone capture via `cpal`.
//!
//! [`CpalRecorder`] wraps the cpal host/device/stream lifecycle behind the
//! [`Recorder`] trait.  `cpal::Stream` is not `Send` on every platform, so
//! the stream lives on a dedicated capture thread that is spawned once at
//! construction and parked for the life of the process; the callback feeds
//! samples into shared state whenever a recording is armed.
//!
//! [`Recorder::stop`] downmixes and resamples the captured audio to
//! 16 kHz mono and writes it out as a 16-bit PCM WAV in the system temp
//! directory, returning a [`RecordedClip`] describing the file.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use thiserror::Error;

use super::resample::{resample_to_16k, stereo_to_mono, TARGET_RATE};

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or running audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to write WAV file: {0}")]
    Wav(#[from] hound::Error),

    #[error("stop called while no recording was active")]
    NotRecording,

    #[error("audio capture thread failed: {0}")]
    Worker(String),
}

// ---------------------------------------------------------------------------
// RecordedClip
// ---------------------------------------------------------------------------

/// A finished recording, written to disk as 16 kHz mono 16-bit PCM WAV.
#[derive(Debug, Clone)]
pub struct RecordedClip {
    /// Path of the temporary WAV file.
    pub path: PathBuf,
    /// Length of the clip in seconds.
    pub duration_secs: f32,
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Something that can capture microphone audio between `start` and `stop`.
pub trait Recorder: Send + Sync {
    /// Arm capture.  Any previously buffered audio is discarded.
    fn start(&self) -> Result<(), CaptureError>;

    /// Disarm capture and write the buffered audio to a temp WAV file.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NotRecording`] when no `start` preceded
    /// this call.
    fn stop(&self) -> Result<RecordedClip, CaptureError>;
}

// ---------------------------------------------------------------------------
// CpalRecorder
// ---------------------------------------------------------------------------

/// Shared state written by the cpal callback and read by `stop`.
struct CaptureState {
    armed: bool,
    samples: Vec<f32>,
}

/// [`Recorder`] implementation backed by the system default input device.
pub struct CpalRecorder {
    state: Arc<Mutex<CaptureState>>,
    /// Native sample rate reported by the device (Hz).
    sample_rate: u32,
    /// Number of interleaved channels reported by the device.
    channels: u16,
}

/// Monotonic suffix so concurrent recordings never collide on a file name.
static CLIP_COUNTER: AtomicU64 = AtomicU64::new(0);

impl CpalRecorder {
    /// Open the default input device and start its stream on a dedicated
    /// capture thread.  The stream stays open for the life of the process;
    /// audio is only buffered while a recording is armed.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NoDevice`] when no input device is
    /// available, or the underlying cpal error when the stream cannot be
    /// built or started.
    pub fn new() -> Result<Self, CaptureError> {
        let state = Arc::new(Mutex::new(CaptureState {
            armed: false,
            samples: Vec::new(),
        }));

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, u16), CaptureError>>();
        let callback_state = Arc::clone(&state);

        thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let result = (|| {
                    let host = cpal::default_host();
                    let device = host
                        .default_input_device()
                        .ok_or(CaptureError::NoDevice)?;

                    let supported = device.default_input_config()?;
                    let channels = supported.channels();
                    let sample_rate = supported.sample_rate().0;
                    let config: cpal::StreamConfig = supported.into();

                    let stream = device.build_input_stream(
                        &config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            let mut state = match callback_state.lock() {
                                Ok(state) => state,
                                Err(poisoned) => poisoned.into_inner(),
                            };
                            if state.armed {
                                state.samples.extend_from_slice(data);
                            }
                        },
                        |err: cpal::StreamError| {
                            log::error!("cpal stream error: {err}");
                        },
                        None, // no timeout
                    )?;

                    stream.play()?;
                    Ok((stream, sample_rate, channels))
                })();

                match result {
                    Ok((stream, sample_rate, channels)) => {
                        let _ = ready_tx.send(Ok((sample_rate, channels)));
                        // Keep the stream alive; the thread only exits when
                        // the process does.
                        let _keep_alive = stream;
                        loop {
                            thread::park();
                        }
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                }
            })
            .map_err(|e| CaptureError::Worker(e.to_string()))?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .map_err(|_| CaptureError::Worker("capture thread exited early".into()))??;

        log::info!("audio: input device open ({sample_rate} Hz, {channels} ch)");

        Ok(Self {
            state,
            sample_rate,
            channels,
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CaptureState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Recorder for CpalRecorder {
    fn start(&self) -> Result<(), CaptureError> {
        let mut state = self.lock_state();
        state.samples.clear();
        state.armed = true;
        log::debug!("audio: capture armed");
        Ok(())
    }

    fn stop(&self) -> Result<RecordedClip, CaptureError> {
        let raw = {
            let mut state = self.lock_state();
            if !state.armed {
                return Err(CaptureError::NotRecording);
            }
            state.armed = false;
            std::mem::take(&mut state.samples)
        };

        let mono = stereo_to_mono(&raw, self.channels);
        let samples = resample_to_16k(&mono, self.sample_rate);
        let duration_secs = samples.len() as f32 / TARGET_RATE as f32;

        let path = temp_wav_path();
        write_wav_16k(&path, &samples)?;

        log::info!(
            "audio: captured {duration_secs:.2}s to {}",
            path.display()
        );

        Ok(RecordedClip {
            path,
            duration_secs,
        })
    }
}

/// Unique path for a clip in the system temp directory.
fn temp_wav_path() -> PathBuf {
    let n = CLIP_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("voxflow-{}-{n}.wav", std::process::id()))
}

/// Write `samples` (16 kHz mono `f32`) as a 16-bit PCM WAV file.
fn write_wav_16k(path: &std::path::Path, samples: &[f32]) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TARGET_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        let clamped = s.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }
    writer.finalize()
}

// ---------------------------------------------------------------------------
// MockRecorder (tests)
// ---------------------------------------------------------------------------

/// Test double that fabricates clips without touching any audio hardware.
#[cfg(test)]
pub struct MockRecorder {
    /// Duration reported for every clip produced by [`Recorder::stop`].
    pub clip_secs: f32,
    armed: Mutex<bool>,
    /// Number of completed start/stop cycles.
    pub stops: AtomicU64,
}

#[cfg(test)]
impl MockRecorder {
    pub fn new(clip_secs: f32) -> Self {
        Self {
            clip_secs,
            armed: Mutex::new(false),
            stops: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
impl Recorder for MockRecorder {
    fn start(&self) -> Result<(), CaptureError> {
        *self.armed.lock().unwrap() = true;
        Ok(())
    }

    fn stop(&self) -> Result<RecordedClip, CaptureError> {
        let mut armed = self.armed.lock().unwrap();
        if !*armed {
            return Err(CaptureError::NotRecording);
        }
        *armed = false;
        self.stops.fetch_add(1, Ordering::SeqCst);

        let samples = vec![0.0_f32; (self.clip_secs * TARGET_RATE as f32) as usize];
        let path = temp_wav_path();
        write_wav_16k(&path, &samples)?;
        Ok(RecordedClip {
            path,
            duration_secs: self.clip_secs,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

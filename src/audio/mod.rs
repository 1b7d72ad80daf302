//! Audio capture — microphone → shared buffer → 16 kHz mono WAV temp file.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → capture buffer (while armed)
//!           → stereo_to_mono → resample_to_16k → hound WAV writer
//! ```
//!
//! [`Recorder`] is the capability interface the `record_audio` stage calls;
//! [`CpalRecorder`] is the production implementation.  The cpal stream runs
//! continuously on its own thread — [`Recorder::start`] merely arms the
//! buffer, so the first recorded sample arrives with no device-open latency.

pub mod recorder;
pub mod resample;

pub use recorder::{CaptureError, CpalRecorder, RecordedClip, Recorder};
pub use resample::{resample_to_16k, stereo_to_mono};

#[cfg(test)]
pub use recorder::MockRecorder;

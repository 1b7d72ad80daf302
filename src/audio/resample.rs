//! Channel mixing and resampling helpers.
//!
//! Whisper expects **16 kHz mono `f32`** audio; these two functions convert
//! whatever the capture device delivers.  The resampler is linear
//! interpolation — swap the inner loop for `rubato`'s `SincFixedIn` when
//! capture quality becomes the bottleneck (rubato is already in Cargo.toml
//! for that upgrade).

/// Target rate required by the STT engine.
pub const TARGET_RATE: u32 = 16_000;

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Downmix interleaved multi-channel audio to mono by averaging each frame.
///
/// Mono input is returned as an owned copy; `channels == 0` yields an empty
/// vector.
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample_to_16k
// ---------------------------------------------------------------------------

/// Resample mono audio from `source_rate` Hz to 16 kHz by linear
/// interpolation.  A 16 kHz input is returned unchanged.
pub fn resample_to_16k(samples: &[f32], source_rate: u32) -> Vec<f32> {
    if source_rate == TARGET_RATE {
        return samples.to_vec();
    }
    if samples.is_empty() {
        return Vec::new();
    }

    let ratio = TARGET_RATE as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = match samples.get(idx) {
            Some(&a) => match samples.get(idx + 1) {
                Some(&b) => a * (1.0 - frac) + b * frac,
                None => a,
            },
            None => 0.0,
        };
        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

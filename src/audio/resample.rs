//! Channel mixing and sample-rate conversion for the transcriber.
//!
//! Whisper wants **16 kHz mono `f32`**.  Capture downmixes in the device
//! callback with [`stereo_to_mono`]; the recorded utterance is converted with
//! [`resample_to_16k`] after the microphone has been released.

/// Sample rate expected by the transcriber.
pub const TARGET_RATE: u32 = 16_000;

/// Mix interleaved multi-channel audio down to mono by averaging channels.
///
/// `channels == 1` copies the input; `channels == 0` yields nothing.
///
/// ```rust
/// use ava::audio::stereo_to_mono;
///
/// let mono = stereo_to_mono(&[0.5, -0.5, 0.2, 0.4], 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
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

/// Linear-interpolation resample from `source_rate` to [`TARGET_RATE`].
///
/// Speech energy sits well below 8 kHz, so linear interpolation is adequate
/// for recognition.  Output length is `ceil(len * 16000 / source_rate)`.
pub fn resample_to_16k(samples: &[f32], source_rate: u32) -> Vec<f32> {
    if source_rate == TARGET_RATE || source_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let step = source_rate as f64 / TARGET_RATE as f64;
    let output_len = (samples.len() as u64 * TARGET_RATE as u64).div_ceil(source_rate as u64) as usize;
    let last = samples.len() - 1;

    (0..output_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = (pos as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] * (1.0 - frac) + samples[next] * frac
        })
        .collect()
}

//! Energy-based speech detection with ambient-noise calibration.
//!
//! [`EnergyDetector`] classifies a chunk as speech when its RMS amplitude is
//! above a threshold.  The threshold follows the background level:
//!
//! ```text
//! damping   = 0.15 ^ chunk_seconds
//! threshold = threshold * damping + rms * 1.5 * (1 - damping)
//! ```
//!
//! so a longer chunk moves the threshold further, independent of the
//! device's buffer size.  Capture runs this update over a short ambient
//! window before every utterance, and optionally keeps running it while
//! waiting for speech to start.

/// Starting threshold before any calibration (RMS, full scale = 1.0).
pub const INITIAL_THRESHOLD: f32 = 0.01;

/// Threshold never drops below this, so digital silence cannot make every
/// faint click count as speech.
pub const MIN_THRESHOLD: f32 = 0.002;

/// Fraction of the old threshold retained after one second of audio.
const DAMPING_PER_SEC: f32 = 0.15;

/// Speech must be this much louder than the ambient level.
const SPEECH_RATIO: f32 = 1.5;

/// Root-mean-square amplitude of `chunk` (`0.0` for an empty chunk).
pub fn rms(chunk: &[f32]) -> f32 {
    if chunk.is_empty() {
        return 0.0;
    }
    let mean_sq = chunk.iter().map(|s| s * s).sum::<f32>() / chunk.len() as f32;
    mean_sq.sqrt()
}

// ---------------------------------------------------------------------------
// EnergyDetector
// ---------------------------------------------------------------------------

/// Adaptive RMS threshold.
///
/// ```rust
/// use ava::audio::EnergyDetector;
///
/// let mut detector = EnergyDetector::new(0.01);
/// // Half a second of quiet room noise pulls the threshold down.
/// for _ in 0..5 {
///     detector.adapt(&vec![0.001_f32; 1_600], 0.1);
/// }
/// assert!(detector.threshold() < 0.01);
/// assert!(detector.is_speech(&vec![0.2_f32; 1_600]));
/// ```
#[derive(Debug, Clone)]
pub struct EnergyDetector {
    threshold: f32,
}

impl EnergyDetector {
    pub fn new(initial_threshold: f32) -> Self {
        Self {
            threshold: initial_threshold.max(MIN_THRESHOLD),
        }
    }

    /// Current RMS threshold.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// `true` when the chunk is louder than the threshold.
    pub fn is_speech(&self, chunk: &[f32]) -> bool {
        !chunk.is_empty() && rms(chunk) > self.threshold
    }

    /// Fold one chunk of background audio lasting `chunk_secs` into the
    /// threshold.
    pub fn adapt(&mut self, chunk: &[f32], chunk_secs: f32) {
        if chunk.is_empty() || chunk_secs <= 0.0 {
            return;
        }
        let damping = DAMPING_PER_SEC.powf(chunk_secs);
        let target = rms(chunk) * SPEECH_RATIO;
        self.threshold = (self.threshold * damping + target * (1.0 - damping)).max(MIN_THRESHOLD);
    }
}

impl Default for EnergyDetector {
    fn default() -> Self {
        Self::new(INITIAL_THRESHOLD)
    }
}

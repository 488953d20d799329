//! Ambient calibration and single-utterance recording over an [`InputStream`].
//!
//! # Utterance boundaries
//!
//! ```text
//!   waiting ──loud chunk──▶ phrase ──pause_threshold of quiet──▶ done
//!      ▲  (pre-roll kept)      │
//!      │                       └──phrase_time_limit reached────▶ done
//!      └──── speech shorter than phrase_threshold: discard ◀──────┘
//! ```
//!
//! Both functions poll the [`ShutdownSignal`] between reads, and treat a
//! stream that goes quiet for [`STALL_TIMEOUT`] as a device fault.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::device::{DeviceError, InputStream};
use super::vad::EnergyDetector;
use crate::config::ListenerConfig;
use crate::pipeline::ShutdownSignal;

/// How long one read blocks before the shutdown flag is checked again.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// A live microphone delivers a chunk every few milliseconds; this much
/// silence from the driver means it has stopped.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("recording interrupted by shutdown")]
    Interrupted,
}

/// Mono audio for one spoken input at the device's native rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Utterance {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Next chunk from `stream`, honouring shutdown and stall detection.
fn next_chunk(
    stream: &mut dyn InputStream,
    shutdown: &ShutdownSignal,
) -> Result<Vec<f32>, RecordError> {
    let started = Instant::now();
    loop {
        if shutdown.is_triggered() {
            return Err(RecordError::Interrupted);
        }
        if let Some(chunk) = stream.read(READ_TIMEOUT)? {
            if !chunk.is_empty() {
                return Ok(chunk);
            }
        }
        if started.elapsed() >= STALL_TIMEOUT {
            return Err(DeviceError::Stalled(STALL_TIMEOUT).into());
        }
    }
}

fn secs_to_samples(secs: f32, rate: u32) -> usize {
    (secs.max(0.0) * rate as f32) as usize
}

/// Sample `duration_secs` of background audio into `detector`.
pub fn calibrate(
    stream: &mut dyn InputStream,
    detector: &mut EnergyDetector,
    duration_secs: f32,
    shutdown: &ShutdownSignal,
) -> Result<(), RecordError> {
    let rate = stream.sample_rate().max(1);
    let wanted = secs_to_samples(duration_secs, rate);
    let mut seen = 0usize;

    while seen < wanted {
        let chunk = next_chunk(stream, shutdown)?;
        detector.adapt(&chunk, chunk.len() as f32 / rate as f32);
        seen += chunk.len();
    }

    log::debug!(
        "ambient calibration over {duration_secs:.2}s: threshold {:.4}",
        detector.threshold()
    );
    Ok(())
}

/// Keeps the most recent `capacity` samples heard before speech began.
struct PreRoll {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl PreRoll {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, chunk: &[f32]) {
        self.samples.extend(chunk.iter().copied());
        let excess = self.samples.len().saturating_sub(self.capacity);
        self.samples.drain(..excess);
    }

    fn into_vec(self) -> Vec<f32> {
        self.samples.into()
    }
}

/// Block until one utterance has been spoken and return it.
pub fn record_utterance(
    stream: &mut dyn InputStream,
    detector: &mut EnergyDetector,
    config: &ListenerConfig,
    shutdown: &ShutdownSignal,
) -> Result<Utterance, RecordError> {
    let rate = stream.sample_rate().max(1);
    let pre_roll_len = secs_to_samples(config.non_speaking_secs, rate);
    let pause_len = secs_to_samples(config.pause_threshold_secs, rate).max(1);
    let min_speech_len = secs_to_samples(config.phrase_threshold_secs, rate);
    let limit_len = config
        .phrase_time_limit_secs
        .map(|secs| secs_to_samples(secs, rate).max(1));

    loop {
        // Wait for the first loud chunk.
        let mut pre_roll = PreRoll::new(pre_roll_len);
        let first = loop {
            let chunk = next_chunk(stream, shutdown)?;
            if detector.is_speech(&chunk) {
                break chunk;
            }
            if config.dynamic_energy {
                detector.adapt(&chunk, chunk.len() as f32 / rate as f32);
            }
            pre_roll.push(&chunk);
        };

        let mut samples = pre_roll.into_vec();
        let phrase_start = samples.len();
        samples.extend_from_slice(&first);
        let mut speech_len = first.len();
        let mut trailing_quiet = 0usize;

        // Record until a long enough pause or the time limit, which is
        // measured from the first loud chunk.
        while trailing_quiet < pause_len
            && limit_len.map_or(true, |limit| samples.len() - phrase_start < limit)
        {
            let chunk = next_chunk(stream, shutdown)?;
            if detector.is_speech(&chunk) {
                speech_len += chunk.len();
                trailing_quiet = 0;
            } else {
                trailing_quiet += chunk.len();
            }
            samples.extend_from_slice(&chunk);
        }

        if speech_len >= min_speech_len {
            // Keep at most a pre-roll's worth of the closing silence.
            let trim = trailing_quiet.saturating_sub(pre_roll_len);
            samples.truncate(samples.len() - trim);
            let utterance = Utterance {
                samples,
                sample_rate: rate,
            };
            log::debug!("captured {:.2}s utterance", utterance.duration_secs());
            return Ok(utterance);
        }

        log::debug!(
            "discarding {:.2}s burst below phrase threshold",
            speech_len as f32 / rate as f32
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

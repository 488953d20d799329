//! Audio input: device access, utterance detection and resampling.
//!
//! # Capture path
//!
//! ```text
//! AudioSource::open ─▶ InputStream (mono f32, native rate)
//!        │                 │
//!        │          calibrate ─▶ EnergyDetector
//!        │                 │
//!        │          record_utterance ─▶ Utterance
//!        ▼                 │
//!   drop(stream)   resample_to_16k ─▶ transcriber
//! ```
//!
//! The stream is opened for one capture and dropped before transcription
//! starts, so the microphone is never held across a turn.

pub mod device;
pub mod recorder;
pub mod resample;
pub mod vad;

pub use device::{AudioSource, CpalMicrophone, DeviceError, InputStream};
pub use recorder::{calibrate, record_utterance, RecordError, Utterance, STALL_TIMEOUT};
pub use resample::{resample_to_16k, stereo_to_mono, TARGET_RATE};
pub use vad::{rms, EnergyDetector, INITIAL_THRESHOLD, MIN_THRESHOLD};

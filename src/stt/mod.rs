//! Speech-to-text: the whisper transcriber and the speech capturer built on
//! top of it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────── SpeechCapturer ──────────────────────────┐
//! │                                                                     │
//! │  AudioSource::open ─▶ calibrate ─▶ record_utterance ─▶ drop(stream) │
//! │                                                          │          │
//! │                                     resample_to_16k ◀────┘          │
//! │                                            │                        │
//! │                         Arc<dyn Transcriber>::transcribe            │
//! │                                            │                        │
//! │               Ok(text) | NoSpeechDetected | RecognitionUnavailable  │
//! │                        | Device | Interrupted                       │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ava::audio::CpalMicrophone;
//! use ava::config::ListenerConfig;
//! use ava::pipeline::ShutdownSignal;
//! use ava::stt::{SpeechCapture, SpeechCapturer, TranscribeParams, WhisperTranscriber};
//!
//! let whisper = WhisperTranscriber::load("models/ggml-base.en.bin", TranscribeParams::default())
//!     .expect("model present");
//! let capturer = SpeechCapturer::new(
//!     Arc::new(CpalMicrophone::new(None)),
//!     Arc::new(whisper),
//!     ListenerConfig::default(),
//! );
//! match capturer.capture(&ShutdownSignal::new()) {
//!     Ok(text) => println!("heard: {text}"),
//!     Err(e) => println!("nothing: {e}"),
//! }
//! ```

pub mod engine;
pub mod listener;
pub mod transcribe;

pub use engine::{
    check_length, SttError, Transcriber, WhisperTranscriber, MAX_AUDIO_SAMPLES, MIN_AUDIO_SAMPLES,
};
pub use listener::{CaptureError, SpeechCapture, SpeechCapturer};
pub use transcribe::TranscribeParams;

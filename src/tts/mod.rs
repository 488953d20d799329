//! Text-to-speech.
//!
//! ```text
//! SpeechSynthesizer::speak(text)
//!     EngineFactory::create ─▶ set_volume ─▶ say(text) ─▶ close
//!                 (a fresh engine every call, closed on every path)
//! ```
//!
//! Engines are never pooled: state left behind by one utterance must not
//! leak into the next.

pub mod engine;
pub mod speaker;

pub use engine::{EngineFactory, EspeakEngine, EspeakFactory, SynthesisEngine, TtsError};
pub use speaker::{Speaker, SpeechSynthesizer};

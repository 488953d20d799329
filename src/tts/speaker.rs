//! The speech synthesizer: text in, `true` if it was heard.
//!
//! [`SpeechSynthesizer::speak`] never fails outward.  Each engine step runs
//! under `catch_unwind`, and the engine is closed on every path once it has
//! been created, including after a failed or panicking `say`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::engine::{EngineFactory, TtsError};
use crate::pipeline::{panic_message, ShutdownSignal};

/// Blocking text-to-speech.
pub trait Speaker: Send + Sync {
    /// Speak `text` to completion.  Returns `false` on any fault.
    fn speak(&self, text: &str, shutdown: &ShutdownSignal) -> bool;
}

pub struct SpeechSynthesizer {
    factory: Arc<dyn EngineFactory>,
    volume: f32,
}

impl SpeechSynthesizer {
    pub fn new(factory: Arc<dyn EngineFactory>, volume: f32) -> Self {
        Self {
            factory,
            volume: volume.clamp(0.0, 1.0),
        }
    }
}

impl Speaker for SpeechSynthesizer {
    fn speak(&self, text: &str, shutdown: &ShutdownSignal) -> bool {
        let Some(mut engine) = guarded("create", || self.factory.create()) else {
            return false;
        };

        let spoken = guarded("set volume", || engine.set_volume(self.volume)).is_some()
            && guarded("speak", || engine.say(text, shutdown)).is_some();
        let closed = guarded("close", || engine.close()).is_some();

        spoken && closed
    }
}

/// Run one engine step, logging and absorbing errors and panics.
fn guarded<T>(step: &str, f: impl FnOnce() -> Result<T, TtsError>) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(TtsError::Interrupted)) => {
            log::info!("speech stopped for shutdown");
            None
        }
        Ok(Err(e)) => {
            log::warn!("speech engine {step} failed: {e}");
            None
        }
        Err(panic) => {
            log::error!("speech engine {step} panicked: {}", panic_message(panic.as_ref()));
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

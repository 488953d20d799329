//! The conversation loop.
//!
//! # Architecture
//!
//! ```text
//!                ShutdownSignal (Arc<AtomicBool>) ◀── ctrl-c / SIGTERM in main
//!                       │ checked between stages, polled while blocked
//!                       ▼
//! TurnOrchestrator::run()  ── one turn at a time ──▶ Turn record
//!        │
//!        ├─ Arc<dyn SpeechCapture>     (spawn_blocking)
//!        ├─ PromptTemplate::format
//!        ├─ Arc<dyn CompletionClient>  (tokio::spawn)
//!        └─ Arc<dyn Speaker>           (spawn_blocking)
//! ```
//!
//! Every stage runs on its own task, so a panic inside one surfaces as a
//! `JoinError` and only costs that turn.

use std::any::Any;

pub mod runner;
pub mod shutdown;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::TurnOrchestrator;
pub use shutdown::ShutdownSignal;
pub use state::{Completion, Turn, TurnOutcome, TurnState, FALLBACK_MESSAGE};

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let payload = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");

        let payload = std::panic::catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 42");
    }
}

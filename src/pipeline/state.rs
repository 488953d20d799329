//! Turn state machine and the per-turn record.
//!
//! A [`Turn`] is built fresh by every
//! [`TurnOrchestrator::run_turn`](super::TurnOrchestrator::run_turn) call and
//! dropped after it is logged.  Nothing carries over between turns.

use crate::llm::CompletionError;

/// Spoken in place of a completion when the model request fails.
pub const FALLBACK_MESSAGE: &str = "Sorry, there was an error from the model.";

// ---------------------------------------------------------------------------
// TurnState
// ---------------------------------------------------------------------------

/// Stages of one turn.
///
/// ```text
/// Listening ──text──▶ Transcribing ──▶ Prompting ──▶ Generating ──▶ Speaking
///     ▲   │                                                            │
///     │   └── no speech / recognition unavailable: turn abandoned      │
///     └────────────────────────── next turn ◀──────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    /// Inside the capturer: calibrating, recording one utterance and
    /// transcribing it.
    #[default]
    Listening,
    /// The capturer returned text and it is stored on the turn.
    Transcribing,
    /// Recognized text is being placed into the prompt template.
    Prompting,
    /// The completion request is in flight.
    Generating,
    /// The completion (or fallback) is being spoken.
    Speaking,
}

impl TurnState {
    /// Short label for log lines.
    ///
    /// ```
    /// use ava::pipeline::TurnState;
    ///
    /// assert_eq!(TurnState::Listening.label(), "LISTENING");
    /// assert_eq!(TurnState::Speaking.label(), "SPEAKING");
    /// ```
    pub fn label(&self) -> &'static str {
        match self {
            TurnState::Listening => "LISTENING",
            TurnState::Transcribing => "TRANSCRIBING",
            TurnState::Prompting => "PROMPTING",
            TurnState::Generating => "GENERATING",
            TurnState::Speaking => "SPEAKING",
        }
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// What the model stage produced: the model's own text, or the reason it
/// failed.  Callers never have to guess which by looking at the string.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Model(String),
    Fallback(CompletionError),
}

impl Completion {
    /// Text to speak: the model output, or [`FALLBACK_MESSAGE`].
    pub fn text(&self) -> &str {
        match self {
            Completion::Model(text) => text,
            Completion::Fallback(_) => FALLBACK_MESSAGE,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Completion::Fallback(_))
    }
}

impl From<Result<String, CompletionError>> for Completion {
    fn from(result: Result<String, CompletionError>) -> Self {
        match result {
            Ok(text) => Completion::Model(text),
            Err(e) => Completion::Fallback(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Reached the speaking stage (whether or not playback succeeded).
    Completed,
    /// Dropped before speaking; carries the reason.
    Abandoned(String),
    /// Stopped by the shutdown signal.
    Interrupted,
}

/// Record of one capture → prompt → complete → speak cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    /// Last stage entered.
    pub state: TurnState,
    pub recognized: Option<String>,
    pub prompt: Option<String>,
    pub completion: Option<Completion>,
    /// Whether playback reported success.
    pub spoken: bool,
    pub outcome: TurnOutcome,
}

impl Turn {
    pub(crate) fn new() -> Self {
        Self {
            state: TurnState::Listening,
            recognized: None,
            prompt: None,
            completion: None,
            spoken: false,
            outcome: TurnOutcome::Interrupted,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == TurnOutcome::Completed
    }
}

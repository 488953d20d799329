//! Turn orchestrator: drives capture → prompt → completion → speech, one
//! turn at a time, until shutdown.
//!
//! # Turn flow
//!
//! ```text
//! run_turn
//!   ├─ spawn_blocking(capturer.capture)         [Listening]
//!   │     ├─ NoSpeech / Unavailable / Device    → Abandoned
//!   │     ├─ Interrupted                        → Interrupted
//!   │     └─ panic (JoinError)                  → Abandoned
//!   ├─ transcript recorded on the turn          [Transcribing]
//!   ├─ template.format(text)                    [Prompting]
//!   ├─ tokio::spawn(client.generate)            [Generating]
//!   │     └─ Err / panic                        → Completion::Fallback
//!   └─ spawn_blocking(speaker.speak)            [Speaking]
//!         └─ false / panic                      → logged, turn still Completed
//! ```
//!
//! `capture()` records and transcribes in one blocking call, so a turn stays
//! in `Listening` while whisper runs.  `Transcribing` is entered once the
//! transcript is in hand.
//!
//! The shutdown signal is checked before listening, after transcription,
//! after generation and before speaking.  Capture and playback also poll it
//! while blocked.

use std::sync::Arc;
use std::time::Duration;

use crate::llm::{CompletionClient, CompletionError, PromptTemplate};
use crate::stt::{CaptureError, SpeechCapture};
use crate::tts::Speaker;

use super::shutdown::ShutdownSignal;
use super::state::{Completion, Turn, TurnOutcome, TurnState};

/// Pause after a device fault so an unplugged microphone does not spin the
/// loop.
const DEVICE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Runs conversation turns strictly one after another.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use ava::llm::{CompletionClient, PromptTemplate};
/// # use ava::pipeline::{ShutdownSignal, TurnOrchestrator};
/// # use ava::stt::SpeechCapture;
/// # use ava::tts::Speaker;
/// # async fn example(
/// #     capturer: Arc<dyn SpeechCapture>,
/// #     client: Arc<dyn CompletionClient>,
/// #     speaker: Arc<dyn Speaker>,
/// # ) {
/// let shutdown = ShutdownSignal::new();
/// let template = PromptTemplate::new("Answer briefly: {text}").unwrap();
/// let orchestrator = TurnOrchestrator::new(capturer, client, speaker, template, shutdown);
/// let turns = orchestrator.run().await;
/// println!("{turns} turns completed");
/// # }
/// ```
pub struct TurnOrchestrator {
    capturer: Arc<dyn SpeechCapture>,
    completion: Arc<dyn CompletionClient>,
    speaker: Arc<dyn Speaker>,
    template: PromptTemplate,
    shutdown: ShutdownSignal,
    retry_delay: Duration,
}

impl TurnOrchestrator {
    pub fn new(
        capturer: Arc<dyn SpeechCapture>,
        completion: Arc<dyn CompletionClient>,
        speaker: Arc<dyn Speaker>,
        template: PromptTemplate,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            capturer,
            completion,
            speaker,
            template,
            shutdown,
            retry_delay: DEVICE_RETRY_DELAY,
        }
    }

    /// Override the pause taken after a device fault.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    /// Run turns until the shutdown signal is raised.  Returns the number of
    /// turns that reached the speaking stage.
    pub async fn run(&self) -> usize {
        let mut completed = 0;
        while !self.shutdown.is_triggered() {
            let turn = self.run_turn().await;
            if turn.is_completed() {
                completed += 1;
            }
        }
        log::info!("shutdown requested, stopping after {completed} completed turns");
        completed
    }

    /// Run one full turn and return its record.  Never panics outward.
    pub async fn run_turn(&self) -> Turn {
        let mut turn = Turn::new();
        if self.shutdown.is_triggered() {
            return turn;
        }

        // ── Listening / Transcribing ─────────────────────────────────────
        self.enter(&mut turn, TurnState::Listening);
        let capturer = Arc::clone(&self.capturer);
        let shutdown = self.shutdown.clone();
        let captured = tokio::task::spawn_blocking(move || capturer.capture(&shutdown)).await;

        let recognized = match captured {
            Ok(Ok(text)) => text,
            Ok(Err(CaptureError::Interrupted)) => return turn,
            Ok(Err(err @ CaptureError::Device(_))) => {
                log::error!("turn abandoned: {err}");
                turn.outcome = TurnOutcome::Abandoned(err.to_string());
                self.back_off().await;
                return turn;
            }
            Ok(Err(err)) => {
                log::warn!("turn abandoned: {err}");
                turn.outcome = TurnOutcome::Abandoned(err.to_string());
                return turn;
            }
            Err(join) => {
                log::error!("capture stage panicked: {join}");
                turn.outcome = TurnOutcome::Abandoned("capture stage panicked".into());
                return turn;
            }
        };

        // Transcription already ran inside capture(); this records its result.
        self.enter(&mut turn, TurnState::Transcribing);
        log::info!("Recognized: {recognized}");
        turn.recognized = Some(recognized.clone());
        if self.shutdown.is_triggered() {
            return turn;
        }

        // ── Prompting ────────────────────────────────────────────────────
        self.enter(&mut turn, TurnState::Prompting);
        let prompt = self.template.format(&recognized);
        turn.prompt = Some(prompt.clone());

        // ── Generating ───────────────────────────────────────────────────
        self.enter(&mut turn, TurnState::Generating);
        let completion = self.complete(&prompt).await;
        let reply = completion.text().to_string();
        turn.completion = Some(completion);
        if self.shutdown.is_triggered() {
            return turn;
        }

        // ── Speaking ─────────────────────────────────────────────────────
        self.enter(&mut turn, TurnState::Speaking);
        log::info!("Speaking: {reply}");
        let speaker = Arc::clone(&self.speaker);
        let shutdown = self.shutdown.clone();
        let spoken = tokio::task::spawn_blocking(move || speaker.speak(&reply, &shutdown))
            .await
            .unwrap_or_else(|join| {
                log::error!("speaking stage panicked: {join}");
                false
            });
        if !spoken {
            log::warn!("speech synthesis failed");
        }

        turn.spoken = spoken;
        turn.outcome = TurnOutcome::Completed;
        turn
    }

    /// Ask the model for a completion, substituting the fallback on any
    /// failure.  The request runs as its own task so a panic stays there.
    pub async fn complete(&self, prompt: &str) -> Completion {
        let client = Arc::clone(&self.completion);
        let prompt = prompt.to_string();
        let completion = match tokio::spawn(async move { client.generate(&prompt).await }).await {
            Ok(result) => Completion::from(result),
            Err(join) => {
                log::error!("completion stage panicked: {join}");
                Completion::Fallback(CompletionError::Unexpected(join.to_string()))
            }
        };

        if let Completion::Fallback(reason) = &completion {
            log::warn!("completion failed ({reason}), using fallback reply");
        }
        completion
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn enter(&self, turn: &mut Turn, state: TurnState) {
        log::debug!("turn: {} → {}", turn.state.label(), state.label());
        turn.state = state;
    }

    async fn back_off(&self) {
        if !self.shutdown.is_triggered() && !self.retry_delay.is_zero() {
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::pipeline::FALLBACK_MESSAGE;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    enum Step {
        Text(&'static str),
        NoSpeech,
        Device,
        Panic,
        /// Hears the text while shutdown is being requested.
        TextThenShutdown(&'static str),
    }

    /// Plays back a script of capture results, then requests shutdown.
    struct ScriptedCapture {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
    }

    impl ScriptedCapture {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl SpeechCapture for ScriptedCapture {
        fn capture(&self, shutdown: &ShutdownSignal) -> Result<String, CaptureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Text(text)) => Ok(text.to_string()),
                Some(Step::NoSpeech) => Err(CaptureError::NoSpeechDetected),
                Some(Step::Device) => Err(CaptureError::Device("unplugged".into())),
                Some(Step::Panic) => panic!("unclassified capture fault"),
                Some(Step::TextThenShutdown(text)) => {
                    shutdown.trigger();
                    Ok(text.to_string())
                }
                None => {
                    shutdown.trigger();
                    Err(CaptureError::Interrupted)
                }
            }
        }
    }

    enum Reply {
        Text(&'static str),
        Fail(CompletionError),
        Panic,
        /// Succeeds but raises shutdown first.
        Shutdown(ShutdownSignal),
    }

    struct FakeClient {
        reply: Reply,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeClient {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for FakeClient {
        async fn generate(&self, prompt: &str) -> Result<String, CompletionError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Reply::Text(text) => Ok(text.to_string()),
                Reply::Fail(e) => Err(e.clone()),
                Reply::Panic => panic!("client bug"),
                Reply::Shutdown(signal) => {
                    signal.trigger();
                    Ok("too late".into())
                }
            }
        }
    }

    struct RecordingSpeaker {
        result: bool,
        spoken: Mutex<Vec<String>>,
    }

    impl RecordingSpeaker {
        fn new(result: bool) -> Arc<Self> {
            Arc::new(Self {
                result,
                spoken: Mutex::new(Vec::new()),
            })
        }

        fn spoken(&self) -> Vec<String> {
            self.spoken.lock().unwrap().clone()
        }
    }

    impl Speaker for RecordingSpeaker {
        fn speak(&self, text: &str, _shutdown: &ShutdownSignal) -> bool {
            self.spoken.lock().unwrap().push(text.to_string());
            self.result
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn orchestrator(
        capture: &Arc<ScriptedCapture>,
        client: &Arc<FakeClient>,
        speaker: &Arc<RecordingSpeaker>,
        shutdown: ShutdownSignal,
    ) -> TurnOrchestrator {
        TurnOrchestrator::new(
            Arc::clone(capture) as Arc<dyn SpeechCapture>,
            Arc::clone(client) as Arc<dyn CompletionClient>,
            Arc::clone(speaker) as Arc<dyn Speaker>,
            PromptTemplate::new("Reply briefly to: {text}. Be terse.").unwrap(),
            shutdown,
        )
        .with_retry_delay(Duration::ZERO)
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn completed_turn_speaks_model_reply() {
        let capture = ScriptedCapture::new(vec![Step::Text("what time is it")]);
        let client = FakeClient::new(Reply::Text("Noon."));
        let speaker = RecordingSpeaker::new(true);
        let orc = orchestrator(&capture, &client, &speaker, ShutdownSignal::new());

        let turn = orc.run_turn().await;

        assert_eq!(turn.outcome, TurnOutcome::Completed);
        assert_eq!(turn.state, TurnState::Speaking);
        assert_eq!(turn.recognized.as_deref(), Some("what time is it"));
        assert_eq!(
            turn.prompt.as_deref(),
            Some("Reply briefly to: what time is it. Be terse.")
        );
        assert_eq!(turn.completion, Some(Completion::Model("Noon.".into())));
        assert!(turn.spoken);
        assert_eq!(speaker.spoken(), vec!["Noon."]);
        assert_eq!(*client.prompts.lock().unwrap(), vec![turn.prompt.unwrap()]);
    }

    #[tokio::test]
    async fn failed_completion_speaks_fallback() {
        let capture = ScriptedCapture::new(vec![Step::Text("hello")]);
        let client = FakeClient::new(Reply::Fail(CompletionError::Status {
            status: 500,
            body: "boom".into(),
        }));
        let speaker = RecordingSpeaker::new(true);
        let orc = orchestrator(&capture, &client, &speaker, ShutdownSignal::new());

        let turn = orc.run_turn().await;

        assert!(turn.is_completed());
        assert!(turn.completion.as_ref().is_some_and(Completion::is_fallback));
        assert_eq!(speaker.spoken(), vec![FALLBACK_MESSAGE]);
    }

    #[tokio::test]
    async fn panicking_completion_speaks_fallback() {
        let capture = ScriptedCapture::new(vec![Step::Text("hello")]);
        let client = FakeClient::new(Reply::Panic);
        let speaker = RecordingSpeaker::new(true);
        let orc = orchestrator(&capture, &client, &speaker, ShutdownSignal::new());

        let turn = orc.run_turn().await;

        assert!(matches!(
            turn.completion,
            Some(Completion::Fallback(CompletionError::Unexpected(_)))
        ));
        assert_eq!(speaker.spoken(), vec![FALLBACK_MESSAGE]);
    }

    #[tokio::test]
    async fn no_speech_abandons_turn_without_speaking() {
        let capture = ScriptedCapture::new(vec![Step::NoSpeech]);
        let client = FakeClient::new(Reply::Text("unused"));
        let speaker = RecordingSpeaker::new(true);
        let orc = orchestrator(&capture, &client, &speaker, ShutdownSignal::new());

        let turn = orc.run_turn().await;

        assert!(matches!(turn.outcome, TurnOutcome::Abandoned(_)));
        assert_eq!(turn.state, TurnState::Listening);
        assert!(turn.prompt.is_none());
        assert!(client.prompts.lock().unwrap().is_empty());
        assert!(speaker.spoken().is_empty());
    }

    #[tokio::test]
    async fn panicking_capture_does_not_stop_later_turns() {
        let capture = ScriptedCapture::new(vec![
            Step::Text("first"),
            Step::Panic,
            Step::Text("third"),
        ]);
        let client = FakeClient::new(Reply::Text("ok"));
        let speaker = RecordingSpeaker::new(true);
        let orc = orchestrator(&capture, &client, &speaker, ShutdownSignal::new());

        let completed = orc.run().await;

        assert_eq!(completed, 2);
        assert_eq!(
            *client.prompts.lock().unwrap(),
            vec![
                "Reply briefly to: first. Be terse.",
                "Reply briefly to: third. Be terse."
            ]
        );
        assert_eq!(speaker.spoken(), vec!["ok", "ok"]);
        // Three scripted turns plus the call that raised shutdown.
        assert_eq!(capture.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn device_fault_and_no_speech_keep_the_loop_running() {
        let capture = ScriptedCapture::new(vec![
            Step::Device,
            Step::NoSpeech,
            Step::Text("still here"),
        ]);
        let client = FakeClient::new(Reply::Text("yes"));
        let speaker = RecordingSpeaker::new(true);
        let orc = orchestrator(&capture, &client, &speaker, ShutdownSignal::new());

        assert_eq!(orc.run().await, 1);
        assert_eq!(speaker.spoken(), vec!["yes"]);
    }

    #[tokio::test]
    async fn failed_playback_still_completes_turn() {
        let capture = ScriptedCapture::new(vec![Step::Text("a"), Step::Text("b")]);
        let client = FakeClient::new(Reply::Text("reply"));
        let speaker = RecordingSpeaker::new(false);
        let orc = orchestrator(&capture, &client, &speaker, ShutdownSignal::new());

        assert_eq!(orc.run().await, 2);
        assert_eq!(speaker.spoken().len(), 2);
    }

    #[tokio::test]
    async fn shutdown_before_run_skips_capture() {
        let capture = ScriptedCapture::new(vec![Step::Text("never")]);
        let client = FakeClient::new(Reply::Text("unused"));
        let speaker = RecordingSpeaker::new(true);
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        let orc = orchestrator(&capture, &client, &speaker, shutdown);

        assert_eq!(orc.run().await, 0);
        assert_eq!(capture.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shutdown_during_generation_skips_speaking() {
        let shutdown = ShutdownSignal::new();
        let capture = ScriptedCapture::new(vec![Step::Text("hello")]);
        let client = FakeClient::new(Reply::Shutdown(shutdown.clone()));
        let speaker = RecordingSpeaker::new(true);
        let orc = orchestrator(&capture, &client, &speaker, shutdown);

        let turn = orc.run_turn().await;

        assert_eq!(turn.outcome, TurnOutcome::Interrupted);
        assert_eq!(turn.state, TurnState::Generating);
        assert!(speaker.spoken().is_empty());
    }

    #[tokio::test]
    async fn shutdown_after_transcription_keeps_text_but_skips_prompting() {
        let shutdown = ShutdownSignal::new();
        let capture = ScriptedCapture::new(vec![Step::TextThenShutdown("lights off")]);
        let client = FakeClient::new(Reply::Text("unused"));
        let speaker = RecordingSpeaker::new(true);
        let orc = orchestrator(&capture, &client, &speaker, shutdown);

        let turn = orc.run_turn().await;

        assert_eq!(turn.outcome, TurnOutcome::Interrupted);
        assert_eq!(turn.state, TurnState::Transcribing);
        assert_eq!(turn.recognized.as_deref(), Some("lights off"));
        assert!(turn.prompt.is_none());
        assert!(client.prompts.lock().unwrap().is_empty());
    }
}

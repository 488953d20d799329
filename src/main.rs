//! Application entry point.
//!
//! # Startup sequence
//!
//! 1. Initialise logging from `LOG_LEVEL`.
//! 2. Load [`AppConfig`], apply `OLLAMA_*` overrides, validate.
//! 3. Probe the input device.
//! 4. Load the whisper model (a missing model degrades, it does not abort).
//! 5. Wire capturer, completion client and synthesizer into a
//!    [`TurnOrchestrator`].
//! 6. Install the interrupt handler and run turns until shutdown.
//!
//! Exit code 0 after a clean shutdown, 1 when initialisation fails.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use ava::{
    audio::CpalMicrophone,
    config::{AppConfig, AppPaths},
    llm::{CompletionClient, OllamaClient, PromptTemplate},
    pipeline::{ShutdownSignal, TurnOrchestrator},
    stt::{SpeechCapture, SpeechCapturer, SttError, TranscribeParams, Transcriber, WhisperTranscriber},
    tts::{EspeakFactory, Speaker, SpeechSynthesizer},
};

fn main() -> ExitCode {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("LOG_LEVEL", "info")).init();
    log::info!("ava starting up");

    let (orchestrator, shutdown) = match build() {
        Ok(built) => built,
        Err(e) => {
            log::error!("initialisation failed: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        tokio::spawn(watch_signals(shutdown));
        orchestrator.run().await
    });

    log::info!("ava stopped");
    ExitCode::SUCCESS
}

/// Steps 2 to 5.  Any error here is fatal.
fn build() -> anyhow::Result<(TurnOrchestrator, ShutdownSignal)> {
    // 2. Configuration
    let paths = AppPaths::new();
    let mut config = AppConfig::load_from(&paths.settings_file)
        .with_context(|| format!("loading {}", paths.settings_file.display()))?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    let template = PromptTemplate::new(&config.prompt_template)?;
    log::info!(
        "completion endpoint {} (model {})",
        config.completion.endpoint,
        config.completion.model
    );

    // 3. Input device
    let microphone = CpalMicrophone::new(config.listener.audio_device.clone());
    microphone.probe().context("no usable input device")?;

    // 4. Transcriber
    let model_path = paths.model_file(&config.stt.model);
    let transcriber: Arc<dyn Transcriber> =
        match WhisperTranscriber::load(&model_path, TranscribeParams::from(&config.stt)) {
            Ok(whisper) => Arc::new(whisper),
            Err(e) => {
                log::warn!(
                    "Could not load Whisper model ({}): {e}. Every turn will report recognition unavailable.",
                    model_path.display()
                );
                Arc::new(NoModel {
                    path: model_path.display().to_string(),
                })
            }
        };

    // 5. Components
    let shutdown = ShutdownSignal::new();
    let capturer: Arc<dyn SpeechCapture> = Arc::new(SpeechCapturer::new(
        Arc::new(microphone),
        transcriber,
        config.listener.clone(),
    ));
    let client: Arc<dyn CompletionClient> = Arc::new(OllamaClient::from_config(&config.completion));
    let speaker: Arc<dyn Speaker> = Arc::new(SpeechSynthesizer::new(
        Arc::new(EspeakFactory::from_config(&config.speech)),
        config.speech.volume,
    ));

    let orchestrator =
        TurnOrchestrator::new(capturer, client, speaker, template, shutdown.clone());
    Ok((orchestrator, shutdown))
}

/// Raise `shutdown` on the first Ctrl+C or SIGTERM; exit on the second.
async fn watch_signals(shutdown: ShutdownSignal) {
    if let Err(e) = next_signal().await {
        log::error!("cannot listen for interrupt signals: {e}");
        return;
    }
    log::info!("interrupt received, finishing the current stage (interrupt again to force exit)");
    shutdown.trigger();

    if next_signal().await.is_ok() {
        log::warn!("second interrupt, exiting immediately");
        std::process::exit(130);
    }
}

#[cfg(unix)]
async fn next_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn next_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

// ---------------------------------------------------------------------------
// NoModel: stand-in transcriber when the model file is not present
// ---------------------------------------------------------------------------

struct NoModel {
    path: String,
}

impl Transcriber for NoModel {
    fn transcribe(&self, _audio: &[f32]) -> Result<String, SttError> {
        Err(SttError::ModelNotFound(self.path.clone()))
    }
}

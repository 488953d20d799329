//! The speech capturer: one utterance in, recognized text out.
//!
//! Every [`capture`](SpeechCapture::capture) call opens the microphone,
//! recalibrates against the room, records one utterance and releases the
//! device before transcription begins.  Release happens on every exit path
//! because the [`InputStream`](crate::audio::InputStream) is a guard owned by
//! the recording scope; a panic inside that scope unwinds through the guard
//! and is then caught here.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;

use super::engine::{SttError, Transcriber, MAX_AUDIO_SAMPLES, MIN_AUDIO_SAMPLES};
use crate::audio::{
    calibrate, record_utterance, resample_to_16k, AudioSource, EnergyDetector, RecordError,
    Utterance, TARGET_RATE,
};
use crate::config::ListenerConfig;
use crate::pipeline::{panic_message, ShutdownSignal};

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Why a capture produced no text.  None of these end the assistant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    /// Audio was captured but held no recognisable words.
    #[error("no speech detected")]
    NoSpeechDetected,

    /// The transcriber failed or is not available.
    #[error("speech recognition unavailable: {0}")]
    RecognitionUnavailable(String),

    /// The input device could not be opened or faulted mid-capture.
    #[error("audio device fault: {0}")]
    Device(String),

    /// Shutdown was requested while waiting for audio.
    #[error("capture interrupted by shutdown")]
    Interrupted,
}

/// One blocking capture per call.
pub trait SpeechCapture: Send + Sync {
    fn capture(&self, shutdown: &ShutdownSignal) -> Result<String, CaptureError>;
}

// ---------------------------------------------------------------------------
// SpeechCapturer
// ---------------------------------------------------------------------------

pub struct SpeechCapturer {
    source: Arc<dyn AudioSource>,
    transcriber: Arc<dyn Transcriber>,
    config: ListenerConfig,
}

impl SpeechCapturer {
    pub fn new(
        source: Arc<dyn AudioSource>,
        transcriber: Arc<dyn Transcriber>,
        config: ListenerConfig,
    ) -> Self {
        Self {
            source,
            transcriber,
            config,
        }
    }

    /// Device-holding part of a capture.  The stream is dropped on return.
    fn record(&self, shutdown: &ShutdownSignal) -> Result<Utterance, RecordError> {
        let mut stream = self.source.open()?;
        let mut detector = EnergyDetector::default();
        calibrate(
            stream.as_mut(),
            &mut detector,
            self.config.ambient_noise_secs,
            shutdown,
        )?;
        log::debug!("listening (threshold {:.4})", detector.threshold());
        record_utterance(stream.as_mut(), &mut detector, &self.config, shutdown)
    }

    fn transcribe(&self, utterance: &Utterance) -> Result<String, CaptureError> {
        let mut audio = resample_to_16k(&utterance.samples, utterance.sample_rate);
        if audio.len() < MIN_AUDIO_SAMPLES {
            log::debug!("utterance too short to transcribe ({} samples)", audio.len());
            return Err(CaptureError::NoSpeechDetected);
        }
        if audio.len() > MAX_AUDIO_SAMPLES {
            // Only reachable without a phrase time limit.
            log::warn!(
                "utterance of {:.1}s exceeds the recognizer window, keeping the first {}s",
                utterance.duration_secs(),
                MAX_AUDIO_SAMPLES / TARGET_RATE as usize
            );
            audio.truncate(MAX_AUDIO_SAMPLES);
        }

        match catch_unwind(AssertUnwindSafe(|| self.transcriber.transcribe(&audio))) {
            Ok(Ok(raw)) => spoken_text(&raw).ok_or(CaptureError::NoSpeechDetected),
            Ok(Err(SttError::AudioTooShort)) => Err(CaptureError::NoSpeechDetected),
            Ok(Err(e)) => Err(CaptureError::RecognitionUnavailable(e.to_string())),
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                log::error!("transcriber panicked: {msg}");
                Err(CaptureError::RecognitionUnavailable(msg))
            }
        }
    }
}

impl SpeechCapture for SpeechCapturer {
    fn capture(&self, shutdown: &ShutdownSignal) -> Result<String, CaptureError> {
        let utterance = match catch_unwind(AssertUnwindSafe(|| self.record(shutdown))) {
            Ok(Ok(utterance)) => utterance,
            Ok(Err(RecordError::Interrupted)) => return Err(CaptureError::Interrupted),
            Ok(Err(RecordError::Device(e))) => {
                log::error!("capture failed: {e}");
                return Err(CaptureError::Device(e.to_string()));
            }
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                log::error!("capture panicked: {msg}");
                return Err(CaptureError::Device(msg));
            }
        };

        self.transcribe(&utterance)
    }
}

/// Strip whisper's non-speech annotations (`[BLANK_AUDIO]`, `(music)`) and
/// return what is left, or `None` if no words remain.
fn spoken_text(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }

    let text = out.split_whitespace().collect::<Vec<_>>().join(" ");
    text.chars().any(char::is_alphanumeric).then_some(text)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::audio::{DeviceError, InputStream};

    const RATE: u32 = 16_000;
    const CHUNK: usize = 1_600;

    #[derive(Default)]
    struct Counters {
        opens: AtomicUsize,
        releases: AtomicUsize,
    }

    #[derive(Clone, Copy)]
    enum Script {
        /// 0.5 s ambient, 1 s speech, 1 s silence.
        Speech,
        /// Stream closes right after calibration.
        Disconnect,
        /// `read` panics on the first call.
        Panic,
    }

    struct TestSource {
        script: Script,
        counters: Arc<Counters>,
        fail_open: bool,
    }

    struct TestStream {
        chunks: VecDeque<Vec<f32>>,
        panic: bool,
        counters: Arc<Counters>,
    }

    impl AudioSource for TestSource {
        fn open(&self) -> Result<Box<dyn InputStream>, DeviceError> {
            if self.fail_open {
                return Err(DeviceError::NoDevice);
            }
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            let parts: &[(f32, usize)] = match self.script {
                Script::Speech => &[(0.001, 5), (0.3, 10), (0.0, 10)],
                Script::Disconnect => &[(0.001, 5)],
                Script::Panic => &[],
            };
            let chunks = parts
                .iter()
                .flat_map(|&(amp, n)| std::iter::repeat(vec![amp; CHUNK]).take(n))
                .collect();
            Ok(Box::new(TestStream {
                chunks,
                panic: matches!(self.script, Script::Panic),
                counters: Arc::clone(&self.counters),
            }))
        }
    }

    impl InputStream for TestStream {
        fn sample_rate(&self) -> u32 {
            RATE
        }

        fn read(&mut self, _timeout: Duration) -> Result<Option<Vec<f32>>, DeviceError> {
            if self.panic {
                panic!("driver exploded");
            }
            self.chunks
                .pop_front()
                .map(Some)
                .ok_or(DeviceError::Disconnected)
        }
    }

    impl Drop for TestStream {
        fn drop(&mut self) {
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Records whether the device was already released when called.
    struct TestTranscriber {
        reply: Result<&'static str, SttError>,
        panic: bool,
        counters: Arc<Counters>,
        released_before_call: AtomicUsize,
    }

    impl Transcriber for TestTranscriber {
        fn transcribe(&self, audio: &[f32]) -> Result<String, SttError> {
            let released = self.counters.releases.load(Ordering::SeqCst);
            self.released_before_call.store(released, Ordering::SeqCst);
            if self.panic {
                panic!("model corrupted");
            }
            assert!(audio.len() >= MIN_AUDIO_SAMPLES);
            assert!(audio.len() <= MAX_AUDIO_SAMPLES);
            self.reply.clone().map(str::to_string)
        }
    }

    fn capturer(
        script: Script,
        reply: Result<&'static str, SttError>,
        panic: bool,
    ) -> (SpeechCapturer, Arc<Counters>, Arc<TestTranscriber>) {
        let counters = Arc::new(Counters::default());
        let source = Arc::new(TestSource {
            script,
            counters: Arc::clone(&counters),
            fail_open: false,
        });
        let transcriber = Arc::new(TestTranscriber {
            reply,
            panic,
            counters: Arc::clone(&counters),
            released_before_call: AtomicUsize::new(0),
        });
        let capturer = SpeechCapturer::new(
            source,
            Arc::clone(&transcriber) as Arc<dyn Transcriber>,
            ListenerConfig::default(),
        );
        (capturer, counters, transcriber)
    }

    fn assert_scoped_once(counters: &Counters) {
        assert_eq!(counters.opens.load(Ordering::SeqCst), 1);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn successful_capture_releases_device_before_transcribing() {
        let (capturer, counters, transcriber) =
            capturer(Script::Speech, Ok(" turn off the lights "), false);

        let text = capturer.capture(&ShutdownSignal::new()).unwrap();

        assert_eq!(text, "turn off the lights");
        assert_scoped_once(&counters);
        assert_eq!(transcriber.released_before_call.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_transcript_is_no_speech() {
        let (capturer, counters, _) = capturer(Script::Speech, Ok(""), false);
        assert_eq!(
            capturer.capture(&ShutdownSignal::new()),
            Err(CaptureError::NoSpeechDetected)
        );
        assert_scoped_once(&counters);
    }

    #[test]
    fn blank_audio_annotation_is_no_speech() {
        let (capturer, _, _) = capturer(Script::Speech, Ok("[BLANK_AUDIO]"), false);
        assert_eq!(
            capturer.capture(&ShutdownSignal::new()),
            Err(CaptureError::NoSpeechDetected)
        );
    }

    #[test]
    fn transcriber_error_is_recognition_unavailable() {
        let (capturer, counters, _) = capturer(
            Script::Speech,
            Err(SttError::Transcription("backend down".into())),
            false,
        );
        let err = capturer.capture(&ShutdownSignal::new()).unwrap_err();
        assert!(matches!(err, CaptureError::RecognitionUnavailable(ref m) if m.contains("backend down")));
        assert_scoped_once(&counters);
    }

    #[test]
    fn transcriber_panic_is_contained() {
        let (capturer, counters, _) = capturer(Script::Speech, Ok("unused"), true);
        let err = capturer.capture(&ShutdownSignal::new()).unwrap_err();
        assert!(matches!(err, CaptureError::RecognitionUnavailable(ref m) if m.contains("model corrupted")));
        assert_scoped_once(&counters);
    }

    #[test]
    fn stream_closing_mid_capture_is_device_fault() {
        let (capturer, counters, _) = capturer(Script::Disconnect, Ok("unused"), false);
        let err = capturer.capture(&ShutdownSignal::new()).unwrap_err();
        assert!(matches!(err, CaptureError::Device(_)), "{err:?}");
        assert_scoped_once(&counters);
    }

    #[test]
    fn panic_while_reading_still_releases_device() {
        let (capturer, counters, _) = capturer(Script::Panic, Ok("unused"), false);
        let err = capturer.capture(&ShutdownSignal::new()).unwrap_err();
        assert!(matches!(err, CaptureError::Device(ref m) if m.contains("driver exploded")));
        assert_scoped_once(&counters);
    }

    #[test]
    fn open_failure_is_device_fault() {
        let counters = Arc::new(Counters::default());
        let capturer = SpeechCapturer::new(
            Arc::new(TestSource {
                script: Script::Speech,
                counters: Arc::clone(&counters),
                fail_open: true,
            }),
            Arc::new(TestTranscriber {
                reply: Ok("unused"),
                panic: false,
                counters: Arc::clone(&counters),
                released_before_call: AtomicUsize::new(0),
            }),
            ListenerConfig::default(),
        );
        assert!(matches!(
            capturer.capture(&ShutdownSignal::new()),
            Err(CaptureError::Device(_))
        ));
        assert_eq!(counters.releases.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shutdown_before_capture_is_interrupted() {
        let (capturer, counters, _) = capturer(Script::Speech, Ok("unused"), false);
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        assert_eq!(capturer.capture(&shutdown), Err(CaptureError::Interrupted));
        assert_scoped_once(&counters);
    }

    #[test]
    fn overlong_utterance_is_cut_to_recognizer_window() {
        let (capturer, _, _) = capturer(Script::Speech, Ok("a very long request"), false);
        let utterance = Utterance {
            samples: vec![0.3; MAX_AUDIO_SAMPLES + 5 * RATE as usize],
            sample_rate: RATE,
        };

        assert_eq!(
            capturer.transcribe(&utterance),
            Ok("a very long request".to_string())
        );
    }

    #[test]
    fn spoken_text_strips_annotations() {
        assert_eq!(spoken_text("  hello   world "), Some("hello world".into()));
        assert_eq!(spoken_text("[BLANK_AUDIO]"), None);
        assert_eq!(spoken_text("(music) play it again"), Some("play it again".into()));
        assert_eq!(spoken_text(" . "), None);
    }
}

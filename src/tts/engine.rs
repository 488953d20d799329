//! Synthesis engines and the factory that creates one per utterance.
//!
//! An engine lives for exactly one [`speak`](super::Speaker::speak) call:
//! created, given a volume, asked to say one text, then closed.  Nothing
//! about it survives into the next call.
//!
//! The production engine renders WAV with `espeak-ng --stdout` and plays it
//! through its own rodio output stream.

use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use thiserror::Error;

use crate::config::SpeechConfig;
use crate::pipeline::ShutdownSignal;

/// How often playback checks for completion and shutdown.
const PLAYBACK_POLL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// TtsError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("synthesizer exited with {status}: {stderr}")]
    Synthesis { status: String, stderr: String },

    #[error("no audio output device: {0}")]
    Output(String),

    #[error("could not decode synthesized audio: {0}")]
    Decode(String),

    #[error("playback interrupted by shutdown")]
    Interrupted,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// One synthesis session.  `close` consumes the engine.
pub trait SynthesisEngine {
    fn set_volume(&mut self, volume: f32) -> Result<(), TtsError>;

    /// Render and play `text`, blocking until playback ends.
    fn say(&mut self, text: &str, shutdown: &ShutdownSignal) -> Result<(), TtsError>;

    fn close(self: Box<Self>) -> Result<(), TtsError>;
}

/// Creates a fresh [`SynthesisEngine`] on demand.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn SynthesisEngine>, TtsError>;
}

// ---------------------------------------------------------------------------
// EspeakFactory / EspeakEngine
// ---------------------------------------------------------------------------

/// Builds [`EspeakEngine`]s from [`SpeechConfig`].
#[derive(Debug, Clone)]
pub struct EspeakFactory {
    program: String,
    voice: Option<String>,
    rate_wpm: u32,
}

impl EspeakFactory {
    pub fn from_config(config: &SpeechConfig) -> Self {
        Self {
            program: config.program.clone(),
            voice: config.voice.clone(),
            rate_wpm: config.rate_wpm,
        }
    }

    /// Arguments for one render.  Text goes in on stdin.
    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--stdout".to_string(),
            "-s".to_string(),
            self.rate_wpm.to_string(),
        ];
        if let Some(voice) = &self.voice {
            args.push("-v".to_string());
            args.push(voice.clone());
        }
        args.push("--stdin".to_string());
        args
    }
}

impl EngineFactory for EspeakFactory {
    fn create(&self) -> Result<Box<dyn SynthesisEngine>, TtsError> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| TtsError::Output(e.to_string()))?;
        let sink = Sink::try_new(&handle).map_err(|e| TtsError::Output(e.to_string()))?;

        Ok(Box::new(EspeakEngine {
            program: self.program.clone(),
            args: self.args(),
            _stream: stream,
            _handle: handle,
            sink,
        }))
    }
}

/// Owns an output stream and sink for the duration of one utterance.
pub struct EspeakEngine {
    program: String,
    args: Vec<String>,
    _stream: OutputStream,
    _handle: OutputStreamHandle,
    sink: Sink,
}

impl SynthesisEngine for EspeakEngine {
    fn set_volume(&mut self, volume: f32) -> Result<(), TtsError> {
        self.sink.set_volume(volume.clamp(0.0, 1.0));
        Ok(())
    }

    fn say(&mut self, text: &str, shutdown: &ShutdownSignal) -> Result<(), TtsError> {
        let wav = render_wav(&self.program, &self.args, text)?;
        let source = wav_to_source(&wav)?;
        self.sink.append(source);

        while !self.sink.empty() {
            if shutdown.is_triggered() {
                self.sink.stop();
                return Err(TtsError::Interrupted);
            }
            std::thread::sleep(PLAYBACK_POLL);
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), TtsError> {
        self.sink.stop();
        log::debug!("speech engine closed");
        Ok(())
    }
}

/// Run the synthesizer once and return the WAV bytes it writes to stdout.
pub(crate) fn render_wav(program: &str, args: &[String], text: &str) -> Result<Vec<u8>, TtsError> {
    let spawn_err = |source| TtsError::Spawn {
        program: program.to_string(),
        source,
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;

    if let Some(mut stdin) = child.stdin.take() {
        // A program that exits without reading is reported by its status.
        if let Err(e) = stdin.write_all(text.as_bytes()) {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(spawn_err(e));
            }
        }
    }

    let output = child.wait_with_output().map_err(spawn_err)?;
    if !output.status.success() {
        return Err(TtsError::Synthesis {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

/// Decode 16-bit PCM WAV into a buffer that ends where the bytes end.
///
/// `espeak-ng --stdout` cannot seek back to patch the header, so its RIFF
/// and `data` sizes are placeholders (`0x7ffff000`).  The sample count is
/// taken from the bytes actually present after the `data` chunk header,
/// capped by the declared size when that is smaller.
pub(crate) fn wav_to_source(bytes: &[u8]) -> Result<SamplesBuffer<f32>, TtsError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(TtsError::Decode("not a RIFF/WAVE stream".into()));
    }

    let mut format: Option<(u16, u32)> = None;
    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let declared = read_u32(bytes, pos + 4) as usize;
        let body = pos + 8;

        match id {
            b"fmt " => {
                if body + 16 > bytes.len() {
                    return Err(TtsError::Decode("truncated fmt chunk".into()));
                }
                let audio_format = read_u16(bytes, body);
                let channels = read_u16(bytes, body + 2);
                let sample_rate = read_u32(bytes, body + 4);
                let bits = read_u16(bytes, body + 14);
                if audio_format != 1 || bits != 16 {
                    return Err(TtsError::Decode(format!(
                        "unsupported encoding (format {audio_format}, {bits} bits)"
                    )));
                }
                if channels == 0 || sample_rate == 0 {
                    return Err(TtsError::Decode("fmt chunk has no channels or rate".into()));
                }
                format = Some((channels, sample_rate));
            }
            b"data" => {
                let (channels, sample_rate) =
                    format.ok_or_else(|| TtsError::Decode("data chunk before fmt chunk".into()))?;
                let available = bytes.len() - body;
                let len = declared.min(available) & !1;
                let samples: Vec<f32> = bytes[body..body + len]
                    .chunks_exact(2)
                    .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
                    .collect();
                return Ok(SamplesBuffer::new(channels, sample_rate, samples));
            }
            _ => {}
        }

        // Chunks are padded to an even length.
        pos = body.saturating_add(declared).saturating_add(declared & 1);
    }

    Err(TtsError::Decode("no data chunk".into()))
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rodio::Source;

    /// Header exactly as `espeak-ng --stdout` writes it: 22050 Hz mono
    /// 16-bit with placeholder RIFF and `data` sizes.
    fn espeak_header() -> Vec<u8> {
        let mut wav = Vec::with_capacity(44);
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&0x7fff_f024u32.to_le_bytes());
        wav.extend_from_slice(b"WAVEfmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&22050u32.to_le_bytes());
        wav.extend_from_slice(&44100u32.to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes());
        wav.extend_from_slice(&16u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&0x7fff_f000u32.to_le_bytes());
        wav
    }

    #[test]
    fn placeholder_sizes_yield_only_the_samples_present() {
        let mut wav = espeak_header();
        for i in 0..22050i16 {
            wav.extend_from_slice(&(i % 100).to_le_bytes());
        }

        let source = wav_to_source(&wav).unwrap();
        assert_eq!(source.channels(), 1);
        assert_eq!(source.sample_rate(), 22050);
        assert_eq!(source.count(), 22050);
    }

    #[test]
    fn samples_are_scaled_to_unit_range() {
        let mut wav = espeak_header();
        for sample in [i16::MIN, 0, 16384] {
            wav.extend_from_slice(&sample.to_le_bytes());
        }
        let samples: Vec<f32> = wav_to_source(&wav).unwrap().collect();
        assert_eq!(samples, vec![-1.0, 0.0, 0.5]);
    }

    #[test]
    fn header_only_stream_is_empty() {
        // What espeak-ng writes for an empty text.
        let source = wav_to_source(&espeak_header()).unwrap();
        assert_eq!(source.count(), 0);
    }

    #[test]
    fn trailing_odd_byte_is_dropped() {
        let mut wav = espeak_header();
        wav.extend_from_slice(&[0x10, 0x00, 0x20]);
        assert_eq!(wav_to_source(&wav).unwrap().count(), 1);
    }

    #[test]
    fn truncated_header_is_decode_error() {
        let wav = espeak_header();
        let err = wav_to_source(&wav[..20]).err().expect("decode error");
        assert!(matches!(err, TtsError::Decode(_)), "{err}");

        let err = wav_to_source(&wav[..30]).err().expect("decode error");
        assert!(matches!(err, TtsError::Decode(_)), "{err}");
    }

    #[test]
    fn non_wav_output_is_decode_error() {
        let err = wav_to_source(b"espeak-ng: no voice").err().expect("decode error");
        assert!(matches!(err, TtsError::Decode(_)), "{err}");
    }

    #[test]
    fn args_carry_rate_and_voice() {
        let factory = EspeakFactory::from_config(&SpeechConfig {
            voice: Some("en-gb".into()),
            rate_wpm: 150,
            ..SpeechConfig::default()
        });
        assert_eq!(
            factory.args(),
            ["--stdout", "-s", "150", "-v", "en-gb", "--stdin"]
        );
    }

    #[test]
    fn args_without_voice_use_synthesizer_default() {
        let factory = EspeakFactory::from_config(&SpeechConfig::default());
        assert!(!factory.args().contains(&"-v".to_string()));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = render_wav("/nonexistent/espeak-ng", &[], "hello").unwrap_err();
        assert!(matches!(err, TtsError::Spawn { .. }), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn stdout_of_program_is_returned() {
        // `cat` echoes stdin, standing in for a synthesizer.
        let bytes = render_wav("cat", &[], "RIFF").unwrap();
        assert_eq!(bytes, b"RIFF");
    }

    #[cfg(unix)]
    #[test]
    fn failing_program_is_synthesis_error() {
        let err = render_wav("false", &[], "hello").unwrap_err();
        assert!(matches!(err, TtsError::Synthesis { .. }), "{err}");
    }
}

//! Application settings structs, defaults, TOML loading and environment
//! overrides.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`.
//! Every struct is `#[serde(default)]`, so a `settings.toml` only needs the
//! keys it wants to change.
//!
//! The configuration is read once at startup and never mutated afterwards;
//! `main` hands each component the sub-config it needs.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AppPaths;
use crate::audio::TARGET_RATE;
use crate::llm::{PromptError, PromptTemplate};
use crate::stt::MAX_AUDIO_SAMPLES;

/// Template used when `settings.toml` does not set `prompt_template`.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Create the ultimate minimal response to the \
following prompt: {text}\nRespond with as fewest words as possible, ideally in a complete \
sentence.";

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("environment variable {var} has an invalid value {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid completion endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("invalid setting `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("invalid prompt template: {0}")]
    Template(#[from] PromptError),
}

// ---------------------------------------------------------------------------
// CompletionConfig
// ---------------------------------------------------------------------------

/// Settings for the local completion endpoint (Ollama `/api/generate`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Full URL the prompt is POSTed to.
    pub endpoint: String,
    /// Model identifier sent in the request body (e.g. `"gemma3:1b"`).
    pub model: String,
    /// Sampling temperature. `0.0` is deterministic.
    pub temperature: f32,
    /// Maximum number of tokens the model may produce.
    pub max_tokens: u32,
    /// Seconds to wait for the whole request before giving up.
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/api/generate".into(),
            model: "gemma3:1b".into(),
            temperature: 0.0,
            max_tokens: 20,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// ListenerConfig
// ---------------------------------------------------------------------------

/// Settings for microphone capture and utterance detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Seconds of ambient audio sampled before every capture to recalibrate
    /// the speech threshold.
    pub ambient_noise_secs: f32,
    /// Seconds of trailing silence that end an utterance.
    pub pause_threshold_secs: f32,
    /// Utterances with less speech than this are discarded as noise.
    pub phrase_threshold_secs: f32,
    /// Seconds of audio kept before the first loud chunk (pre-roll).
    pub non_speaking_secs: f32,
    /// Hard cap on speech length, measured from the first loud chunk and at
    /// most 60 s.  `None` records until the pause; anything past 60 s is then
    /// dropped before transcription.
    pub phrase_time_limit_secs: Option<f32>,
    /// Keep adapting the threshold to background noise while waiting for
    /// speech to start.
    pub dynamic_energy: bool,
    /// Input device name. `None` means the system default.
    pub audio_device: Option<String>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            ambient_noise_secs: 0.5,
            pause_threshold_secs: 0.8,
            phrase_threshold_secs: 0.3,
            non_speaking_secs: 0.5,
            phrase_time_limit_secs: Some(15.0),
            dynamic_energy: true,
            audio_device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Settings for the whisper transcriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// GGML model file stem inside the models directory.
    pub model: String,
    /// ISO-639-1 code, or `"auto"` for whisper's language detection.
    pub language: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: "ggml-base.en".into(),
            language: "en".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Settings for speech synthesis and playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Playback volume in `[0.0, 1.0]`.
    pub volume: f32,
    /// Synthesizer executable; must accept `--stdout` and write WAV.
    pub program: String,
    /// Voice name passed with `-v`. `None` uses the synthesizer default.
    pub voice: Option<String>,
    /// Speaking rate in words per minute.
    pub rate_wpm: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            program: "espeak-ng".into(),
            voice: None,
            rate_wpm: 175,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, read from `settings.toml`.
///
/// ```rust,no_run
/// use ava::config::AppConfig;
///
/// let mut config = AppConfig::load().unwrap();
/// config.apply_env_overrides(|key| std::env::var(key).ok()).unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub completion: CompletionConfig,
    pub listener: ListenerConfig,
    pub stt: SttConfig,
    pub speech: SpeechConfig,
    /// Prompt sent to the model; `{text}` marks where the recognized speech
    /// goes and must appear exactly once.
    pub prompt_template: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            completion: CompletionConfig::default(),
            listener: ListenerConfig::default(),
            stt: SttConfig::default(),
            speech: SpeechConfig::default(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.into(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`
    /// (or the file named by `AVA_CONFIG`).
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Override completion settings from `OLLAMA_ENDPOINT`, `OLLAMA_MODEL`,
    /// `OLLAMA_TEMPERATURE` and `OLLAMA_MAX_TOKENS`.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production and a map in tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("OLLAMA_ENDPOINT") {
            self.completion.endpoint = endpoint;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.completion.model = model;
        }
        if let Some(value) = lookup("OLLAMA_TEMPERATURE") {
            self.completion.temperature = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: "OLLAMA_TEMPERATURE",
                    value,
                })?;
        }
        if let Some(value) = lookup("OLLAMA_MAX_TOKENS") {
            self.completion.max_tokens = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: "OLLAMA_MAX_TOKENS",
                    value,
                })?;
        }
        Ok(())
    }

    /// Check every value a component would otherwise reject at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.completion.endpoint)
            .map_err(|_| ConfigError::InvalidEndpoint(self.completion.endpoint.clone()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint(self.completion.endpoint.clone()));
        }

        let t = self.completion.temperature;
        if !t.is_finite() || t < 0.0 {
            return Err(invalid("completion.temperature", format!("{t} is not >= 0")));
        }
        if self.completion.max_tokens == 0 {
            return Err(invalid("completion.max_tokens", "must be at least 1".into()));
        }
        if self.completion.timeout_secs == 0 {
            return Err(invalid("completion.timeout_secs", "must be at least 1".into()));
        }

        let v = self.speech.volume;
        if !(0.0..=1.0).contains(&v) {
            return Err(invalid("speech.volume", format!("{v} is outside [0, 1]")));
        }

        let l = &self.listener;
        for (field, secs) in [
            ("listener.ambient_noise_secs", l.ambient_noise_secs),
            ("listener.pause_threshold_secs", l.pause_threshold_secs),
            ("listener.phrase_threshold_secs", l.phrase_threshold_secs),
            ("listener.non_speaking_secs", l.non_speaking_secs),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return Err(invalid(field, format!("{secs} is not a duration")));
            }
        }
        if let Some(limit) = l.phrase_time_limit_secs {
            let window = MAX_AUDIO_SAMPLES as f32 / TARGET_RATE as f32;
            if !limit.is_finite() || limit <= 0.0 {
                return Err(invalid(
                    "listener.phrase_time_limit_secs",
                    format!("{limit} is not a positive duration"),
                ));
            }
            if limit > window {
                return Err(invalid(
                    "listener.phrase_time_limit_secs",
                    format!("{limit}s is longer than the {window}s the recognizer accepts"),
                ));
            }
        }

        PromptTemplate::new(&self.prompt_template)?;
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidValue { field, reason }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Core `CompletionClient` trait and `OllamaClient` implementation.
//!
//! `OllamaClient` POSTs one prompt to Ollama's native `/api/generate`
//! endpoint with streaming disabled and reads back the `response` field.
//! All connection details come from [`CompletionConfig`]; nothing is
//! hardcoded.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::config::CompletionConfig;

/// Number of characters of a completion echoed to the log.
const LOG_PREVIEW_CHARS: usize = 50;

// ---------------------------------------------------------------------------
// CompletionError
// ---------------------------------------------------------------------------

/// Closed set of reasons a completion request can fail.
///
/// The `Display` text of each variant is the short reason reported for the
/// turn; the fields carry the detail that goes to the log.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompletionError {
    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// The endpoint could not be reached (refused, DNS, reset).
    #[error("Connection error")]
    Connection(String),

    /// The endpoint answered with a status other than 200.
    #[error("Error {status}")]
    Status { status: u16, body: String },

    /// Anything else, e.g. a 200 response whose body is not JSON.
    #[error("Unexpected error")]
    Unexpected(String),
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CompletionError::Timeout
        } else if e.is_decode() || e.is_builder() {
            CompletionError::Unexpected(e.to_string())
        } else {
            CompletionError::Connection(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// CompletionClient trait
// ---------------------------------------------------------------------------

/// Async trait for exchanging one prompt for one completion.
///
/// Implementors must be `Send + Sync` so they can be held behind an
/// `Arc<dyn CompletionClient>`.  Implementations hold no per-call state.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, CompletionError>;
}

// ---------------------------------------------------------------------------
// OllamaClient
// ---------------------------------------------------------------------------

/// Calls an Ollama-style `/api/generate` endpoint.
///
/// Request body:
///
/// ```json
/// {"prompt": "...", "model": "...", "stream": false, "temperature": 0.0, "max_tokens": 20}
/// ```
pub struct OllamaClient {
    client: reqwest::Client,
    config: CompletionConfig,
    timeout: Duration,
}

impl OllamaClient {
    /// Build an `OllamaClient` from application config.
    ///
    /// The HTTP client is pre-configured with `config.timeout_secs` as the
    /// whole-request timeout.
    pub fn from_config(config: &CompletionConfig) -> Self {
        Self::with_timeout(config, Duration::from_secs(config.timeout_secs))
    }

    /// Same as [`from_config`](Self::from_config) with an explicit timeout.
    pub fn with_timeout(config: &CompletionConfig, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("HTTP client setup failed ({e}); using defaults with a per-request timeout");
                reqwest::Client::new()
            });

        log::info!("OllamaClient initialized with model: {}", config.model);

        Self {
            client,
            config: config.clone(),
            timeout,
        }
    }

    async fn send(&self, prompt: &str) -> Result<String, CompletionError> {
        let body = serde_json::json!({
            "prompt":      prompt,
            "model":       self.config.model,
            "stream":      false,
            "temperature": self.config.temperature,
            "max_tokens":  self.config.max_tokens
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response.json().await?;

        // A missing or non-string `response` field is an empty completion.
        let text = json["response"].as_str().unwrap_or_default().to_string();
        Ok(text)
    }
}

#[async_trait]
impl CompletionClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, CompletionError> {
        match self.send(prompt).await {
            Ok(text) => {
                let preview: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
                log::info!("LLM response: {preview}...");
                Ok(text)
            }
            Err(err) => {
                match &err {
                    CompletionError::Timeout => log::error!("LLM request timed out"),
                    CompletionError::Connection(detail) => {
                        log::error!("LLM request failed: {detail}")
                    }
                    CompletionError::Status { status, body } => {
                        log::error!("LLM error {status}: {body}")
                    }
                    CompletionError::Unexpected(detail) => {
                        log::error!("Unexpected error during LLM generation: {detail}")
                    }
                }
                Err(err)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

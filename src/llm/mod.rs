//! Completion stage: prompt formatting and the local LLM endpoint.
//!
//! This module provides:
//! * [`CompletionClient`]: async trait implemented by completion backends.
//! * [`OllamaClient`]: Ollama `/api/generate` client (production backend).
//! * [`CompletionError`]: closed set of failure reasons for one request.
//! * [`PromptTemplate`]: template with a single `{text}` substitution point.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use ava::config::AppConfig;
//! use ava::llm::{CompletionClient, OllamaClient, PromptTemplate};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let template = PromptTemplate::new(&config.prompt_template).unwrap();
//!     let client = OllamaClient::from_config(&config.completion);
//!
//!     match client.generate(&template.format("turn off the lights")).await {
//!         Ok(text) => println!("{text}"),
//!         Err(reason) => eprintln!("{reason}"),
//!     }
//! }
//! ```

pub mod client;
pub mod prompt;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use client::{CompletionClient, CompletionError, OllamaClient};
pub use prompt::{PromptError, PromptTemplate, PLACEHOLDER};

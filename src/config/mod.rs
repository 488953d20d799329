//! Configuration module for the voice assistant.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each stage,
//! `AppPaths` for cross-platform data directories, TOML loading via
//! `AppConfig::load`, and environment overrides for the completion endpoint.

pub mod paths;
pub mod settings;

pub use paths::{AppPaths, CONFIG_PATH_ENV};
pub use settings::{
    AppConfig, CompletionConfig, ConfigError, ListenerConfig, SpeechConfig, SttConfig,
    DEFAULT_PROMPT_TEMPLATE,
};

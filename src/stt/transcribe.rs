//! Parameters for a single whisper inference run.

use crate::config::SttConfig;

/// Settings that control one [`WhisperTranscriber`](super::WhisperTranscriber)
/// call.
///
/// ```
/// use ava::stt::TranscribeParams;
///
/// let params = TranscribeParams {
///     language: "de".into(),
///     ..TranscribeParams::default()
/// };
/// assert_eq!(params.best_of, 1);
/// ```
#[derive(Debug, Clone)]
pub struct TranscribeParams {
    /// ISO-639-1 language code, or `"auto"` to let whisper detect it.
    pub language: String,

    /// Candidates evaluated per step with greedy decoding.  1 is fastest.
    pub best_of: i32,

    /// CPU threads handed to whisper.
    pub n_threads: i32,

    /// Keep whisper's progress output off stderr.
    pub suppress_progress: bool,
}

impl Default for TranscribeParams {
    fn default() -> Self {
        Self {
            language: "en".into(),
            best_of: 1,
            n_threads: optimal_threads(),
            suppress_progress: true,
        }
    }
}

impl From<&SttConfig> for TranscribeParams {
    fn from(config: &SttConfig) -> Self {
        Self {
            language: config.language.clone(),
            ..Self::default()
        }
    }
}

/// Inference threads: available parallelism capped at 8, where whisper
/// stops getting faster.
pub(crate) fn optimal_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

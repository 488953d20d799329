//! Voice assistant loop: listen for one utterance, transcribe it, ask a
//! local LLM for a short reply and speak the reply, then listen again.
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | settings file, env overrides, paths |
//! | [`audio`] | microphone, utterance detection, resampling |
//! | [`stt`] | whisper transcriber and the speech capturer |
//! | [`llm`] | completion client and prompt template |
//! | [`tts`] | speech synthesis and playback |
//! | [`pipeline`] | turn state machine and orchestrator |

pub mod audio;
pub mod config;
pub mod llm;
pub mod pipeline;
pub mod stt;
pub mod tts;

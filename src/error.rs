//! Error types for the voice session core

use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors raised at the transport and backend boundaries.
///
/// Interruption and the playback timeout fallback are regular outcomes and
/// never show up here.
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Speech credential request failed: {0}")]
    Credential(String),

    #[error("Backend request failed: {0}")]
    Backend(String),

    #[error("Failed to start recognition: {0}")]
    RecognitionStart(String),

    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("TTS failed: {0}")]
    Synthesis(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hound::Error> for VoiceError {
    fn from(err: hound::Error) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

// Error types shared across the codec and playback modules

use thiserror::Error;

/// Errors surfaced by the audio core
#[derive(Error, Debug)]
pub enum AudioError {
    /// Malformed base64 audio payload
    #[error("invalid base64 audio payload: {0}")]
    Decode(#[from] base64::DecodeError),

    /// PCM data that cannot be interpreted with the given parameters
    #[error("malformed PCM data: {0}")]
    Format(String),

    /// WAV container or MP3 encoder failure
    #[error("audio encoding failed: {0}")]
    Encoding(String),

    /// No usable audio output on this host
    #[error("audio output unavailable: {0}")]
    PlaybackUnavailable(String),
}

/// Convenience Result type using AudioError
pub type Result<T> = std::result::Result<T, AudioError>;

//! Error types for the intercom gateway

use thiserror::Error;

/// Result type alias for intercom operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the intercom gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (fatal at startup)
    #[error("configuration error: {0}")]
    Config(String),

    /// No usable audio input or output device could be resolved
    #[error("no usable audio device: {0}")]
    DeviceUnavailable(String),

    /// A read from the input device failed mid-capture
    #[error("capture error: {0}")]
    Capture(String),

    /// The raw PCM buffer could not be converted to the delivery codec
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Transcription failed; recovered locally by delivering without a caption
    #[error("transcription error: {0}")]
    Transcription(String),

    /// The message channel rejected or failed to send the artifact
    #[error("delivery error: {0}")]
    Delivery(String),

    /// A trigger arrived while a recording was already in progress
    #[error("a recording is already in progress")]
    Busy,

    /// Audio hardware or codec error outside the capture path
    #[error("audio error: {0}")]
    Audio(String),

    /// Message channel transport error
    #[error("channel error: {0}")]
    Channel(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// GPIO access error
    #[error("gpio error: {0}")]
    Gpio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

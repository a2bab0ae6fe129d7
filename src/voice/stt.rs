//! Speech-to-text for voice message captions
//!
//! Captions help on the receiving end in noisy environments; transcription
//! failure is always recoverable, the message just goes out uncaptioned.

use crate::{Error, Result};

/// Stands in for stretches the recognizer could not make out
pub const UNINTELLIGIBLE: &str = "[unintelligible]";

/// Response from the Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcribes recorded voice messages
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl SpeechToText {
    /// Create an STT client against an OpenAI-compatible Whisper endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing.
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("speech API key required for STT".to_string()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        })
    }

    /// Transcribe an encoded voice message (OGG bytes).
    ///
    /// A transcript the recognizer could not make anything of comes back as
    /// the [`UNINTELLIGIBLE`] placeholder rather than an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transcription` if the request itself fails.
    pub async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("voice.ogg")
                    .mime_str("audio/ogg")
                    .map_err(|e| Error::Transcription(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Transcription(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transcription(format!(
                "transcription API error {status}: {body}"
            )));
        }

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(e.to_string()))?;

        let transcript = if result.text.trim().is_empty() {
            UNINTELLIGIBLE.to_string()
        } else {
            result.text
        };
        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

//! Text-to-speech for spoken prompts and inbound text messages

use crate::{Error, Result};

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    model: String,
    voice: String,
}

impl TextToSpeech {
    /// Create a TTS client against an OpenAI-compatible speech endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing.
    pub fn new(api_key: String, model: String, voice: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("speech API key required for TTS".to_string()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            voice,
        })
    }

    /// Synthesize `text` and return MP3 bytes.
    ///
    /// `lang` and `accent` participate in prompt cache keys; the provider
    /// infers language from the text itself.
    ///
    /// # Errors
    ///
    /// Returns `Error::Tts` if synthesis fails.
    pub async fn synthesize(&self, text: &str, lang: &str, accent: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
        }

        tracing::debug!(chars = text.len(), lang, accent, "synthesizing speech");

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Tts(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("TTS error {status}: {body}")));
        }

        let audio = response.bytes().await.map_err(|e| Error::Tts(e.to_string()))?;
        Ok(audio.to_vec())
    }
}

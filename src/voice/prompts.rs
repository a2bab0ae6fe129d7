//! Spoken prompt cache
//!
//! Standard prompts are synthesized once per (key, language, accent) and the
//! rendered audio is kept in the state directory, so restarts reuse the
//! files instead of re-synthesizing. The cache is an explicit object owned
//! by the audio output, not process-global state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::tts::TextToSpeech;
use crate::{Error, Result};

/// The standard prompts the intercom speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PromptKey {
    /// Spoken once the gateway is connected
    Online,
    /// Played before a capture starts
    RecordMessage,
    /// Played while a voice message is being delivered
    SendingMessage,
    /// Played before a remotely triggered recording
    RemoteRecordStart,
}

impl PromptKey {
    /// Stable identifier used for config overrides and cache file names
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Online => "intercom-online",
            Self::RecordMessage => "record-message",
            Self::SendingMessage => "sending-message",
            Self::RemoteRecordStart => "remote-record-start",
        }
    }

    /// Default spoken text, used when the config has no override
    #[must_use]
    pub const fn default_text(self) -> &'static str {
        match self {
            Self::Online => "Your intercom is now online.",
            Self::RecordMessage => "Please record your message.",
            Self::SendingMessage => "Sending audio message.",
            Self::RemoteRecordStart => "Starting remote recording in 3 seconds.",
        }
    }
}

/// Lazily rendered prompt audio files keyed by (prompt, language, accent)
pub struct PromptCache {
    dir: PathBuf,
    lang: String,
    accent: String,
    overrides: BTreeMap<String, String>,
    rendered: BTreeMap<String, PathBuf>,
}

impl PromptCache {
    /// Create a cache rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be created.
    pub fn new(
        dir: PathBuf,
        lang: String,
        accent: String,
        overrides: BTreeMap<String, String>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lang,
            accent,
            overrides,
            rendered: BTreeMap::new(),
        })
    }

    /// Spoken text for a prompt, honoring config overrides
    #[must_use]
    pub fn text_for(&self, key: PromptKey) -> &str {
        self.overrides
            .get(key.name())
            .map_or(key.default_text(), String::as_str)
    }

    fn file_for(&self, key: PromptKey) -> PathBuf {
        self.dir
            .join(format!("{}.{}.{}.mp3", key.name(), self.lang, self.accent))
    }

    /// Path to the rendered audio for `key`, synthesizing on first use.
    ///
    /// # Errors
    ///
    /// Returns `Error::Tts` if synthesis fails or the file cannot be written.
    pub async fn resolve(&mut self, key: PromptKey, tts: &TextToSpeech) -> Result<&Path> {
        let cache_key = format!("{}.{}.{}", key.name(), self.lang, self.accent);
        if !self.rendered.contains_key(&cache_key) {
            let path = self.file_for(key);
            if !path.exists() {
                tracing::debug!(prompt = key.name(), path = %path.display(), "rendering prompt audio");
                let text = self.text_for(key).to_string();
                let audio = tts.synthesize(&text, &self.lang, &self.accent).await?;
                tokio::fs::write(&path, &audio)
                    .await
                    .map_err(|e| Error::Tts(format!("cannot write prompt audio: {e}")))?;
            }
            self.rendered.insert(cache_key.clone(), path);
        }
        Ok(self.rendered[&cache_key].as_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_text_wins_over_default() {
        let mut overrides = BTreeMap::new();
        overrides.insert("record-message".to_string(), "Speak now.".to_string());
        let cache = PromptCache::new(
            std::env::temp_dir().join("intercom-prompt-test"),
            "en".into(),
            "com".into(),
            overrides,
        )
        .unwrap();

        assert_eq!(cache.text_for(PromptKey::RecordMessage), "Speak now.");
        assert_eq!(
            cache.text_for(PromptKey::SendingMessage),
            "Sending audio message."
        );
    }

    #[test]
    fn cache_file_names_include_language_and_accent() {
        let cache = PromptCache::new(
            std::env::temp_dir().join("intercom-prompt-test"),
            "de".into(),
            "de".into(),
            BTreeMap::new(),
        )
        .unwrap();
        let path = cache.file_for(PromptKey::Online);
        assert!(path.ends_with("intercom-online.de.de.mp3"));
    }
}

//! Configuration for the intercom gateway
//!
//! Loaded once at startup from YAML and immutable thereafter. Search order:
//! an explicit `--config` path, then `~/.config/intercom/config.yaml`, then
//! `/etc/intercom/config.yaml`. A missing configuration is fatal.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::channels::Target;
use crate::{Error, Result};

/// System-wide fallback configuration path
const ETC_CONFIG_FILE: &str = "/etc/intercom/config.yaml";

/// Default amplitude below which a sample counts as quiet
const DEFAULT_AMPLITUDE_THRESHOLD: i16 = 1000;

/// Default number of consecutive quiet blocks that ends a capture
const DEFAULT_TRAILING_SILENCE_BLOCKS: u32 = 30;

/// Default playback volume (percent)
const DEFAULT_VOLUME: u8 = 100;

/// Default dispatcher poll cadence in milliseconds
const DEFAULT_TICK_MS: u64 = 10;

/// Intercom gateway configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Telegram bot credentials and home chat
    pub telegram: TelegramConfig,

    /// Audio capture and playback settings
    #[serde(default)]
    pub audio: AudioConfig,

    /// Speech service credentials (STT caption + TTS prompts)
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Contact book: physical pins mapped to delivery targets
    #[serde(default)]
    pub rolodex: BTreeMap<String, RolodexEntry>,

    /// Dispatcher settings
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// State directory override (prompt cache lives here)
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

/// Telegram bot configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot API token
    pub token: String,

    /// Chat that receives online/offline notices
    pub chat: String,
}

/// Audio capture and playback configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AudioConfig {
    /// Samples with absolute value below this are "quiet"
    #[serde(default = "default_amplitude_threshold")]
    pub amplitude_threshold: i16,

    /// Consecutive quiet blocks after voice onset that end a capture
    #[serde(default = "default_trailing_silence_blocks")]
    pub trailing_silence_blocks: u32,

    /// Preferred input device: a device name or a numeric index
    #[serde(default)]
    pub device: Option<String>,

    /// Playback volume in percent
    #[serde(default = "default_volume")]
    pub playback_volume: u8,

    /// Language for synthesized prompt speech
    #[serde(default = "default_text_language")]
    pub text_language: String,

    /// Accent hint for synthesized prompt speech
    #[serde(default = "default_text_accent")]
    pub text_accent: String,

    /// Prompt text overrides keyed by prompt name
    #[serde(default)]
    pub prompts: BTreeMap<String, String>,

    /// Appended to each sentence of inbound text before synthesis
    /// (e.g. "stop" for a telegram feel)
    #[serde(default)]
    pub text_message_line_ending: Option<String>,

    /// ffmpeg binary used for the OGG voice container
    #[serde(default = "default_ffmpeg_cmd")]
    pub ffmpeg_cmd: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            amplitude_threshold: DEFAULT_AMPLITUDE_THRESHOLD,
            trailing_silence_blocks: DEFAULT_TRAILING_SILENCE_BLOCKS,
            device: None,
            playback_volume: DEFAULT_VOLUME,
            text_language: default_text_language(),
            text_accent: default_text_accent(),
            prompts: BTreeMap::new(),
            text_message_line_ending: None,
            ffmpeg_cmd: default_ffmpeg_cmd(),
        }
    }
}

impl AudioConfig {
    /// Capture thresholds derived from this configuration
    #[must_use]
    pub fn thresholds(&self) -> crate::voice::RecordingThresholds {
        crate::voice::RecordingThresholds {
            amplitude: self.amplitude_threshold,
            trailing_silence_blocks: self.trailing_silence_blocks,
        }
    }
}

/// Speech service configuration (both directions are optional; without an
/// STT key voice messages are delivered uncaptioned, without a TTS key
/// prompts fall back to silence)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SpeechConfig {
    /// OpenAI-compatible API key (`OPENAI_API_KEY` env overrides)
    #[serde(default)]
    pub api_key: Option<String>,

    /// STT model for captions
    #[serde(default = "default_stt_model")]
    pub stt_model: String,

    /// TTS model for prompts
    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    /// TTS voice identifier
    #[serde(default = "default_tts_voice")]
    pub tts_voice: String,
}

/// One rolodex entry: a contact reachable from a physical button
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RolodexEntry {
    /// BCM pin number wired to this contact's button
    pub pin: u8,

    /// Chat identifier recordings are delivered to
    pub id: String,

    /// Human-readable alias used in logs and replies
    #[serde(default)]
    pub alias: Option<String>,

    /// Playback volume override for this contact's inbound messages
    #[serde(default)]
    pub volume: Option<u8>,
}

/// Dispatcher configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Poll cadence for event sources in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Enable the keyboard stand-in source for development hosts
    #[serde(default)]
    pub simulated_input: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            simulated_input: false,
        }
    }
}

/// Static mapping from an input pin to a delivery target
#[derive(Debug, Clone)]
pub struct PinBinding {
    /// BCM pin number
    pub pin: u8,

    /// Delivery target for recordings triggered by this pin
    pub target: Target,

    /// Alias used in logs and replies
    pub alias: String,
}

impl Config {
    /// Load configuration, starting with the explicit path if given,
    /// then the per-user path, then the system path.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no file is found or it fails to parse.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let candidates: Vec<PathBuf> = explicit
            .map(|p| vec![p.to_path_buf()])
            .unwrap_or_else(|| {
                let mut paths = Vec::new();
                if let Some(dirs) = ProjectDirs::from("", "", "intercom") {
                    paths.push(dirs.config_dir().join("config.yaml"));
                }
                paths.push(PathBuf::from(ETC_CONFIG_FILE));
                paths
            });

        let path = candidates
            .iter()
            .find(|p| p.exists())
            .ok_or_else(|| {
                Error::Config(format!(
                    "no configuration found (looked in: {})",
                    candidates
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })?;

        tracing::info!(path = %path.display(), "using configuration");
        let text = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.telegram.token.trim().is_empty() {
            return Err(Error::Config("telegram.token must not be empty".into()));
        }
        if self.audio.amplitude_threshold < 0 {
            return Err(Error::Config(
                "audio.amplitude-threshold must be non-negative".into(),
            ));
        }
        let mut pins = std::collections::HashSet::new();
        for (name, entry) in &self.rolodex {
            if !pins.insert(entry.pin) {
                return Err(Error::Config(format!(
                    "rolodex entry '{name}' reuses pin {}",
                    entry.pin
                )));
            }
        }
        Ok(())
    }

    /// Pin bindings in configuration order (rolodex entries are kept
    /// sorted by name so polling order is deterministic)
    #[must_use]
    pub fn pin_bindings(&self) -> Vec<PinBinding> {
        self.rolodex
            .iter()
            .map(|(name, entry)| PinBinding {
                pin: entry.pin,
                target: Target::new(entry.id.clone()),
                alias: entry.alias.clone().unwrap_or_else(|| name.clone()),
            })
            .collect()
    }

    /// Playback volume for a sender, honoring rolodex overrides
    #[must_use]
    pub fn volume_for(&self, target: &Target) -> u8 {
        self.rolodex
            .values()
            .find(|e| e.id == target.as_str())
            .and_then(|e| e.volume)
            .unwrap_or(self.audio.playback_volume)
    }

    /// Directory for durable state (prompt cache)
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no state directory can be determined.
    pub fn state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        ProjectDirs::from("", "", "intercom")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| Error::Config("cannot determine state directory".into()))
    }

    /// Effective speech API key (environment wins over file)
    #[must_use]
    pub fn speech_api_key(&self) -> Option<String> {
        std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.speech.api_key.clone())
    }
}

fn default_amplitude_threshold() -> i16 {
    DEFAULT_AMPLITUDE_THRESHOLD
}

fn default_trailing_silence_blocks() -> u32 {
    DEFAULT_TRAILING_SILENCE_BLOCKS
}

fn default_volume() -> u8 {
    DEFAULT_VOLUME
}

fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}

fn default_text_language() -> String {
    "en".to_string()
}

fn default_text_accent() -> String {
    "com".to_string()
}

fn default_ffmpeg_cmd() -> String {
    "ffmpeg".to_string()
}

fn default_stt_model() -> String {
    "whisper-1".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_tts_voice() -> String {
    "alloy".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<Config> {
        let config: Config = serde_yaml::from_str(yaml).map_err(Error::from)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config = parse(
            r"
telegram:
  token: abc123
  chat: '@family'
",
        )
        .unwrap();

        assert_eq!(config.audio.amplitude_threshold, 1000);
        assert_eq!(config.audio.trailing_silence_blocks, 30);
        assert_eq!(config.audio.playback_volume, 100);
        assert_eq!(config.dispatcher.tick_ms, 10);
        assert!(config.pin_bindings().is_empty());
    }

    #[test]
    fn rolodex_bindings_are_sorted_by_name() {
        let config = parse(
            r"
telegram:
  token: abc123
  chat: '@family'
rolodex:
  zoe:
    pin: 11
    id: '1001'
  adam:
    pin: 13
    id: '1002'
    alias: workshop
",
        )
        .unwrap();

        let bindings = config.pin_bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].pin, 13);
        assert_eq!(bindings[0].alias, "workshop");
        assert_eq!(bindings[1].pin, 11);
        assert_eq!(bindings[1].alias, "zoe");
    }

    #[test]
    fn duplicate_pins_are_rejected() {
        let err = parse(
            r"
telegram:
  token: abc123
  chat: '@family'
rolodex:
  a:
    pin: 11
    id: '1'
  b:
    pin: 11
    id: '2'
",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn empty_token_is_rejected() {
        let err = parse(
            r"
telegram:
  token: ''
  chat: '@family'
",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn volume_override_applies_per_target() {
        let config = parse(
            r"
telegram:
  token: abc123
  chat: '@family'
audio:
  playback-volume: 80
rolodex:
  quiet-room:
    pin: 15
    id: '2001'
    volume: 40
",
        )
        .unwrap();

        assert_eq!(config.volume_for(&Target::new("2001")), 40);
        assert_eq!(config.volume_for(&Target::new("9999")), 80);
    }
}

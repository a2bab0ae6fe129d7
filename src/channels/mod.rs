//! Message channel seam
//!
//! The intercom core talks to its messaging service through the
//! [`MessageChannel`] trait; incoming traffic (commands, voice notes, text)
//! arrives as [`ChannelEvent`]s over an mpsc receiver so the daemon can
//! process one event at a time.

mod telegram;

use async_trait::async_trait;

pub use telegram::TelegramChannel;

use crate::Result;

/// Prefixes that mark a text message as a bot command
pub const COMMAND_PREFIXES: [char; 2] = ['/', '!'];

/// Opaque destination identifier for delivered recordings
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target(String);

impl Target {
    /// Wrap a platform-specific chat/contact reference
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The underlying identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An inbound event from the messaging service
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A bot command such as `/record`
    Command(ParsedCommand),
    /// A voice note to play through the speaker
    Voice {
        /// Who sent it
        from: Target,
        /// Platform file reference, downloadable via the channel
        file_id: String,
    },
    /// A plain text message to speak aloud
    Text {
        /// Who sent it
        from: Target,
        /// Message body
        content: String,
    },
}

/// A recognized command with its arguments
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    /// Command name, lowercased, without prefix
    pub name: String,

    /// Whitespace-separated arguments
    pub args: Vec<String>,

    /// Requester (reply destination)
    pub from: Target,

    /// Requester display name for logs and chatinfo
    pub sender_name: String,
}

/// The registration table of commands the intercom understands
///
/// Dispatch is synchronous, one command at a time, in the order the channel
/// delivers them.
#[derive(Debug, Clone, Copy)]
pub struct CommandRegistry;

impl CommandRegistry {
    /// Known command names
    pub const NAMES: [&'static str; 4] = ["record", "chatinfo", "lsaudio", "help"];

    /// Parse a message body into a command, if it starts with a command
    /// prefix and names a registered command.
    #[must_use]
    pub fn parse(text: &str, from: Target, sender_name: String) -> Option<ParsedCommand> {
        let trimmed = text.trim();
        let rest = COMMAND_PREFIXES
            .iter()
            .find_map(|&p| trimmed.strip_prefix(p))?;
        let mut words = rest.split_whitespace();
        let name = words.next()?.to_lowercase();
        if !Self::NAMES.contains(&name.as_str()) {
            return None;
        }
        Some(ParsedCommand {
            name,
            args: words.map(str::to_string).collect(),
            from,
            sender_name,
        })
    }

    /// Help text listing every registered command
    #[must_use]
    pub fn help_text() -> String {
        [
            "/record - Record audio on the device and send it as a voice message",
            "/chatinfo - Display details about the current chat",
            "/lsaudio [<index>|default] - List available audio input devices",
            "/help - Show this help message",
        ]
        .join("\n")
    }
}

/// Narrow messaging capability consumed by the recording pipeline
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Channel name for logs
    fn name(&self) -> &'static str;

    /// Establish the connection
    async fn connect(&mut self) -> Result<()>;

    /// Tear the connection down
    async fn disconnect(&mut self) -> Result<()>;

    /// Send a plain text message
    async fn send_text(&self, target: &Target, text: &str) -> Result<()>;

    /// Send an encoded voice message with an optional caption
    async fn send_voice(&self, target: &Target, audio: Vec<u8>, caption: Option<&str>)
        -> Result<()>;

    /// Download a file referenced by an inbound event
    async fn download(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Whether the channel currently has a connection
    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Option<ParsedCommand> {
        CommandRegistry::parse(text, Target::new("42"), "tester".into())
    }

    #[test]
    fn parses_slash_and_bang_prefixes() {
        assert_eq!(parse("/record").unwrap().name, "record");
        assert_eq!(parse("!record").unwrap().name, "record");
    }

    #[test]
    fn parses_arguments() {
        let cmd = parse("/lsaudio 3").unwrap();
        assert_eq!(cmd.name, "lsaudio");
        assert_eq!(cmd.args, vec!["3"]);
    }

    #[test]
    fn ignores_unknown_commands_and_plain_text() {
        assert!(parse("/selfdestruct").is_none());
        assert!(parse("hello there").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn command_names_are_case_insensitive() {
        assert_eq!(parse("/RECORD").unwrap().name, "record");
    }
}

//! Telegram channel adapter
//!
//! Long-polls the Bot API for inbound traffic and sends text and voice
//! messages back out. Only the narrow [`MessageChannel`] surface is exposed
//! to the rest of the gateway.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;

use super::{ChannelEvent, CommandRegistry, MessageChannel, Target};
use crate::{Error, Result};

/// Telegram Bot API base URL
const API_BASE: &str = "https://api.telegram.org/bot";

/// Telegram file download base URL
const FILE_BASE: &str = "https://api.telegram.org/file/bot";

/// Long-poll timeout passed to getUpdates (seconds)
const POLL_TIMEOUT_SECS: u32 = 30;

/// Telegram channel adapter
#[derive(Clone)]
pub struct TelegramChannel {
    token: String,
    client: Client,
    event_tx: Option<mpsc::Sender<ChannelEvent>>,
    connected: Arc<AtomicBool>,
}

impl TelegramChannel {
    /// Create an adapter that only sends (no inbound events)
    #[must_use]
    pub fn new(token: String) -> Self {
        Self {
            token,
            client: Client::new(),
            event_tx: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create an adapter plus a receiver for inbound events
    #[must_use]
    pub fn with_receiver(token: String) -> (Self, mpsc::Receiver<ChannelEvent>) {
        let (tx, rx) = mpsc::channel(100);
        let mut channel = Self::new(token);
        channel.event_tx = Some(tx);
        (channel, rx)
    }

    /// Spawn a background task long-polling getUpdates and forwarding
    /// parsed events into the mpsc channel.
    ///
    /// # Panics
    ///
    /// Panics if the adapter was created without a receiver.
    pub fn start_polling(&self) -> tokio::task::JoinHandle<()> {
        let token = self.token.clone();
        let client = self.client.clone();
        let connected = Arc::clone(&self.connected);
        let tx = self
            .event_tx
            .clone()
            .expect("start_polling requires an event receiver (use with_receiver)");

        tokio::spawn(async move {
            // Drop any stale webhook so getUpdates works.
            let delete_url = format!("{API_BASE}{token}/deleteWebhook");
            if let Err(e) = client.post(&delete_url).send().await {
                tracing::warn!(error = %e, "failed to delete Telegram webhook before polling");
            }

            let mut offset: Option<i64> = None;
            loop {
                let url = format!("{API_BASE}{token}/getUpdates");
                let mut params = serde_json::json!({
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"],
                });
                if let Some(off) = offset {
                    params["offset"] = serde_json::json!(off);
                }

                match client.post(&url).json(&params).send().await {
                    Ok(resp) => {
                        connected.store(true, Ordering::Relaxed);
                        if let Ok(body) = resp.text().await {
                            if let Ok(updates) =
                                serde_json::from_str::<GetUpdatesResponse>(&body)
                            {
                                for update in &updates.result {
                                    offset = Some(update.update_id + 1);
                                    if let Some(event) = update_to_event(update) {
                                        if tx.send(event).await.is_err() {
                                            tracing::debug!("event receiver gone, stopping poll");
                                            return;
                                        }
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        connected.store(false, Ordering::Relaxed);
                        tracing::warn!(error = %e, "Telegram getUpdates error");
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }
        })
    }

    async fn api_post(&self, method: &str, body: serde_json::Value) -> Result<()> {
        let url = format!("{API_BASE}{}/{method}", self.token);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram API error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "Telegram {method} error: {status} - {text}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageChannel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn connect(&mut self) -> Result<()> {
        #[derive(Deserialize)]
        struct MeResponse {
            ok: bool,
        }

        let url = format!("{API_BASE}{}/getMe", self.token);
        let response: MeResponse = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram connect failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Channel(format!("Telegram connect failed: {e}")))?;

        if !response.ok {
            return Err(Error::Channel("Telegram rejected the bot token".into()));
        }
        self.connected.store(true, Ordering::Relaxed);
        tracing::info!("Telegram connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn send_text(&self, target: &Target, text: &str) -> Result<()> {
        self.api_post(
            "sendMessage",
            serde_json::json!({
                "chat_id": chat_id_value(target),
                "text": text,
            }),
        )
        .await?;
        tracing::debug!(%target, "Telegram message sent");
        Ok(())
    }

    async fn send_voice(
        &self,
        target: &Target,
        audio: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<()> {
        let url = format!("{API_BASE}{}/sendVoice", self.token);

        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", target.as_str().to_string())
            .part(
                "voice",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("voice.ogg")
                    .mime_str("audio/ogg")
                    .map_err(|e| Error::Delivery(e.to_string()))?,
            );
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Delivery(format!("Telegram sendVoice failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Delivery(format!(
                "Telegram sendVoice error: {status} - {body}"
            )));
        }
        tracing::debug!(%target, "Telegram voice message sent");
        Ok(())
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        #[derive(Deserialize)]
        struct FileResponse {
            result: FileInfo,
        }
        #[derive(Deserialize)]
        struct FileInfo {
            file_path: String,
        }

        let url = format!("{API_BASE}{}/getFile", self.token);
        let info: FileResponse = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "file_id": file_id }))
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram getFile failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Channel(format!("Telegram getFile failed: {e}")))?;

        let file_url = format!("{FILE_BASE}{}/{}", self.token, info.result.file_path);
        let bytes = self
            .client
            .get(&file_url)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram file download failed: {e}")))?
            .bytes()
            .await
            .map_err(|e| Error::Channel(format!("Telegram file download failed: {e}")))?;
        Ok(bytes.to_vec())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Numeric chat ids go out as numbers, usernames as strings
fn chat_id_value(target: &Target) -> serde_json::Value {
    target
        .as_str()
        .parse::<i64>()
        .map_or_else(|_| serde_json::json!(target.as_str()), |n| serde_json::json!(n))
}

/// Response from the getUpdates API
#[derive(Deserialize)]
struct GetUpdatesResponse {
    #[serde(default)]
    result: Vec<Update>,
}

/// A single polled update
#[derive(Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

/// Message payload from an update
#[derive(Deserialize)]
struct Message {
    from: Option<User>,
    chat: Chat,
    text: Option<String>,
    voice: Option<Voice>,
}

#[derive(Deserialize)]
struct User {
    first_name: Option<String>,
    username: Option<String>,
}

#[derive(Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Deserialize)]
struct Voice {
    file_id: String,
}

/// Convert a polled update into a channel event
fn update_to_event(update: &Update) -> Option<ChannelEvent> {
    let message = update.message.as_ref()?;
    let from = Target::new(message.chat.id.to_string());
    let sender_name = message
        .from
        .as_ref()
        .and_then(|u| u.username.clone().or_else(|| u.first_name.clone()))
        .unwrap_or_else(|| "unknown".to_string());

    if let Some(voice) = &message.voice {
        return Some(ChannelEvent::Voice {
            from,
            file_id: voice.file_id.clone(),
        });
    }

    let text = message.text.as_ref()?;
    if let Some(command) = CommandRegistry::parse(text, from.clone(), sender_name) {
        return Some(ChannelEvent::Command(command));
    }
    Some(ChannelEvent::Text {
        from,
        content: text.clone(),
    })
}

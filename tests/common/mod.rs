//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use intercom_gateway::channels::{MessageChannel, Target};
use intercom_gateway::{Error, Result};

/// A sent voice message captured by the mock channel
#[derive(Debug, Clone)]
pub struct SentVoice {
    pub target: String,
    pub audio: Vec<u8>,
    pub caption: Option<String>,
}

/// Mock message channel recording everything sent through it
pub struct MockChannel {
    connected: std::sync::atomic::AtomicBool,
    pub sent_texts: Arc<Mutex<Vec<(String, String)>>>,
    pub sent_voices: Arc<Mutex<Vec<SentVoice>>>,
    pub files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockChannel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connected: std::sync::atomic::AtomicBool::new(false),
            sent_texts: Arc::new(Mutex::new(Vec::new())),
            sent_voices: Arc::new(Mutex::new(Vec::new())),
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Register a downloadable file
    pub async fn stash_file(&self, file_id: &str, bytes: Vec<u8>) {
        self.files.lock().await.insert(file_id.to_string(), bytes);
    }

    pub async fn texts(&self) -> Vec<(String, String)> {
        self.sent_texts.lock().await.clone()
    }

    pub async fn voices(&self) -> Vec<SentVoice> {
        self.sent_voices.lock().await.clone()
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageChannel for MockChannel {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&mut self) -> Result<()> {
        self.connected
            .store(true, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected
            .store(false, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    async fn send_text(&self, target: &Target, text: &str) -> Result<()> {
        self.sent_texts
            .lock()
            .await
            .push((target.as_str().to_string(), text.to_string()));
        Ok(())
    }

    async fn send_voice(
        &self,
        target: &Target,
        audio: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<()> {
        self.sent_voices.lock().await.push(SentVoice {
            target: target.as_str().to_string(),
            audio,
            caption: caption.map(str::to_string),
        });
        Ok(())
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        self.files
            .lock()
            .await
            .get(file_id)
            .cloned()
            .ok_or_else(|| Error::Channel(format!("no such file: {file_id}")))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// Generate a block of quiet samples
#[must_use]
pub fn quiet_block(len: usize) -> Vec<i16> {
    (0..len).map(|i| ((i % 3) as i16) - 1).collect()
}

/// Generate a block with a clear voice-level waveform
#[must_use]
pub fn voice_block(len: usize, amplitude: i16) -> Vec<i16> {
    (0..len)
        .map(|i| {
            let t = i as f32 / len as f32;
            let value = (t * 8.0 * std::f32::consts::PI).sin();
            (value * f32::from(amplitude)) as i16
        })
        .collect()
}

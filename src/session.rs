//! One recording session, start to delivery
//!
//! A session owns the microphone for its whole lifetime: prompt, capture,
//! encode, optional caption, deliver. It runs behind the dispatch gate, so
//! at most one session exists at a time and the prompt player and the
//! capture never overlap on the audio hardware.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::channels::MessageChannel;
use crate::dispatch::SessionRunner;
use crate::sources::Trigger;
use crate::voice::{
    capture, resolve_input, to_ogg, AudioOutput, Cancellation, MicSource, PromptKey,
    Recording, RecordingThresholds, SpeechToText,
};
use crate::Result;

/// Pause between the remote announcement and the actual capture
const REMOTE_START_DELAY: Duration = Duration::from_secs(3);

/// The production recording pipeline
pub struct RecordingSession {
    channel: Arc<dyn MessageChannel>,
    output: Arc<Mutex<AudioOutput>>,
    stt: Option<Arc<SpeechToText>>,
    thresholds: RecordingThresholds,
    device_hint: Option<String>,
    ffmpeg_cmd: String,
}

impl RecordingSession {
    /// Wire up the pipeline's collaborators.
    #[must_use]
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        output: Arc<Mutex<AudioOutput>>,
        stt: Option<Arc<SpeechToText>>,
        thresholds: RecordingThresholds,
        device_hint: Option<String>,
        ffmpeg_cmd: String,
    ) -> Self {
        Self {
            channel,
            output,
            stt,
            thresholds,
            device_hint,
            ffmpeg_cmd,
        }
    }

    /// Speak a prompt, downgrading failures to warnings: a broken speaker
    /// must not lose the message.
    async fn announce(&self, key: PromptKey) {
        let mut output = self.output.lock().await;
        if let Err(e) = output.play_prompt(key).await {
            tracing::warn!(prompt = key.name(), error = %e, "prompt playback failed");
        }
    }

    /// Open the microphone and record until the stop condition fires.
    fn record(&self, hold: Option<Box<dyn Fn() -> bool + Send>>) -> Result<Recording> {
        let mut cancel = match hold {
            // The capture stops once the button is released.
            Some(held) => Cancellation::when(move || !held()),
            None => Cancellation::None,
        };

        // cpal streams stay on this thread; the capture loop is blocking.
        tokio::task::block_in_place(|| {
            let device = resolve_input(self.device_hint.as_deref())?;
            let mut source = MicSource::open(&device)?;
            capture(&mut source, &self.thresholds, &mut cancel)
        })
    }

    /// Transcribe the encoded message for use as a caption. Transcription
    /// is best-effort: on failure the message goes out uncaptioned.
    async fn caption(&self, ogg: &[u8]) -> Option<String> {
        let stt = self.stt.as_ref()?;
        match stt.transcribe(ogg).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed, sending without caption");
                None
            }
        }
    }
}

#[async_trait]
impl SessionRunner for RecordingSession {
    async fn run(&self, trigger: Trigger) -> Result<()> {
        if trigger.remote {
            self.announce(PromptKey::RemoteRecordStart).await;
            tokio::time::sleep(REMOTE_START_DELAY).await;
        }
        self.announce(PromptKey::RecordMessage).await;

        let recording = self.record(trigger.hold)?;
        if recording.samples.is_empty() {
            tracing::info!(alias = %trigger.alias, "nothing but silence recorded, not sending");
            return Ok(());
        }
        tracing::debug!(
            alias = %trigger.alias,
            duration_ms = recording.duration_ms(),
            "capture complete"
        );

        let ogg = to_ogg(&recording, &self.ffmpeg_cmd).await?;
        self.announce(PromptKey::SendingMessage).await;

        let caption = self.caption(&ogg).await;
        self.channel
            .send_voice(&trigger.target, ogg, caption.as_deref())
            .await?;

        tracing::info!(
            alias = %trigger.alias,
            target = %trigger.target,
            duration_ms = recording.duration_ms(),
            captioned = caption.is_some(),
            "voice message delivered"
        );
        Ok(())
    }
}

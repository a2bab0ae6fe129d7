//! Daemon wiring and the inbound event loop
//!
//! Startup wires the channel, the audio pipeline, and the dispatcher
//! together, announces the intercom, then processes inbound events one at a
//! time until Ctrl-C. Shutdown drains the in-flight recording session
//! before the offline notice goes out.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::channels::{
    ChannelEvent, CommandRegistry, MessageChannel, ParsedCommand, Target, TelegramChannel,
};
use crate::config::Config;
use crate::dispatch::{DispatchHandle, Dispatcher};
use crate::session::RecordingSession;
use crate::sources::{EventSource, SimulatedEdgeSource, Trigger};
use crate::voice::{
    list_inputs, AudioOutput, PromptCache, PromptKey, SpeechToText, TextToSpeech,
};
use crate::{Error, Result};

/// Reply sent when a record command hits the busy gate
const BUSY_REPLY: &str = "Please wait for the current recording to finish.";

/// The intercom gateway daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a daemon around a validated configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if startup wiring fails; runtime errors inside the
    /// event loop are logged and survived.
    pub async fn run(self) -> Result<()> {
        let config = self.config;

        // Channel first: without it there is nowhere to deliver anything.
        let (mut telegram, mut events) =
            TelegramChannel::with_receiver(config.telegram.token.clone());
        telegram.connect().await?;
        telegram.start_polling();
        let channel: Arc<dyn MessageChannel> = Arc::new(telegram.clone());
        let home = Target::new(config.telegram.chat.clone());

        let output = Arc::new(Mutex::new(build_audio_output(&config)?));
        let stt = match config.speech_api_key() {
            Some(key) => Some(Arc::new(SpeechToText::new(
                key,
                config.speech.stt_model.clone(),
            )?)),
            None => None,
        };

        let session = RecordingSession::new(
            Arc::clone(&channel),
            Arc::clone(&output),
            stt,
            config.audio.thresholds(),
            config.audio.device.clone(),
            config.audio.ffmpeg_cmd.clone(),
        );
        let handle = DispatchHandle::new(Arc::new(session));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = Dispatcher::new(
            build_sources(&config),
            handle.clone(),
            config.dispatcher.tick_ms,
        );
        let dispatcher_task = tokio::spawn(dispatcher.run(shutdown_rx));

        // Online notice: a text to the home chat and a spoken prompt.
        if let Err(e) = channel.send_text(&home, "Intercom online.").await {
            tracing::warn!(error = %e, "could not send online notice");
        }
        {
            let mut output = output.lock().await;
            if let Err(e) = output.play_prompt(PromptKey::Online).await {
                tracing::warn!(error = %e, "could not play online prompt");
            }
        }
        tracing::info!(chat = %home, "intercom online");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::warn!("channel event stream closed");
                        break;
                    };
                    handle_event(event, &config, &channel, &output, &handle).await;
                }
            }
        }

        // Stop new sessions, let the in-flight one finish, then say goodbye.
        let _ = shutdown_tx.send(true);
        if let Err(e) = dispatcher_task.await {
            tracing::warn!(error = %e, "dispatcher task ended abnormally");
        }
        if let Err(e) = channel.send_text(&home, "Intercom going offline.").await {
            tracing::warn!(error = %e, "could not send offline notice");
        }
        telegram.disconnect().await?;
        tracing::info!("intercom offline");
        Ok(())
    }
}

/// Build the audio output with its prompt cache and optional TTS.
fn build_audio_output(config: &Config) -> Result<AudioOutput> {
    let state_dir = config.state_dir()?;
    let prompts = PromptCache::new(
        state_dir.join("prompts"),
        config.audio.text_language.clone(),
        config.audio.text_accent.clone(),
        config.audio.prompts.clone(),
    )?;

    let tts = match config.speech_api_key() {
        Some(key) => Some(Arc::new(TextToSpeech::new(
            key,
            config.speech.tts_model.clone(),
            config.speech.tts_voice.clone(),
        )?)),
        None => {
            tracing::warn!("no speech API key configured, prompts will be silent");
            None
        }
    };

    Ok(AudioOutput::new(
        tts,
        prompts,
        config.audio.playback_volume,
        config.audio.ffmpeg_cmd.clone(),
        config.audio.text_language.clone(),
        config.audio.text_accent.clone(),
    ))
}

/// Build the button sources for the configured rolodex.
fn build_sources(config: &Config) -> Vec<Box<dyn EventSource>> {
    let mut sources: Vec<Box<dyn EventSource>> = Vec::new();
    let bindings = config.pin_bindings();

    #[cfg(feature = "gpio")]
    for binding in &bindings {
        match crate::gpio::GpioButton::new(binding.pin) {
            Ok(button) => {
                sources.push(Box::new(crate::sources::PinLevelSource::new(
                    Arc::new(button),
                    binding.clone(),
                )));
            }
            Err(e) => {
                tracing::error!(pin = binding.pin, alias = %binding.alias, error = %e,
                    "cannot claim GPIO pin, contact unreachable by button");
            }
        }
    }
    #[cfg(not(feature = "gpio"))]
    if !bindings.is_empty() && !config.dispatcher.simulated_input {
        tracing::warn!(
            contacts = bindings.len(),
            "built without GPIO support, rolodex buttons are inert"
        );
    }

    if config.dispatcher.simulated_input {
        tracing::info!("keyboard stand-in enabled, press Enter to record");
        sources.push(Box::new(SimulatedEdgeSource::new(bindings)));
    }
    sources
}

/// Process one inbound channel event.
async fn handle_event(
    event: ChannelEvent,
    config: &Config,
    channel: &Arc<dyn MessageChannel>,
    output: &Arc<Mutex<AudioOutput>>,
    handle: &DispatchHandle,
) {
    match event {
        ChannelEvent::Command(cmd) => {
            handle_command(cmd, channel, handle).await;
        }
        ChannelEvent::Voice { from, file_id } => {
            // The speaker and the microphone are one acoustic space; hold
            // playback until the in-flight recording finishes.
            handle.drain().await;
            let volume = config.volume_for(&from);
            match channel.download(&file_id).await {
                Ok(audio) => {
                    let output = output.lock().await;
                    if let Err(e) = output.play_bytes(&audio, Some(volume)).await {
                        tracing::error!(%from, error = %e, "inbound voice playback failed");
                    } else {
                        tracing::info!(%from, volume, "played inbound voice message");
                    }
                }
                Err(e) => {
                    tracing::error!(%from, error = %e, "could not download voice message");
                }
            }
        }
        ChannelEvent::Text { from, content } => {
            handle.drain().await;
            speak_text(&content, config, output).await;
            tracing::info!(%from, "spoke inbound text message");
        }
    }
}

/// Handle one parsed command, replying to the requester.
async fn handle_command(
    cmd: ParsedCommand,
    channel: &Arc<dyn MessageChannel>,
    handle: &DispatchHandle,
) {
    tracing::debug!(command = %cmd.name, from = %cmd.from, "handling command");
    let reply = match cmd.name.as_str() {
        "record" => {
            let trigger = Trigger {
                target: cmd.from.clone(),
                alias: cmd.sender_name.clone(),
                hold: None,
                remote: true,
            };
            match handle.try_dispatch(trigger) {
                Ok(()) => None,
                Err(Error::Busy) => Some(BUSY_REPLY.to_string()),
                Err(e) => Some(format!("Recording failed to start: {e}")),
            }
        }
        "chatinfo" => Some(format!(
            "Chat id: {}\nYour name: {}",
            cmd.from, cmd.sender_name
        )),
        "lsaudio" => Some(lsaudio_reply(cmd.args.first().map(String::as_str))),
        "help" => Some(CommandRegistry::help_text()),
        other => {
            tracing::warn!(command = other, "registered command without a handler");
            None
        }
    };

    if let Some(reply) = reply {
        if let Err(e) = channel.send_text(&cmd.from, &reply).await {
            tracing::error!(command = %cmd.name, error = %e, "could not send reply");
        }
    }
}

/// Build the `lsaudio` reply: the full device list, one device by index,
/// or the device capture would currently resolve to (`default`).
fn lsaudio_reply(arg: Option<&str>) -> String {
    match arg {
        None => match list_inputs() {
            Ok(devices) if devices.is_empty() => "No input devices found.".to_string(),
            Ok(devices) => devices
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => format!("Cannot list audio devices: {e}"),
        },
        Some("default") => match crate::voice::resolve_input(None) {
            Ok(device) => {
                use cpal::traits::DeviceTrait;
                format!(
                    "Would record from: {}",
                    device.name().unwrap_or_else(|_| "<unnamed>".to_string())
                )
            }
            Err(e) => format!("No usable input device: {e}"),
        },
        Some(index) => match (index.parse::<usize>(), list_inputs()) {
            (Ok(n), Ok(devices)) => devices
                .into_iter()
                .find(|d| d.index == n)
                .map_or_else(|| format!("No input device with index {n}."), |d| d.to_string()),
            (Err(_), _) => format!("Not a device index: {index}"),
            (_, Err(e)) => format!("Cannot list audio devices: {e}"),
        },
    }
}

/// Speak an inbound text message line by line, with the configured suffix
/// appended to each line.
async fn speak_text(content: &str, config: &Config, output: &Arc<Mutex<AudioOutput>>) {
    let suffix = config
        .audio
        .text_message_line_ending
        .as_deref()
        .unwrap_or_default();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let spoken = if suffix.is_empty() {
            line.to_string()
        } else {
            format!("{line} {suffix}")
        };
        let mut output = output.lock().await;
        if let Err(e) = output.play_impromptu(&spoken).await {
            tracing::error!(error = %e, "text-to-speech playback failed");
            break;
        }
    }
}

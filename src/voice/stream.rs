//! Microphone block source backed by cpal
//!
//! The cpal callback thread converts whatever sample format the hardware
//! delivers into native i16 and feeds a bounded channel; `next_block`
//! assembles fixed-size blocks on the caller side. Dropping the source
//! stops and releases the stream, so every capture exit path releases the
//! microphone.

use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};

use super::capture::{SampleSource, BLOCK_FRAMES};
use crate::{Error, Result};

/// Chunks buffered between the callback thread and the capture loop
const CHANNEL_CAPACITY: usize = 32;

/// Consecutive empty waits tolerated before the read is declared dead
const MAX_EMPTY_WAITS: u32 = 5;

/// How long one block wait may take before counting as an empty wait
const WAIT_TIMEOUT: Duration = Duration::from_secs(1);

/// An open microphone stream delivering fixed-size i16 blocks
pub struct MicSource {
    // Held for its Drop: releases the device.
    _stream: Stream,
    receiver: Receiver<Vec<i16>>,
    pending: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl MicSource {
    /// Open a capture stream on `device` in its default input format.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if the stream cannot be opened or the
    /// sample format is unsupported.
    pub fn open(device: &Device) -> Result<Self> {
        let default_config = device
            .default_input_config()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
        let format = default_config.sample_format();
        let config: StreamConfig = default_config.into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels.max(1);

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            ?format,
            sample_rate,
            channels,
            "opening capture stream"
        );

        let (sender, receiver) = sync_channel::<Vec<i16>>(CHANNEL_CAPACITY);
        let err_fn = |err| tracing::error!(error = %err, "audio capture stream error");

        let stream = match format {
            SampleFormat::I16 => device
                .build_input_stream(
                    &config,
                    move |data: &[i16], _| forward(&sender, data.to_vec()),
                    err_fn,
                    None,
                )
                .map_err(|e| Error::DeviceUnavailable(e.to_string()))?,
            SampleFormat::U16 => device
                .build_input_stream(
                    &config,
                    move |data: &[u16], _| {
                        let converted = data
                            .iter()
                            .map(|&s| (i32::from(s) - 32_768) as i16)
                            .collect();
                        forward(&sender, converted);
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| Error::DeviceUnavailable(e.to_string()))?,
            SampleFormat::F32 => device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _| {
                        let converted = data
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * 32_767.0) as i16)
                            .collect();
                        forward(&sender, converted);
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| Error::DeviceUnavailable(e.to_string()))?,
            other => {
                return Err(Error::DeviceUnavailable(format!(
                    "unsupported sample format: {other:?}"
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            receiver,
            pending: Vec::new(),
            sample_rate,
            channels,
        })
    }
}

/// Push a converted chunk toward the capture loop, dropping it if the
/// consumer has fallen behind (losing audio beats blocking the callback).
fn forward(sender: &SyncSender<Vec<i16>>, chunk: Vec<i16>) {
    if sender.try_send(chunk).is_err() {
        tracing::warn!("capture consumer lagging, dropping audio chunk");
    }
}

impl SampleSource for MicSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn next_block(&mut self) -> Result<Vec<i16>> {
        let block_len = BLOCK_FRAMES * usize::from(self.channels);
        let mut empty_waits = 0;

        while self.pending.len() < block_len {
            match self.receiver.recv_timeout(WAIT_TIMEOUT) {
                Ok(chunk) => {
                    empty_waits = 0;
                    self.pending.extend(chunk);
                }
                Err(RecvTimeoutError::Timeout) => {
                    empty_waits += 1;
                    if empty_waits >= MAX_EMPTY_WAITS {
                        return Err(Error::Capture(
                            "input stream stopped delivering samples".into(),
                        ));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Capture("input stream disconnected".into()));
                }
            }
        }

        let rest = self.pending.split_off(block_len);
        Ok(std::mem::replace(&mut self.pending, rest))
    }
}

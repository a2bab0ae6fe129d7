//! Speaker output: prompts, impromptu speech, and inbound voice messages
//!
//! Playback is an exclusive resource like the microphone: one stream at a
//! time, built, drained, and dropped inside each call. MP3 (TTS output) is
//! decoded in-process; anything else (OGG voice notes) goes through ffmpeg
//! into WAV first.

use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::SampleRate;

use super::device::resolve_output;
use super::encode::decode_to_wav;
use super::prompts::{PromptCache, PromptKey};
use super::tts::TextToSpeech;
use crate::{Error, Result};

/// Speaker-side collaborator for the recording pipeline
pub struct AudioOutput {
    tts: Option<Arc<TextToSpeech>>,
    prompts: PromptCache,
    volume: u8,
    ffmpeg_cmd: String,
    lang: String,
    accent: String,
}

impl AudioOutput {
    /// Create the audio output with its prompt cache.
    pub fn new(
        tts: Option<Arc<TextToSpeech>>,
        prompts: PromptCache,
        volume: u8,
        ffmpeg_cmd: String,
        lang: String,
        accent: String,
    ) -> Self {
        Self {
            tts,
            prompts,
            volume,
            ffmpeg_cmd,
            lang,
            accent,
        }
    }

    /// Play a standard prompt, rendering and caching it on first use.
    ///
    /// Without a TTS collaborator the prompt is skipped; guiding audio is
    /// nice to have, the recording still works.
    ///
    /// # Errors
    ///
    /// Returns an error if synthesis or playback fails.
    pub async fn play_prompt(&mut self, key: PromptKey) -> Result<()> {
        let Some(tts) = self.tts.clone() else {
            tracing::debug!(prompt = key.name(), "no TTS configured, skipping prompt");
            return Ok(());
        };
        let path = self.prompts.resolve(key, &tts).await?.to_path_buf();
        self.play_file(&path, None).await
    }

    /// Synthesize `text` and play it once, without caching.
    ///
    /// # Errors
    ///
    /// Returns an error if synthesis or playback fails.
    pub async fn play_impromptu(&mut self, text: &str) -> Result<()> {
        let Some(tts) = self.tts.clone() else {
            tracing::debug!("no TTS configured, skipping impromptu speech");
            return Ok(());
        };
        let audio = tts.synthesize(text, &self.lang, &self.accent).await?;
        self.play_bytes(&audio, None).await
    }

    /// Play an audio file through the speaker.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, decoded, or played.
    pub async fn play_file(&self, path: &Path, volume_override: Option<u8>) -> Result<()> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::Audio(format!("{}: {e}", path.display())))?;
        self.play_bytes(&bytes, volume_override).await
    }

    /// Play in-memory audio (MP3, WAV, or anything ffmpeg can decode).
    ///
    /// # Errors
    ///
    /// Returns an error if decoding or playback fails.
    pub async fn play_bytes(&self, audio: &[u8], volume_override: Option<u8>) -> Result<()> {
        let (samples, sample_rate) = match decode_audio(audio) {
            Ok(decoded) => decoded,
            Err(_) => {
                // Not MP3/WAV: let ffmpeg turn it into WAV first.
                let wav = decode_to_wav(audio, &self.ffmpeg_cmd).await?;
                decode_wav(&wav)?
            }
        };

        let volume = volume_override.unwrap_or(self.volume);
        let gain = f32::from(volume.min(100)) / 100.0;
        tokio::task::block_in_place(|| play_samples(&samples, sample_rate, gain))
    }
}

/// Decode MP3 or WAV bytes to mono f32 samples
fn decode_audio(audio: &[u8]) -> Result<(Vec<f32>, u32)> {
    if audio.starts_with(b"RIFF") {
        decode_wav(audio)
    } else {
        decode_mp3(audio)
    }
}

/// Decode WAV bytes to mono f32 samples
fn decode_wav(wav: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::new(Cursor::new(wav))
        .map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|v| f32::from(v) / 32_768.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
    };

    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3));
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = frame.sample_rate as u32;
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32_768.0;
                        let right =
                            f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32_768.0;
                        (left + right) / 2.0
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32_768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(Error::Audio("no decodable audio frames".into()));
    }
    Ok((samples, sample_rate))
}

/// Play mono samples through the default output device, blocking until done
fn play_samples(samples: &[f32], sample_rate: u32, gain: f32) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let device = resolve_output()?;
    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .or_else(|| {
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
        })
        .ok_or_else(|| Error::Audio("no suitable output config found".into()))?;

    let config = supported.with_sample_rate(SampleRate(sample_rate)).config();
    let channels = usize::from(config.channels);

    let queue: Arc<Mutex<(Vec<f32>, usize)>> =
        Arc::new(Mutex::new((samples.to_vec(), 0)));
    let finished = Arc::new(Mutex::new(false));
    let queue_cb = Arc::clone(&queue);
    let finished_cb = Arc::clone(&finished);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let Ok(mut state) = queue_cb.lock() else { return };
                let (samples, pos) = &mut *state;
                for frame in data.chunks_mut(channels) {
                    let sample = if *pos < samples.len() {
                        let s = samples[*pos] * gain;
                        *pos += 1;
                        s
                    } else {
                        if let Ok(mut done) = finished_cb.lock() {
                            *done = true;
                        }
                        0.0
                    };
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| tracing::error!(error = %err, "audio playback error"),
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    // Wait for playback, bounded by the clip duration plus slack.
    let duration_ms = samples.len() as u64 * 1000 / u64::from(sample_rate.max(1));
    let deadline = Instant::now() + Duration::from_millis(duration_ms + 500);
    while !finished.lock().map(|d| *d).unwrap_or(true) {
        if Instant::now() > deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    std::thread::sleep(Duration::from_millis(100));

    drop(stream);
    tracing::debug!(samples = samples.len(), sample_rate, "playback complete");
    Ok(())
}

//! Encoding captured PCM into the delivery container
//!
//! The raw capture is written to WAV in memory, then handed to ffmpeg for
//! the OGG voice container Telegram expects. Scratch files live in a
//! temporary directory that is removed on drop, success or failure.

use std::process::Stdio;

use tokio::process::Command;

use super::capture::Recording;
use crate::{Error, Result};

/// Serialize a recording as WAV bytes.
///
/// # Errors
///
/// Returns `Error::Encoding` if WAV serialization fails.
pub fn to_wav(recording: &Recording) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: recording.channels,
        sample_rate: recording.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Encoding(e.to_string()))?;
        for &sample in &recording.samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Encoding(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| Error::Encoding(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// Encode a recording into an OGG voice container via ffmpeg.
///
/// # Errors
///
/// Returns `Error::Encoding` if ffmpeg cannot be run or rejects the input.
pub async fn to_ogg(recording: &Recording, ffmpeg_cmd: &str) -> Result<Vec<u8>> {
    let wav = to_wav(recording)?;

    let scratch = tempfile::tempdir().map_err(|e| Error::Encoding(e.to_string()))?;
    let wav_path = scratch.path().join("voice.wav");
    let ogg_path = scratch.path().join("voice.ogg");
    tokio::fs::write(&wav_path, &wav)
        .await
        .map_err(|e| Error::Encoding(e.to_string()))?;

    let status = Command::new(ffmpeg_cmd)
        .arg("-y")
        .arg("-i")
        .arg(&wav_path)
        .args(["-f", "ogg", "-acodec", "libopus"])
        .arg(&ogg_path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| Error::Encoding(format!("failed to run {ffmpeg_cmd}: {e}")))?;

    if !status.success() {
        return Err(Error::Encoding(format!(
            "{ffmpeg_cmd} exited with {status}"
        )));
    }

    let ogg = tokio::fs::read(&ogg_path)
        .await
        .map_err(|e| Error::Encoding(e.to_string()))?;
    tracing::debug!(wav_bytes = wav.len(), ogg_bytes = ogg.len(), "encoded voice message");
    Ok(ogg)
}

/// Decode an arbitrary audio file to mono-capable WAV via ffmpeg, for
/// playback of inbound voice messages.
///
/// # Errors
///
/// Returns `Error::Audio` if ffmpeg cannot decode the input.
pub async fn decode_to_wav(audio: &[u8], ffmpeg_cmd: &str) -> Result<Vec<u8>> {
    let scratch = tempfile::tempdir().map_err(|e| Error::Audio(e.to_string()))?;
    let in_path = scratch.path().join("inbound.bin");
    let wav_path = scratch.path().join("inbound.wav");
    tokio::fs::write(&in_path, audio)
        .await
        .map_err(|e| Error::Audio(e.to_string()))?;

    let status = Command::new(ffmpeg_cmd)
        .arg("-y")
        .arg("-i")
        .arg(&in_path)
        .arg(&wav_path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| Error::Audio(format!("failed to run {ffmpeg_cmd}: {e}")))?;

    if !status.success() {
        return Err(Error::Audio(format!("{ffmpeg_cmd} exited with {status}")));
    }

    tokio::fs::read(&wav_path)
        .await
        .map_err(|e| Error::Audio(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_roundtrip_preserves_samples() {
        let recording = Recording {
            samples: vec![0, 42, -42, i16::MAX, i16::MIN],
            sample_rate: 16_000,
            channels: 1,
        };
        let wav = to_wav(&recording).unwrap();

        let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, recording.samples);
    }

    #[test]
    fn wav_keeps_channel_count() {
        let recording = Recording {
            samples: vec![1, 2, 3, 4],
            sample_rate: 44_100,
            channels: 2,
        };
        let wav = to_wav(&recording).unwrap();
        let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().channels, 2);
    }
}

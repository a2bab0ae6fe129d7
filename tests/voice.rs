//! Voice pipeline integration tests
//!
//! Exercises capture, trimming, and encoding through the public API
//! without requiring audio hardware.

use intercom_gateway::voice::{
    capture, is_silent, samples_from_le_bytes, to_wav, trim, Cancellation, Recording,
    RecordingThresholds, SampleSource,
};
use intercom_gateway::{Error, Result};

mod common;
use common::{quiet_block, voice_block};

/// Replays canned blocks, then errors, so a capture that never stops fails
/// the test instead of hanging.
struct ScriptedMic {
    blocks: Vec<Vec<i16>>,
    cursor: usize,
    sample_rate: u32,
}

impl ScriptedMic {
    fn new(blocks: Vec<Vec<i16>>) -> Self {
        Self {
            blocks,
            cursor: 0,
            sample_rate: 16_000,
        }
    }
}

impl SampleSource for ScriptedMic {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        1
    }

    fn next_block(&mut self) -> Result<Vec<i16>> {
        let block = self
            .blocks
            .get(self.cursor)
            .cloned()
            .ok_or_else(|| Error::Capture("scripted mic exhausted".into()))?;
        self.cursor += 1;
        Ok(block)
    }
}

fn thresholds(limit: u32) -> RecordingThresholds {
    RecordingThresholds {
        amplitude: 1000,
        trailing_silence_blocks: limit,
    }
}

#[test]
fn sine_blocks_classify_as_voice() {
    assert!(!is_silent(&voice_block(256, 3000), 1000));
    assert!(is_silent(&quiet_block(256), 1000));
}

#[test]
fn quiet_message_quiet_capture_stops_and_trims() {
    let blocks = vec![
        quiet_block(64),
        voice_block(64, 3000),
        quiet_block(64),
        quiet_block(64),
    ];
    let mut mic = ScriptedMic::new(blocks);
    let recording = capture(&mut mic, &thresholds(2), &mut Cancellation::None).unwrap();

    assert_eq!(recording.sample_rate, 16_000);
    assert_eq!(recording.channels, 1);
    // Leading and trailing quiet is trimmed away; the voice survives.
    assert!(!recording.samples.is_empty());
    assert!(recording.samples.len() <= 64);
    assert!(recording.samples.iter().any(|s| s.abs() > 1000));
}

#[test]
fn held_button_capture_stops_on_release() {
    // Plenty of voice; the hold probe releases after three blocks.
    let blocks = vec![voice_block(64, 3000); 10];
    let mut mic = ScriptedMic::new(blocks);
    let mut held_for = 3;
    let mut cancel = Cancellation::when(move || {
        held_for -= 1;
        held_for == 0
    });

    let recording = capture(&mut mic, &thresholds(1000), &mut cancel).unwrap();
    assert!(!recording.samples.is_empty());
    assert!(recording.samples.len() <= 3 * 64);
}

#[test]
fn capture_never_stops_on_leading_silence() {
    // Five quiet blocks, then voice, then quiet: the silence limit of 1
    // must only count after the voice block.
    let mut blocks = vec![quiet_block(64); 5];
    blocks.push(voice_block(64, 3000));
    blocks.push(quiet_block(64));
    let mut mic = ScriptedMic::new(blocks);

    let recording = capture(&mut mic, &thresholds(1), &mut Cancellation::None).unwrap();
    assert_eq!(mic.cursor, 7);
    assert!(recording.samples.iter().any(|s| s.abs() > 1000));
}

#[test]
fn borderline_capture_yields_empty_recording() {
    // A sample exactly at the threshold counts as voice for onset (not
    // strictly below) but is still trimmed (not strictly above), so the
    // recording comes back empty and the caller skips delivery.
    let mut onset = quiet_block(64);
    onset[10] = 1000;
    let mut mic = ScriptedMic::new(vec![onset, quiet_block(64)]);

    let recording = capture(&mut mic, &thresholds(1), &mut Cancellation::None).unwrap();
    assert!(recording.samples.is_empty());
}

#[test]
fn trim_preserves_interior_quiet() {
    let buffer = [0, 0, 2000, 0, 0, 0, 1500, 0, 0];
    assert_eq!(trim(&buffer, 1000), vec![2000, 0, 0, 0, 1500]);
}

#[test]
fn recording_encodes_to_wav() {
    let recording = Recording {
        samples: voice_block(160, 2000),
        sample_rate: 16_000,
        channels: 1,
    };
    let wav = to_wav(&recording).unwrap();

    let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
    assert_eq!(reader.spec().sample_rate, 16_000);
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.spec().bits_per_sample, 16);
    let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(decoded, recording.samples);
}

#[test]
fn wire_bytes_normalize_to_samples() {
    let mut bytes = Vec::new();
    for sample in [-5i16, 0, 1200, i16::MIN] {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    assert_eq!(
        samples_from_le_bytes(&bytes),
        vec![-5, 0, 1200, i16::MIN]
    );
}

#[test]
fn exhausted_mic_surfaces_a_capture_error() {
    let mut mic = ScriptedMic::new(vec![voice_block(64, 3000)]);
    let err = capture(&mut mic, &thresholds(10), &mut Cancellation::None).unwrap_err();
    assert!(matches!(err, Error::Capture(_)));
}

//! Voice-activity-based capture state machine
//!
//! Reads fixed-size blocks from a [`SampleSource`], classifies each block
//! against the amplitude threshold, and stops on trailing silence or when a
//! cancellation predicate fires. The state machine is pure over the source
//! abstraction so tests can replay canned block sequences without hardware.

use super::silence::{is_silent, trim};
use crate::Result;

/// Frames per block read from the input device
pub const BLOCK_FRAMES: usize = 4096;

/// Bytes per sample (signed 16-bit PCM)
pub const SAMPLE_WIDTH: u16 = 2;

/// Capture thresholds, supplied by configuration
#[derive(Debug, Clone, Copy)]
pub struct RecordingThresholds {
    /// Samples with absolute value below this are "quiet"
    pub amplitude: i16,

    /// Consecutive quiet blocks after voice onset that end the capture
    pub trailing_silence_blocks: u32,
}

/// How a capture in progress may be stopped early
///
/// With `Predicate`, the predicate is polled once per block after voice
/// onset and the trailing-silence counter is ignored.
pub enum Cancellation {
    /// Stop only on the trailing-silence counter
    None,
    /// Stop as soon as the predicate returns true (e.g. button released)
    Predicate(Box<dyn FnMut() -> bool + Send>),
}

impl Cancellation {
    /// Wrap a hold-probe closure
    pub fn when<F>(predicate: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        Self::Predicate(Box::new(predicate))
    }
}

/// Blocking block reader over some audio input
///
/// Production sources wrap a cpal stream; tests replay canned blocks. The
/// source owns the underlying stream resource and releases it on drop, which
/// guarantees release on every capture exit path.
pub trait SampleSource {
    /// Sample rate of the delivered blocks
    fn sample_rate(&self) -> u32;

    /// Interleaved channel count of the delivered blocks
    fn channels(&self) -> u16;

    /// Read the next block of native-endian i16 samples, blocking until a
    /// full block is available.
    fn next_block(&mut self) -> Result<Vec<i16>>;
}

/// Per-capture state, created fresh for each invocation
struct CaptureState {
    voice_started: bool,
    consecutive_silent_blocks: u32,
    buffer: Vec<i16>,
}

impl CaptureState {
    fn new() -> Self {
        Self {
            voice_started: false,
            consecutive_silent_blocks: 0,
            buffer: Vec::new(),
        }
    }

    /// Update onset / trailing-silence tracking for one classified block.
    ///
    /// The counter tracks consecutive trailing silence: after onset every
    /// silent block increments it and every non-silent block resets it.
    fn observe(&mut self, silent: bool) {
        if silent {
            if self.voice_started {
                self.consecutive_silent_blocks += 1;
            }
        } else if self.voice_started {
            self.consecutive_silent_blocks = 0;
        } else {
            self.voice_started = true;
        }
    }
}

/// A completed, trimmed capture
#[derive(Debug, Clone)]
pub struct Recording {
    /// Trimmed interleaved samples
    pub samples: Vec<i16>,

    /// Sample rate the device delivered
    pub sample_rate: u32,

    /// Interleaved channel count
    pub channels: u16,
}

impl Recording {
    /// Bytes per sample
    #[must_use]
    pub const fn sample_width(&self) -> u16 {
        SAMPLE_WIDTH
    }

    /// Duration in milliseconds
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        let frames = self.samples.len() as u64 / u64::from(self.channels.max(1));
        frames * 1000 / u64::from(self.sample_rate.max(1))
    }
}

/// Record from `source` until the stop condition fires, then trim.
///
/// Capture never terminates before at least one non-silent block has been
/// observed; with no cancellation predicate it stops once the trailing
/// silence counter reaches `trailing_silence_blocks`. The source's stream is
/// released on all exit paths (drop), including mid-capture read errors.
///
/// # Errors
///
/// Propagates `Error::Capture` from a failed block read.
pub fn capture(
    source: &mut dyn SampleSource,
    thresholds: &RecordingThresholds,
    cancel: &mut Cancellation,
) -> Result<Recording> {
    let mut state = CaptureState::new();
    let silence_limit = thresholds.trailing_silence_blocks.max(1);

    loop {
        let block = source.next_block()?;
        state.buffer.extend_from_slice(&block);

        let silent = is_silent(&block, thresholds.amplitude);
        state.observe(silent);
        tracing::trace!(
            silent,
            voice_started = state.voice_started,
            trailing = state.consecutive_silent_blocks,
            "block classified"
        );

        // Stop conditions apply only once voice has been heard.
        if !state.voice_started {
            continue;
        }
        match cancel {
            Cancellation::Predicate(stop) => {
                if stop() {
                    tracing::debug!("capture stopped by cancellation predicate");
                    break;
                }
            }
            Cancellation::None => {
                if state.consecutive_silent_blocks >= silence_limit {
                    tracing::debug!(
                        trailing = state.consecutive_silent_blocks,
                        "capture stopped on trailing silence"
                    );
                    break;
                }
            }
        }
    }

    let samples = trim(&state.buffer, thresholds.amplitude);
    tracing::debug!(
        raw = state.buffer.len(),
        trimmed = samples.len(),
        "capture finalized"
    );
    Ok(Recording {
        samples,
        sample_rate: source.sample_rate(),
        channels: source.channels(),
    })
}

/// Normalize a wire-order (little-endian) PCM byte slice into native i16
/// samples. Hardware that delivers big-endian frames goes through the same
/// path; the odd trailing byte, if any, is ignored.
#[must_use]
pub fn samples_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    /// Replays canned blocks; errors out when exhausted so runaway loops
    /// fail the test instead of hanging.
    struct CannedSource {
        blocks: std::vec::IntoIter<Vec<i16>>,
        reads: usize,
    }

    impl CannedSource {
        fn new(blocks: Vec<Vec<i16>>) -> Self {
            Self {
                blocks: blocks.into_iter(),
                reads: 0,
            }
        }
    }

    impl SampleSource for CannedSource {
        fn sample_rate(&self) -> u32 {
            16_000
        }

        fn channels(&self) -> u16 {
            1
        }

        fn next_block(&mut self) -> Result<Vec<i16>> {
            self.reads += 1;
            self.blocks
                .next()
                .ok_or_else(|| Error::Capture("source exhausted".into()))
        }
    }

    fn thresholds(limit: u32) -> RecordingThresholds {
        RecordingThresholds {
            amplitude: 10,
            trailing_silence_blocks: limit,
        }
    }

    const QUIET: [i16; 4] = [0, 1, -2, 3];
    const VOICE: [i16; 4] = [0, 90, -80, 12];

    #[test]
    fn stops_after_trailing_silence_following_onset() {
        let mut source = CannedSource::new(vec![
            QUIET.to_vec(),
            VOICE.to_vec(),
            QUIET.to_vec(),
            QUIET.to_vec(),
        ]);
        let recording =
            capture(&mut source, &thresholds(2), &mut Cancellation::None).unwrap();

        // All four blocks were read; onset silence is handled by trim.
        assert_eq!(source.reads, 4);
        assert_eq!(recording.samples, vec![90, -80, 12]);
    }

    #[test]
    fn does_not_stop_before_voice_onset() {
        let mut source = CannedSource::new(vec![
            QUIET.to_vec(),
            QUIET.to_vec(),
            QUIET.to_vec(),
            VOICE.to_vec(),
            QUIET.to_vec(),
        ]);
        let recording =
            capture(&mut source, &thresholds(1), &mut Cancellation::None).unwrap();

        assert_eq!(source.reads, 5);
        assert_eq!(recording.samples, vec![90, -80, 12]);
    }

    #[test]
    fn silence_counter_resets_on_voice() {
        // voice, silent, voice, silent, silent: limit 2 must not fire at the
        // first silent block after the second voice block.
        let mut source = CannedSource::new(vec![
            VOICE.to_vec(),
            QUIET.to_vec(),
            VOICE.to_vec(),
            QUIET.to_vec(),
            QUIET.to_vec(),
        ]);
        let recording =
            capture(&mut source, &thresholds(2), &mut Cancellation::None).unwrap();

        assert_eq!(source.reads, 5);
        assert_eq!(recording.samples.first(), Some(&90));
        assert_eq!(recording.samples.last(), Some(&12));
    }

    #[test]
    fn cancel_predicate_overrides_silence_counter() {
        let mut source = CannedSource::new(vec![
            VOICE.to_vec(),
            VOICE.to_vec(),
            VOICE.to_vec(),
            VOICE.to_vec(),
        ]);
        let mut polls = 0;
        let mut cancel = Cancellation::when(move || {
            polls += 1;
            polls >= 3
        });
        let recording = capture(&mut source, &thresholds(100), &mut cancel).unwrap();

        // Stopped exactly at block 3 regardless of the silence counter;
        // trim drops only the leading quiet sample.
        assert_eq!(source.reads, 3);
        assert_eq!(recording.samples.len(), 11);
        assert_eq!(recording.samples.first(), Some(&90));
        assert_eq!(recording.samples.last(), Some(&12));
    }

    #[test]
    fn cancel_predicate_not_polled_before_onset() {
        let mut source = CannedSource::new(vec![QUIET.to_vec(), VOICE.to_vec()]);
        let mut cancel = Cancellation::when(|| true);
        let recording = capture(&mut source, &thresholds(1), &mut cancel).unwrap();

        // Block 1 is quiet: the predicate must not fire there.
        assert_eq!(source.reads, 2);
        assert_eq!(recording.samples, vec![90, -80, 12]);
    }

    #[test]
    fn read_error_propagates() {
        let mut source = CannedSource::new(vec![VOICE.to_vec()]);
        // Never cancels and never goes silent: the exhausted source errors.
        let err = capture(&mut source, &thresholds(5), &mut Cancellation::None)
            .unwrap_err();
        assert!(matches!(err, Error::Capture(_)));
    }

    #[test]
    fn zero_silence_limit_stops_on_first_trailing_silent_block() {
        let mut source = CannedSource::new(vec![VOICE.to_vec(), QUIET.to_vec()]);
        let recording =
            capture(&mut source, &thresholds(0), &mut Cancellation::None).unwrap();
        assert_eq!(source.reads, 2);
        assert_eq!(recording.samples, vec![90, -80, 12]);
    }

    #[test]
    fn le_byte_normalization() {
        let bytes = [0x01, 0x00, 0xff, 0x7f, 0x00, 0x80, 0x42];
        assert_eq!(samples_from_le_bytes(&bytes), vec![1, i16::MAX, i16::MIN]);
    }

    #[test]
    fn recording_duration() {
        let recording = Recording {
            samples: vec![0; 16_000],
            sample_rate: 16_000,
            channels: 1,
        };
        assert_eq!(recording.duration_ms(), 1000);
        assert_eq!(recording.sample_width(), 2);
    }
}

//! Voice pipeline: capture, silence handling, encoding, playback
//!
//! Capture runs block-by-block over an abstract sample source so the state
//! machine can be exercised without audio hardware; the cpal-backed source
//! and device resolution live alongside it.

mod capture;
mod device;
mod encode;
mod playback;
mod prompts;
mod silence;
mod stream;
mod stt;
mod tts;

pub use capture::{
    capture, samples_from_le_bytes, Cancellation, Recording, RecordingThresholds,
    SampleSource, BLOCK_FRAMES, SAMPLE_WIDTH,
};
pub use device::{list_inputs, resolve_input, resolve_output, DeviceInfo};
pub use encode::{to_ogg, to_wav};
pub use playback::AudioOutput;
pub use prompts::{PromptCache, PromptKey};
pub use silence::{is_silent, trim};
pub use stream::MicSource;
pub use stt::{SpeechToText, UNINTELLIGIBLE};
pub use tts::TextToSpeech;

//! Intercom Gateway - a Raspberry Pi voice intercom over Telegram
//!
//! This library provides the core functionality for the intercom:
//! - Silence-detected voice capture and OGG encoding
//! - Button and remote-command trigger dispatch (one recording at a time)
//! - Telegram delivery, with optional speech-to-text captions
//! - Spoken prompts and inbound message playback
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Triggers                         │
//! │   GPIO buttons  │  /record command  │  keyboard     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Dispatcher                          │
//! │        at-most-one recording session gate            │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               Recording session                      │
//! │   prompt  │  capture  │  trim  │  encode  │  STT    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              Telegram channel                        │
//! │   voice messages  │  commands  │  text playback     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod channels;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod error;
#[cfg(feature = "gpio")]
pub mod gpio;
pub mod session;
pub mod sources;
pub mod voice;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};

//! Audio device resolution
//!
//! Input selection prefers a configured name or index hint, then the
//! platform default, then the first enumerated device with a usable input
//! channel count. Voice hardware on small boards frequently exposes bogus
//! multi-channel devices, so "usable" means one or two input channels.
//! Selection runs over a small host seam so the fallback order is testable
//! without audio hardware.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

use crate::{Error, Result};

/// Human-readable summary of one input device, for `lsaudio` style listings
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Position in enumeration order
    pub index: usize,

    /// Device name as reported by the host
    pub name: String,

    /// Input channel count of the default input config
    pub channels: u16,
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}. {} (input channels: {})",
            self.index, self.name, self.channels
        )
    }
}

/// One selectable device, reduced to what selection needs
trait InputCandidate {
    fn name(&self) -> Option<String>;
    fn input_channels(&self) -> Option<u16>;
}

/// Enumeration seam over the audio host
trait InputHost {
    type Candidate: InputCandidate;

    fn default_input(&self) -> Option<Self::Candidate>;
    fn enumerate(&self) -> Result<Vec<Self::Candidate>>;
}

/// Whether the candidate is suitable for recording voice
fn is_valid_input(candidate: &impl InputCandidate) -> bool {
    candidate
        .input_channels()
        .is_some_and(|c| (1..=2).contains(&c))
}

/// Resolve the input device to record from.
///
/// `hint` is a device name or a numeric enumeration index from
/// configuration. An invalid hint is logged and falls through to the
/// default-then-enumerate path; if the default is valid it is selected
/// without walking the full device list.
fn select_input<H: InputHost>(host: &H, hint: Option<&str>) -> Result<H::Candidate> {
    if let Some(hint) = hint {
        let index_hint = hint.parse::<usize>().ok();
        for (index, candidate) in host.enumerate()?.into_iter().enumerate() {
            let name_matches = candidate.name().is_some_and(|n| n == hint);
            if name_matches || index_hint == Some(index) {
                if is_valid_input(&candidate) {
                    tracing::debug!(hint, index, "using configured input device");
                    return Ok(candidate);
                }
                tracing::error!(hint, index, "configured input device is invalid");
            }
        }
        tracing::warn!(hint, "configured input device not found, falling back");
    }

    if let Some(candidate) = host.default_input() {
        if is_valid_input(&candidate) {
            tracing::debug!(
                name = candidate.name().unwrap_or_default(),
                "using default input device"
            );
            return Ok(candidate);
        }
    }

    tracing::info!("selecting a candidate input device from the list");
    for candidate in host.enumerate()? {
        if is_valid_input(&candidate) {
            tracing::debug!(
                name = candidate.name().unwrap_or_default(),
                "using first valid input device"
            );
            return Ok(candidate);
        }
    }

    Err(Error::DeviceUnavailable(
        "no valid input devices found".into(),
    ))
}

impl InputCandidate for Device {
    fn name(&self) -> Option<String> {
        DeviceTrait::name(self).ok()
    }

    fn input_channels(&self) -> Option<u16> {
        self.default_input_config().ok().map(|c| c.channels())
    }
}

struct CpalHost(cpal::Host);

impl InputHost for CpalHost {
    type Candidate = Device;

    fn default_input(&self) -> Option<Device> {
        self.0.default_input_device()
    }

    fn enumerate(&self) -> Result<Vec<Device>> {
        Ok(self
            .0
            .input_devices()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .collect())
    }
}

/// Enumerate input devices with their channel counts
///
/// # Errors
///
/// Returns `DeviceUnavailable` if the host cannot enumerate devices.
pub fn list_inputs() -> Result<Vec<DeviceInfo>> {
    let host = CpalHost(cpal::default_host());
    Ok(host
        .enumerate()?
        .into_iter()
        .enumerate()
        .filter_map(|(index, device)| {
            Some(DeviceInfo {
                index,
                name: InputCandidate::name(&device)?,
                channels: device.input_channels()?,
            })
        })
        .collect())
}

/// Resolve the input device to record from, honoring a name or index hint.
///
/// # Errors
///
/// Returns `DeviceUnavailable` if no candidate qualifies.
pub fn resolve_input(hint: Option<&str>) -> Result<Device> {
    select_input(&CpalHost(cpal::default_host()), hint)
}

/// Resolve the output device for playback.
///
/// # Errors
///
/// Returns `DeviceUnavailable` if the host has no default output device.
pub fn resolve_output() -> Result<Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::DeviceUnavailable("no output device available".into()))
}

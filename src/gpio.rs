//! Raspberry Pi GPIO backend for button inputs
//!
//! Buttons are wired between a BCM pin and ground, so the line uses the
//! internal pull-up and reads low while pressed. Compiled only with the
//! `gpio` feature; development hosts use the keyboard stand-in instead.

use rppal::gpio::{Gpio, InputPin};

use crate::sources::DigitalInput;
use crate::{Error, Result};

/// One pulled-up, active-low button line
pub struct GpioButton {
    pin: InputPin,
}

impl GpioButton {
    /// Claim `bcm_pin` as a pulled-up input.
    ///
    /// # Errors
    ///
    /// Returns `Error::Gpio` if the GPIO peripheral or the pin cannot be
    /// acquired (typically missing permissions on /dev/gpiomem).
    pub fn new(bcm_pin: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| Error::Gpio(e.to_string()))?;
        let pin = gpio
            .get(bcm_pin)
            .map_err(|e| Error::Gpio(format!("pin {bcm_pin}: {e}")))?
            .into_input_pullup();
        tracing::debug!(pin = bcm_pin, "claimed GPIO input");
        Ok(Self { pin })
    }
}

impl DigitalInput for GpioButton {
    fn is_active(&self) -> bool {
        self.pin.is_low()
    }
}

//! Three-lamp indicator on GPIO output lines.
//!
//! The lamps are any three [`OutputPin`]s. On a Raspberry Pi [`open`] claims
//! them from the GPIO character device by BCM line number.
//!
//! Exactly one lamp is lit at a time. The other two are switched off before
//! the selected one is switched on.

use embedded_hal::digital::OutputPin;
use log::{debug, warn};
use rppal::gpio::Gpio;

use marshal_core::{IndicatorColor, IndicatorSink, SinkError};

use crate::MarshalError;

/// BCM line numbers of the three lamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LampPins {
    pub red: u8,
    pub yellow: u8,
    pub green: u8,
}

impl Default for LampPins {
    fn default() -> Self {
        LampPins {
            red: 17,
            yellow: 27,
            green: 22,
        }
    }
}

pub struct LampIndicator<P: OutputPin> {
    red: P,
    yellow: P,
    green: P,
}

impl<P: OutputPin> LampIndicator<P> {
    pub fn new(red: P, yellow: P, green: P) -> Self {
        LampIndicator { red, yellow, green }
    }

    fn lamp(&mut self, color: IndicatorColor) -> &mut P {
        match color {
            IndicatorColor::Red => &mut self.red,
            IndicatorColor::Yellow => &mut self.yellow,
            IndicatorColor::Green => &mut self.green,
        }
    }

    fn all_off(&mut self) -> Result<(), SinkError> {
        for color in IndicatorColor::ALL {
            self.lamp(color)
                .set_low()
                .map_err(|e| SinkError::Device(format!("{} lamp: {:?}", color, e)))?;
        }
        Ok(())
    }
}

/// Claim the three BCM lines as outputs, all lamps off.
pub fn open(pins: LampPins) -> Result<LampIndicator<rppal::gpio::OutputPin>, MarshalError> {
    let gpio = Gpio::new().map_err(|e| MarshalError::Gpio {
        pin: pins.red,
        message: e.to_string(),
    })?;
    let output = |pin: u8| {
        gpio.get(pin)
            .map(|p| p.into_output_low())
            .map_err(|e| MarshalError::Gpio {
                pin,
                message: e.to_string(),
            })
    };
    let indicator = LampIndicator::new(output(pins.red)?, output(pins.yellow)?, output(pins.green)?);
    debug!(
        "GPIO indicator ready on pins R{} Y{} G{}",
        pins.red, pins.yellow, pins.green
    );
    Ok(indicator)
}

impl<P: OutputPin + Send> IndicatorSink for LampIndicator<P> {
    fn set(&mut self, color: IndicatorColor) -> Result<(), SinkError> {
        self.all_off()?;
        self.lamp(color)
            .set_high()
            .map_err(|e| SinkError::Device(format!("{} lamp: {:?}", color, e)))
    }

    fn reset(&mut self) -> Result<(), SinkError> {
        self.all_off()
    }
}

impl<P: OutputPin> Drop for LampIndicator<P> {
    fn drop(&mut self) {
        if let Err(e) = self.all_off() {
            warn!("Cannot switch lamps off: {}", e);
        }
    }
}

impl<P: OutputPin> std::fmt::Debug for LampIndicator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LampIndicator").finish_non_exhaustive()
    }
}

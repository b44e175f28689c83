//! Three-color indicator light.

use serde::{Deserialize, Serialize};

use crate::error::SinkError;

/// Indicator color. Exactly one is lit at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndicatorColor {
    Red,
    Yellow,
    Green,
}

impl IndicatorColor {
    pub const ALL: [IndicatorColor; 3] =
        [IndicatorColor::Red, IndicatorColor::Yellow, IndicatorColor::Green];
}

impl Default for IndicatorColor {
    fn default() -> Self {
        IndicatorColor::Red
    }
}

impl std::fmt::Display for IndicatorColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndicatorColor::Red => write!(f, "RED"),
            IndicatorColor::Yellow => write!(f, "YELLOW"),
            IndicatorColor::Green => write!(f, "GREEN"),
        }
    }
}

/// Output device driving the three lamps.
///
/// `set` must switch the other two outputs off before lighting the requested
/// one, so callers never observe two lamps on at once.
pub trait IndicatorSink: Send {
    fn set(&mut self, color: IndicatorColor) -> Result<(), SinkError>;

    /// Switch every lamp off. Called on shutdown.
    fn reset(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Indicator sink that only logs. Used when no lamp hardware is configured.
#[derive(Debug, Default)]
pub struct LogIndicator;

impl IndicatorSink for LogIndicator {
    fn set(&mut self, color: IndicatorColor) -> Result<(), SinkError> {
        log::debug!("Indicator -> {}", color);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), SinkError> {
        log::debug!("Indicator -> off");
        Ok(())
    }
}

/// Remembers the requested color and forwards it to the sink.
pub struct IndicatorController {
    sink: Box<dyn IndicatorSink>,
    color: IndicatorColor,
}

impl IndicatorController {
    /// Wrap a sink and light RED, the safe default.
    pub fn new(sink: Box<dyn IndicatorSink>) -> Self {
        let mut controller = IndicatorController {
            sink,
            color: IndicatorColor::Red,
        };
        controller.set(IndicatorColor::Red);
        controller
    }

    /// Currently requested color.
    pub fn color(&self) -> IndicatorColor {
        self.color
    }

    /// Light `color`. Device failures are logged, not returned.
    pub fn set(&mut self, color: IndicatorColor) {
        self.color = color;
        if let Err(e) = self.sink.set(color) {
            log::error!("Failed to set indicator to {}: {}", color, e);
        }
    }

    /// Switch the lamps off.
    pub fn reset(&mut self) {
        if let Err(e) = self.sink.reset() {
            log::error!("Failed to reset indicator: {}", e);
        }
    }
}

impl std::fmt::Debug for IndicatorController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IndicatorController {{ color: {} }}", self.color)
    }
}

//! Deployment constants.
//!
//! Everything here is fixed at startup. The server loads a JSON document into
//! [`ControllerConfig`]; missing fields fall back to the calibrated defaults.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::scan::{MIN_VALID_RANGE, NO_RETURN_SENTINEL};
use crate::segmenter::SegmenterConfig;

/// Complete controller configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    pub scan: ScanConfig,
    pub segmenter: SegmenterConfig,
    pub traffic: TrafficConfig,
    pub motion: MotionConfig,
    pub emergency: EmergencyConfig,
    /// Minimum spacing between two status lines (milliseconds)
    pub status_interval_ms: u64,
}

/// Range reading sanitation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanConfig {
    /// Readings at or below this (meters) are "no return"
    pub min_valid_range: f32,
    /// Substitute for "no return" readings (meters)
    pub no_return_sentinel: f32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            min_valid_range: MIN_VALID_RANGE,
            no_return_sentinel: NO_RETURN_SENTINEL,
        }
    }
}

/// Congestion thresholds. The gap between them is the deadband.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrafficConfig {
    /// NORMAL becomes CONGESTION when the count reaches this
    pub congestion_enter: usize,
    /// CONGESTION becomes NORMAL when the count drops below this
    pub congestion_exit: usize,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        TrafficConfig {
            congestion_enter: 4,
            congestion_exit: 2,
        }
    }
}

/// Open-loop calibration for the emergency maneuver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MotionConfig {
    /// Linear speed (m/s)
    pub linear_speed: f64,
    /// Angular speed (rad/s)
    pub angular_speed: f64,
    /// Time to cover the straight leg (about 50 cm at the default speed)
    pub linear_duration_s: f64,
    /// Time to turn about 90° at the default angular speed
    pub turn_duration_s: f64,
    /// Interval between repeated velocity commands (milliseconds)
    pub publish_interval_ms: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            linear_speed: 0.1,
            angular_speed: 0.3,
            linear_duration_s: 5.0,
            turn_duration_s: 5.2,
            publish_interval_ms: 100,
        }
    }
}

/// Emergency episode schedule, measured from the START trigger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmergencyConfig {
    /// T1: the robot clears the way after this many seconds
    pub outbound_delay_s: f64,
    /// T2: the robot returns after this many seconds
    pub return_delay_s: f64,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        EmergencyConfig {
            outbound_delay_s: 30.0,
            return_delay_s: 60.0,
        }
    }
}

impl ControllerConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: ControllerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the state machine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positives: [(&'static str, f64); 8] = [
            ("segmenter.maxViewDistance", self.segmenter.max_view_distance as f64),
            ("scan.noReturnSentinel", self.scan.no_return_sentinel as f64),
            ("motion.linearSpeed", self.motion.linear_speed),
            ("motion.angularSpeed", self.motion.angular_speed),
            ("motion.linearDurationS", self.motion.linear_duration_s),
            ("motion.turnDurationS", self.motion.turn_duration_s),
            ("motion.publishIntervalMs", self.motion.publish_interval_ms as f64),
            ("emergency.outboundDelayS", self.emergency.outbound_delay_s),
        ];
        for (name, value) in positives {
            if !(value > 0.0) {
                return Err(ConfigError::NotPositive { name, value });
            }
        }

        if self.segmenter.gap_threshold < 0.0 {
            return Err(ConfigError::NotPositive {
                name: "segmenter.gapThreshold",
                value: self.segmenter.gap_threshold as f64,
            });
        }

        if self.scan.no_return_sentinel < self.segmenter.max_view_distance {
            return Err(ConfigError::SentinelInRange {
                sentinel: self.scan.no_return_sentinel,
                max_view_distance: self.segmenter.max_view_distance,
            });
        }

        if self.emergency.return_delay_s <= self.emergency.outbound_delay_s {
            return Err(ConfigError::DelayOrder {
                outbound_s: self.emergency.outbound_delay_s,
                return_s: self.emergency.return_delay_s,
            });
        }

        if self.traffic.congestion_exit > self.traffic.congestion_enter {
            return Err(ConfigError::ThresholdOrder {
                enter: self.traffic.congestion_enter,
                exit: self.traffic.congestion_exit,
            });
        }

        Ok(())
    }

    /// Status interval, with the one-second default when unset.
    pub fn status_interval_ms(&self) -> u64 {
        if self.status_interval_ms == 0 {
            1000
        } else {
            self.status_interval_ms
        }
    }
}

//! Error types for configuration and output sinks

use thiserror::Error;

/// Errors reported when a [`ControllerConfig`](crate::config::ControllerConfig)
/// does not describe a usable deployment.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A value that must be strictly positive is zero or negative
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    /// The return leg must be scheduled after the outbound leg
    #[error("Return delay ({return_s}s) must be later than outbound delay ({outbound_s}s)")]
    DelayOrder { outbound_s: f64, return_s: f64 },

    /// The exit threshold must not exceed the enter threshold
    #[error("Congestion exit threshold ({exit}) must not exceed enter threshold ({enter})")]
    ThresholdOrder { enter: usize, exit: usize },

    /// "No return" readings must land outside the detection range
    #[error("No-return sentinel ({sentinel}m) must not be below the view distance ({max_view_distance}m)")]
    SentinelInRange { sentinel: f32, max_view_distance: f32 },

    /// Failed to deserialize the configuration document
    #[error("Cannot parse configuration: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

/// Errors raised by indicator and motion sinks.
///
/// Sinks wrap hardware or transport failures; the core logs them and carries
/// on, so the payload is kept as text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The underlying device could not be written
    #[error("Device write failed: {0}")]
    Device(String),

    /// The underlying transport refused the message
    #[error("Transport failed: {0}")]
    Transport(String),
}

/// Errors raised by a [`NotificationSink`](crate::notify::NotificationSink).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The push service could not be reached
    #[error("Notification service unreachable: {0}")]
    Unreachable(String),

    /// The push service rejected the request
    #[error("Notification rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Credentials are missing or invalid
    #[error("Notification service credentials rejected")]
    Unauthorized,
}

//! # Marshal Core
//!
//! Platform-independent logic for a traffic-marshal robot: 360° range-scan
//! segmentation and the NORMAL / CONGESTION / EMERGENCY state machine.
//!
//! This crate contains pure decision logic with **zero I/O dependencies**.
//! Every side effect goes through a trait so the same controller can drive
//! real hardware in `marshal-server` and recording mocks in tests.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  marshal-core (platform-independent, no tokio/async deps)   │
//! │                                                             │
//! │  scan ──► segmenter ──► count ──► TrafficStateMachine       │
//! │                                      │      │       │       │
//! │                     IndicatorSink ◄──┘      │       │       │
//! │                  NotificationSink ◄─────────┘       │       │
//! │           MotionSequencer ─► MotionSink ◄───────────┘       │
//! │                                                             │
//! │  Clock (monotonic ms, ManualClock for tests)                │
//! └─────────────────────────────────────────────────────────────┘
//!                 ▲
//!    ┌────────────┴────────────┐
//!    │  marshal-server         │
//!    │  (GPIO, Pushbullet,     │
//!    │   UDP, HTTP, tokio)     │
//!    └─────────────────────────┘
//! ```
//!
//! ## Key Modules
//!
//! - [`segmenter`] - Object counting over a range scan
//! - [`controller`] - The traffic state machine and emergency sequence
//! - [`motion`] - Open-loop timed moves
//! - [`indicator`] - Three-color light
//! - [`notify`] - Best-effort push notifications
//! - [`config`] - Deployment constants
//!
//! ## Example: Counting Objects
//!
//! ```rust
//! use marshal_core::segmenter::segment;
//!
//! let ranges = [10.0, 10.0, 0.5, 0.5, 0.5, 0.5, 10.0, 10.0];
//! assert_eq!(segment(&ranges, 1.5, 0.05, 3), 1);
//! ```
//!
//! ## Example: Driving the State Machine
//!
//! ```rust
//! use std::sync::Arc;
//! use marshal_core::{
//!     ControllerConfig, LogIndicator, LogMotionSink, ManualClock, Mode, TrafficStateMachine,
//!     TriggerCommand,
//! };
//!
//! let clock = ManualClock::new(0);
//! let mut machine = TrafficStateMachine::new(
//!     ControllerConfig::default(),
//!     Arc::new(clock.clone()),
//!     Box::new(LogIndicator),
//!     None,
//!     Box::new(LogMotionSink),
//! );
//!
//! machine.on_external_trigger(TriggerCommand::Start);
//! assert_eq!(machine.mode(), Mode::Emergency);
//!
//! // Past T1 the next scan runs the outbound leg (virtual time advances)
//! clock.advance_ms(30_001);
//! machine.on_scan(&[10.0; 360]);
//! assert!(machine.episode().unwrap().outbound_done);
//! ```

pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod indicator;
pub mod motion;
pub mod notify;
pub mod scan;
pub mod segmenter;

// Re-export commonly used types
pub use clock::{Clock, ManualClock};
pub use config::ControllerConfig;
pub use controller::{
    ControllerStatus, EmergencyEpisode, Mode, ScanSummary, StatusListener, TrafficStateMachine,
    TriggerCommand, TriggerOutcome,
};
pub use error::{ConfigError, NotifyError, SinkError};
pub use indicator::{IndicatorColor, IndicatorSink, LogIndicator};
pub use motion::{AbortHandle, LogMotionSink, ManeuverOutcome, MotionSink, Velocity};
pub use notify::NotificationSink;
pub use segmenter::{RangeSegmenter, SegmenterConfig};

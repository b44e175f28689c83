//! Open-loop timed moves.
//!
//! A move publishes one velocity repeatedly for a fixed wall-clock duration,
//! then publishes zero once. No odometry is consulted: the distance covered
//! depends only on the speed and duration the caller supplies.
//!
//! ```text
//!   t=0        interval      ...        t>=duration
//!   |--v--|--v--|--v--| ... |--v--|  0
//!                                    ^ always published, even when aborted
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::SinkError;

/// Planar velocity command.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Velocity {
    /// Forward speed (m/s), negative is reverse
    pub linear_x: f64,
    /// Yaw rate (rad/s), positive is counter-clockwise
    pub angular_z: f64,
}

impl Velocity {
    pub const ZERO: Velocity = Velocity {
        linear_x: 0.0,
        angular_z: 0.0,
    };

    pub fn new(linear_x: f64, angular_z: f64) -> Self {
        Velocity {
            linear_x,
            angular_z,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.linear_x == 0.0 && self.angular_z == 0.0
    }
}

/// Destination for velocity commands.
pub trait MotionSink: Send {
    fn publish(&mut self, velocity: Velocity) -> Result<(), SinkError>;
}

/// Motion sink that only logs. Used when no drive is configured.
#[derive(Debug, Default)]
pub struct LogMotionSink;

impl MotionSink for LogMotionSink {
    fn publish(&mut self, velocity: Velocity) -> Result<(), SinkError> {
        log::trace!(
            "Velocity -> linear {:.3} angular {:.3}",
            velocity.linear_x,
            velocity.angular_z
        );
        Ok(())
    }
}

/// One timed move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedMove {
    pub velocity: Velocity,
    pub duration_s: f64,
}

impl TimedMove {
    pub fn new(linear_x: f64, angular_z: f64, duration_s: f64) -> Self {
        TimedMove {
            velocity: Velocity::new(linear_x, angular_z),
            duration_s,
        }
    }
}

/// How a move (or a sequence of moves) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManeuverOutcome {
    Completed,
    Aborted,
}

/// Shared flag that cuts an in-flight move short.
///
/// The flag is raised from outside the controller thread (a STOP trigger)
/// and observed by the sequencer before every publish.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Executes timed moves against a [`MotionSink`].
pub struct MotionSequencer {
    sink: Box<dyn MotionSink>,
    clock: Arc<dyn Clock>,
    publish_interval_ms: u64,
    abort: AbortHandle,
}

impl MotionSequencer {
    pub fn new(sink: Box<dyn MotionSink>, clock: Arc<dyn Clock>, publish_interval_ms: u64) -> Self {
        MotionSequencer {
            sink,
            clock,
            publish_interval_ms: publish_interval_ms.max(1),
            abort: AbortHandle::new(),
        }
    }

    /// Share an existing abort flag instead of the sequencer's own.
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Publish `(linear, angular)` for `duration_s` seconds, then zero.
    ///
    /// Blocks the calling thread for the whole duration unless aborted.
    pub fn execute(&mut self, linear: f64, angular: f64, duration_s: f64) -> ManeuverOutcome {
        let velocity = Velocity::new(linear, angular);
        let duration_ms = (duration_s.max(0.0) * 1000.0).round() as u64;
        let start = self.clock.now_ms();
        let mut outcome = ManeuverOutcome::Completed;

        while self.clock.now_ms().saturating_sub(start) < duration_ms {
            if self.abort.is_aborted() {
                outcome = ManeuverOutcome::Aborted;
                break;
            }
            self.publish(velocity);
            self.clock.sleep_ms(self.publish_interval_ms);
        }

        self.publish(Velocity::ZERO);
        outcome
    }

    /// Run moves back to back. Stops at the first aborted move.
    pub fn execute_all(&mut self, moves: &[TimedMove]) -> ManeuverOutcome {
        for m in moves {
            let outcome = self.execute(m.velocity.linear_x, m.velocity.angular_z, m.duration_s);
            if outcome == ManeuverOutcome::Aborted {
                return outcome;
            }
        }
        ManeuverOutcome::Completed
    }

    fn publish(&mut self, velocity: Velocity) {
        // Open loop: a dropped command is not retried
        if let Err(e) = self.sink.publish(velocity) {
            log::warn!("Failed to publish velocity: {}", e);
        }
    }
}

impl std::fmt::Debug for MotionSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionSequencer")
            .field("publish_interval_ms", &self.publish_interval_ms)
            .field("aborted", &self.abort.is_aborted())
            .finish()
    }
}

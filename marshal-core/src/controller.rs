//! Traffic state machine.
//!
//! Owns every piece of mutable controller state and is the only writer of the
//! indicator. Scans and external triggers are fed in one at a time by a
//! single caller; the server serializes them through one queue.
//!
//! # Modes
//!
//! ```text
//!            count >= enter                 START (any mode)
//!   NORMAL ----------------> CONGESTION     ---------------> EMERGENCY
//!      ^                         |                               |
//!      +------ count < exit -----+                               |
//!      ^                                                         |
//!      +------------------------ STOP (any mode) ----------------+
//! ```
//!
//! # Emergency episode
//!
//! ```text
//!   START          T1                       T2
//!     |------------|------------------------|---------------->
//!     RED          YELLOW reverse+turn RED  YELLOW turn+forward RED, notify
//! ```
//!
//! Each leg runs at most once per episode and is re-checked on every scan,
//! so a late or repeated scan never replays a leg.

use serde::Serialize;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::ControllerConfig;
use crate::indicator::{IndicatorColor, IndicatorController, IndicatorSink};
use crate::motion::{AbortHandle, ManeuverOutcome, MotionSequencer, MotionSink, TimedMove};
use crate::notify::{NotificationChannel, NotificationSink};
use crate::scan;
use crate::segmenter::RangeSegmenter;

// =============================================================================
// Mode and Trigger
// =============================================================================

/// Traffic-flow mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    Normal,
    Congestion,
    Emergency,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Normal
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Normal => write!(f, "NORMAL"),
            Mode::Congestion => write!(f, "CONGESTION"),
            Mode::Emergency => write!(f, "EMERGENCY"),
        }
    }
}

/// External emergency trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerCommand {
    Start,
    Stop,
}

impl TriggerCommand {
    /// Parse a trigger message. Only `START` and `STOP` are recognized.
    pub fn parse(text: &str) -> Option<TriggerCommand> {
        match text.trim() {
            "START" => Some(TriggerCommand::Start),
            "STOP" => Some(TriggerCommand::Stop),
            _ => None,
        }
    }
}

impl std::fmt::Display for TriggerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerCommand::Start => write!(f, "START"),
            TriggerCommand::Stop => write!(f, "STOP"),
        }
    }
}

/// What happened to a trigger message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Applied(TriggerCommand),
    Ignored,
}

// =============================================================================
// Episode and Reports
// =============================================================================

/// One emergency response, from START to STOP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyEpisode {
    /// Clock reading when START was processed
    pub started_ms: u64,
    /// The clear-the-way leg has run
    pub outbound_done: bool,
    /// The return leg has run
    pub return_done: bool,
}

impl EmergencyEpisode {
    fn new(started_ms: u64) -> Self {
        EmergencyEpisode {
            started_ms,
            outbound_done: false,
            return_done: false,
        }
    }

    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.started_ms)
    }
}

/// Result of processing one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSummary {
    pub object_count: usize,
    /// Mode after the scan was processed
    pub mode: Mode,
    /// Present when this scan emitted the rate-limited status line
    pub status_line: Option<String>,
}

/// Serializable snapshot of the controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    pub mode: Mode,
    pub object_count: usize,
    pub indicator: IndicatorColor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency: Option<EpisodeStatus>,
    pub notifications_connected: bool,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub scans_processed: u64,
}

impl Default for ControllerStatus {
    fn default() -> Self {
        ControllerStatus {
            mode: Mode::Normal,
            object_count: 0,
            indicator: IndicatorColor::Red,
            emergency: None,
            notifications_connected: false,
            notifications_sent: 0,
            notifications_failed: 0,
            scans_processed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeStatus {
    pub elapsed_s: u64,
    pub outbound_done: bool,
    pub return_done: bool,
}

// =============================================================================
// State Machine
// =============================================================================

/// Reactive traffic controller.
pub struct TrafficStateMachine {
    config: ControllerConfig,
    segmenter: RangeSegmenter,
    clock: Arc<dyn Clock>,
    indicator: IndicatorController,
    notifier: NotificationChannel,
    motion: MotionSequencer,
    mode: Mode,
    episode: Option<EmergencyEpisode>,
    last_status_ms: Option<u64>,
    last_count: usize,
    scans_processed: u64,
    status_listener: Option<StatusListener>,
}

/// Receives a status snapshot whenever a maneuver leg starts.
pub type StatusListener = Box<dyn FnMut(&ControllerStatus) + Send>;

impl TrafficStateMachine {
    /// Build a controller in NORMAL mode with the indicator RED.
    ///
    /// Pass `None` as notifier when the push service could not be set up;
    /// the controller then runs without notifications.
    pub fn new(
        config: ControllerConfig,
        clock: Arc<dyn Clock>,
        indicator: Box<dyn IndicatorSink>,
        notifier: Option<Box<dyn NotificationSink>>,
        motion: Box<dyn MotionSink>,
    ) -> Self {
        let motion = MotionSequencer::new(motion, clock.clone(), config.motion.publish_interval_ms);
        TrafficStateMachine {
            segmenter: RangeSegmenter::new(config.segmenter),
            config,
            clock,
            indicator: IndicatorController::new(indicator),
            notifier: NotificationChannel::new(notifier),
            motion,
            mode: Mode::Normal,
            episode: None,
            last_status_ms: None,
            last_count: 0,
            scans_processed: 0,
            status_listener: None,
        }
    }

    /// Report status while a leg blocks the caller. Between legs the
    /// caller reads [`status`](Self::status) itself.
    pub fn with_status_listener(mut self, listener: StatusListener) -> Self {
        self.status_listener = Some(listener);
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn episode(&self) -> Option<&EmergencyEpisode> {
        self.episode.as_ref()
    }

    pub fn indicator_color(&self) -> IndicatorColor {
        self.indicator.color()
    }

    pub fn last_count(&self) -> usize {
        self.last_count
    }

    pub fn notifications_connected(&self) -> bool {
        self.notifier.is_connected()
    }

    /// Share an abort flag created before the controller, so callers can hold
    /// it before the controller thread is up.
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.motion = self.motion.with_abort_handle(abort);
        self
    }

    /// Handle used to cut an in-flight maneuver short from another thread.
    pub fn abort_handle(&self) -> AbortHandle {
        self.motion.abort_handle()
    }

    pub fn status(&self) -> ControllerStatus {
        let now = self.clock.now_ms();
        ControllerStatus {
            mode: self.mode,
            object_count: self.last_count,
            indicator: self.indicator.color(),
            emergency: self.episode.map(|e| EpisodeStatus {
                elapsed_s: e.elapsed_ms(now) / 1000,
                outbound_done: e.outbound_done,
                return_done: e.return_done,
            }),
            notifications_connected: self.notifier.is_connected(),
            notifications_sent: self.notifier.sent(),
            notifications_failed: self.notifier.failed(),
            scans_processed: self.scans_processed,
        }
    }

    // -------------------------------------------------------------------------
    // Scans
    // -------------------------------------------------------------------------

    /// Process one range scan.
    ///
    /// May block for the length of an emergency maneuver.
    pub fn on_scan(&mut self, ranges: &[f32]) -> ScanSummary {
        let ranges = scan::sanitize_with(
            ranges,
            self.config.scan.min_valid_range,
            self.config.scan.no_return_sentinel,
        );
        let count = self.segmenter.segment(&ranges);
        self.last_count = count;
        self.scans_processed += 1;

        let status_line = self.maybe_status_line(count);

        let mode = self.mode;
        match mode {
            Mode::Normal if count >= self.config.traffic.congestion_enter => {
                self.mode = Mode::Congestion;
                log::info!("Congestion detected: {} objects", count);
                self.indicator.set(IndicatorColor::Green);
                self.notifier
                    .send(&format!("Congestion! I see {} objects.", count));
            }
            Mode::Congestion if count < self.config.traffic.congestion_exit => {
                self.mode = Mode::Normal;
                log::info!("Congestion cleared: {} objects", count);
                self.indicator.set(IndicatorColor::Red);
            }
            _ => {}
        }

        if self.mode == Mode::Emergency {
            self.run_emergency_sequence();
        }

        ScanSummary {
            object_count: count,
            mode: self.mode,
            status_line,
        }
    }

    fn maybe_status_line(&mut self, count: usize) -> Option<String> {
        let now = self.clock.now_ms();
        if let Some(last) = self.last_status_ms {
            if now.saturating_sub(last) <= self.config.status_interval_ms() {
                return None;
            }
        }
        self.last_status_ms = Some(now);

        let mut line = format!("360° scan: found {} objects | Mode: {}", count, self.mode);
        if let (Mode::Emergency, Some(episode)) = (self.mode, self.episode.as_ref()) {
            line.push_str(&format!(" (Time: {}s)", episode.elapsed_ms(now) / 1000));
        }
        log::info!("{}", line);
        Some(line)
    }

    fn run_emergency_sequence(&mut self) {
        let Some(episode) = self.episode else {
            return;
        };
        let elapsed_s = episode.elapsed_ms(self.clock.now_ms()) as f64 / 1000.0;
        let motion = self.config.motion;

        if elapsed_s > self.config.emergency.outbound_delay_s && !episode.outbound_done {
            log::info!(
                "T+{}s: clearing the way",
                self.config.emergency.outbound_delay_s
            );
            let outcome = self.run_leg(&[
                TimedMove::new(-motion.linear_speed, 0.0, motion.linear_duration_s),
                TimedMove::new(0.0, motion.angular_speed, motion.turn_duration_s),
            ]);
            if let Some(e) = self.episode.as_mut() {
                e.outbound_done = true;
            }
            if outcome == ManeuverOutcome::Aborted {
                log::warn!("Outbound maneuver aborted");
            }
        }

        let outbound_done = self.episode.map_or(false, |e| e.outbound_done);
        let return_done = self.episode.map_or(true, |e| e.return_done);
        if elapsed_s > self.config.emergency.return_delay_s && outbound_done && !return_done {
            log::info!("T+{}s: returning", self.config.emergency.return_delay_s);
            let outcome = self.run_leg(&[
                TimedMove::new(0.0, -motion.angular_speed, motion.turn_duration_s),
                TimedMove::new(motion.linear_speed, 0.0, motion.linear_duration_s),
            ]);
            if let Some(e) = self.episode.as_mut() {
                e.return_done = true;
            }
            match outcome {
                ManeuverOutcome::Completed => {
                    self.notifier.send("Emergency Ended. Robot returned.");
                }
                ManeuverOutcome::Aborted => log::warn!("Return maneuver aborted"),
            }
        }
    }

    fn run_leg(&mut self, moves: &[TimedMove]) -> ManeuverOutcome {
        self.indicator.set(IndicatorColor::Yellow);
        if let Some(mut listener) = self.status_listener.take() {
            listener(&self.status());
            self.status_listener = Some(listener);
        }
        let outcome = self.motion.execute_all(moves);
        self.indicator.set(IndicatorColor::Red);
        outcome
    }

    // -------------------------------------------------------------------------
    // Triggers
    // -------------------------------------------------------------------------

    /// Apply an external trigger.
    pub fn on_external_trigger(&mut self, command: TriggerCommand) {
        self.motion.abort_handle().clear();
        match command {
            TriggerCommand::Start => {
                // Restarting an active episode resets its clock and both legs
                self.mode = Mode::Emergency;
                self.episode = Some(EmergencyEpisode::new(self.clock.now_ms()));
                self.indicator.set(IndicatorColor::Red);
                self.notifier.send(&format!(
                    "EMERGENCY CALL! Robot moving in {}s.",
                    self.config.emergency.outbound_delay_s
                ));
                log::info!("!!! EMERGENCY MODE STARTED !!!");
            }
            TriggerCommand::Stop => {
                self.mode = Mode::Normal;
                self.episode = None;
                self.indicator.set(IndicatorColor::Red);
                log::info!("--- Normal mode restored ---");
            }
        }
    }

    /// Parse and apply a raw trigger message; unknown text is ignored.
    pub fn on_trigger_text(&mut self, text: &str) -> TriggerOutcome {
        match TriggerCommand::parse(text) {
            Some(command) => {
                self.on_external_trigger(command);
                TriggerOutcome::Applied(command)
            }
            None => {
                log::debug!("Ignoring unknown trigger '{}'", text);
                TriggerOutcome::Ignored
            }
        }
    }

    /// Switch the indicator off. Called once when the process stops.
    pub fn shutdown(&mut self) {
        log::info!("Controller shutting down");
        self.indicator.reset();
    }
}

impl std::fmt::Debug for TrafficStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrafficStateMachine")
            .field("mode", &self.mode)
            .field("episode", &self.episode)
            .field("indicator", &self.indicator)
            .field("notifier", &self.notifier)
            .field("last_count", &self.last_count)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{NotifyError, SinkError};
    use crate::motion::Velocity;
    use std::sync::Mutex;

    const FAR: f32 = 10.0;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Light(IndicatorColor),
        Drive(Velocity),
        Note(String),
    }

    #[derive(Clone, Default)]
    struct Log(Arc<Mutex<Vec<Event>>>);

    impl Log {
        fn push(&self, event: Event) {
            self.0.lock().unwrap().push(event);
        }

        fn take(&self) -> Vec<Event> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    impl IndicatorSink for Log {
        fn set(&mut self, color: IndicatorColor) -> Result<(), SinkError> {
            self.push(Event::Light(color));
            Ok(())
        }
    }

    impl MotionSink for Log {
        fn publish(&mut self, velocity: Velocity) -> Result<(), SinkError> {
            self.push(Event::Drive(velocity));
            Ok(())
        }
    }

    impl NotificationSink for Log {
        fn send(&mut self, text: &str) -> Result<(), NotifyError> {
            self.push(Event::Note(text.to_string()));
            Ok(())
        }
    }

    struct Harness {
        machine: TrafficStateMachine,
        clock: ManualClock,
        log: Log,
    }

    fn harness() -> Harness {
        let clock = ManualClock::new(1_000);
        let log = Log::default();
        let machine = TrafficStateMachine::new(
            ControllerConfig::default(),
            Arc::new(clock.clone()),
            Box::new(log.clone()),
            Some(Box::new(log.clone())),
            Box::new(log.clone()),
        );
        log.take();
        Harness {
            machine,
            clock,
            log,
        }
    }

    /// A scan with exactly `objects` separated five-sample objects.
    fn scan_with(objects: usize) -> Vec<f32> {
        let mut ranges = vec![FAR; 360];
        for i in 0..objects {
            let start = 10 + i * 20;
            for r in ranges.iter_mut().skip(start).take(5) {
                *r = 0.5;
            }
        }
        ranges
    }

    fn notes(events: &[Event]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Note(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn lights(events: &[Event]) -> Vec<IndicatorColor> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Light(color) => Some(*color),
                _ => None,
            })
            .collect()
    }

    fn drives(events: &[Event]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, Event::Drive(_)))
            .count()
    }

    #[test]
    fn test_scan_counts_objects() {
        let mut h = harness();
        for n in 0..4 {
            assert_eq!(h.machine.on_scan(&scan_with(n)).object_count, n);
        }
        // Zero readings are no-return and never form objects
        assert_eq!(h.machine.on_scan(&vec![0.0; 360]).object_count, 0);
    }

    #[test]
    fn test_congestion_enter_and_exit() {
        let mut h = harness();

        h.machine.on_scan(&scan_with(3));
        assert_eq!(h.machine.mode(), Mode::Normal);

        h.machine.on_scan(&scan_with(4));
        assert_eq!(h.machine.mode(), Mode::Congestion);
        assert_eq!(h.machine.indicator_color(), IndicatorColor::Green);
        let events = h.log.take();
        assert_eq!(notes(&events), vec!["Congestion! I see 4 objects."]);

        h.machine.on_scan(&scan_with(1));
        assert_eq!(h.machine.mode(), Mode::Normal);
        assert_eq!(h.machine.indicator_color(), IndicatorColor::Red);
        assert!(notes(&h.log.take()).is_empty());
    }

    #[test]
    fn test_congestion_deadband() {
        let mut h = harness();
        h.machine.on_scan(&scan_with(5));
        assert_eq!(h.machine.mode(), Mode::Congestion);
        h.log.take();

        for n in [3, 2, 3, 2, 4, 6] {
            h.machine.on_scan(&scan_with(n));
            assert_eq!(h.machine.mode(), Mode::Congestion, "count {}", n);
        }
        // Staying congested neither re-notifies nor touches the light
        assert!(h.log.take().is_empty());

        h.machine.on_scan(&scan_with(0));
        assert_eq!(h.machine.mode(), Mode::Normal);
    }

    #[test]
    fn test_start_trigger() {
        let mut h = harness();
        h.machine.on_scan(&scan_with(4));
        h.log.take();

        assert_eq!(
            h.machine.on_trigger_text("START"),
            TriggerOutcome::Applied(TriggerCommand::Start)
        );
        assert_eq!(h.machine.mode(), Mode::Emergency);
        let episode = *h.machine.episode().unwrap();
        assert_eq!(episode.started_ms, 1_000);
        assert!(!episode.outbound_done);
        assert!(!episode.return_done);
        assert_eq!(h.machine.indicator_color(), IndicatorColor::Red);

        let events = h.log.take();
        assert_eq!(notes(&events), vec!["EMERGENCY CALL! Robot moving in 30s."]);
    }

    #[test]
    fn test_emergency_suppresses_congestion() {
        let mut h = harness();
        h.machine.on_external_trigger(TriggerCommand::Start);
        h.log.take();

        h.machine.on_scan(&scan_with(8));
        assert_eq!(h.machine.mode(), Mode::Emergency);
        assert!(h.log.take().is_empty());
    }

    #[test]
    fn test_unknown_trigger_ignored() {
        let mut h = harness();
        for text in ["start", "GO", "", "START NOW"] {
            assert_eq!(h.machine.on_trigger_text(text), TriggerOutcome::Ignored);
        }
        assert_eq!(h.machine.mode(), Mode::Normal);
        assert!(h.log.take().is_empty());
        assert_eq!(
            h.machine.on_trigger_text(" STOP\n"),
            TriggerOutcome::Applied(TriggerCommand::Stop)
        );
    }

    #[test]
    fn test_nothing_moves_before_t1() {
        let mut h = harness();
        h.machine.on_external_trigger(TriggerCommand::Start);
        h.log.take();

        h.clock.advance_s(30);
        h.machine.on_scan(&scan_with(0));
        assert_eq!(drives(&h.log.take()), 0);
        assert!(!h.machine.episode().unwrap().outbound_done);
    }

    #[test]
    fn test_outbound_leg_runs_once() {
        let mut h = harness();
        h.machine.on_external_trigger(TriggerCommand::Start);
        h.log.take();

        h.clock.advance_ms(30_500);
        h.machine.on_scan(&scan_with(0));

        let events = h.log.take();
        assert_eq!(
            lights(&events),
            vec![IndicatorColor::Yellow, IndicatorColor::Red]
        );
        // 5.0s reverse then 5.2s turn at 100ms, each followed by a stop
        assert_eq!(drives(&events), 50 + 1 + 52 + 1);
        assert_eq!(
            events[1],
            Event::Drive(Velocity::new(-0.1, 0.0))
        );
        assert!(events.contains(&Event::Drive(Velocity::new(0.0, 0.3))));

        let episode = *h.machine.episode().unwrap();
        assert!(episode.outbound_done);
        assert!(!episode.return_done);

        // Scans during the wait for T2 do not replay the leg
        h.machine.on_scan(&scan_with(0));
        h.machine.on_scan(&scan_with(0));
        assert_eq!(drives(&h.log.take()), 0);
    }

    #[test]
    fn test_return_leg_after_t2() {
        let mut h = harness();
        h.machine.on_external_trigger(TriggerCommand::Start);
        h.clock.advance_s(31);
        h.machine.on_scan(&scan_with(0));
        h.log.take();

        h.clock.set_ms(1_000 + 60_001);
        h.machine.on_scan(&scan_with(0));
        let events = h.log.take();
        assert_eq!(events[1], Event::Drive(Velocity::new(0.0, -0.3)));
        assert!(events.contains(&Event::Drive(Velocity::new(0.1, 0.0))));
        assert_eq!(notes(&events), vec!["Emergency Ended. Robot returned."]);
        assert_eq!(h.machine.indicator_color(), IndicatorColor::Red);

        let episode = *h.machine.episode().unwrap();
        assert!(episode.return_done);
        // The episode stays in EMERGENCY until STOP
        assert_eq!(h.machine.mode(), Mode::Emergency);

        h.machine.on_scan(&scan_with(0));
        assert!(h.log.take().is_empty());
    }

    #[test]
    fn test_nothing_returns_at_exactly_t2() {
        let mut h = harness();
        h.machine.on_external_trigger(TriggerCommand::Start);
        h.clock.advance_s(31);
        h.machine.on_scan(&scan_with(0));
        h.log.take();

        h.clock.set_ms(1_000 + 60_000);
        h.machine.on_scan(&scan_with(0));
        assert_eq!(drives(&h.log.take()), 0);
        let episode = *h.machine.episode().unwrap();
        assert!(episode.outbound_done);
        assert!(!episode.return_done);

        h.clock.advance_ms(1);
        h.machine.on_scan(&scan_with(0));
        assert!(drives(&h.log.take()) > 0);
        assert!(h.machine.episode().unwrap().return_done);
    }

    #[test]
    fn test_late_first_scan_runs_both_legs_in_order() {
        let mut h = harness();
        h.machine.on_external_trigger(TriggerCommand::Start);
        h.log.take();

        h.clock.advance_s(90);
        h.machine.on_scan(&scan_with(0));
        let events = h.log.take();
        assert_eq!(
            lights(&events),
            vec![
                IndicatorColor::Yellow,
                IndicatorColor::Red,
                IndicatorColor::Yellow,
                IndicatorColor::Red
            ]
        );
        assert_eq!(events[1], Event::Drive(Velocity::new(-0.1, 0.0)));
        let episode = *h.machine.episode().unwrap();
        assert!(episode.outbound_done && episode.return_done);
    }

    #[test]
    fn test_stop_clears_episode_at_any_point() {
        for advance in [0, 31, 61] {
            let mut h = harness();
            h.machine.on_external_trigger(TriggerCommand::Start);
            h.clock.advance_s(advance);
            h.machine.on_scan(&scan_with(0));
            h.log.take();

            h.machine.on_external_trigger(TriggerCommand::Stop);
            assert_eq!(h.machine.mode(), Mode::Normal);
            assert!(h.machine.episode().is_none());
            let events = h.log.take();
            assert_eq!(lights(&events), vec![IndicatorColor::Red]);
            assert!(notes(&events).is_empty());
        }
    }

    #[test]
    fn test_restart_resets_episode() {
        let mut h = harness();
        h.machine.on_external_trigger(TriggerCommand::Start);
        h.clock.advance_s(31);
        h.machine.on_scan(&scan_with(0));
        assert!(h.machine.episode().unwrap().outbound_done);

        let restart_at = h.clock.now_ms();
        h.machine.on_external_trigger(TriggerCommand::Start);
        let episode = *h.machine.episode().unwrap();
        assert_eq!(episode.started_ms, restart_at);
        assert!(!episode.outbound_done);
        assert!(!episode.return_done);
    }

    #[test]
    fn test_abort_cuts_maneuver_short() {
        struct AbortingDrive {
            log: Log,
            handle: AbortHandle,
        }

        impl MotionSink for AbortingDrive {
            fn publish(&mut self, velocity: Velocity) -> Result<(), SinkError> {
                self.log.push(Event::Drive(velocity));
                self.handle.abort();
                Ok(())
            }
        }

        let clock = ManualClock::new(0);
        let log = Log::default();
        let mut machine = TrafficStateMachine::new(
            ControllerConfig::default(),
            Arc::new(clock.clone()),
            Box::new(log.clone()),
            Some(Box::new(log.clone())),
            Box::new(log.clone()),
        );
        // Swap in a drive that raises the abort flag on its first command
        let handle = machine.abort_handle();
        machine.motion = MotionSequencer::new(
            Box::new(AbortingDrive {
                log: log.clone(),
                handle: handle.clone(),
            }),
            Arc::new(clock.clone()),
            100,
        )
        .with_abort_handle(handle);

        machine.on_external_trigger(TriggerCommand::Start);
        log.take();
        clock.advance_s(31);
        machine.on_scan(&scan_with(0));

        let events = log.take();
        // One command and the stop, then the turn is abandoned
        assert_eq!(drives(&events), 2);
        assert_eq!(
            lights(&events),
            vec![IndicatorColor::Yellow, IndicatorColor::Red]
        );
        assert_eq!(machine.indicator_color(), IndicatorColor::Red);
        assert!(machine.episode().unwrap().outbound_done);

        // START clears the abort flag for the next episode
        machine.on_external_trigger(TriggerCommand::Start);
        assert!(!machine.abort_handle().is_aborted());
    }

    #[test]
    fn test_status_line_rate_limited() {
        let mut h = harness();
        let first = h.machine.on_scan(&scan_with(2));
        assert_eq!(
            first.status_line.as_deref(),
            Some("360° scan: found 2 objects | Mode: NORMAL")
        );

        h.clock.advance_ms(500);
        assert!(h.machine.on_scan(&scan_with(2)).status_line.is_none());
        h.clock.advance_ms(500);
        assert!(h.machine.on_scan(&scan_with(2)).status_line.is_none());
        h.clock.advance_ms(1);
        assert!(h.machine.on_scan(&scan_with(2)).status_line.is_some());

        h.machine.on_external_trigger(TriggerCommand::Start);
        h.clock.advance_ms(12_400);
        let line = h.machine.on_scan(&scan_with(0)).status_line.unwrap();
        assert_eq!(line, "360° scan: found 0 objects | Mode: EMERGENCY (Time: 12s)");
    }

    #[test]
    fn test_without_notifier() {
        let clock = ManualClock::new(0);
        let log = Log::default();
        let mut machine = TrafficStateMachine::new(
            ControllerConfig::default(),
            Arc::new(clock.clone()),
            Box::new(log.clone()),
            None,
            Box::new(log.clone()),
        );
        assert!(!machine.notifications_connected());

        machine.on_external_trigger(TriggerCommand::Start);
        clock.advance_s(61);
        machine.on_scan(&scan_with(0));
        let episode = *machine.episode().unwrap();
        assert!(episode.outbound_done && episode.return_done);
        assert!(notes(&log.take()).is_empty());
    }

    #[test]
    fn test_status_snapshot() {
        let mut h = harness();
        h.machine.on_scan(&scan_with(4));
        let status = h.machine.status();
        assert_eq!(status.mode, Mode::Congestion);
        assert_eq!(status.object_count, 4);
        assert_eq!(status.indicator, IndicatorColor::Green);
        assert!(status.emergency.is_none());
        assert!(status.notifications_connected);

        h.machine.on_external_trigger(TriggerCommand::Start);
        h.clock.advance_s(5);
        let json = serde_json::to_value(h.machine.status()).unwrap();
        assert_eq!(json["mode"], "EMERGENCY");
        assert_eq!(json["indicator"], "RED");
        assert_eq!(json["emergency"]["elapsedS"], 5);
        assert_eq!(json["emergency"]["outboundDone"], false);
        // Congestion and emergency notes
        assert_eq!(json["notificationsSent"], 2);
        assert_eq!(json["notificationsFailed"], 0);
    }

    #[test]
    fn test_status_listener_sees_leg_in_progress() {
        let clock = ManualClock::new(0);
        let log = Log::default();
        let seen: Arc<Mutex<Vec<ControllerStatus>>> = Arc::default();
        let recorder = seen.clone();
        let mut machine = TrafficStateMachine::new(
            ControllerConfig::default(),
            Arc::new(clock.clone()),
            Box::new(log.clone()),
            None,
            Box::new(log.clone()),
        )
        .with_status_listener(Box::new(move |status| {
            recorder.lock().unwrap().push(status.clone());
        }));

        machine.on_external_trigger(TriggerCommand::Start);
        clock.advance_s(31);
        machine.on_scan(&scan_with(0));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].indicator, IndicatorColor::Yellow);
        assert_eq!(seen[0].mode, Mode::Emergency);
        assert!(!seen[0].emergency.unwrap().outbound_done);
        assert_eq!(machine.indicator_color(), IndicatorColor::Red);
    }
}

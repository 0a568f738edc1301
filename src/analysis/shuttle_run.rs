// src/analysis/shuttle_run.rs
//
// Shuttle run over GPS.
//
//   Idle → Calibrating → Tracking ⇄ WaitingForDirectionChange → Complete
//
// Distance accumulates between consecutive fixes while Tracking. Every lap
// boundary except the last pauses accumulation until the runner's heading
// reverses, so drift while turning around never counts as distance.

use crate::analysis::calibrator::{CalibrationStatus, GpsCalibrator};
use crate::analysis::measurement::{bearing, fix_distance, heading_difference, run_metrics};
use crate::analysis::milestones::{MilestoneDebouncer, MilestoneId, DISTANCE_EPSILON_M};
use crate::analysis::sliding_window::SlidingWindow;
use crate::types::{
    Baseline, CalibrationConfidence, FailureReason, Metric, PositionFix, ShuttleRunConfig,
    TestEvent,
};
use tracing::{debug, info, warn};

/// Movement below this cannot yield a trustworthy bearing
const MIN_BEARING_DISTANCE_M: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShuttleRunState {
    Idle,
    Calibrating,
    Tracking,
    WaitingForDirectionChange,
    Complete,
}

impl ShuttleRunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Calibrating => "calibrating",
            Self::Tracking => "tracking",
            Self::WaitingForDirectionChange => "waiting_for_direction_change",
            Self::Complete => "complete",
        }
    }
}

pub struct ShuttleRunDetector {
    config: ShuttleRunConfig,
    state: ShuttleRunState,
    calibrator: GpsCalibrator,
    baseline: Option<Baseline>,

    /// Fix the next distance delta is measured from
    last_fix: Option<PositionFix>,
    last_heading: Option<f64>,
    distance_m: f64,
    /// Distance covered since the last confirmed turn
    leg_distance_m: f64,

    laps_completed: u32,
    direction_changes: u32,
    pending_milestone: Option<u32>,
    reference_heading: Option<f64>,
    reversal_window: SlidingWindow<f64>,

    start_ms: Option<f64>,
    end_ms: Option<f64>,
    debouncer: MilestoneDebouncer,
}

impl ShuttleRunDetector {
    pub fn new(config: ShuttleRunConfig) -> Self {
        Self {
            calibrator: GpsCalibrator::new(config.calibration.clone()),
            reversal_window: SlidingWindow::new(config.reversal_confirm_fixes),
            config,
            state: ShuttleRunState::Idle,
            baseline: None,
            last_fix: None,
            last_heading: None,
            distance_m: 0.0,
            leg_distance_m: 0.0,
            laps_completed: 0,
            direction_changes: 0,
            pending_milestone: None,
            reference_heading: None,
            start_ms: None,
            end_ms: None,
            debouncer: MilestoneDebouncer::new(),
        }
    }

    pub fn observe(&mut self, fix: &PositionFix) -> Vec<TestEvent> {
        if !fix.is_usable() {
            debug!("📡 Unusable fix at {:.0}ms skipped", fix.timestamp_ms);
            return Vec::new();
        }

        match self.state {
            ShuttleRunState::Idle => {
                info!("🏃 Shuttle run: calibrating on first fix");
                self.state = ShuttleRunState::Calibrating;
                self.calibrate(fix)
            }
            ShuttleRunState::Calibrating => self.calibrate(fix),
            ShuttleRunState::Tracking => self.track(fix),
            ShuttleRunState::WaitingForDirectionChange => self.await_reversal(fix),
            ShuttleRunState::Complete => Vec::new(),
        }
    }

    fn calibrate(&mut self, fix: &PositionFix) -> Vec<TestEvent> {
        match self.calibrator.observe(fix) {
            CalibrationStatus::Collecting { collected, total } => {
                debug!("📡 Calibrating {}/{}", collected, total);
                Vec::new()
            }
            CalibrationStatus::Ready(baseline) => {
                self.baseline = Some(baseline);
                self.last_fix = Some(*fix);
                self.start_ms = Some(fix.timestamp_ms);
                self.state = ShuttleRunState::Tracking;
                info!(
                    "✓ Shuttle run started: {} × {:.0}m, clock at {:.0}ms",
                    self.config.total_laps, self.config.lap_length_m, fix.timestamp_ms
                );
                vec![TestEvent::CalibrationComplete { baseline }]
            }
        }
    }

    fn track(&mut self, fix: &PositionFix) -> Vec<TestEvent> {
        if fix.accuracy_m > self.config.max_fix_accuracy_m {
            debug!("📡 Fix ±{:.1}m too coarse for tracking, dropped", fix.accuracy_m);
            return Vec::new();
        }
        let Some(previous) = self.last_fix else {
            self.last_fix = Some(*fix);
            return Vec::new();
        };

        let delta = fix_distance(&previous, fix);
        let heading = fix.heading().or_else(|| {
            (delta >= MIN_BEARING_DISTANCE_M).then(|| bearing(&previous, fix))
        });
        if heading.is_some() {
            self.last_heading = heading;
        }
        self.last_fix = Some(*fix);

        let before = self.distance_m;
        self.distance_m += delta;
        self.leg_distance_m += delta;
        let total_laps = self.config.total_laps;

        let crossed = self.debouncer.fire_crossed(
            before,
            self.distance_m,
            self.config.lap_length_m,
            total_laps,
            MilestoneId::Lap,
        );
        if crossed.len() > 1 {
            warn!(
                "⚠️  {} lap boundaries crossed in one fix ({:.1}m jump), back-filling",
                crossed.len(),
                delta
            );
        }

        let mut events = Vec::new();
        for &lap in &crossed {
            self.laps_completed = lap;
            info!("🏁 Lap {}/{} at {:.1}m", lap, total_laps, self.distance_m);
            events.push(TestEvent::LapComplete { lap_index: lap });
        }

        if self.laps_completed < total_laps && self.requirements_met() {
            // Final leg covered per the turn count even though the summed
            // distance fell short of the last lap line
            info!(
                "🏁 Final leg {:.1}m after {} turns, closing remaining laps at {:.1}m",
                self.leg_distance_m, self.direction_changes, self.distance_m
            );
            for lap in self.laps_completed + 1..=total_laps {
                if self.debouncer.fire(MilestoneId::Lap(lap)) {
                    events.push(TestEvent::LapComplete { lap_index: lap });
                }
            }
            self.laps_completed = total_laps;
        }

        if self.laps_completed >= total_laps {
            events.extend(self.complete(fix.timestamp_ms));
            return events;
        }

        if let Some(&milestone) = crossed.last() {
            self.pending_milestone = Some(milestone);
            self.reference_heading = self.last_heading;
            self.reversal_window.clear();
            self.state = ShuttleRunState::WaitingForDirectionChange;
            if self
                .debouncer
                .fire(MilestoneId::DirectionChangeRequired(milestone))
            {
                info!(
                    "↩️  Turn required after lap {} (heading {:?})",
                    milestone, self.reference_heading
                );
                events.push(TestEvent::DirectionChangeRequired { milestone });
            }
        }
        events
    }

    fn await_reversal(&mut self, fix: &PositionFix) -> Vec<TestEvent> {
        if fix.accuracy_m > self.config.max_fix_accuracy_m {
            debug!("📡 Fix ±{:.1}m too coarse to judge a turn, dropped", fix.accuracy_m);
            return Vec::new();
        }
        let Some(previous) = self.last_fix else {
            self.last_fix = Some(*fix);
            return Vec::new();
        };
        // Reference follows the runner while paused; nothing accumulates
        let moved = fix_distance(&previous, fix);
        let heading = fix.heading().or_else(|| {
            (moved >= MIN_BEARING_DISTANCE_M).then(|| bearing(&previous, fix))
        });
        self.last_fix = Some(*fix);

        let Some(heading) = heading else {
            return Vec::new();
        };
        self.last_heading = Some(heading);

        let Some(reference) = self.reference_heading else {
            debug!("No heading at the line yet, adopting {:.0}°", heading);
            self.reference_heading = Some(heading);
            return Vec::new();
        };

        let change = heading_difference(reference, heading);
        if change < self.config.reversal_threshold_deg {
            self.reversal_window.clear();
            debug!("Waiting for turn: heading change {:.0}°", change);
            return Vec::new();
        }
        self.reversal_window.push(change);
        if !self.reversal_window.is_full() {
            return Vec::new();
        }

        let milestone = self.pending_milestone.take().unwrap_or(self.laps_completed);
        self.direction_changes += 1;
        self.leg_distance_m = 0.0;
        self.reference_heading = None;
        self.reversal_window.clear();
        self.state = ShuttleRunState::Tracking;

        let mut events = Vec::new();
        if self
            .debouncer
            .fire(MilestoneId::DirectionChangeDetected(milestone))
        {
            info!("🔄 Direction change {} detected ({:.0}°)", milestone, change);
            events.push(TestEvent::DirectionChangeDetected { milestone });
        }
        events
    }

    /// Every turn made and the final leg covered, independent of the summed
    /// distance reaching the last lap line
    fn requirements_met(&self) -> bool {
        let total = self.config.total_laps;
        self.direction_changes + 1 >= total
            && self.leg_distance_m + self.config.final_leg_tolerance_m
                >= self.config.lap_length_m
    }

    fn complete(&mut self, timestamp_ms: f64) -> Vec<TestEvent> {
        let course = self.course_length_m();
        if self.distance_m > course + DISTANCE_EPSILON_M {
            debug!(
                "Distance {:.2}m capped at course length {:.0}m",
                self.distance_m, course
            );
        }
        self.distance_m = self.distance_m.min(course);
        self.end_ms = Some(timestamp_ms);
        self.state = ShuttleRunState::Complete;
        self.pending_milestone = None;

        match self.outcome() {
            Ok(metric) if self.debouncer.fire(MilestoneId::Completion) => {
                info!("✓ Shuttle run complete: {:?}", metric);
                vec![TestEvent::TestComplete {
                    final_metric: metric,
                }]
            }
            Ok(_) => Vec::new(),
            Err(reason) => {
                warn!("✗ Shuttle run result rejected: {:?}", reason);
                Vec::new()
            }
        }
    }

    pub fn outcome(&self) -> Result<Metric, FailureReason> {
        match self.state {
            ShuttleRunState::Idle => Err(FailureReason::CalibrationFailed),
            ShuttleRunState::Calibrating => Err(FailureReason::NotCalibrated),
            ShuttleRunState::WaitingForDirectionChange => {
                Err(FailureReason::DirectionChangeNotDetected)
            }
            ShuttleRunState::Tracking => Err(FailureReason::LapsIncomplete),
            ShuttleRunState::Complete => {
                let (Some(start), Some(end)) = (self.start_ms, self.end_ms) else {
                    return Err(FailureReason::InvalidMeasurement);
                };
                Metric::ShuttleRun {
                    run: run_metrics(self.distance_m, start, end),
                    laps_completed: self.laps_completed,
                    direction_changes: self.direction_changes,
                }
                .validate()
            }
        }
    }

    pub fn course_length_m(&self) -> f64 {
        self.config.lap_length_m * self.config.total_laps as f64
    }

    pub fn state(&self) -> ShuttleRunState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state == ShuttleRunState::Complete
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn laps_completed(&self) -> u32 {
        self.laps_completed
    }

    pub fn direction_changes(&self) -> u32 {
        self.direction_changes
    }

    pub fn calibration_confidence(&self) -> Option<CalibrationConfidence> {
        self.baseline.map(|b| b.confidence)
    }

    pub fn completed_at_ms(&self) -> Option<f64> {
        self.end_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::measurement::EARTH_RADIUS_M;

    const BASE_LAT: f64 = 28.6;
    const BASE_LON: f64 = 77.2;

    /// Fix `north_m` metres north of the base point
    fn fix(t: f64, north_m: f64, heading: Option<f64>) -> PositionFix {
        PositionFix {
            timestamp_ms: t,
            latitude: BASE_LAT + (north_m / EARTH_RADIUS_M).to_degrees(),
            longitude: BASE_LON,
            accuracy_m: 5.0,
            heading_deg: heading,
        }
    }

    fn calibrated(config: ShuttleRunConfig) -> ShuttleRunDetector {
        let mut detector = ShuttleRunDetector::new(config);
        for i in 0..3 {
            detector.observe(&fix(i as f64 * 1000.0, 0.0, None));
        }
        assert_eq!(detector.state(), ShuttleRunState::Tracking);
        detector
    }

    #[test]
    fn test_calibration_consumes_first_fixes() {
        let mut detector = ShuttleRunDetector::new(ShuttleRunConfig::default());
        assert_eq!(detector.state(), ShuttleRunState::Idle);
        detector.observe(&fix(0.0, 0.0, None));
        assert_eq!(detector.state(), ShuttleRunState::Calibrating);
        detector.observe(&fix(1000.0, 0.0, None));
        let events = detector.observe(&fix(2000.0, 0.0, None));
        assert!(matches!(events[0], TestEvent::CalibrationComplete { .. }));
        assert_eq!(detector.distance_m(), 0.0);
    }

    #[test]
    fn test_lap_boundary_pauses_until_reversal() {
        let mut detector = calibrated(ShuttleRunConfig::default());
        detector.observe(&fix(3000.0, 5.0, Some(0.0)));
        let events = detector.observe(&fix(4000.0, 10.0, Some(0.0)));
        assert_eq!(
            events,
            vec![
                TestEvent::LapComplete { lap_index: 1 },
                TestEvent::DirectionChangeRequired { milestone: 1 },
            ]
        );
        assert_eq!(detector.state(), ShuttleRunState::WaitingForDirectionChange);

        // Drifting past the line while still facing the same way
        assert!(detector.observe(&fix(5000.0, 10.2, Some(0.0))).is_empty());
        assert!(detector.observe(&fix(6000.0, 10.4, Some(5.0))).is_empty());
        assert!((detector.distance_m() - 10.0).abs() < 1e-6, "drift must not count");

        let events = detector.observe(&fix(7000.0, 10.3, Some(170.0)));
        assert_eq!(events, vec![TestEvent::DirectionChangeDetected { milestone: 1 }]);
        assert_eq!(detector.state(), ShuttleRunState::Tracking);
    }

    #[test]
    fn test_pause_does_not_change_tracked_distance() {
        // Same tracked deltas (4, 4, 4, 3) with and without a turn in the middle
        let mut plain = calibrated(ShuttleRunConfig {
            lap_length_m: 100.0,
            ..ShuttleRunConfig::default()
        });
        for (i, d) in [4.0, 8.0, 12.0, 15.0].into_iter().enumerate() {
            plain.observe(&fix(3000.0 + i as f64 * 1000.0, d, Some(0.0)));
        }

        let mut paused = calibrated(ShuttleRunConfig::default());
        paused.observe(&fix(3000.0, 4.0, Some(0.0)));
        paused.observe(&fix(4000.0, 8.0, Some(0.0)));
        paused.observe(&fix(5000.0, 12.0, Some(0.0)));
        assert_eq!(paused.state(), ShuttleRunState::WaitingForDirectionChange);
        paused.observe(&fix(6000.0, 12.5, Some(0.0)));
        paused.observe(&fix(7000.0, 13.0, Some(180.0)));
        assert_eq!(paused.state(), ShuttleRunState::Tracking);
        paused.observe(&fix(8000.0, 10.0, Some(180.0)));

        assert!(
            (plain.distance_m() - paused.distance_m()).abs() < 1e-6,
            "plain {} vs paused {}",
            plain.distance_m(),
            paused.distance_m()
        );
    }

    #[test]
    fn test_large_jump_backfills_laps_and_waits_once() {
        let mut detector = calibrated(ShuttleRunConfig::default());
        detector.observe(&fix(3000.0, 9.0, Some(0.0)));
        let events = detector.observe(&fix(4000.0, 25.0, Some(0.0)));
        assert_eq!(
            events,
            vec![
                TestEvent::LapComplete { lap_index: 1 },
                TestEvent::LapComplete { lap_index: 2 },
                TestEvent::DirectionChangeRequired { milestone: 2 },
            ]
        );
        assert_eq!(detector.laps_completed(), 2);
    }

    #[test]
    fn test_full_run_completes_with_capped_distance() {
        let mut detector = calibrated(ShuttleRunConfig::default());
        let mut t = 3000.0;
        let mut events = Vec::new();
        let mut position = 0.0;
        for lap in 0..4 {
            let (direction, heading) = if lap % 2 == 0 { (1.0, 0.0) } else { (-1.0, 180.0) };
            for _ in 0..5 {
                position += direction * 2.0;
                t += 500.0;
                events.extend(detector.observe(&fix(t, position, Some(heading))));
            }
            // Overshoot on the last lap, then turn around for the next
            if lap == 3 {
                break;
            }
            t += 500.0;
            events.extend(detector.observe(&fix(t, position, Some(180.0 - heading))));
        }

        assert_eq!(detector.state(), ShuttleRunState::Complete);
        let laps: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                TestEvent::LapComplete { lap_index } => Some(*lap_index),
                _ => None,
            })
            .collect();
        assert_eq!(laps, vec![1, 2, 3, 4]);

        let Ok(Metric::ShuttleRun {
            run,
            laps_completed,
            direction_changes,
        }) = detector.outcome()
        else {
            panic!("expected shuttle metric");
        };
        assert_eq!(laps_completed, 4);
        assert_eq!(direction_changes, 3);
        assert!(run.distance_m <= 40.0 + 1e-9);
        assert!(run.time_s > 0.0);
        assert!(matches!(events.last(), Some(TestEvent::TestComplete { .. })));
    }

    #[test]
    fn test_outcome_while_waiting_reports_missing_turn() {
        let mut detector = calibrated(ShuttleRunConfig::default());
        detector.observe(&fix(3000.0, 11.0, Some(0.0)));
        assert_eq!(detector.outcome(), Err(FailureReason::DirectionChangeNotDetected));
    }

    #[test]
    fn test_repeated_fix_at_lap_line_fires_once() {
        let mut detector = calibrated(ShuttleRunConfig::default());
        let mut events = Vec::new();
        for i in 0..100 {
            events.extend(detector.observe(&fix(3000.0 + i as f64 * 100.0, 10.0, Some(0.0))));
        }
        assert_eq!(
            events,
            vec![
                TestEvent::LapComplete { lap_index: 1 },
                TestEvent::DirectionChangeRequired { milestone: 1 },
            ]
        );
        assert_eq!(detector.state(), ShuttleRunState::WaitingForDirectionChange);
        assert_eq!(detector.laps_completed(), 1);
    }

    #[test]
    fn test_coarse_fix_cannot_confirm_turn() {
        let mut detector = calibrated(ShuttleRunConfig::default());
        detector.observe(&fix(3000.0, 10.0, Some(0.0)));
        assert_eq!(detector.state(), ShuttleRunState::WaitingForDirectionChange);

        let mut coarse = fix(4000.0, 9.0, Some(180.0));
        coarse.accuracy_m = 80.0;
        assert!(detector.observe(&coarse).is_empty());
        assert_eq!(detector.state(), ShuttleRunState::WaitingForDirectionChange);
        assert_eq!(detector.direction_changes(), 0);

        let events = detector.observe(&fix(5000.0, 9.5, Some(180.0)));
        assert_eq!(events, vec![TestEvent::DirectionChangeDetected { milestone: 1 }]);
    }

    #[test]
    fn test_final_leg_completes_when_distance_falls_short() {
        let mut detector = calibrated(ShuttleRunConfig::default());
        let mut t = 3000.0;
        let mut events = Vec::new();
        let mut position = 0.0;
        for lap in 0..3 {
            let (direction, heading) = if lap % 2 == 0 { (1.0, 0.0) } else { (-1.0, 180.0) };
            position += direction * 10.0;
            t += 1000.0;
            events.extend(detector.observe(&fix(t, position, Some(heading))));
            t += 500.0;
            events.extend(detector.observe(&fix(t, position, Some(180.0 - heading))));
        }
        assert_eq!(detector.direction_changes(), 3);
        assert_eq!(detector.laps_completed(), 3);

        // Last leg ends 0.5m short of the line
        t += 1000.0;
        events.extend(detector.observe(&fix(t, position - 9.5, Some(180.0))));
        assert_eq!(detector.state(), ShuttleRunState::Complete);
        assert!(events.contains(&TestEvent::LapComplete { lap_index: 4 }));

        let Ok(Metric::ShuttleRun {
            run,
            laps_completed,
            ..
        }) = detector.outcome()
        else {
            panic!("expected shuttle metric");
        };
        assert_eq!(laps_completed, 4);
        assert!((run.distance_m - 39.5).abs() < 1e-6, "got {}", run.distance_m);
    }

    #[test]
    fn test_short_final_leg_beyond_tolerance_stays_tracking() {
        let mut detector = calibrated(ShuttleRunConfig {
            total_laps: 2,
            ..ShuttleRunConfig::default()
        });
        detector.observe(&fix(3000.0, 10.0, Some(0.0)));
        detector.observe(&fix(3500.0, 10.0, Some(180.0)));
        assert_eq!(detector.direction_changes(), 1);

        detector.observe(&fix(4500.0, 2.0, Some(180.0)));
        assert_eq!(detector.state(), ShuttleRunState::Tracking);
        assert_eq!(detector.outcome(), Err(FailureReason::LapsIncomplete));
    }

    #[test]
    fn test_coarse_fixes_are_dropped_while_tracking() {
        let mut detector = calibrated(ShuttleRunConfig::default());
        let mut coarse = fix(3000.0, 8.0, None);
        coarse.accuracy_m = 80.0;
        assert!(detector.observe(&coarse).is_empty());
        assert_eq!(detector.distance_m(), 0.0);
    }
}

// src/analysis/timed_run.rs
//
// Distance race against the clock over GPS.
//
//   Idle → Calibrating → Tracking → TargetReached
//
// The calibration window lets the receiver settle: fixes inside it move the
// start reference but add no distance. The clock starts at the first fix
// after the window.

use crate::analysis::calibrator::GpsCalibrator;
use crate::analysis::measurement::{fix_distance, run_metrics};
use crate::analysis::milestones::{MilestoneDebouncer, MilestoneId, DISTANCE_EPSILON_M};
use crate::types::{
    Baseline, CalibrationConfidence, FailureReason, Metric, PositionFix, TestEvent, TimedRunConfig,
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedRunState {
    Idle,
    Calibrating,
    Tracking,
    TargetReached,
}

impl TimedRunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Calibrating => "calibrating",
            Self::Tracking => "tracking",
            Self::TargetReached => "target_reached",
        }
    }
}

pub struct TimedRunDetector {
    config: TimedRunConfig,
    state: TimedRunState,
    calibrator: GpsCalibrator,
    baseline: Option<Baseline>,

    window_start_ms: Option<f64>,
    reference: Option<PositionFix>,
    distance_m: f64,

    start_ms: Option<f64>,
    end_ms: Option<f64>,
    debouncer: MilestoneDebouncer,
}

impl TimedRunDetector {
    pub fn new(config: TimedRunConfig) -> Self {
        Self {
            calibrator: GpsCalibrator::new(config.calibration.clone()),
            config,
            state: TimedRunState::Idle,
            baseline: None,
            window_start_ms: None,
            reference: None,
            distance_m: 0.0,
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
            TimedRunState::Idle => {
                info!(
                    "🏃 Timed run: settling for {:.0}ms before the clock starts",
                    self.config.calibration_window_ms
                );
                self.window_start_ms = Some(fix.timestamp_ms);
                self.state = TimedRunState::Calibrating;
                self.calibrate(fix)
            }
            TimedRunState::Calibrating => self.calibrate(fix),
            TimedRunState::Tracking => self.track(fix),
            TimedRunState::TargetReached => Vec::new(),
        }
    }

    fn calibrate(&mut self, fix: &PositionFix) -> Vec<TestEvent> {
        if self.calibrator.baseline().is_none() {
            self.calibrator.observe(fix);
        }
        if self.reference.is_none() || self.calibrator.qualifies(fix) {
            self.reference = Some(*fix);
        }

        let window_start = self.window_start_ms.unwrap_or(fix.timestamp_ms);
        if fix.timestamp_ms - window_start < self.config.calibration_window_ms {
            return Vec::new();
        }

        let Some(baseline) = self.calibrator.finalize() else {
            return Vec::new();
        };
        self.baseline = Some(baseline);
        self.start_ms = Some(fix.timestamp_ms);
        self.state = TimedRunState::Tracking;
        info!(
            "⏱️  Clock started at {:.0}ms, target {:.0}m",
            fix.timestamp_ms, self.config.target_distance_m
        );
        vec![TestEvent::CalibrationComplete { baseline }]
    }

    fn track(&mut self, fix: &PositionFix) -> Vec<TestEvent> {
        if fix.accuracy_m > self.config.max_fix_accuracy_m {
            debug!("📡 Fix ±{:.1}m too coarse for tracking, dropped", fix.accuracy_m);
            return Vec::new();
        }
        let Some(previous) = self.reference else {
            self.reference = Some(*fix);
            return Vec::new();
        };

        let delta = fix_distance(&previous, fix);
        self.reference = Some(*fix);
        let before = self.distance_m;
        let target = self.config.target_distance_m;
        self.distance_m = (self.distance_m + delta).min(target);

        let mut events = Vec::new();
        let interval = self.config.checkpoint_interval_m;
        if interval > 0.0 {
            let limit = ((target + DISTANCE_EPSILON_M) / interval).floor() as u32;
            let crossed = self.debouncer.fire_crossed(
                before,
                self.distance_m,
                interval,
                limit,
                MilestoneId::Checkpoint,
            );
            if crossed.len() > 1 {
                warn!(
                    "⚠️  {} checkpoints crossed in one fix ({:.1}m jump), back-filling",
                    crossed.len(),
                    delta
                );
            }
            for index in crossed {
                let distance_m = index as f64 * interval;
                info!("📍 {:.0}m reached", distance_m);
                events.push(TestEvent::MilestoneReached { distance_m });
            }
        }

        if self.distance_m + DISTANCE_EPSILON_M >= target {
            self.distance_m = target;
            self.end_ms = Some(fix.timestamp_ms);
            self.state = TimedRunState::TargetReached;
            match self.outcome() {
                Ok(metric) if self.debouncer.fire(MilestoneId::Completion) => {
                    info!("✓ Target reached: {:?}", metric);
                    events.push(TestEvent::TestComplete {
                        final_metric: metric,
                    });
                }
                Ok(_) => {}
                Err(reason) => warn!("✗ Timed run result rejected: {:?}", reason),
            }
        }
        events
    }

    pub fn outcome(&self) -> Result<Metric, FailureReason> {
        match self.state {
            TimedRunState::Idle => Err(FailureReason::CalibrationFailed),
            TimedRunState::Calibrating => Err(FailureReason::NotCalibrated),
            TimedRunState::Tracking => Err(FailureReason::TargetNotReached),
            TimedRunState::TargetReached => {
                let (Some(start), Some(end)) = (self.start_ms, self.end_ms) else {
                    return Err(FailureReason::InvalidMeasurement);
                };
                Metric::TimedRun {
                    run: run_metrics(self.distance_m, start, end),
                }
                .validate()
            }
        }
    }

    pub fn state(&self) -> TimedRunState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state == TimedRunState::TargetReached
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
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

    fn fix(t: f64, north_m: f64) -> PositionFix {
        PositionFix {
            timestamp_ms: t,
            latitude: 28.6 + (north_m / EARTH_RADIUS_M).to_degrees(),
            longitude: 77.2,
            accuracy_m: 5.0,
            heading_deg: None,
        }
    }

    fn config() -> TimedRunConfig {
        TimedRunConfig {
            target_distance_m: 30.0,
            checkpoint_interval_m: 10.0,
            ..TimedRunConfig::default()
        }
    }

    #[test]
    fn test_movement_inside_window_is_not_counted() {
        let mut detector = TimedRunDetector::new(config());
        detector.observe(&fix(0.0, 0.0));
        detector.observe(&fix(1000.0, 4.0));
        detector.observe(&fix(2000.0, 8.0));
        assert_eq!(detector.state(), TimedRunState::Calibrating);
        let events = detector.observe(&fix(3000.0, 9.0));
        assert_eq!(detector.state(), TimedRunState::Tracking);
        assert!(matches!(events[0], TestEvent::CalibrationComplete { .. }));
        assert_eq!(detector.distance_m(), 0.0);

        detector.observe(&fix(4000.0, 14.0));
        assert!((detector.distance_m() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_repeated_fix_past_checkpoint_fires_once() {
        let mut detector = TimedRunDetector::new(config());
        for t in [0.0, 1000.0, 2000.0, 3000.0] {
            detector.observe(&fix(t, 0.0));
        }
        assert_eq!(detector.state(), TimedRunState::Tracking);

        let mut events = detector.observe(&fix(4000.0, 12.0));
        for i in 0..100 {
            events.extend(detector.observe(&fix(5000.0 + i as f64 * 100.0, 12.0)));
        }
        let checkpoints: Vec<&TestEvent> = events
            .iter()
            .filter(|e| matches!(e, TestEvent::MilestoneReached { .. }))
            .collect();
        assert_eq!(checkpoints.len(), 1, "{events:?}");
        assert_eq!(detector.state(), TimedRunState::Tracking);
    }

    #[test]
    fn test_target_reached_caps_distance_and_times_from_window_end() {
        let mut detector = TimedRunDetector::new(config());
        for (i, t) in [0.0, 1000.0, 2000.0, 3000.0].into_iter().enumerate() {
            detector.observe(&fix(t, i as f64 * 0.1));
        }
        let start = 0.3;
        let mut events = Vec::new();
        let mut t = 3000.0;
        for step in 1..=7 {
            t += 1000.0;
            events.extend(detector.observe(&fix(t, start + step as f64 * 4.0)));
        }
        // 28m covered, one more 5m stride overshoots the 30m target
        assert_eq!(detector.state(), TimedRunState::Tracking);
        t += 1000.0;
        events.extend(detector.observe(&fix(t, start + 33.0)));
        assert_eq!(detector.state(), TimedRunState::TargetReached);

        let Ok(Metric::TimedRun { run }) = detector.outcome() else {
            panic!("expected timed run metric");
        };
        assert_eq!(run.distance_m, 30.0);
        assert_eq!(run.time_s, 8.0);
        assert!((run.speed_mps - 3.75).abs() < 1e-9);

        let checkpoints: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                TestEvent::MilestoneReached { distance_m } => Some(*distance_m),
                _ => None,
            })
            .collect();
        assert_eq!(checkpoints, vec![10.0, 20.0, 30.0]);
        assert!(matches!(events.last(), Some(TestEvent::TestComplete { .. })));

        // Nothing after the terminal state
        assert!(detector.observe(&fix(t + 1000.0, 60.0)).is_empty());
        assert_eq!(detector.distance_m(), 30.0);
    }

    #[test]
    fn test_cancel_before_target() {
        let mut detector = TimedRunDetector::new(config());
        assert_eq!(detector.outcome(), Err(FailureReason::CalibrationFailed));
        detector.observe(&fix(0.0, 0.0));
        assert_eq!(detector.outcome(), Err(FailureReason::NotCalibrated));
        detector.observe(&fix(3000.0, 0.0));
        detector.observe(&fix(4000.0, 5.0));
        assert_eq!(detector.outcome(), Err(FailureReason::TargetNotReached));
    }

    #[test]
    fn test_zero_window_starts_on_first_fix() {
        let mut detector = TimedRunDetector::new(TimedRunConfig {
            calibration_window_ms: 0.0,
            ..config()
        });
        let events = detector.observe(&fix(0.0, 0.0));
        assert_eq!(detector.state(), TimedRunState::Tracking);
        assert_eq!(events.len(), 1);
        assert_eq!(
            detector.calibration_confidence(),
            Some(CalibrationConfidence::Degraded)
        );
    }
}

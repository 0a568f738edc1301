// src/analysis/throw_detector.rs
//
// Medicine-ball throw from an externally tracked ball position plus the
// thrower's pose.
//
//   Calibrating → Tracking → Released → Done
//
// The release point is where the ball starts moving horizontally; the
// landing point is the lowest (max y) ball position seen after it. The
// throw is closed out when the session ends.

use crate::analysis::calibrator::{CalibrationStatus, FrameCalibrator};
use crate::analysis::measurement::{cm_per_px, horizontal_distance_cm};
use crate::analysis::milestones::{MilestoneDebouncer, MilestoneId};
use crate::analysis::sliding_window::SlidingWindow;
use crate::types::{
    Baseline, CalibrationConfidence, FailureReason, LandmarkFrame, LandmarkId, Metric, Point2,
    TestEvent, ThrowConfig,
};
use tracing::{debug, info, warn};

/// Nose-to-hip span as a fraction of standing height
const TORSO_HEIGHT_RATIO: f64 = 0.35;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrowState {
    Calibrating,
    Tracking,
    Released,
    Done,
}

impl ThrowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calibrating => "calibrating",
            Self::Tracking => "tracking",
            Self::Released => "released",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallSample {
    pub position: Point2,
    pub timestamp_ms: f64,
}

pub struct MedicineBallThrowDetector {
    config: ThrowConfig,
    state: ThrowState,
    calibrator: FrameCalibrator,
    baseline: Option<Baseline>,
    cm_per_px: Option<f64>,

    trajectory: SlidingWindow<BallSample>,
    trajectory_points: usize,
    clutter_rejected: u32,

    origin: Option<BallSample>,
    landing: Option<BallSample>,
    debouncer: MilestoneDebouncer,
}

impl MedicineBallThrowDetector {
    pub fn new(config: ThrowConfig) -> Self {
        Self {
            calibrator: FrameCalibrator::new(config.calibration_frames),
            trajectory: SlidingWindow::new(config.max_trajectory_points),
            config,
            state: ThrowState::Calibrating,
            baseline: None,
            cm_per_px: None,
            trajectory_points: 0,
            clutter_rejected: 0,
            origin: None,
            landing: None,
            debouncer: MilestoneDebouncer::new(),
        }
    }

    pub fn observe(&mut self, frame: &LandmarkFrame) -> Vec<TestEvent> {
        let mut events = Vec::new();
        let anchor = person_anchor(frame);

        if self.state == ThrowState::Calibrating {
            events.extend(self.calibrate(frame, anchor));
        }

        let Some(ball) = frame.get(LandmarkId::Ball) else {
            return events;
        };
        let sample = BallSample {
            position: ball,
            timestamp_ms: frame.timestamp_ms,
        };

        match self.state {
            ThrowState::Calibrating | ThrowState::Tracking => {
                if self.record_held(sample, anchor) {
                    events.extend(self.watch_release());
                }
            }
            ThrowState::Released => self.record_flight(sample),
            ThrowState::Done => {}
        }
        events
    }

    fn calibrate(&mut self, frame: &LandmarkFrame, anchor: Option<Point2>) -> Vec<TestEvent> {
        let (Some(anchor), Some(height)) = (anchor, body_height(frame)) else {
            return Vec::new();
        };
        let body = &self.config.body;
        let status = self
            .calibrator
            .observe(anchor.x * body.frame_width_px, height * body.frame_height_px);

        match status {
            CalibrationStatus::Collecting { .. } => Vec::new(),
            CalibrationStatus::Ready(baseline) => {
                self.baseline = Some(baseline);
                self.cm_per_px = cm_per_px(&self.config.body, baseline.scale);
                self.state = ThrowState::Tracking;
                info!(
                    "🧊 Thrower baseline frozen: body={:.0}px, {:?} cm/px",
                    baseline.scale, self.cm_per_px
                );
                vec![TestEvent::CalibrationComplete { baseline }]
            }
        }
    }

    /// Pre-release detections must be near the athlete; anything else is
    /// static clutter. Returns whether the sample was kept.
    fn record_held(&mut self, sample: BallSample, anchor: Option<Point2>) -> bool {
        let width = self.config.body.frame_width_px;
        let anchor_px = anchor
            .map(|a| a.x * width)
            .or_else(|| self.baseline.and_then(|b| b.reference_value()));

        if let Some(anchor_px) = anchor_px {
            let gap = (sample.position.x * width - anchor_px).abs();
            if gap > self.config.person_proximity_px {
                self.clutter_rejected += 1;
                debug!("🏐 Ball {:.0}px from athlete, treated as clutter", gap);
                return false;
            }
        }
        self.push(sample);
        true
    }

    fn record_flight(&mut self, sample: BallSample) {
        self.push(sample);
        if self
            .landing
            .map_or(true, |l| sample.position.y > l.position.y)
        {
            self.landing = Some(sample);
        }
    }

    fn push(&mut self, sample: BallSample) {
        self.trajectory.push(sample);
        self.trajectory_points += 1;
    }

    fn watch_release(&mut self) -> Vec<TestEvent> {
        let n = self.trajectory.len();
        if n < 3 {
            return Vec::new();
        }
        let (Some(first), Some(last)) = (self.trajectory.get(n - 3), self.trajectory.get(n - 1))
        else {
            return Vec::new();
        };
        let moved_px = (last.position.x - first.position.x).abs() * self.config.body.frame_width_px;
        if moved_px <= self.config.release_threshold_px {
            return Vec::new();
        }

        // Origin is the last resting sample before the movement began
        let origin_index = n.saturating_sub(4);
        let Some(origin) = self.trajectory.get(origin_index).copied() else {
            return Vec::new();
        };
        self.origin = Some(origin);
        self.landing = self
            .trajectory
            .iter()
            .skip(origin_index)
            .copied()
            .fold(None, |best: Option<BallSample>, s| match best {
                Some(b) if b.position.y >= s.position.y => Some(b),
                _ => Some(s),
            });
        self.state = ThrowState::Released;

        // Thrown before calibration finished: use what was collected
        if self.baseline.is_none() {
            if let Some(baseline) = self.calibrator.finalize() {
                self.baseline = Some(baseline);
                self.cm_per_px = cm_per_px(&self.config.body, baseline.scale);
            }
        }

        if !self.debouncer.fire(MilestoneId::Release) {
            return Vec::new();
        }
        info!(
            "🏐 Release at {:.0}ms from x={:.3} ({:.0}px movement)",
            origin.timestamp_ms, origin.position.x, moved_px
        );
        vec![TestEvent::BallReleased {
            position: origin.position,
            timestamp_ms: origin.timestamp_ms,
        }]
    }

    /// Closes out a released throw; the landing is the lowest point seen.
    pub fn finish(&mut self) {
        if self.state == ThrowState::Released {
            self.state = ThrowState::Done;
            if self.clutter_rejected > 0 {
                debug!("🏐 {} clutter detections ignored", self.clutter_rejected);
            }
        }
    }

    pub fn outcome(&self) -> Result<Metric, FailureReason> {
        let enough = self.trajectory_points >= self.config.min_trajectory_points;
        match self.state {
            ThrowState::Calibrating
                if self.calibrator.collected() == 0 && self.trajectory_points == 0 =>
            {
                Err(FailureReason::CalibrationFailed)
            }
            ThrowState::Calibrating | ThrowState::Tracking if !enough => {
                Err(FailureReason::InsufficientTrajectory)
            }
            ThrowState::Calibrating | ThrowState::Tracking => Err(FailureReason::NoReleaseDetected),
            ThrowState::Released | ThrowState::Done if !enough => {
                Err(FailureReason::InsufficientTrajectory)
            }
            ThrowState::Released | ThrowState::Done => {
                let (Some(origin), Some(landing)) = (self.origin, self.landing) else {
                    return Err(FailureReason::InsufficientTrajectory);
                };
                let scale = self.cm_per_px.unwrap_or_else(|| {
                    warn!(
                        "⚠️  No plausible body scale, using default {:.2} cm/px",
                        self.config.default_cm_per_px
                    );
                    self.config.default_cm_per_px
                });
                Metric::Throw {
                    distance_cm: horizontal_distance_cm(
                        origin.position.x,
                        landing.position.x,
                        self.config.body.frame_width_px,
                        scale,
                    ),
                    cm_per_px: scale,
                    trajectory_points: self.trajectory_points,
                }
                .validate()
            }
        }
    }

    pub fn state(&self) -> ThrowState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state == ThrowState::Done
    }

    pub fn calibration_confidence(&self) -> Option<CalibrationConfidence> {
        self.baseline.map(|b| b.confidence)
    }

    pub fn completed_at_ms(&self) -> Option<f64> {
        match self.state {
            ThrowState::Done => self.trajectory.latest().map(|s| s.timestamp_ms),
            _ => None,
        }
    }

    pub fn origin(&self) -> Option<BallSample> {
        self.origin
    }
}

/// Hip midpoint, falling back to the ankles
fn person_anchor(frame: &LandmarkFrame) -> Option<Point2> {
    frame
        .pair_midpoint(LandmarkId::LeftHip, LandmarkId::RightHip)
        .or_else(|| frame.pair_midpoint(LandmarkId::LeftAnkle, LandmarkId::RightAnkle))
}

/// Normalized standing height: nose to ankles, or nose to hips scaled up
fn body_height(frame: &LandmarkFrame) -> Option<f64> {
    let nose = frame.get(LandmarkId::Nose)?;
    if let Some(ankles) = frame.pair_midpoint(LandmarkId::LeftAnkle, LandmarkId::RightAnkle) {
        return Some((ankles.y - nose.y).abs());
    }
    let hips = frame.pair_midpoint(LandmarkId::LeftHip, LandmarkId::RightHip)?;
    Some((hips.y - nose.y).abs() / TORSO_HEIGHT_RATIO)
}

// src/analysis/jump_detector.rs
//
// Standing horizontal jump from pose landmarks.
//
//   Calibrating → Ready → InAir → Done
//        └──→ Rejected (implausible body scale)
//
// Heel height against the calibrated standing baseline drives takeoff and
// landing; the toe position at each end gives the jump distance.

use crate::analysis::calibrator::{CalibrationStatus, FrameCalibrator};
use crate::analysis::measurement::{cm_per_px, horizontal_distance_cm};
use crate::analysis::milestones::{MilestoneDebouncer, MilestoneId};
use crate::analysis::sliding_window::SlidingWindow;
use crate::analysis::thresholds::ThresholdPolicy;
use crate::types::{
    Baseline, CalibrationConfidence, FailureReason, JumpConfig, LandmarkFrame, LandmarkId, Metric,
    Point2, TestEvent,
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpState {
    Calibrating,
    Ready,
    InAir,
    Done,
    Rejected,
}

impl JumpState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calibrating => "calibrating",
            Self::Ready => "ready",
            Self::InAir => "in_air",
            Self::Done => "done",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FootContact {
    pub position: Point2,
    pub timestamp_ms: f64,
}

/// Heel height and toe position for both feet, averaged
#[derive(Debug, Clone, Copy)]
struct FeetReading {
    heel_y: f64,
    toe: Point2,
}

impl FeetReading {
    fn from_frame(frame: &LandmarkFrame) -> Option<Self> {
        let heel = frame.pair_midpoint(LandmarkId::LeftHeel, LandmarkId::RightHeel)?;
        let toe = frame.pair_midpoint(LandmarkId::LeftFootIndex, LandmarkId::RightFootIndex)?;
        Some(Self {
            heel_y: heel.y,
            toe,
        })
    }
}

pub struct HorizontalJumpDetector {
    config: JumpConfig,
    state: JumpState,
    calibrator: FrameCalibrator,
    baseline: Option<Baseline>,
    cm_per_px: Option<f64>,

    takeoff_policy: ThresholdPolicy,
    landing_policy: ThresholdPolicy,

    // Takeoff debounce
    rising_frames: u32,
    rise_start: Option<FootContact>,

    // Flight
    frames_in_air: u32,
    toe_window: SlidingWindow<f64>,

    takeoff: Option<FootContact>,
    landing: Option<FootContact>,
    rejected_at_ms: Option<f64>,
    debouncer: MilestoneDebouncer,
}

impl HorizontalJumpDetector {
    pub fn new(config: JumpConfig) -> Self {
        let takeoff_policy =
            ThresholdPolicy::exceed(config.takeoff_rise_fraction, config.takeoff_confirm_frames);
        let landing_policy = ThresholdPolicy::return_within(
            config.landing_margins.clone(),
            config.min_air_frames,
            config.stability_tolerance,
        );
        Self {
            calibrator: FrameCalibrator::new(config.calibration_frames),
            toe_window: SlidingWindow::new(config.stability_window),
            config,
            state: JumpState::Calibrating,
            baseline: None,
            cm_per_px: None,
            takeoff_policy,
            landing_policy,
            rising_frames: 0,
            rise_start: None,
            frames_in_air: 0,
            takeoff: None,
            landing: None,
            rejected_at_ms: None,
            debouncer: MilestoneDebouncer::new(),
        }
    }

    pub fn observe(&mut self, frame: &LandmarkFrame) -> Vec<TestEvent> {
        let Some(feet) = FeetReading::from_frame(frame) else {
            debug!("🦶 Frame {:.0}ms missing foot landmarks, skipped", frame.timestamp_ms);
            return Vec::new();
        };

        match self.state {
            JumpState::Calibrating => self.calibrate(frame, feet),
            JumpState::Ready => self.watch_takeoff(frame, feet),
            JumpState::InAir => self.watch_landing(frame, feet),
            JumpState::Done | JumpState::Rejected => Vec::new(),
        }
    }

    fn calibrate(&mut self, frame: &LandmarkFrame, feet: FeetReading) -> Vec<TestEvent> {
        let Some(nose) = frame.get(LandmarkId::Nose) else {
            debug!("Calibration frame without head landmark, skipped");
            return Vec::new();
        };
        let body_px = (feet.heel_y - nose.y) * self.config.body.frame_height_px;

        match self.calibrator.observe(feet.heel_y, body_px) {
            CalibrationStatus::Collecting { .. } => Vec::new(),
            CalibrationStatus::Ready(baseline) => {
                self.baseline = Some(baseline);
                self.cm_per_px = cm_per_px(&self.config.body, baseline.scale);
                info!(
                    "🧊 Standing baseline frozen: heel_y={:.3}, body={:.0}px, {:?} cm/px",
                    baseline.reference_value().unwrap_or(f64::NAN),
                    baseline.scale,
                    self.cm_per_px
                );
                if baseline.scale > 0.0 && self.cm_per_px.is_some() {
                    self.state = JumpState::Ready;
                } else {
                    // Margins scale with body height; a bad scale can never trigger
                    warn!(
                        "✗ Body height {:.0}px gives no plausible scale, attempt rejected",
                        baseline.scale
                    );
                    self.state = JumpState::Rejected;
                    self.rejected_at_ms = Some(frame.timestamp_ms);
                }
                vec![TestEvent::CalibrationComplete { baseline }]
            }
        }
    }

    fn watch_takeoff(&mut self, frame: &LandmarkFrame, feet: FeetReading) -> Vec<TestEvent> {
        let Some(baseline) = self.baseline else {
            return Vec::new();
        };
        let Some(ground_y) = baseline.reference_value() else {
            return Vec::new();
        };
        let rise_px = (ground_y - feet.heel_y) * self.config.body.frame_height_px;

        if !self
            .takeoff_policy
            .value_condition(&baseline, self.rising_frames, rise_px)
        {
            if self.rising_frames > 0 {
                debug!("Rise of {} frames not sustained, reset", self.rising_frames);
            }
            self.rising_frames = 0;
            self.rise_start = None;
            return Vec::new();
        }

        self.rising_frames += 1;
        let start = *self.rise_start.get_or_insert(FootContact {
            position: feet.toe,
            timestamp_ms: frame.timestamp_ms,
        });

        if !self
            .takeoff_policy
            .should_transition(&baseline, self.rising_frames, rise_px, &self.toe_window)
        {
            return Vec::new();
        }

        self.state = JumpState::InAir;
        self.frames_in_air = self.rising_frames;
        self.toe_window.clear();
        self.takeoff = Some(start);

        if !self.debouncer.fire(MilestoneId::Takeoff) {
            return Vec::new();
        }
        info!(
            "🚀 Takeoff at {:.0}ms (toe x={:.3}, rise {:.0}px)",
            start.timestamp_ms, start.position.x, rise_px
        );
        vec![TestEvent::Takeoff {
            position: start.position,
            timestamp_ms: start.timestamp_ms,
        }]
    }

    fn watch_landing(&mut self, frame: &LandmarkFrame, feet: FeetReading) -> Vec<TestEvent> {
        let Some(baseline) = self.baseline else {
            return Vec::new();
        };
        let Some(ground_y) = baseline.reference_value() else {
            return Vec::new();
        };

        self.frames_in_air += 1;
        self.toe_window.push(feet.toe.x);
        let displacement_px = (feet.heel_y - ground_y) * self.config.body.frame_height_px;

        if !self.landing_policy.should_transition(
            &baseline,
            self.frames_in_air,
            displacement_px,
            &self.toe_window,
        ) {
            return Vec::new();
        }

        let landing = FootContact {
            position: feet.toe,
            timestamp_ms: frame.timestamp_ms,
        };
        self.landing = Some(landing);
        self.state = JumpState::Done;

        let mut events = Vec::new();
        if self.debouncer.fire(MilestoneId::Landing) {
            info!(
                "🛬 Landing at {:.0}ms after {} frames (toe x={:.3}, margin {:.1}px)",
                landing.timestamp_ms,
                self.frames_in_air,
                landing.position.x,
                self.landing_policy.current_margin(&baseline, self.frames_in_air)
            );
            events.push(TestEvent::Landing {
                position: landing.position,
                timestamp_ms: landing.timestamp_ms,
            });
        }

        match self.outcome() {
            Ok(metric) if self.debouncer.fire(MilestoneId::Completion) => {
                events.push(TestEvent::TestComplete {
                    final_metric: metric,
                });
            }
            Ok(_) => {}
            Err(reason) => warn!("✗ Jump measurement rejected: {:?}", reason),
        }
        events
    }

    pub fn outcome(&self) -> Result<Metric, FailureReason> {
        match self.state {
            JumpState::Calibrating if self.calibrator.collected() == 0 => {
                Err(FailureReason::CalibrationFailed)
            }
            JumpState::Calibrating => Err(FailureReason::NotCalibrated),
            JumpState::Ready => Err(FailureReason::NoTakeoffDetected),
            JumpState::InAir => Err(FailureReason::NoLandingDetected),
            JumpState::Rejected => Err(FailureReason::InvalidMeasurement),
            JumpState::Done => {
                let (Some(takeoff), Some(landing)) = (self.takeoff, self.landing) else {
                    return Err(FailureReason::InvalidMeasurement);
                };
                let scale = self.cm_per_px.ok_or(FailureReason::InvalidMeasurement)?;
                let distance_cm = horizontal_distance_cm(
                    takeoff.position.x,
                    landing.position.x,
                    self.config.body.frame_width_px,
                    scale,
                );
                Metric::Jump {
                    distance_cm,
                    cm_per_px: scale,
                }
                .validate()
            }
        }
    }

    pub fn state(&self) -> JumpState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JumpState::Done | JumpState::Rejected)
    }

    pub fn baseline(&self) -> Option<Baseline> {
        self.baseline
    }

    pub fn calibration_confidence(&self) -> Option<CalibrationConfidence> {
        self.baseline.map(|b| b.confidence)
    }

    pub fn completed_at_ms(&self) -> Option<f64> {
        self.landing.map(|l| l.timestamp_ms).or(self.rejected_at_ms)
    }

    pub fn takeoff(&self) -> Option<FootContact> {
        self.takeoff
    }

    pub fn landing(&self) -> Option<FootContact> {
        self.landing
    }
}

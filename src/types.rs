// src/types.rs
//
// Shared data model: sensor samples in, typed events and session results out,
// plus the serde config tree loaded from config.yaml.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub jump: JumpConfig,
    pub shuttle_run: ShuttleRunConfig,
    pub timed_run: TimedRunConfig,
    pub throw: ThrowConfig,
    pub feedback: FeedbackConfig,
    pub replay: ReplayConfig,
    pub logging: LoggingConfig,
}

/// Converts normalized landmark coordinates into real-world units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyScaleConfig {
    pub frame_width_px: f64,
    pub frame_height_px: f64,
    pub athlete_height_cm: f64,
    /// Accepted cm-per-pixel range; anything outside is a bad body measurement
    pub min_cm_per_px: f64,
    pub max_cm_per_px: f64,
}

impl Default for BodyScaleConfig {
    fn default() -> Self {
        Self {
            frame_width_px: 1280.0,
            frame_height_px: 720.0,
            athlete_height_cm: 170.0,
            min_cm_per_px: 0.2,
            max_cm_per_px: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginTier {
    /// Number of frames (counted from entering the state) this tier covers
    pub frames: u32,
    /// Margin as a fraction of the baseline scale
    pub margin: f64,
}

/// Time-in-state margin schedule. Tiers apply in order, `loosest` after the last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginSchedule {
    pub tiers: Vec<MarginTier>,
    pub loosest: f64,
}

impl Default for MarginSchedule {
    fn default() -> Self {
        Self {
            tiers: vec![
                MarginTier {
                    frames: 20,
                    margin: 0.05,
                },
                MarginTier {
                    frames: 15,
                    margin: 0.08,
                },
            ],
            loosest: 0.12,
        }
    }
}

impl MarginSchedule {
    pub fn constant(margin: f64) -> Self {
        Self {
            tiers: Vec::new(),
            loosest: margin,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JumpConfig {
    pub calibration_frames: u32,
    /// Heel rise (fraction of body height) that counts as leaving the ground
    pub takeoff_rise_fraction: f64,
    /// Consecutive rising frames before takeoff is accepted
    pub takeoff_confirm_frames: u32,
    pub landing_margins: MarginSchedule,
    /// Minimum airborne frames before a landing can be accepted
    pub min_air_frames: u32,
    /// Toe-x history length used for the "feet have settled" check
    pub stability_window: usize,
    /// Max spread (normalized x) allowed inside the stability window
    pub stability_tolerance: f64,
    pub body: BodyScaleConfig,
}

impl Default for JumpConfig {
    fn default() -> Self {
        Self {
            calibration_frames: 50,
            takeoff_rise_fraction: 0.10,
            takeoff_confirm_frames: 2,
            landing_margins: MarginSchedule::default(),
            min_air_frames: 5,
            stability_window: 5,
            stability_tolerance: 0.02,
            body: BodyScaleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsCalibrationConfig {
    /// Qualifying fixes averaged into the baseline
    pub target_fixes: u32,
    /// Fixes examined before giving up and falling back
    pub max_attempts: u32,
    /// Fixes reporting worse accuracy than this are discarded
    pub accuracy_threshold_m: f64,
}

impl Default for GpsCalibrationConfig {
    fn default() -> Self {
        Self {
            target_fixes: 3,
            max_attempts: 10,
            accuracy_threshold_m: 15.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShuttleRunConfig {
    pub calibration: GpsCalibrationConfig,
    pub lap_length_m: f64,
    pub total_laps: u32,
    /// Heading change (degrees) that counts as turning around
    pub reversal_threshold_deg: f64,
    /// Consecutive reversed fixes needed to resume tracking
    pub reversal_confirm_fixes: usize,
    /// Fixes worse than this are dropped while tracking
    pub max_fix_accuracy_m: f64,
    /// Shortfall allowed on the final leg once every turn is made
    pub final_leg_tolerance_m: f64,
    pub teardown_grace_ms: f64,
}

impl Default for ShuttleRunConfig {
    fn default() -> Self {
        Self {
            calibration: GpsCalibrationConfig::default(),
            lap_length_m: 10.0,
            total_laps: 4,
            reversal_threshold_deg: 120.0,
            reversal_confirm_fixes: 1,
            max_fix_accuracy_m: 25.0,
            final_leg_tolerance_m: 1.0,
            teardown_grace_ms: 1500.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimedRunConfig {
    pub calibration: GpsCalibrationConfig,
    /// Settling window; fixes inside it move the reference but add no distance
    pub calibration_window_ms: f64,
    pub target_distance_m: f64,
    /// Distance checkpoint spacing; 0 disables checkpoints
    pub checkpoint_interval_m: f64,
    pub max_fix_accuracy_m: f64,
    pub teardown_grace_ms: f64,
}

impl Default for TimedRunConfig {
    fn default() -> Self {
        Self {
            calibration: GpsCalibrationConfig::default(),
            calibration_window_ms: 3000.0,
            target_distance_m: 800.0,
            checkpoint_interval_m: 100.0,
            max_fix_accuracy_m: 25.0,
            teardown_grace_ms: 1500.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrowConfig {
    pub calibration_frames: u32,
    /// Ball x movement (px) across two frames that marks the release
    pub release_threshold_px: f64,
    /// Pre-release ball detections farther than this from the athlete are clutter
    pub person_proximity_px: f64,
    pub min_trajectory_points: usize,
    pub max_trajectory_points: usize,
    /// Used when no plausible body scale was measured
    pub default_cm_per_px: f64,
    pub body: BodyScaleConfig,
}

impl Default for ThrowConfig {
    fn default() -> Self {
        Self {
            calibration_frames: 30,
            release_threshold_px: 20.0,
            person_proximity_px: 200.0,
            min_trajectory_points: 3,
            max_trajectory_points: 600,
            default_cm_per_px: 0.5,
            body: BodyScaleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub enabled: bool,
    pub tick_pulse_ms: u32,
    pub milestone_pulse_ms: u32,
    pub success_pulse_ms: u32,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_pulse_ms: 40,
            milestone_pulse_ms: 120,
            success_pulse_ms: 400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub input_dir: String,
    pub output_dir: String,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            input_dir: "recordings".to_string(),
            output_dir: "results".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ============================================================================
// SAMPLES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkId {
    Nose,
    LeftHip,
    RightHip,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
    /// Ball centre from an external tracker (throw tests)
    Ball,
}

/// 2-D point. Landmark positions are normalized to frame size ([0, 1]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn midpoint(a: Point2, b: Point2) -> Self {
        Self {
            x: (a.x + b.x) / 2.0,
            y: (a.y + b.y) / 2.0,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    pub timestamp_ms: f64,
    #[serde(default)]
    pub landmarks: HashMap<LandmarkId, Point2>,
}

impl LandmarkFrame {
    pub fn new(timestamp_ms: f64) -> Self {
        Self {
            timestamp_ms,
            landmarks: HashMap::new(),
        }
    }

    pub fn with(mut self, id: LandmarkId, x: f64, y: f64) -> Self {
        self.landmarks.insert(id, Point2::new(x, y));
        self
    }

    /// Landmark position, or None when the estimator did not report it
    /// (absent or non-finite coordinates both count as missing).
    pub fn get(&self, id: LandmarkId) -> Option<Point2> {
        self.landmarks.get(&id).copied().filter(Point2::is_finite)
    }

    /// Midpoint of a left/right landmark pair; both must be present.
    pub fn pair_midpoint(&self, left: LandmarkId, right: LandmarkId) -> Option<Point2> {
        Some(Point2::midpoint(self.get(left)?, self.get(right)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub timestamp_ms: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
    #[serde(default)]
    pub heading_deg: Option<f64>,
}

impl PositionFix {
    /// Coordinates and accuracy are sane enough to look at
    pub fn is_usable(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && self.accuracy_m.is_finite()
            && self.accuracy_m >= 0.0
    }

    pub fn heading(&self) -> Option<f64> {
        self.heading_deg.filter(|h| h.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Sample {
    Landmarks(LandmarkFrame),
    Position(PositionFix),
}

impl Sample {
    pub fn timestamp_ms(&self) -> f64 {
        match self {
            Sample::Landmarks(frame) => frame.timestamp_ms,
            Sample::Position(fix) => fix.timestamp_ms,
        }
    }
}

// ============================================================================
// BASELINE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reference {
    Scalar { value: f64 },
    Geo { latitude: f64, longitude: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationConfidence {
    /// At least two qualifying readings were averaged
    Full,
    /// Only one qualifying reading was available
    Degraded,
    /// Nothing qualified; built from the single best reading seen
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub reference: Reference,
    pub scale: f64,
    pub sample_count: u32,
    pub confidence: CalibrationConfidence,
}

impl Baseline {
    pub fn reference_value(&self) -> Option<f64> {
        match self.reference {
            Reference::Scalar { value } => Some(value),
            Reference::Geo { .. } => None,
        }
    }
}

// ============================================================================
// EVENTS & RESULTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    HorizontalJump,
    ShuttleRun,
    TimedRun,
    MedicineBallThrow,
}

impl TestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HorizontalJump => "horizontal_jump",
            Self::ShuttleRun => "shuttle_run",
            Self::TimedRun => "timed_run",
            Self::MedicineBallThrow => "medicine_ball_throw",
        }
    }

    pub fn uses_landmarks(&self) -> bool {
        matches!(self, Self::HorizontalJump | Self::MedicineBallThrow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    #[serde(rename = "distance")]
    pub distance_m: f64,
    #[serde(rename = "timeTaken")]
    pub time_s: f64,
    #[serde(rename = "speed")]
    pub speed_mps: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Metric {
    Jump {
        distance_cm: f64,
        cm_per_px: f64,
    },
    Throw {
        distance_cm: f64,
        cm_per_px: f64,
        trajectory_points: usize,
    },
    TimedRun {
        #[serde(flatten)]
        run: RunMetrics,
    },
    ShuttleRun {
        #[serde(flatten)]
        run: RunMetrics,
        laps_completed: u32,
        direction_changes: u32,
    },
}

impl Metric {
    /// NaN, infinite, or negative measurements and zero elapsed time are
    /// never reported as results.
    pub fn validate(self) -> Result<Self, FailureReason> {
        let sane = |v: f64| v.is_finite() && v >= 0.0;
        let ok = match &self {
            Metric::Jump {
                distance_cm,
                cm_per_px,
            }
            | Metric::Throw {
                distance_cm,
                cm_per_px,
                ..
            } => sane(*distance_cm) && sane(*cm_per_px) && *cm_per_px > 0.0,
            Metric::TimedRun { run } | Metric::ShuttleRun { run, .. } => {
                sane(run.distance_m) && sane(run.speed_mps) && sane(run.time_s) && run.time_s > 0.0
            }
        };
        if ok {
            Ok(self)
        } else {
            Err(FailureReason::InvalidMeasurement)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TestEvent {
    CalibrationComplete { baseline: Baseline },
    Takeoff { position: Point2, timestamp_ms: f64 },
    Landing { position: Point2, timestamp_ms: f64 },
    BallReleased { position: Point2, timestamp_ms: f64 },
    LapComplete { lap_index: u32 },
    DirectionChangeRequired { milestone: u32 },
    DirectionChangeDetected { milestone: u32 },
    MilestoneReached { distance_m: f64 },
    TestComplete { final_metric: Metric },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    CalibrationFailed,
    NotCalibrated,
    NoTakeoffDetected,
    NoLandingDetected,
    NoReleaseDetected,
    InsufficientTrajectory,
    LapsIncomplete,
    DirectionChangeNotDetected,
    TargetNotReached,
    InvalidMeasurement,
}

impl FailureReason {
    /// Guidance the caller can show the athlete
    pub fn description(&self) -> &'static str {
        match self {
            Self::CalibrationFailed => "No usable sensor data during calibration. Check camera or GPS.",
            Self::NotCalibrated => "Calibration did not finish. Hold still until ready.",
            Self::NoTakeoffDetected => "Takeoff not detected. Jump with both feet together.",
            Self::NoLandingDetected => "Landing not detected. Stay still after landing.",
            Self::NoReleaseDetected => "Ball release not detected. Keep the ball in view.",
            Self::InsufficientTrajectory => "Not enough ball detections. Adjust ball color settings.",
            Self::LapsIncomplete => "Not all laps were completed.",
            Self::DirectionChangeNotDetected => "Turn not detected. Reverse direction at the line.",
            Self::TargetNotReached => "Target distance was not reached.",
            Self::InvalidMeasurement => "Measurement was invalid. Please retry.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub session_id: Uuid,
    pub test_kind: TestKind,
    pub success: bool,
    pub metric: Option<Metric>,
    pub failure_reason: Option<FailureReason>,
    pub last_state: String,
    pub calibration_confidence: Option<CalibrationConfidence>,
    pub recorded_at: DateTime<Utc>,
}

impl SessionResult {
    pub fn from_outcome(
        session_id: Uuid,
        test_kind: TestKind,
        outcome: Result<Metric, FailureReason>,
        last_state: &str,
        calibration_confidence: Option<CalibrationConfidence>,
    ) -> Self {
        let (metric, failure_reason) = match outcome.and_then(Metric::validate) {
            Ok(metric) => (Some(metric), None),
            Err(reason) => (None, Some(reason)),
        };
        Self {
            session_id,
            test_kind,
            success: metric.is_some(),
            metric,
            failure_reason,
            last_state: last_state.to_string(),
            calibration_confidence,
            recorded_at: Utc::now(),
        }
    }
}

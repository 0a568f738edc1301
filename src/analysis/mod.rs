// src/analysis/mod.rs
//
// Detection modules.
//
//   calibrator ──→ Baseline ──┐
//   thresholds + sliding_window ┼→ jump_detector, throw_detector (landmarks)
//   milestones + measurement ───┴→ shuttle_run, timed_run (GPS)

pub mod calibrator;
pub mod jump_detector;
pub mod measurement;
pub mod milestones;
pub mod shuttle_run;
pub mod sliding_window;
pub mod thresholds;
pub mod throw_detector;
pub mod timed_run;

pub use calibrator::{CalibrationStatus, FrameCalibrator, GpsCalibrator};
pub use jump_detector::{HorizontalJumpDetector, JumpState};
pub use milestones::{MilestoneDebouncer, MilestoneId, MilestoneSet};
pub use shuttle_run::{ShuttleRunDetector, ShuttleRunState};
pub use sliding_window::SlidingWindow;
pub use thresholds::{ThresholdPolicy, TriggerMode};
pub use throw_detector::{MedicineBallThrowDetector, ThrowState};
pub use timed_run::{TimedRunDetector, TimedRunState};

// src/analysis/thresholds.rs
//
// Multi-condition transition rule. A state change needs all of:
//   1. dwell      - at least `min_dwell_frames` spent in the current state
//   2. value      - displacement vs. a margin that depends on time-in-state
//   3. stability  - a sliding window of readings has settled (optional)
// Each condition alone is too noisy to trust.

use crate::analysis::sliding_window::SlidingWindow;
use crate::types::{Baseline, MarginSchedule};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Displacement from the baseline has come back inside the margin
    ReturnWithin,
    /// Displacement from the baseline exceeds the margin
    Exceed,
}

#[derive(Debug, Clone)]
pub struct ThresholdPolicy {
    pub schedule: MarginSchedule,
    pub min_dwell_frames: u32,
    pub stability_tolerance: Option<f64>,
    pub mode: TriggerMode,
}

impl MarginSchedule {
    /// Margin (fraction of baseline scale) after `elapsed` frames in state
    pub fn margin_at(&self, elapsed: u32) -> f64 {
        let mut boundary: u64 = 0;
        for tier in &self.tiers {
            boundary += tier.frames as u64;
            if (elapsed as u64) < boundary {
                return tier.margin;
            }
        }
        self.loosest
    }
}

impl ThresholdPolicy {
    pub fn return_within(schedule: MarginSchedule, min_dwell_frames: u32, tolerance: f64) -> Self {
        Self {
            schedule,
            min_dwell_frames,
            stability_tolerance: Some(tolerance),
            mode: TriggerMode::ReturnWithin,
        }
    }

    pub fn exceed(fraction: f64, min_dwell_frames: u32) -> Self {
        Self {
            schedule: MarginSchedule::constant(fraction),
            min_dwell_frames,
            stability_tolerance: None,
            mode: TriggerMode::Exceed,
        }
    }

    /// Absolute margin in the baseline's units
    pub fn current_margin(&self, baseline: &Baseline, elapsed: u32) -> f64 {
        self.schedule.margin_at(elapsed) * baseline.scale
    }

    pub fn value_condition(&self, baseline: &Baseline, elapsed: u32, displacement: f64) -> bool {
        if !displacement.is_finite() {
            return false;
        }
        let margin = self.current_margin(baseline, elapsed);
        match self.mode {
            TriggerMode::ReturnWithin => displacement.abs() <= margin,
            TriggerMode::Exceed => displacement > margin,
        }
    }

    pub fn stability_condition(&self, window: &SlidingWindow<f64>) -> bool {
        match self.stability_tolerance {
            Some(tolerance) => window.is_stable(tolerance),
            None => true,
        }
    }

    pub fn should_transition(
        &self,
        baseline: &Baseline,
        elapsed: u32,
        displacement: f64,
        window: &SlidingWindow<f64>,
    ) -> bool {
        elapsed >= self.min_dwell_frames
            && self.value_condition(baseline, elapsed, displacement)
            && self.stability_condition(window)
    }
}

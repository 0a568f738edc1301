// src/analysis/calibrator.rs
//
// Baseline estimation from the first readings of a session.
//
//   FrameCalibrator - mean of a per-frame reference value and a per-frame
//                     body scale over N landmark frames
//   GpsCalibrator   - mean position over the first qualifying fixes, with a
//                     best-fix fallback when accuracy never gets good enough

use crate::types::{Baseline, CalibrationConfidence, GpsCalibrationConfig, PositionFix, Reference};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationStatus {
    Collecting { collected: u32, total: u32 },
    Ready(Baseline),
}

// ============================================================================
// LANDMARK FRAMES
// ============================================================================

#[derive(Debug, Clone)]
pub struct FrameCalibrator {
    target_frames: u32,
    reference_sum: f64,
    scale_sum: f64,
    count: u32,
    baseline: Option<Baseline>,
}

impl FrameCalibrator {
    pub fn new(target_frames: u32) -> Self {
        Self {
            target_frames: target_frames.max(1),
            reference_sum: 0.0,
            scale_sum: 0.0,
            count: 0,
            baseline: None,
        }
    }

    /// Feed one frame's reference value and body-scale measurement.
    /// Once the baseline is frozen further readings are ignored.
    pub fn observe(&mut self, reference: f64, scale: f64) -> CalibrationStatus {
        if let Some(baseline) = self.baseline {
            return CalibrationStatus::Ready(baseline);
        }
        if !reference.is_finite() || !scale.is_finite() {
            return self.status();
        }

        self.reference_sum += reference;
        self.scale_sum += scale;
        self.count += 1;

        if self.count >= self.target_frames {
            let baseline = self.build(CalibrationConfidence::Full);
            info!(
                "✓ Calibration complete: reference={:.4}, scale={:.1} ({} frames)",
                self.reference_sum / self.count as f64,
                baseline.scale,
                self.count
            );
            self.baseline = Some(baseline);
            return CalibrationStatus::Ready(baseline);
        }
        self.status()
    }

    /// Best-effort baseline from whatever was collected; None with no frames.
    pub fn finalize(&mut self) -> Option<Baseline> {
        if self.baseline.is_none() && self.count > 0 {
            warn!(
                "⚠️  Calibration cut short at {}/{} frames, using partial baseline",
                self.count, self.target_frames
            );
            let confidence = if self.count >= 2 {
                CalibrationConfidence::Degraded
            } else {
                CalibrationConfidence::Fallback
            };
            self.baseline = Some(self.build(confidence));
        }
        self.baseline
    }

    pub fn baseline(&self) -> Option<Baseline> {
        self.baseline
    }

    pub fn collected(&self) -> u32 {
        self.count
    }

    fn status(&self) -> CalibrationStatus {
        CalibrationStatus::Collecting {
            collected: self.count,
            total: self.target_frames,
        }
    }

    fn build(&self, confidence: CalibrationConfidence) -> Baseline {
        let n = self.count as f64;
        Baseline {
            reference: Reference::Scalar {
                value: self.reference_sum / n,
            },
            scale: self.scale_sum / n,
            sample_count: self.count,
            confidence,
        }
    }
}

// ============================================================================
// POSITION FIXES
// ============================================================================

#[derive(Debug, Clone)]
pub struct GpsCalibrator {
    config: GpsCalibrationConfig,
    attempts: u32,
    qualifying: Vec<PositionFix>,
    best: Option<PositionFix>,
    baseline: Option<Baseline>,
}

impl GpsCalibrator {
    pub fn new(config: GpsCalibrationConfig) -> Self {
        Self {
            qualifying: Vec::with_capacity(config.target_fixes as usize),
            config,
            attempts: 0,
            best: None,
            baseline: None,
        }
    }

    pub fn qualifies(&self, fix: &PositionFix) -> bool {
        fix.is_usable() && fix.accuracy_m <= self.config.accuracy_threshold_m
    }

    pub fn observe(&mut self, fix: &PositionFix) -> CalibrationStatus {
        if let Some(baseline) = self.baseline {
            return CalibrationStatus::Ready(baseline);
        }
        if !fix.is_usable() {
            debug!("📡 Unusable fix ignored during calibration");
            return self.status();
        }

        self.attempts += 1;
        if self.best.map_or(true, |b| fix.accuracy_m < b.accuracy_m) {
            self.best = Some(*fix);
        }

        if self.qualifies(fix) {
            self.qualifying.push(*fix);
            debug!(
                "📡 Calibration fix {}/{} (±{:.1}m)",
                self.qualifying.len(),
                self.config.target_fixes,
                fix.accuracy_m
            );
        } else {
            debug!(
                "📡 Fix rejected for calibration: ±{:.1}m > ±{:.1}m",
                fix.accuracy_m, self.config.accuracy_threshold_m
            );
        }

        if self.qualifying.len() as u32 >= self.config.target_fixes
            || self.attempts >= self.config.max_attempts
        {
            if let Some(baseline) = self.finalize() {
                return CalibrationStatus::Ready(baseline);
            }
        }
        self.status()
    }

    /// Freezes a baseline from what has been seen so far.
    ///
    /// Two or more qualifying fixes give `Full` confidence, one gives
    /// `Degraded`, none falls back to the single most accurate fix.
    pub fn finalize(&mut self) -> Option<Baseline> {
        if self.baseline.is_some() {
            return self.baseline;
        }

        let baseline = match self.qualifying.len() {
            0 => {
                let best = self.best?;
                warn!(
                    "⚠️  No fix met ±{:.1}m after {} attempts, falling back to best fix (±{:.1}m)",
                    self.config.accuracy_threshold_m, self.attempts, best.accuracy_m
                );
                Baseline {
                    reference: Reference::Geo {
                        latitude: best.latitude,
                        longitude: best.longitude,
                    },
                    scale: best.accuracy_m,
                    sample_count: 1,
                    confidence: CalibrationConfidence::Fallback,
                }
            }
            n => {
                let count = n as f64;
                let latitude = self.qualifying.iter().map(|f| f.latitude).sum::<f64>() / count;
                let longitude = self.qualifying.iter().map(|f| f.longitude).sum::<f64>() / count;
                let accuracy = self.qualifying.iter().map(|f| f.accuracy_m).sum::<f64>() / count;
                let confidence = if n >= 2 {
                    CalibrationConfidence::Full
                } else {
                    warn!("⚠️  Only one qualifying fix, baseline is degraded");
                    CalibrationConfidence::Degraded
                };
                Baseline {
                    reference: Reference::Geo {
                        latitude,
                        longitude,
                    },
                    scale: accuracy,
                    sample_count: n as u32,
                    confidence,
                }
            }
        };

        info!(
            "✓ GPS calibration complete: {} fixes, ±{:.1}m, {:?}",
            baseline.sample_count, baseline.scale, baseline.confidence
        );
        self.baseline = Some(baseline);
        self.baseline
    }

    pub fn baseline(&self) -> Option<Baseline> {
        self.baseline
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn status(&self) -> CalibrationStatus {
        CalibrationStatus::Collecting {
            collected: self.qualifying.len() as u32,
            total: self.config.target_fixes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(t: f64, lat: f64, accuracy: f64) -> PositionFix {
        PositionFix {
            timestamp_ms: t,
            latitude: lat,
            longitude: 77.0,
            accuracy_m: accuracy,
            heading_deg: None,
        }
    }

    #[test]
    fn test_frame_calibrator_averages_and_freezes() {
        let mut calibrator = FrameCalibrator::new(3);
        assert!(matches!(
            calibrator.observe(0.79, 290.0),
            CalibrationStatus::Collecting { collected: 1, total: 3 }
        ));
        calibrator.observe(0.80, 300.0);
        let status = calibrator.observe(0.81, 310.0);

        let CalibrationStatus::Ready(baseline) = status else {
            panic!("expected baseline after 3 frames");
        };
        assert!((baseline.reference_value().unwrap() - 0.80).abs() < 1e-9);
        assert!((baseline.scale - 300.0).abs() < 1e-9);
        assert_eq!(baseline.confidence, CalibrationConfidence::Full);

        // Frozen: later frames do not move it
        calibrator.observe(0.10, 10.0);
        assert_eq!(calibrator.baseline(), Some(baseline));
    }

    #[test]
    fn test_frame_calibrator_skips_non_finite_readings() {
        let mut calibrator = FrameCalibrator::new(2);
        calibrator.observe(f64::NAN, 300.0);
        assert_eq!(calibrator.collected(), 0);
    }

    #[test]
    fn test_frame_calibrator_partial_finalize() {
        let mut calibrator = FrameCalibrator::new(50);
        assert!(calibrator.finalize().is_none(), "no frames means no baseline");
        calibrator.observe(0.8, 300.0);
        calibrator.observe(0.8, 300.0);
        let baseline = calibrator.finalize().unwrap();
        assert_eq!(baseline.sample_count, 2);
        assert_eq!(baseline.confidence, CalibrationConfidence::Degraded);
    }

    #[test]
    fn test_gps_calibrator_needs_target_qualifying_fixes() {
        let mut calibrator = GpsCalibrator::new(GpsCalibrationConfig::default());
        calibrator.observe(&fix(0.0, 28.0000, 5.0));
        calibrator.observe(&fix(1000.0, 28.5, 50.0)); // too inaccurate, ignored
        calibrator.observe(&fix(2000.0, 28.0002, 5.0));
        let status = calibrator.observe(&fix(3000.0, 28.0004, 5.0));

        let CalibrationStatus::Ready(baseline) = status else {
            panic!("expected baseline");
        };
        match baseline.reference {
            Reference::Geo { latitude, .. } => assert!((latitude - 28.0002).abs() < 1e-9),
            _ => panic!("expected geo reference"),
        }
        assert_eq!(baseline.sample_count, 3);
        assert_eq!(baseline.confidence, CalibrationConfidence::Full);
    }

    #[test]
    fn test_gps_calibrator_falls_back_to_best_fix() {
        let config = GpsCalibrationConfig {
            target_fixes: 3,
            max_attempts: 4,
            accuracy_threshold_m: 10.0,
        };
        let mut calibrator = GpsCalibrator::new(config);
        let mut last = CalibrationStatus::Collecting {
            collected: 0,
            total: 3,
        };
        for (i, accuracy) in [40.0, 25.0, 60.0, 30.0].into_iter().enumerate() {
            last = calibrator.observe(&fix(i as f64 * 1000.0, 28.0 + i as f64, accuracy));
        }

        let CalibrationStatus::Ready(baseline) = last else {
            panic!("max attempts must force a baseline");
        };
        assert_eq!(baseline.confidence, CalibrationConfidence::Fallback);
        assert_eq!(baseline.scale, 25.0);
        assert_eq!(
            baseline.reference,
            Reference::Geo {
                latitude: 29.0,
                longitude: 77.0
            }
        );
    }

    #[test]
    fn test_gps_calibrator_single_qualifying_fix_is_degraded() {
        let config = GpsCalibrationConfig {
            target_fixes: 3,
            max_attempts: 3,
            accuracy_threshold_m: 10.0,
        };
        let mut calibrator = GpsCalibrator::new(config);
        calibrator.observe(&fix(0.0, 28.0, 40.0));
        calibrator.observe(&fix(1.0, 28.0, 5.0));
        let status = calibrator.observe(&fix(2.0, 28.0, 40.0));
        let CalibrationStatus::Ready(baseline) = status else {
            panic!("expected baseline");
        };
        assert_eq!(baseline.confidence, CalibrationConfidence::Degraded);
    }
}

// src/config.rs

use crate::types::{BodyScaleConfig, Config, GpsCalibrationConfig, MarginSchedule};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would make a detector meaningless
    /// (zero-length laps, empty calibration windows and the like).
    pub fn validate(&self) -> Result<()> {
        let jump = &self.jump;
        if jump.calibration_frames == 0 {
            bail!("jump.calibration_frames must be at least 1");
        }
        if jump.takeoff_rise_fraction <= 0.0 {
            bail!("jump.takeoff_rise_fraction must be positive");
        }
        if jump.stability_window == 0 {
            bail!("jump.stability_window must be at least 1");
        }
        validate_margins("jump.landing_margins", &jump.landing_margins)?;
        validate_body("jump.body", &jump.body)?;

        let shuttle = &self.shuttle_run;
        validate_gps("shuttle_run.calibration", &shuttle.calibration)?;
        if shuttle.lap_length_m <= 0.0 {
            bail!("shuttle_run.lap_length_m must be positive");
        }
        if shuttle.total_laps == 0 {
            bail!("shuttle_run.total_laps must be at least 1");
        }
        if !(0.0..=180.0).contains(&shuttle.reversal_threshold_deg) {
            bail!("shuttle_run.reversal_threshold_deg must be within 0..=180");
        }
        if shuttle.reversal_confirm_fixes == 0 {
            bail!("shuttle_run.reversal_confirm_fixes must be at least 1");
        }
        if !(0.0..shuttle.lap_length_m).contains(&shuttle.final_leg_tolerance_m) {
            bail!("shuttle_run.final_leg_tolerance_m must be within 0..lap_length_m");
        }

        let timed = &self.timed_run;
        validate_gps("timed_run.calibration", &timed.calibration)?;
        if timed.target_distance_m <= 0.0 {
            bail!("timed_run.target_distance_m must be positive");
        }
        if timed.calibration_window_ms < 0.0 || timed.checkpoint_interval_m < 0.0 {
            bail!("timed_run windows and intervals cannot be negative");
        }

        let throw = &self.throw;
        if throw.min_trajectory_points < 3 {
            bail!("throw.min_trajectory_points must be at least 3");
        }
        if throw.max_trajectory_points < throw.min_trajectory_points {
            bail!("throw.max_trajectory_points must be >= min_trajectory_points");
        }
        if throw.default_cm_per_px <= 0.0 {
            bail!("throw.default_cm_per_px must be positive");
        }
        validate_body("throw.body", &throw.body)?;

        Ok(())
    }
}

fn validate_gps(section: &str, gps: &GpsCalibrationConfig) -> Result<()> {
    if gps.target_fixes == 0 {
        bail!("{section}.target_fixes must be at least 1");
    }
    if gps.max_attempts < gps.target_fixes {
        bail!("{section}.max_attempts must be >= target_fixes");
    }
    if gps.accuracy_threshold_m <= 0.0 {
        bail!("{section}.accuracy_threshold_m must be positive");
    }
    Ok(())
}

fn validate_body(section: &str, body: &BodyScaleConfig) -> Result<()> {
    if body.frame_width_px <= 0.0 || body.frame_height_px <= 0.0 {
        bail!("{section} frame dimensions must be positive");
    }
    if body.athlete_height_cm <= 0.0 {
        bail!("{section}.athlete_height_cm must be positive");
    }
    if body.min_cm_per_px <= 0.0 || body.max_cm_per_px < body.min_cm_per_px {
        bail!("{section} cm-per-px range is empty");
    }
    Ok(())
}

fn validate_margins(section: &str, schedule: &MarginSchedule) -> Result<()> {
    if !(schedule.loosest > 0.0) {
        bail!("{section}.loosest must be positive");
    }
    let mut last = 0.0;
    for tier in &schedule.tiers {
        if tier.margin < last {
            bail!("{section} tiers must widen over time");
        }
        last = tier.margin;
    }
    if schedule.loosest < last {
        bail!("{section}.loosest must be the widest margin");
    }
    Ok(())
}

// src/main.rs

use anyhow::Result;
use motion_event_detection::pipeline::{
    EngineMetrics, FeedbackDispatcher, JsonlResultSink, LogHapticSink,
};
use motion_event_detection::replay::{ReplayDriver, ReplaySource};
use motion_event_detection::types::Config;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var("MOTION_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config_found = Path::new(&config_path).exists();
    let config = if config_found {
        Config::load(&config_path)?
    } else {
        Config::default()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("motion_event_detection={}", config.logging.level))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🏃 Motion Event Detection Engine starting");
    if config_found {
        info!("✓ Configuration loaded from {}", config_path);
    } else {
        warn!("⚠️  {} not found, running with defaults", config_path);
    }
    info!(
        "Tests: jump calib={} frames, shuttle {}×{:.0}m, timed run {:.0}m",
        config.jump.calibration_frames,
        config.shuttle_run.total_laps,
        config.shuttle_run.lap_length_m,
        config.timed_run.target_distance_m
    );

    let source = ReplaySource::new(config.replay.clone());
    let recordings = source.find_recordings()?;
    if recordings.is_empty() {
        error!("No recordings found in {}", config.replay.input_dir);
        return Ok(());
    }

    let metrics = EngineMetrics::new();
    let feedback = FeedbackDispatcher::spawn(
        Arc::new(LogHapticSink),
        config.feedback.clone(),
        metrics.clone(),
    );
    let sink = JsonlResultSink::timestamped(&config.replay.output_dir)?;
    info!("💾 Results → {}", sink.path().display());

    for (idx, path) in recordings.iter().enumerate() {
        info!("========================================");
        info!(
            "Replaying {}/{}: {}",
            idx + 1,
            recordings.len(),
            path.display()
        );

        let records = match ReplaySource::read_records(path) {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to read recording: {:#}", e);
                continue;
            }
        };

        let driver = ReplayDriver::new(&config, metrics.clone(), Some(&feedback), &sink);
        match driver.run(records) {
            Ok(stats) => {
                info!("✓ Recording replayed");
                info!("  Records: {}", stats.records);
                info!("  Events: {}", stats.events);
                info!(
                    "  Sessions: {} ({} succeeded)",
                    stats.results.len(),
                    stats.succeeded()
                );
                if stats.orphan_samples > 0 {
                    warn!("  ⚠️  Samples outside a session: {}", stats.orphan_samples);
                }
                for result in &stats.results {
                    match (&result.metric, result.failure_reason) {
                        (Some(metric), _) => info!("  ✅ {}: {:?}", result.test_kind.as_str(), metric),
                        (None, Some(reason)) => warn!(
                            "  ❌ {}: {}",
                            result.test_kind.as_str(),
                            reason.description()
                        ),
                        (None, None) => {}
                    }
                }
            }
            Err(e) => error!("Failed to replay recording: {:#}", e),
        }
    }

    feedback.shutdown().await;
    info!("📊 {}", serde_json::to_string(&metrics.summary())?);
    Ok(())
}

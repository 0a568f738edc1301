// src/pipeline/metrics.rs
//
// Engine counters. Cheap to clone and share with the feedback task;
// summarized to the log when a replay run finishes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct EngineMetrics {
    pub samples_received: Arc<AtomicU64>,
    pub samples_stale: Arc<AtomicU64>,
    pub samples_wrong_kind: Arc<AtomicU64>,
    pub events_emitted: Arc<AtomicU64>,
    pub sessions_started: Arc<AtomicU64>,
    pub sessions_succeeded: Arc<AtomicU64>,
    pub sessions_failed: Arc<AtomicU64>,
    pub haptic_pulses_sent: Arc<AtomicU64>,
    pub haptic_pulses_dropped: Arc<AtomicU64>,
    pub results_persisted: Arc<AtomicU64>,
    pub observe_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            samples_received: Arc::new(AtomicU64::new(0)),
            samples_stale: Arc::new(AtomicU64::new(0)),
            samples_wrong_kind: Arc::new(AtomicU64::new(0)),
            events_emitted: Arc::new(AtomicU64::new(0)),
            sessions_started: Arc::new(AtomicU64::new(0)),
            sessions_succeeded: Arc::new(AtomicU64::new(0)),
            sessions_failed: Arc::new(AtomicU64::new(0)),
            haptic_pulses_sent: Arc::new(AtomicU64::new(0)),
            haptic_pulses_dropped: Arc::new(AtomicU64::new(0)),
            results_persisted: Arc::new(AtomicU64::new(0)),
            observe_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn samples_per_sec(&self) -> f64 {
        let samples = self.samples_received.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            samples as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            samples_received: self.samples_received.load(Ordering::Relaxed),
            samples_per_sec: self.samples_per_sec(),
            samples_stale: self.samples_stale.load(Ordering::Relaxed),
            samples_wrong_kind: self.samples_wrong_kind.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_succeeded: self.sessions_succeeded.load(Ordering::Relaxed),
            sessions_failed: self.sessions_failed.load(Ordering::Relaxed),
            haptic_pulses_sent: self.haptic_pulses_sent.load(Ordering::Relaxed),
            haptic_pulses_dropped: self.haptic_pulses_dropped.load(Ordering::Relaxed),
            results_persisted: self.results_persisted.load(Ordering::Relaxed),
            last_observe_us: self.observe_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub samples_received: u64,
    pub samples_per_sec: f64,
    pub samples_stale: u64,
    pub samples_wrong_kind: u64,
    pub events_emitted: u64,
    pub sessions_started: u64,
    pub sessions_succeeded: u64,
    pub sessions_failed: u64,
    pub haptic_pulses_sent: u64,
    pub haptic_pulses_dropped: u64,
    pub results_persisted: u64,
    pub last_observe_us: u64,
    pub elapsed_secs: f64,
}

// src/pipeline/feedback.rs
//
// Haptic feedback off the detection path. Events are mapped to pulses and
// pushed onto an unbounded channel; a spawned task drives the sink. Sending
// never blocks, so a slow motor cannot stall sample processing.

use crate::pipeline::metrics::EngineMetrics;
use crate::pipeline::sinks::HapticSink;
use crate::types::{FeedbackConfig, TestEvent};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PulseKind {
    Tick,
    Milestone,
    Success,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HapticPulse {
    pub kind: PulseKind,
    pub duration_ms: u32,
    pub message: String,
}

impl HapticPulse {
    pub fn for_event(event: &TestEvent, config: &FeedbackConfig) -> Option<Self> {
        let (kind, message) = match event {
            TestEvent::CalibrationComplete { .. } => (PulseKind::Tick, "Ready".to_string()),
            TestEvent::Landing { .. } => (PulseKind::Tick, "Landed".to_string()),
            TestEvent::BallReleased { .. } => (PulseKind::Tick, "Released".to_string()),
            TestEvent::LapComplete { lap_index } => {
                (PulseKind::Milestone, format!("Lap {lap_index}"))
            }
            TestEvent::DirectionChangeRequired { .. } => {
                (PulseKind::Milestone, "Turn around".to_string())
            }
            TestEvent::DirectionChangeDetected { .. } => (PulseKind::Tick, "Go".to_string()),
            TestEvent::MilestoneReached { distance_m } => {
                (PulseKind::Milestone, format!("{distance_m:.0}m"))
            }
            TestEvent::TestComplete { .. } => (PulseKind::Success, "Complete".to_string()),
            TestEvent::Takeoff { .. } => return None,
        };
        let duration_ms = match kind {
            PulseKind::Tick => config.tick_pulse_ms,
            PulseKind::Milestone => config.milestone_pulse_ms,
            PulseKind::Success => config.success_pulse_ms,
        };
        Some(Self {
            kind,
            duration_ms,
            message,
        })
    }
}

pub struct FeedbackDispatcher {
    config: FeedbackConfig,
    tx: mpsc::UnboundedSender<HapticPulse>,
    handle: JoinHandle<()>,
    metrics: EngineMetrics,
}

impl FeedbackDispatcher {
    /// Must be called from inside a tokio runtime.
    pub fn spawn(sink: Arc<dyn HapticSink>, config: FeedbackConfig, metrics: EngineMetrics) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<HapticPulse>();
        let task_metrics = metrics.clone();
        let handle = tokio::spawn(async move {
            while let Some(pulse) = rx.recv().await {
                sink.pulse(&pulse);
                task_metrics.inc(&task_metrics.haptic_pulses_sent);
            }
            debug!("📳 Feedback channel closed");
        });
        Self {
            config,
            tx,
            handle,
            metrics,
        }
    }

    /// Queues a pulse for every event that has one. Returns how many were queued.
    pub fn dispatch(&self, events: &[TestEvent]) -> usize {
        if !self.config.enabled {
            return 0;
        }
        let mut queued = 0;
        for pulse in events
            .iter()
            .filter_map(|e| HapticPulse::for_event(e, &self.config))
        {
            if self.tx.send(pulse).is_err() {
                self.metrics.inc(&self.metrics.haptic_pulses_dropped);
                warn!("📳 Feedback task gone, pulse dropped");
            } else {
                queued += 1;
            }
        }
        queued
    }

    /// Closes the channel and waits for queued pulses to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            warn!("📳 Feedback task ended abnormally: {}", e);
        }
    }
}

// src/pipeline/session.rs
//
// One test attempt. Owns the detector for the chosen test kind, filters
// out-of-order and wrong-kind samples, and produces the final result when
// the attempt ends, naturally or by cancellation.

use crate::analysis::jump_detector::HorizontalJumpDetector;
use crate::analysis::shuttle_run::ShuttleRunDetector;
use crate::analysis::throw_detector::MedicineBallThrowDetector;
use crate::analysis::timed_run::TimedRunDetector;
use crate::pipeline::metrics::EngineMetrics;
use crate::types::{
    CalibrationConfidence, Config, FailureReason, Metric, Sample, SessionResult, TestEvent,
    TestKind,
};
use anyhow::Result;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub enum Detector {
    Jump(HorizontalJumpDetector),
    ShuttleRun(ShuttleRunDetector),
    TimedRun(TimedRunDetector),
    Throw(MedicineBallThrowDetector),
}

impl Detector {
    pub fn for_kind(kind: TestKind, config: &Config) -> Self {
        match kind {
            TestKind::HorizontalJump => Self::Jump(HorizontalJumpDetector::new(config.jump.clone())),
            TestKind::ShuttleRun => {
                Self::ShuttleRun(ShuttleRunDetector::new(config.shuttle_run.clone()))
            }
            TestKind::TimedRun => Self::TimedRun(TimedRunDetector::new(config.timed_run.clone())),
            TestKind::MedicineBallThrow => {
                Self::Throw(MedicineBallThrowDetector::new(config.throw.clone()))
            }
        }
    }

    /// None when the sample is the wrong modality for this detector
    pub fn observe(&mut self, sample: &Sample) -> Option<Vec<TestEvent>> {
        match (self, sample) {
            (Self::Jump(d), Sample::Landmarks(frame)) => Some(d.observe(frame)),
            (Self::Throw(d), Sample::Landmarks(frame)) => Some(d.observe(frame)),
            (Self::ShuttleRun(d), Sample::Position(fix)) => Some(d.observe(fix)),
            (Self::TimedRun(d), Sample::Position(fix)) => Some(d.observe(fix)),
            _ => None,
        }
    }

    pub fn state_label(&self) -> &'static str {
        match self {
            Self::Jump(d) => d.state().as_str(),
            Self::ShuttleRun(d) => d.state().as_str(),
            Self::TimedRun(d) => d.state().as_str(),
            Self::Throw(d) => d.state().as_str(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Jump(d) => d.is_terminal(),
            Self::ShuttleRun(d) => d.is_terminal(),
            Self::TimedRun(d) => d.is_terminal(),
            Self::Throw(d) => d.is_terminal(),
        }
    }

    /// Closes out detectors whose result is only known at the end
    pub fn finish(&mut self) {
        if let Self::Throw(d) = self {
            d.finish();
        }
    }

    pub fn outcome(&self) -> Result<Metric, FailureReason> {
        match self {
            Self::Jump(d) => d.outcome(),
            Self::ShuttleRun(d) => d.outcome(),
            Self::TimedRun(d) => d.outcome(),
            Self::Throw(d) => d.outcome(),
        }
    }

    pub fn calibration_confidence(&self) -> Option<CalibrationConfidence> {
        match self {
            Self::Jump(d) => d.calibration_confidence(),
            Self::ShuttleRun(d) => d.calibration_confidence(),
            Self::TimedRun(d) => d.calibration_confidence(),
            Self::Throw(d) => d.calibration_confidence(),
        }
    }

    pub fn completed_at_ms(&self) -> Option<f64> {
        match self {
            Self::Jump(d) => d.completed_at_ms(),
            Self::ShuttleRun(d) => d.completed_at_ms(),
            Self::TimedRun(d) => d.completed_at_ms(),
            Self::Throw(d) => d.completed_at_ms(),
        }
    }
}

pub struct TestSession {
    id: Uuid,
    kind: TestKind,
    config: Config,
    detector: Detector,
    last_timestamp_ms: Option<f64>,
    result: Option<SessionResult>,
    metrics: EngineMetrics,
}

/// Validates `config` and opens a session with its own counters.
pub fn start_session(kind: TestKind, config: &Config) -> Result<TestSession> {
    TestSession::new(kind, config, EngineMetrics::new())
}

impl TestSession {
    pub fn new(kind: TestKind, config: &Config, metrics: EngineMetrics) -> Result<Self> {
        config.validate()?;
        let id = Uuid::new_v4();
        metrics.inc(&metrics.sessions_started);
        info!("🎬 Session {} started: {}", id, kind.as_str());
        Ok(Self {
            id,
            kind,
            detector: Detector::for_kind(kind, config),
            config: config.clone(),
            last_timestamp_ms: None,
            result: None,
            metrics,
        })
    }

    pub fn observe(&mut self, sample: &Sample) -> Vec<TestEvent> {
        if self.result.is_some() {
            debug!("Session {} already closed, sample ignored", self.id);
            return Vec::new();
        }
        self.metrics.inc(&self.metrics.samples_received);

        let timestamp = sample.timestamp_ms();
        let stale = !timestamp.is_finite()
            || self.last_timestamp_ms.is_some_and(|last| timestamp <= last);
        if stale {
            self.metrics.inc(&self.metrics.samples_stale);
            debug!(
                "⏪ Out-of-order sample at {:.0}ms (last {:?}), dropped",
                timestamp, self.last_timestamp_ms
            );
            return Vec::new();
        }

        let started = Instant::now();
        let Some(events) = self.detector.observe(sample) else {
            self.metrics.inc(&self.metrics.samples_wrong_kind);
            debug!("Sample modality does not match {}, skipped", self.kind.as_str());
            return Vec::new();
        };
        self.last_timestamp_ms = Some(timestamp);

        self.metrics
            .set_timing(&self.metrics.observe_time_us, started.elapsed().as_micros() as u64);
        self.metrics
            .add(&self.metrics.events_emitted, events.len() as u64);
        events
    }

    /// Ends the attempt and returns its result. Idempotent: later calls
    /// return the same result.
    pub fn terminate(&mut self) -> SessionResult {
        if let Some(result) = &self.result {
            return result.clone();
        }

        self.detector.finish();
        let result = SessionResult::from_outcome(
            self.id,
            self.kind,
            self.detector.outcome(),
            self.detector.state_label(),
            self.detector.calibration_confidence(),
        );

        if result.success {
            self.metrics.inc(&self.metrics.sessions_succeeded);
            info!(
                "✓ Session {} ({}) succeeded: {:?}",
                self.id,
                self.kind.as_str(),
                result.metric
            );
        } else {
            self.metrics.inc(&self.metrics.sessions_failed);
            let guidance = result
                .failure_reason
                .map(|r| r.description())
                .unwrap_or_default();
            warn!(
                "✗ Session {} ({}) ended in {}: {:?} - {}",
                self.id,
                self.kind.as_str(),
                result.last_state,
                result.failure_reason,
                guidance
            );
        }

        self.result = Some(result.clone());
        result
    }

    /// Discards all progress and starts a fresh attempt of the same test
    pub fn reset(&mut self) {
        self.id = Uuid::new_v4();
        self.detector = Detector::for_kind(self.kind, &self.config);
        self.last_timestamp_ms = None;
        self.result = None;
        self.metrics.inc(&self.metrics.sessions_started);
        info!("🔄 Session reset, new attempt {}", self.id);
    }

    /// Sample time after which a finished session may be torn down
    pub fn teardown_deadline_ms(&self) -> Option<f64> {
        let grace = match self.kind {
            TestKind::ShuttleRun => self.config.shuttle_run.teardown_grace_ms,
            TestKind::TimedRun => self.config.timed_run.teardown_grace_ms,
            TestKind::HorizontalJump | TestKind::MedicineBallThrow => 0.0,
        };
        self.detector.completed_at_ms().map(|t| t + grace)
    }

    pub fn should_teardown(&self, now_ms: f64) -> bool {
        self.teardown_deadline_ms()
            .is_some_and(|deadline| now_ms >= deadline)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> TestKind {
        self.kind
    }

    pub fn state_label(&self) -> &'static str {
        self.detector.state_label()
    }

    pub fn is_finished(&self) -> bool {
        self.detector.is_terminal()
    }

    pub fn is_closed(&self) -> bool {
        self.result.is_some()
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }
}

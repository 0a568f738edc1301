// src/pipeline/mod.rs

pub mod feedback;
pub mod metrics;
pub mod session;
pub mod sinks;

pub use feedback::{FeedbackDispatcher, HapticPulse, PulseKind};
pub use metrics::{EngineMetrics, MetricsSummary};
pub use session::{start_session, Detector, TestSession};
pub use sinks::{HapticSink, JsonlResultSink, LogHapticSink, ResultSink};

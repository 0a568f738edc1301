// src/lib.rs
//
// Motion event detection for field fitness tests.
//
// Signal flow:
//   LandmarkFrame ─→ jump_detector / throw_detector ─┐
//   PositionFix   ─→ shuttle_run / timed_run ────────┼→ TestEvent* → FeedbackDispatcher
//                                                    └→ SessionResult → ResultSink
//
// Orchestrated per attempt by pipeline::TestSession.

pub mod analysis;
pub mod config;
pub mod pipeline;
pub mod replay;
pub mod types;

pub use pipeline::{start_session, TestSession};
pub use types::{Config, Sample, SessionResult, TestEvent, TestKind};

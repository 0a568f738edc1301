// src/replay.rs
//
// Offline driver. Recorded sessions are JSONL files, one tagged record per
// line:
//
//   {"type":"start","test":"shuttle_run"}
//   {"type":"position","timestamp_ms":0,"latitude":..,"longitude":..,"accuracy_m":4}
//   {"type":"landmarks","timestamp_ms":33,"landmarks":{"nose":{"x":0.5,"y":0.2}}}
//   {"type":"reset"}
//   {"type":"stop"}
//
// Each start..stop span is fed through a TestSession and its result persisted.

use crate::pipeline::feedback::FeedbackDispatcher;
use crate::pipeline::metrics::EngineMetrics;
use crate::pipeline::session::TestSession;
use crate::pipeline::sinks::ResultSink;
use crate::types::{Config, LandmarkFrame, PositionFix, ReplayConfig, Sample, SessionResult, TestKind};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayRecord {
    Start { test: TestKind },
    Landmarks(LandmarkFrame),
    Position(PositionFix),
    Reset,
    Stop,
}

impl ReplayRecord {
    pub fn into_sample(self) -> Option<Sample> {
        match self {
            Self::Landmarks(frame) => Some(Sample::Landmarks(frame)),
            Self::Position(fix) => Some(Sample::Position(fix)),
            Self::Start { .. } | Self::Reset | Self::Stop => None,
        }
    }
}

pub struct ReplaySource {
    config: ReplayConfig,
}

impl ReplaySource {
    pub fn new(config: ReplayConfig) -> Self {
        Self { config }
    }

    pub fn find_recordings(&self) -> Result<Vec<PathBuf>> {
        let mut recordings: Vec<PathBuf> = WalkDir::new(&self.config.input_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl"))
            })
            .collect();
        recordings.sort();

        info!("Found {} recording(s)", recordings.len());
        Ok(recordings)
    }

    pub fn read_records(path: &Path) -> Result<Vec<ReplayRecord>> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading recording {}", path.display()))?;
        parse_records(&contents).with_context(|| format!("parsing {}", path.display()))
    }
}

pub fn parse_records(contents: &str) -> Result<Vec<ReplayRecord>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", i + 1))
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct ReplayStats {
    pub records: usize,
    pub orphan_samples: usize,
    pub events: usize,
    pub results: Vec<SessionResult>,
}

impl ReplayStats {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}

pub struct ReplayDriver<'a> {
    config: &'a Config,
    metrics: EngineMetrics,
    feedback: Option<&'a FeedbackDispatcher>,
    sink: &'a dyn ResultSink,
}

impl<'a> ReplayDriver<'a> {
    pub fn new(
        config: &'a Config,
        metrics: EngineMetrics,
        feedback: Option<&'a FeedbackDispatcher>,
        sink: &'a dyn ResultSink,
    ) -> Self {
        Self {
            config,
            metrics,
            feedback,
            sink,
        }
    }

    pub fn run(&self, records: impl IntoIterator<Item = ReplayRecord>) -> Result<ReplayStats> {
        let mut stats = ReplayStats::default();
        let mut session: Option<TestSession> = None;

        for record in records {
            stats.records += 1;
            match record {
                ReplayRecord::Start { test } => {
                    if let Some(mut previous) = session.take() {
                        warn!("Start without stop, closing session {}", previous.id());
                        self.close(&mut previous, &mut stats)?;
                    }
                    session = Some(TestSession::new(test, self.config, self.metrics.clone())?);
                }
                ReplayRecord::Reset => match session.as_mut() {
                    Some(active) => active.reset(),
                    None => warn!("Reset with no active session ignored"),
                },
                ReplayRecord::Stop => match session.take() {
                    Some(mut active) => self.close(&mut active, &mut stats)?,
                    None => warn!("Stop with no active session ignored"),
                },
                other => {
                    let Some(sample) = other.into_sample() else {
                        continue;
                    };
                    let Some(active) = session.as_mut() else {
                        stats.orphan_samples += 1;
                        debug!("Sample outside a session skipped");
                        continue;
                    };
                    let events = active.observe(&sample);
                    stats.events += events.len();
                    for event in &events {
                        debug!("📣 {:?}", event);
                    }
                    if let Some(feedback) = self.feedback {
                        feedback.dispatch(&events);
                    }
                    if active.should_teardown(sample.timestamp_ms()) {
                        debug!("Teardown grace elapsed for {}", active.id());
                        if let Some(mut done) = session.take() {
                            self.close(&mut done, &mut stats)?;
                        }
                    }
                }
            }
        }

        if let Some(mut active) = session.take() {
            warn!("Recording ended mid-session, cancelling {}", active.id());
            self.close(&mut active, &mut stats)?;
        }
        Ok(stats)
    }

    fn close(&self, session: &mut TestSession, stats: &mut ReplayStats) -> Result<()> {
        let result = session.terminate();
        self.sink.persist(&result)?;
        self.metrics.inc(&self.metrics.results_persisted);
        stats.results.push(result);
        Ok(())
    }
}

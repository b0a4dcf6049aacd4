//! Recorded frame streams driven through the full decision pipeline.
//!
//! Each line of a replay file is one frame:
//! `{"at_ms": 120, "embedding": [..], "detection_confidence": 0.97}`.
//! `at_ms` is an offset from the start of the recording and must not
//! decrease. A line without `embedding` is a frame with no face and only
//! advances the clock.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use facegate_core::faces::{EmbeddingVector, FaceDetection, FaceEmbeddingProvider, MatchOutcome};
use facegate_core::{
    ActuatorStatus, CooldownReason, FaceGate, GateOutcome, GateStage, LockEvent, LockState,
    UnlockActuator,
};
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::errors::{AppError, AppResult};
use crate::faces::open_database;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordedFrame {
    pub at_ms: u64,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub detection_confidence: Option<f64>,
}

pub fn parse_frames(contents: &str, path: &Path) -> AppResult<Vec<RecordedFrame>> {
    let mut frames: Vec<RecordedFrame> = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let frame: RecordedFrame =
            serde_json::from_str(line).map_err(|err| AppError::InvalidProbeFile {
                path: path.to_path_buf(),
                message: format!("line {}: {err}", index + 1),
            })?;
        if let Some(previous) = frames.last() {
            if frame.at_ms < previous.at_ms {
                return Err(AppError::InvalidProbeFile {
                    path: path.to_path_buf(),
                    message: format!(
                        "line {}: at_ms {} is earlier than the previous frame ({})",
                        index + 1,
                        frame.at_ms,
                        previous.at_ms
                    ),
                });
            }
        }
        frames.push(frame);
    }
    Ok(frames)
}

/// Treats recorded frames as already-extracted detections.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordedFrameProvider;

impl FaceEmbeddingProvider for RecordedFrameProvider {
    type Frame = RecordedFrame;

    fn extract(&self, frame: &RecordedFrame) -> AppResult<Option<FaceDetection>> {
        let Some(values) = &frame.embedding else {
            return Ok(None);
        };
        Ok(Some(FaceDetection {
            embedding: EmbeddingVector::new(values.clone())?,
            detection_confidence: frame.detection_confidence.unwrap_or(1.0),
        }))
    }
}

/// Stands in for the lock hardware: logs each request and optionally fails.
#[derive(Debug, Default)]
pub struct LoggingActuator {
    fail: bool,
    calls: u32,
}

impl LoggingActuator {
    pub fn new(fail: bool) -> Self {
        Self { fail, calls: 0 }
    }

    pub fn calls(&self) -> u32 {
        self.calls
    }
}

impl UnlockActuator for LoggingActuator {
    fn perform_unlock(&mut self) -> AppResult<ActuatorStatus> {
        self.calls += 1;
        tracing::info!(target: "facegate.replay", call = self.calls, "unlock requested");
        if self.fail {
            return Err(AppError::ActuatorFailure {
                message: "simulated actuator failure".into(),
            });
        }
        Ok(ActuatorStatus::Completed)
    }
}

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub frames: PathBuf,
    pub actuator_fails: bool,
    pub settings: Settings,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub at_ms: u64,
    pub stage: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub state: LockState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayOutcome {
    pub frames: Vec<FrameReport>,
    pub unlock_calls: u32,
    pub final_state: LockState,
}

pub fn run_replay(config: &ReplayConfig) -> AppResult<ReplayOutcome> {
    let contents = fs::read_to_string(&config.frames).map_err(|source| AppError::ProbeRead {
        path: config.frames.clone(),
        source,
    })?;
    let frames = parse_frames(&contents, &config.frames)?;

    let settings = &config.settings;
    let (database, _store) = open_database(&settings.store_path, settings.embedding_dimension)?;
    tracing::info!(
        target: "facegate.replay",
        frames = frames.len(),
        records = database.len(),
        "starting replay"
    );

    let mut gate = FaceGate::new(Arc::new(database), settings.gate);
    let mut actuator = LoggingActuator::new(config.actuator_fails);
    let provider = RecordedFrameProvider;
    let start = Instant::now();

    let mut reports = Vec::with_capacity(frames.len());
    for frame in &frames {
        let at = start
            .checked_add(Duration::from_millis(frame.at_ms))
            .ok_or_else(|| AppError::InvalidProbeFile {
                path: config.frames.clone(),
                message: format!("at_ms {} is out of range", frame.at_ms),
            })?;
        let outcome = gate.process_frame(&provider, frame, at, &mut actuator)?;
        let report = frame_report(frame.at_ms, outcome, gate.state());
        reports.push(report);
    }

    Ok(ReplayOutcome {
        frames: reports,
        unlock_calls: actuator.calls(),
        final_state: gate.state(),
    })
}

fn frame_report(at_ms: u64, outcome: GateOutcome, state: LockState) -> FrameReport {
    let mut report = FrameReport {
        at_ms,
        stage: "no_face",
        elapsed: outcome.elapsed.as_ref().map(describe_event),
        outcome: None,
        similarity: None,
        confidence: None,
        event: None,
        state,
    };
    match outcome.stage {
        GateStage::NoFace => {}
        GateStage::Skipped { .. } => report.stage = "skipped",
        GateStage::Idle { .. } => report.stage = "idle",
        GateStage::Pending { verdict, .. } => {
            report.stage = "pending";
            report.outcome = Some(describe_verdict(&verdict.outcome));
            report.similarity = Some(verdict.similarity);
        }
        GateStage::Decided {
            verdict,
            decision,
            event,
        } => {
            report.stage = "decided";
            report.outcome = Some(describe_verdict(&verdict.outcome));
            report.similarity = Some(verdict.similarity);
            report.confidence = Some(decision.confidence);
            report.event = Some(describe_event(&event));
        }
    }
    report
}

fn describe_verdict(outcome: &MatchOutcome) -> String {
    match outcome {
        MatchOutcome::Allowed(label) => format!("allowed:{label}"),
        MatchOutcome::Denied(label) => format!("denied:{label}"),
        MatchOutcome::Unknown => "unknown".into(),
    }
}

pub fn describe_event(event: &LockEvent) -> String {
    match event {
        LockEvent::Ignored { state } => format!("ignored ({state})"),
        LockEvent::AttemptRejected {
            failures,
            max_attempts,
        } => format!("attempt rejected ({failures}/{max_attempts})"),
        LockEvent::UnlockPending => "unlock pending".into(),
        LockEvent::Unlocked => "unlocked".into(),
        LockEvent::CooldownStarted { reason, .. } => {
            let reason = match reason {
                CooldownReason::TooManyAttempts => "too many attempts",
            };
            format!("cooldown started ({reason})")
        }
        LockEvent::UnlockFailed { error, .. } => format!("unlock failed: {error}"),
        LockEvent::CooldownElapsed => "cooldown elapsed".into(),
        LockEvent::Relocked { from } => format!("relocked from {from}"),
    }
}

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::errors::AppResult;
use crate::faces::database::FaceDatabase;
use crate::faces::matcher::{FaceMatcher, MatchVerdict};
use crate::faces::provider::{FaceEmbeddingProvider, FaceObservation};
use crate::session::{RecognitionDecision, RecognitionSession, SessionConfig, SessionOutput};
use crate::unlock::{LockEvent, LockState, UnlockActuator, UnlockPolicy, UnlockStateMachine};

pub const DEFAULT_MIN_DETECTION_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateConfig {
    pub matcher: FaceMatcher,
    pub session: SessionConfig,
    pub unlock: UnlockPolicy,
    pub min_detection_confidence: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            matcher: FaceMatcher::default(),
            session: SessionConfig::default(),
            unlock: UnlockPolicy::default(),
            min_detection_confidence: DEFAULT_MIN_DETECTION_CONFIDENCE,
        }
    }
}

#[derive(Debug)]
pub enum GateStage {
    /// The frame source reported no face this cycle.
    NoFace,
    /// The detector was not confident enough to match this face.
    Skipped { detection_confidence: f64 },
    /// The device is unlocking or unlocked; frames are not matched.
    Idle { state: LockState },
    Pending {
        verdict: MatchVerdict,
        samples: usize,
        required: usize,
    },
    Decided {
        verdict: MatchVerdict,
        decision: RecognitionDecision,
        event: LockEvent,
    },
}

#[derive(Debug)]
pub struct GateOutcome {
    /// Time-driven transition applied before the frame was handled.
    pub elapsed: Option<LockEvent>,
    pub stage: GateStage,
}

/// Frame source → matcher → session → unlock state machine, for one device
/// session.
#[derive(Debug)]
pub struct FaceGate {
    database: Arc<FaceDatabase>,
    config: GateConfig,
    session: RecognitionSession,
    machine: UnlockStateMachine,
}

impl FaceGate {
    pub fn new(database: Arc<FaceDatabase>, config: GateConfig) -> Self {
        Self {
            database,
            session: RecognitionSession::new(config.session),
            machine: UnlockStateMachine::new(config.unlock),
            config,
        }
    }

    pub fn database(&self) -> &Arc<FaceDatabase> {
        &self.database
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn state(&self) -> LockState {
        self.machine.state()
    }

    pub fn machine(&self) -> &UnlockStateMachine {
        &self.machine
    }

    pub fn session(&self) -> &RecognitionSession {
        &self.session
    }

    /// Runs one detected face through the pipeline.
    ///
    /// Dimension mismatches surface as errors and leave the session and lock
    /// state untouched.
    pub fn observe<A>(
        &mut self,
        observation: FaceObservation,
        actuator: &mut A,
    ) -> AppResult<GateOutcome>
    where
        A: UnlockActuator + ?Sized,
    {
        let now = observation.timestamp;
        let elapsed = self.tick(now);

        let state = self.machine.state();
        if matches!(state, LockState::Unlocking | LockState::Unlocked) {
            return Ok(GateOutcome {
                elapsed,
                stage: GateStage::Idle { state },
            });
        }

        if observation.detection_confidence < self.config.min_detection_confidence {
            debug!(
                target: "facegate.gate",
                detection_confidence = observation.detection_confidence,
                "low-confidence detection skipped"
            );
            return Ok(GateOutcome {
                elapsed,
                stage: GateStage::Skipped {
                    detection_confidence: observation.detection_confidence,
                },
            });
        }

        let verdict = self
            .config
            .matcher
            .match_probe(&observation.embedding, &self.database)?;

        let stage = match self.session.submit(verdict.clone(), now) {
            SessionOutput::Pending { samples, required } => GateStage::Pending {
                verdict,
                samples,
                required,
            },
            SessionOutput::Decided(decision) => {
                let event = self.machine.handle_decision(&decision, now, actuator);
                if event.is_terminal() {
                    self.session.reset();
                }
                log_event(&event);
                GateStage::Decided {
                    verdict,
                    decision,
                    event,
                }
            }
        };

        Ok(GateOutcome { elapsed, stage })
    }

    /// Runs `provider` over a raw frame and feeds the result, if any, through
    /// [`FaceGate::observe`]. A frame without a face only advances time.
    pub fn process_frame<P, A>(
        &mut self,
        provider: &P,
        frame: &P::Frame,
        timestamp: Instant,
        actuator: &mut A,
    ) -> AppResult<GateOutcome>
    where
        P: FaceEmbeddingProvider + ?Sized,
        A: UnlockActuator + ?Sized,
    {
        match provider.extract(frame)? {
            Some(detection) => {
                self.observe(FaceObservation::from_detection(detection, timestamp), actuator)
            }
            None => Ok(GateOutcome {
                elapsed: self.tick(timestamp),
                stage: GateStage::NoFace,
            }),
        }
    }

    /// Advances time-driven transitions. Stale samples are dropped when a
    /// cooldown ends so the next attempt starts clean.
    pub fn tick(&mut self, now: Instant) -> Option<LockEvent> {
        let event = self.machine.tick(now);
        if event.is_some() {
            self.session.reset();
        }
        event
    }

    pub fn complete_unlock(&mut self, result: AppResult<()>, now: Instant) -> LockEvent {
        let event = self.machine.complete_unlock(result, now);
        log_event(&event);
        event
    }

    /// External re-lock signal.
    pub fn relock(&mut self) -> LockEvent {
        self.session.reset();
        self.machine.relock()
    }
}

fn log_event(event: &LockEvent) {
    match event {
        LockEvent::Unlocked => info!(target: "facegate.gate", "unlock granted"),
        LockEvent::UnlockFailed { error, .. } => {
            warn!(target: "facegate.gate", error = %error, "unlock failed")
        }
        LockEvent::CooldownStarted { reason, .. } => {
            warn!(target: "facegate.gate", reason = ?reason, "cooldown started")
        }
        other => debug!(target: "facegate.gate", event = ?other, "lock event"),
    }
}

//! Face-match decision engine and unlock state machine.
//!
//! Per-frame embeddings are matched against an allow-list and a deny-list,
//! aggregated over a sliding window, and turned into lock/unlock transitions.
//! Camera access, embedding extraction and the physical unlock are external
//! collaborators reached through [`faces::FaceEmbeddingProvider`] and
//! [`unlock::UnlockActuator`].

pub mod errors;
pub mod faces;
pub mod gate;
pub mod session;
pub mod unlock;

pub use errors::{AppError, AppResult};
pub use gate::{FaceGate, GateConfig, GateOutcome, GateStage, DEFAULT_MIN_DETECTION_CONFIDENCE};
pub use session::{RecognitionDecision, RecognitionSession, SessionConfig, SessionOutput};
pub use unlock::{
    ActuatorStatus, CooldownReason, LockEvent, LockState, UnlockActuator, UnlockPolicy,
    UnlockStateMachine,
};

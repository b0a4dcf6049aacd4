use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};
use crate::session::RecognitionDecision;

pub const DEFAULT_UNLOCK_CONFIDENCE_THRESHOLD: f64 = 0.7;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_ATTEMPT_WINDOW: Duration = Duration::from_secs(30);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);
/// Longest cooldown the machine schedules; longer policies are capped.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    Locked,
    Unlocking,
    Unlocked,
    Cooldown,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockState::Locked => "locked",
            LockState::Unlocking => "unlocking",
            LockState::Unlocked => "unlocked",
            LockState::Cooldown => "cooldown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnlockPolicy {
    pub unlock_confidence_threshold: f64,
    pub max_attempts: u32,
    pub attempt_window: Duration,
    pub cooldown: Duration,
}

impl Default for UnlockPolicy {
    fn default() -> Self {
        Self {
            unlock_confidence_threshold: DEFAULT_UNLOCK_CONFIDENCE_THRESHOLD,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_window: DEFAULT_ATTEMPT_WINDOW,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorStatus {
    /// The device is unlocked.
    Completed,
    /// The unlock continues asynchronously; report the result through
    /// [`UnlockStateMachine::complete_unlock`].
    InProgress,
}

/// Performs the physical unlock. Invoked at most once per lock cycle.
pub trait UnlockActuator {
    fn perform_unlock(&mut self) -> AppResult<ActuatorStatus>;
}

impl<F> UnlockActuator for F
where
    F: FnMut() -> AppResult<ActuatorStatus>,
{
    fn perform_unlock(&mut self) -> AppResult<ActuatorStatus> {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownReason {
    TooManyAttempts,
}

#[derive(Debug)]
pub enum LockEvent {
    /// The current state does not act on this input.
    Ignored { state: LockState },
    /// A failed attempt was counted; the device stays locked.
    AttemptRejected { failures: u32, max_attempts: u32 },
    /// The actuator accepted the request and will report completion later.
    UnlockPending,
    Unlocked,
    CooldownStarted {
        reason: CooldownReason,
        until: Instant,
    },
    /// The actuator failed; the machine is now in cooldown.
    UnlockFailed { error: AppError, until: Instant },
    CooldownElapsed,
    Relocked { from: LockState },
}

impl LockEvent {
    /// Whether the event ends the current recognition attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LockEvent::AttemptRejected { .. }
                | LockEvent::UnlockPending
                | LockEvent::Unlocked
                | LockEvent::CooldownStarted { .. }
                | LockEvent::UnlockFailed { .. }
        )
    }
}

/// Drives the device lock from recognition decisions.
///
/// The state is private: decisions, ticks, actuator completions and the
/// external re-lock signal are the only ways to move it.
#[derive(Debug)]
pub struct UnlockStateMachine {
    policy: UnlockPolicy,
    state: LockState,
    cooldown_until: Option<Instant>,
    failures: VecDeque<Instant>,
}

impl UnlockStateMachine {
    pub fn new(policy: UnlockPolicy) -> Self {
        Self {
            policy,
            state: LockState::Locked,
            cooldown_until: None,
            failures: VecDeque::new(),
        }
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn policy(&self) -> &UnlockPolicy {
        &self.policy
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }

    /// Failed attempts still inside the attempt window.
    pub fn failures(&self) -> u32 {
        self.failures.len() as u32
    }

    pub fn handle_decision<A>(
        &mut self,
        decision: &RecognitionDecision,
        now: Instant,
        actuator: &mut A,
    ) -> LockEvent
    where
        A: UnlockActuator + ?Sized,
    {
        self.tick(now);

        match self.state {
            LockState::Locked => {}
            state => {
                debug!(target: "facegate.unlock", %state, "decision ignored");
                return LockEvent::Ignored { state };
            }
        }

        if decision.recognized && decision.confidence >= self.policy.unlock_confidence_threshold {
            self.begin_unlock(now, actuator)
        } else {
            self.record_failure(now)
        }
    }

    /// Reports the outcome of an unlock that returned
    /// [`ActuatorStatus::InProgress`]. Ignored outside `Unlocking`.
    pub fn complete_unlock(&mut self, result: AppResult<()>, now: Instant) -> LockEvent {
        if self.state != LockState::Unlocking {
            debug!(target: "facegate.unlock", state = %self.state, "late actuator completion ignored");
            return LockEvent::Ignored { state: self.state };
        }
        match result {
            Ok(()) => self.finish_unlock(),
            Err(error) => self.fail_unlock(error, now),
        }
    }

    /// Applies time-driven transitions. Call periodically so cooldown ends
    /// even when no frames arrive.
    pub fn tick(&mut self, now: Instant) -> Option<LockEvent> {
        self.prune_failures(now);
        if self.state != LockState::Cooldown {
            return None;
        }

        match self.cooldown_until {
            Some(until) if now < until => None,
            _ => {
                self.state = LockState::Locked;
                self.cooldown_until = None;
                self.failures.clear();
                info!(target: "facegate.unlock", "cooldown elapsed; locked");
                Some(LockEvent::CooldownElapsed)
            }
        }
    }

    /// External re-lock signal, e.g. the OS locked the device again.
    pub fn relock(&mut self) -> LockEvent {
        match self.state {
            LockState::Unlocked | LockState::Unlocking => {
                let from = self.state;
                self.state = LockState::Locked;
                self.failures.clear();
                info!(target: "facegate.unlock", %from, "device re-locked");
                LockEvent::Relocked { from }
            }
            state => LockEvent::Ignored { state },
        }
    }

    fn begin_unlock<A>(&mut self, now: Instant, actuator: &mut A) -> LockEvent
    where
        A: UnlockActuator + ?Sized,
    {
        self.state = LockState::Unlocking;
        info!(target: "facegate.unlock", "recognition accepted; invoking unlock actuator");
        match actuator.perform_unlock() {
            Ok(ActuatorStatus::Completed) => self.finish_unlock(),
            Ok(ActuatorStatus::InProgress) => LockEvent::UnlockPending,
            Err(error) => self.fail_unlock(error, now),
        }
    }

    fn finish_unlock(&mut self) -> LockEvent {
        self.state = LockState::Unlocked;
        self.failures.clear();
        info!(target: "facegate.unlock", "device unlocked");
        LockEvent::Unlocked
    }

    fn fail_unlock(&mut self, error: AppError, now: Instant) -> LockEvent {
        let until = self.enter_cooldown(now);
        warn!(
            target: "facegate.unlock",
            error = %error,
            cooldown_secs = self.policy.cooldown.as_secs_f64(),
            "unlock actuator failed; entering cooldown"
        );
        LockEvent::UnlockFailed { error, until }
    }

    fn record_failure(&mut self, now: Instant) -> LockEvent {
        self.failures.push_back(now);
        let failures = self.failures();
        let max_attempts = self.policy.max_attempts.max(1);
        if failures >= max_attempts {
            let until = self.enter_cooldown(now);
            warn!(
                target: "facegate.unlock",
                failures,
                cooldown_secs = self.policy.cooldown.as_secs_f64(),
                "too many failed attempts; entering cooldown"
            );
            return LockEvent::CooldownStarted {
                reason: CooldownReason::TooManyAttempts,
                until,
            };
        }

        debug!(target: "facegate.unlock", failures, max_attempts, "attempt rejected");
        LockEvent::AttemptRejected {
            failures,
            max_attempts,
        }
    }

    fn enter_cooldown(&mut self, now: Instant) -> Instant {
        // Falls back to `now` only if the clock cannot represent the deadline.
        let until = now
            .checked_add(self.policy.cooldown.min(MAX_COOLDOWN))
            .unwrap_or(now);
        self.state = LockState::Cooldown;
        self.cooldown_until = Some(until);
        self.failures.clear();
        until
    }

    fn prune_failures(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.policy.attempt_window) else {
            return;
        };
        while self.failures.front().is_some_and(|at| *at < cutoff) {
            self.failures.pop_front();
        }
    }
}

impl Default for UnlockStateMachine {
    fn default() -> Self {
        Self::new(UnlockPolicy::default())
    }
}

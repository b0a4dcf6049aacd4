use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, trace};

use crate::faces::matcher::{MatchOutcome, MatchVerdict};

pub const DEFAULT_WINDOW: Duration = Duration::from_millis(1500);
pub const DEFAULT_MIN_SAMPLES: usize = 5;
pub const DEFAULT_AGREEMENT_RATIO: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub window: Duration,
    pub min_samples: usize,
    pub agreement_ratio: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            min_samples: DEFAULT_MIN_SAMPLES,
            agreement_ratio: DEFAULT_AGREEMENT_RATIO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionDecision {
    pub recognized: bool,
    /// In `[0, 1]`; zero whenever the window contains a deny hit.
    pub confidence: f64,
    pub window_samples: usize,
    /// Most frequent allowed label in the window, if any.
    pub identity: Option<String>,
}

impl RecognitionDecision {
    pub fn rejected(window_samples: usize) -> Self {
        Self {
            recognized: false,
            confidence: 0.0,
            window_samples,
            identity: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutput {
    /// Not enough samples inside the window yet; keep feeding frames.
    Pending { samples: usize, required: usize },
    Decided(RecognitionDecision),
}

impl SessionOutput {
    pub fn decision(&self) -> Option<&RecognitionDecision> {
        match self {
            SessionOutput::Decided(decision) => Some(decision),
            SessionOutput::Pending { .. } => None,
        }
    }
}

/// Aggregates per-frame verdicts over a sliding time window.
///
/// Decisions may repeat or flicker from one call to the next; turning them
/// into a single unlock is the state machine's job.
#[derive(Debug, Clone)]
pub struct RecognitionSession {
    config: SessionConfig,
    samples: VecDeque<(Instant, MatchVerdict)>,
}

impl RecognitionSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            samples: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn submit(&mut self, verdict: MatchVerdict, timestamp: Instant) -> SessionOutput {
        self.evict_expired(timestamp);
        self.samples.push_back((timestamp, verdict));

        let required = self.config.min_samples.max(1);
        if self.samples.len() < required {
            trace!(
                target: "facegate.session",
                samples = self.samples.len(),
                required,
                "waiting for more samples"
            );
            return SessionOutput::Pending {
                samples: self.samples.len(),
                required,
            };
        }

        let decision = self.decide();
        debug!(
            target: "facegate.session",
            recognized = decision.recognized,
            confidence = decision.confidence,
            samples = decision.window_samples,
            "window decision"
        );
        SessionOutput::Decided(decision)
    }

    /// Drops every buffered sample.
    pub fn reset(&mut self) {
        if !self.samples.is_empty() {
            trace!(target: "facegate.session", dropped = self.samples.len(), "session reset");
        }
        self.samples.clear();
    }

    fn evict_expired(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.config.window) else {
            return;
        };
        // Samples may arrive slightly out of order, so scan the whole queue.
        self.samples.retain(|(at, _)| *at >= cutoff);
    }

    fn decide(&self) -> RecognitionDecision {
        let total = self.samples.len();
        if self.samples.iter().any(|(_, verdict)| verdict.is_denied()) {
            return RecognitionDecision::rejected(total);
        }

        let mut allowed = 0usize;
        let mut similarity_sum = 0.0f64;
        let mut votes: HashMap<&str, usize> = HashMap::new();
        for (_, verdict) in &self.samples {
            if let MatchOutcome::Allowed(label) = &verdict.outcome {
                allowed += 1;
                similarity_sum += verdict.similarity;
                *votes.entry(label.as_str()).or_default() += 1;
            }
        }

        if allowed == 0 {
            return RecognitionDecision::rejected(total);
        }

        let ratio = allowed as f64 / total as f64;
        let mean_similarity = similarity_sum / allowed as f64;
        let identity = votes
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(label, _)| label.to_string());

        RecognitionDecision {
            recognized: ratio >= self.config.agreement_ratio,
            confidence: (ratio * mean_similarity).clamp(0.0, 1.0),
            window_samples: total,
            identity,
        }
    }
}

impl Default for RecognitionSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

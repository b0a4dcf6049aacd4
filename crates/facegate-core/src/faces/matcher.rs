use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::AppResult;
use crate::faces::database::{FaceDatabase, ListKind};
use crate::faces::embedding::EmbeddingVector;

pub const DEFAULT_ALLOW_THRESHOLD: f64 = 0.9;
pub const DEFAULT_DENY_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "label", rename_all = "lowercase")]
pub enum MatchOutcome {
    Allowed(String),
    Denied(String),
    Unknown,
}

/// Per-frame match result. `similarity` is in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchVerdict {
    pub outcome: MatchOutcome,
    pub similarity: f64,
}

impl MatchVerdict {
    pub fn allowed(label: impl Into<String>, similarity: f64) -> Self {
        Self {
            outcome: MatchOutcome::Allowed(label.into()),
            similarity: clamp_unit(similarity),
        }
    }

    pub fn denied(label: impl Into<String>, similarity: f64) -> Self {
        Self {
            outcome: MatchOutcome::Denied(label.into()),
            similarity: clamp_unit(similarity),
        }
    }

    pub fn unknown(similarity: f64) -> Self {
        Self {
            outcome: MatchOutcome::Unknown,
            similarity: clamp_unit(similarity),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self.outcome, MatchOutcome::Allowed(_))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self.outcome, MatchOutcome::Denied(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMatcher {
    pub allow_threshold: f64,
    pub deny_threshold: f64,
}

impl Default for FaceMatcher {
    fn default() -> Self {
        Self {
            allow_threshold: DEFAULT_ALLOW_THRESHOLD,
            deny_threshold: DEFAULT_DENY_THRESHOLD,
        }
    }
}

impl FaceMatcher {
    pub fn new(allow_threshold: f64, deny_threshold: f64) -> Self {
        Self {
            allow_threshold,
            deny_threshold,
        }
    }

    pub fn match_probe(
        &self,
        probe: &EmbeddingVector,
        database: &FaceDatabase,
    ) -> AppResult<MatchVerdict> {
        match_probe(probe, database, self.allow_threshold, self.deny_threshold)
    }
}

/// Deny list first, then allow list. A deny hit wins regardless of how well
/// the probe scores against the allow list.
///
/// On `Unknown` the reported similarity is the best allow-list score that
/// missed the threshold, or zero when the allow list is empty.
pub fn match_probe(
    probe: &EmbeddingVector,
    database: &FaceDatabase,
    allow_threshold: f64,
    deny_threshold: f64,
) -> AppResult<MatchVerdict> {
    let candidates = database.best_candidates(probe)?;
    if let Some(hit) = candidates
        .deny
        .filter(|candidate| candidate.similarity >= deny_threshold)
    {
        warn!(
            target: "facegate.matcher",
            label = %hit.label,
            similarity = hit.similarity,
            "deny-list match"
        );
        return Ok(MatchVerdict::denied(hit.label, hit.similarity));
    }

    let verdict = match candidates.allow {
        Some(best) if best.similarity >= allow_threshold => {
            MatchVerdict::allowed(best.label, best.similarity)
        }
        Some(best) => MatchVerdict::unknown(best.similarity),
        None => MatchVerdict::unknown(0.0),
    };
    debug!(
        target: "facegate.matcher",
        outcome = ?verdict.outcome,
        similarity = verdict.similarity,
        "probe matched"
    );
    Ok(verdict)
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;

    fn vector(values: &[f32]) -> EmbeddingVector {
        EmbeddingVector::new(values.to_vec()).unwrap()
    }

    fn database() -> FaceDatabase {
        let db = FaceDatabase::new();
        db.add_face(vector(&[1.0, 0.0, 0.0]), "alice").unwrap();
        db.add_face(vector(&[0.0, 1.0, 0.0]), "bob").unwrap();
        db.add_to_deny_list(vector(&[0.8, 0.6, 0.0]), "mallory").unwrap();
        db
    }

    #[test]
    fn allowed_when_only_allow_list_fires() {
        let verdict = FaceMatcher::new(0.9, 0.95)
            .match_probe(&vector(&[0.0, 1.0, 0.05]), &database())
            .unwrap();
        assert_eq!(verdict.outcome, MatchOutcome::Allowed("bob".into()));
        assert!(verdict.similarity > 0.99);
    }

    #[test]
    fn deny_wins_over_stronger_allow_match() {
        // alice scores 1.0, mallory 0.8: deny still takes precedence.
        let verdict = FaceMatcher::new(0.9, 0.75)
            .match_probe(&vector(&[1.0, 0.0, 0.0]), &database())
            .unwrap();
        assert_eq!(verdict.outcome, MatchOutcome::Denied("mallory".into()));
        assert!((verdict.similarity - 0.8).abs() < 1e-6);
    }

    #[test]
    fn unknown_reports_best_allow_score_below_threshold() {
        let verdict = FaceMatcher::new(0.99, 0.99)
            .match_probe(&vector(&[0.7, 0.7, 0.1]), &database())
            .unwrap();
        assert_eq!(verdict.outcome, MatchOutcome::Unknown);
        assert!(verdict.similarity > 0.6 && verdict.similarity < 0.99);
    }

    #[test]
    fn unknown_on_empty_database_scores_zero() {
        let verdict = FaceMatcher::default()
            .match_probe(&vector(&[1.0, 0.0]), &FaceDatabase::new())
            .unwrap();
        assert_eq!(verdict, MatchVerdict::unknown(0.0));
    }

    #[test]
    fn negative_similarity_is_clamped() {
        let db = FaceDatabase::new();
        db.add_face(vector(&[1.0, 0.0]), "alice").unwrap();
        let verdict = FaceMatcher::default()
            .match_probe(&vector(&[-1.0, 0.0]), &db)
            .unwrap();
        assert_eq!(verdict.similarity, 0.0);
    }

    #[test]
    fn probe_dimension_mismatch_propagates() {
        let err = FaceMatcher::default()
            .match_probe(&vector(&[1.0, 0.0]), &database())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidEmbedding { .. }));
    }
}

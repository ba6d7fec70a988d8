//! Confidence scores produced by the scoring oracle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Result of the Confidence Gate for one trade signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    score: f64,
    rationale: String,
    evaluated_at: DateTime<Utc>,
}

impl ConfidenceScore {
    /// Create a validated confidence score.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ScoreOutOfRange`] when `score` is not a finite
    /// value in `[0, 1]`.
    pub fn try_new(
        score: f64,
        rationale: impl Into<String>,
        evaluated_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(DomainError::ScoreOutOfRange { score });
        }
        Ok(Self {
            score,
            rationale: rationale.into(),
            evaluated_at,
        })
    }

    /// The score in `[0, 1]`.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Free-text rationale returned by the oracle.
    #[must_use]
    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    /// When the score was produced.
    #[must_use]
    pub fn evaluated_at(&self) -> DateTime<Utc> {
        self.evaluated_at
    }

    /// Return true if the score clears the given admission threshold.
    #[must_use]
    pub fn admits(&self, threshold: f64) -> bool {
        self.score >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bounds() {
        let now = Utc::now();
        assert!(ConfidenceScore::try_new(0.0, "", now).is_ok());
        assert!(ConfidenceScore::try_new(1.0, "", now).is_ok());
    }

    #[test]
    fn rejects_out_of_range_and_nan() {
        let now = Utc::now();
        assert!(ConfidenceScore::try_new(-0.01, "", now).is_err());
        assert!(ConfidenceScore::try_new(1.01, "", now).is_err());
        assert!(ConfidenceScore::try_new(f64::NAN, "", now).is_err());
    }

    #[test]
    fn threshold_is_inclusive() {
        let score = ConfidenceScore::try_new(0.7, "ok", Utc::now()).unwrap();
        assert!(score.admits(0.7));
        assert!(!score.admits(0.71));
    }
}

//! Score Evaluator

use vitals::{CriteriaSet, QSOFA_ALERT_THRESHOLD};

/// Outcome of evaluating a patient's criteria
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreAssessment {
    pub criteria: CriteriaSet,
    pub score: usize,
    pub meets_threshold: bool,
}

/// Compares the live criterion count against the alert threshold
#[derive(Debug, Clone, Copy)]
pub struct ScoreEvaluator {
    threshold: usize,
}

impl ScoreEvaluator {
    /// Create an evaluator with a custom threshold
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    /// Assess a freshly read criteria set
    pub fn assess(&self, criteria: CriteriaSet) -> ScoreAssessment {
        let score = criteria.score();
        ScoreAssessment {
            meets_threshold: score >= self.threshold,
            score,
            criteria,
        }
    }
}

impl Default for ScoreEvaluator {
    fn default() -> Self {
        Self::new(QSOFA_ALERT_THRESHOLD)
    }
}

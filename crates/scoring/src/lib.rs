//! qSOFA Scoring
//!
//! Criterion tracking with time-bounded validity and score evaluation. The
//! score is always recomputed from the keyed store, never cached in process.

mod criterion_store;
mod evaluator;

pub use criterion_store::{CriterionStore, CriterionUpdate, DEFAULT_CRITERIA_WINDOW};
pub use evaluator::{ScoreAssessment, ScoreEvaluator};

use state_store::StoreError;
use thiserror::Error;

/// Scoring errors
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Criterion store error: {0}")]
    Store(#[from] StoreError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

use super::config::EarlyStopping;
use super::error::RejectedConfiguration;
use super::metrics::EvaluationMetrics;
use crate::core::nn::params::ModelParameters;

/// Why a training run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Evaluation loss reached the target.
    Converged,
    MaxStepsReached,
    /// Evaluation loss stopped improving for `patience` evaluations.
    EarlyStopped,
    /// Too many consecutive batches produced a non-finite loss or gradient.
    AbortedOnDivergence,
    Interrupted,
    DataExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationRecord {
    pub step: u64,
    pub metrics: EvaluationMetrics,
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub status: RunStatus,
    /// Last committed parameters.
    pub parameters: ModelParameters,
    /// Batches drawn, including skipped ones.
    pub steps: u64,
    /// Committed optimizer updates.
    pub updates: u64,
    pub skipped_batches: u64,
    pub initial_evaluation: Option<EvaluationRecord>,
    pub final_evaluation: Option<EvaluationRecord>,
    pub best_evaluation: Option<EvaluationRecord>,
    pub history: Vec<EvaluationRecord>,
    pub rejected: Vec<RejectedConfiguration>,
}

/// Patience counter over evaluation losses.
#[derive(Debug, Clone)]
pub(crate) struct EarlyStoppingTracker {
    patience: usize,
    min_delta: f64,
    best: f64,
    stale: usize,
}

impl EarlyStoppingTracker {
    pub(crate) fn new(settings: EarlyStopping) -> Self {
        Self {
            patience: settings.patience,
            min_delta: settings.min_delta,
            best: f64::INFINITY,
            stale: 0,
        }
    }

    /// Records an evaluation loss; returns `true` once patience is exhausted.
    pub(crate) fn observe(&mut self, loss: f64) -> bool {
        if loss < self.best - self.min_delta {
            self.best = loss;
            self.stale = 0;
        } else {
            self.stale += 1;
        }
        self.stale >= self.patience
    }
}

use thiserror::Error;

use super::config::ConfigError;
use crate::core::models::error::InputError;
use crate::core::models::label::ConfigId;
use crate::core::neighbors::builder::NeighborError;
use crate::core::potential::error::{DressError, ModelConfigError, PredictionError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid training configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Model construction failed: {0}")]
    Model(#[from] ModelConfigError),

    #[error("Atomic energy dress could not be fitted: {0}")]
    Dress(#[from] DressError),

    #[error("The {0} dataset contains no usable configurations")]
    EmptyDataset(&'static str),

    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] PredictionError),
}

/// Why a single training step did not update the parameters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StepError {
    #[error("Every configuration in the batch was rejected")]
    EmptyBatch,

    #[error(
        "Numerical divergence on configurations {configs:?}: loss {loss}, gradient finite: {gradient_finite}"
    )]
    NumericalDivergence {
        loss: f64,
        gradient_finite: bool,
        configs: Vec<ConfigId>,
    },

    #[error(transparent)]
    Prediction(#[from] PredictionError),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RejectionReason {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Neighbors(#[from] NeighborError),
}

/// A configuration removed from training or evaluation, with the reason.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("Configuration {id} rejected: {reason}")]
pub struct RejectedConfiguration {
    pub id: ConfigId,
    pub reason: RejectionReason,
}

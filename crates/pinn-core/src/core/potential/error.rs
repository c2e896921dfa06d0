use crate::core::models::error::InputError;
use crate::core::neighbors::builder::NeighborError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelConfigError {
    #[error("Invalid model parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl ModelConfigError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredictionError {
    #[error("Configuration {index} rejected: {source}")]
    Input {
        index: usize,
        #[source]
        source: InputError,
    },

    #[error("Neighbor list for configuration {index} failed: {source}")]
    Neighbors {
        index: usize,
        #[source]
        source: NeighborError,
    },
}

impl PredictionError {
    /// Position of the offending configuration within the request.
    pub fn index(&self) -> usize {
        match self {
            PredictionError::Input { index, .. } | PredictionError::Neighbors { index, .. } => *index,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DressError {
    #[error("No energy-labeled configurations to fit atomic reference energies")]
    NoEnergyLabels,

    #[error("Least-squares solve for atomic reference energies failed: {0}")]
    Solve(&'static str),
}

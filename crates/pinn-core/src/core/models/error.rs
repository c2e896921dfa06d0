use super::configuration::Species;
use thiserror::Error;

/// Reasons a single configuration or label is rejected.
///
/// Input errors never abort a training run; the offending configuration is
/// dropped and reported with its identity.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("Atom count mismatch: {species} species but {positions} positions")]
    AtomCountMismatch { species: usize, positions: usize },

    #[error("Atom {index} has a non-finite coordinate")]
    NonFiniteCoordinate { index: usize },

    #[error("Cell matrix contains non-finite entries")]
    NonFiniteCell,

    #[error("Cell volume must be positive, got {volume}")]
    NonPositiveVolume { volume: f64 },

    #[error("Label provides {found} forces for {expected} atoms")]
    ForceCountMismatch { expected: usize, found: usize },

    #[error("Label field '{field}' contains non-finite values")]
    NonFiniteLabel { field: &'static str },

    #[error("Stress label given for a non-periodic configuration")]
    StressWithoutCell,

    #[error("Species {0} is not one of the model's atom types")]
    UnknownSpecies(Species),
}

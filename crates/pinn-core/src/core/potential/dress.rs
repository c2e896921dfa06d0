use super::error::DressError;
use super::input::SpeciesIndex;
use crate::core::models::error::InputError;
use crate::core::models::label::{ConfigId, LabeledConfiguration};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

const SINGULAR_VALUE_EPS: f64 = 1e-10;

/// Fitted reference energies, one per atom type.
#[derive(Debug, Clone, PartialEq)]
pub struct DressFit {
    pub dress: Vec<f64>,
    /// Energy-labeled records left out of the fit.
    pub skipped: Vec<(ConfigId, InputError)>,
}

/// Least-squares per-species reference energies.
///
/// Solves `counts · dress ≈ energies` over every energy-labeled configuration,
/// where `counts[c][t]` is the number of atoms of type `t` in configuration
/// `c`. Species that never occur get a zero reference energy. Records with a
/// species outside `species` are skipped and reported.
pub fn fit_atomic_dress<'a>(
    records: impl IntoIterator<Item = &'a LabeledConfiguration>,
    species: &SpeciesIndex,
) -> Result<DressFit, DressError> {
    let mut counts: Vec<Vec<f64>> = Vec::new();
    let mut energies = Vec::new();
    let mut skipped = Vec::new();
    for record in records {
        let Some(energy) = record.label.energy else {
            continue;
        };
        let row = record.configuration.species().iter().try_fold(
            vec![0.0; species.len()],
            |mut row, &s| {
                row[species.index_of(s)?] += 1.0;
                Ok::<_, InputError>(row)
            },
        );
        match row {
            Ok(row) => {
                counts.push(row);
                energies.push(energy);
            }
            Err(error) => {
                warn!(id = %record.id, %error, "Left configuration out of the dress fit.");
                skipped.push((record.id, error));
            }
        }
    }
    if counts.is_empty() {
        return Err(DressError::NoEnergyLabels);
    }

    let design = DMatrix::from_fn(counts.len(), species.len(), |i, j| counts[i][j]);
    let targets = DVector::from_vec(energies);
    let solution = design
        .svd(true, true)
        .solve(&targets, SINGULAR_VALUE_EPS)
        .map_err(DressError::Solve)?;

    debug!(configurations = counts.len(), "Fitted atomic energy dress.");
    Ok(DressFit {
        dress: solution.iter().copied().collect(),
        skipped,
    })
}

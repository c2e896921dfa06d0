use super::cell::Cell;
use super::error::InputError;
use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use std::fmt;

/// Categorical atom species, by convention the atomic number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Species(pub u32);

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered set of atoms with an optional periodic cell.
///
/// The atom count and species are fixed at construction. Positions are
/// Cartesian; use [`AtomicConfiguration::from_fractional`] for fractional input.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicConfiguration {
    species: Vec<Species>,
    positions: Vec<Point3<f64>>,
    cell: Option<Cell>,
}

impl AtomicConfiguration {
    pub fn new(
        species: Vec<Species>,
        positions: Vec<Point3<f64>>,
        cell: Option<Cell>,
    ) -> Result<Self, InputError> {
        if species.len() != positions.len() {
            return Err(InputError::AtomCountMismatch {
                species: species.len(),
                positions: positions.len(),
            });
        }
        validate_positions(&positions)?;
        Ok(Self {
            species,
            positions,
            cell,
        })
    }

    pub fn from_fractional(
        species: Vec<Species>,
        fractional: &[Vector3<f64>],
        cell: Cell,
    ) -> Result<Self, InputError> {
        let positions = fractional.iter().map(|s| cell.to_cartesian(s)).collect();
        Self::new(species, positions, Some(cell))
    }

    pub fn n_atoms(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn cell(&self) -> Option<&Cell> {
        self.cell.as_ref()
    }

    pub fn is_periodic(&self) -> bool {
        self.cell.is_some()
    }

    /// Same atoms at new positions; the species list is carried over unchanged.
    pub fn with_positions(&self, positions: Vec<Point3<f64>>) -> Result<Self, InputError> {
        Self::new(self.species.clone(), positions, self.cell)
    }

    /// Applies `x' = x (I + ε)` to every position and to the cell, keeping
    /// fractional coordinates fixed.
    pub fn strained(&self, strain: &Matrix3<f64>) -> Result<Self, InputError> {
        let deformation = (Matrix3::identity() + strain).transpose();
        let positions = self
            .positions
            .iter()
            .map(|p| Point3::from(deformation * p.coords))
            .collect();
        let cell = self.cell.map(|c| c.strained(strain)).transpose()?;
        Self::new(self.species.clone(), positions, cell)
    }

    /// Rigid motion of the whole configuration, cell included.
    pub fn rigidly_moved(
        &self,
        rotation: &Rotation3<f64>,
        translation: &Vector3<f64>,
    ) -> Result<Self, InputError> {
        let positions = self
            .positions
            .iter()
            .map(|p| rotation * p + translation)
            .collect();
        let cell = self
            .cell
            .map(|c| Cell::new(c.matrix() * rotation.matrix().transpose()))
            .transpose()?;
        Self::new(self.species.clone(), positions, cell)
    }
}

fn validate_positions(positions: &[Point3<f64>]) -> Result<(), InputError> {
    match positions
        .iter()
        .position(|p| p.coords.iter().any(|v| !v.is_finite()))
    {
        Some(index) => Err(InputError::NonFiniteCoordinate { index }),
        None => Ok(()),
    }
}

use super::error::InputError;
use nalgebra::{Matrix3, Point3, Vector3};

/// A fully periodic simulation cell.
///
/// The rows of `matrix` are the three lattice vectors, so a Cartesian position
/// is `x = s₀·a + s₁·b + s₂·c` for fractional coordinates `s`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    matrix: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Cell {
    /// Creates a cell from a matrix whose rows are the lattice vectors.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::NonFiniteCell`] for NaN or infinite entries and
    /// [`InputError::NonPositiveVolume`] for singular or left-handed cells.
    pub fn new(matrix: Matrix3<f64>) -> Result<Self, InputError> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(InputError::NonFiniteCell);
        }
        let volume = matrix.determinant();
        if !(volume > 0.0) {
            return Err(InputError::NonPositiveVolume { volume });
        }
        let inverse = matrix
            .try_inverse()
            .ok_or(InputError::NonPositiveVolume { volume })?;
        Ok(Self { matrix, inverse })
    }

    pub fn cubic(length: f64) -> Result<Self, InputError> {
        Self::new(Matrix3::from_diagonal_element(length))
    }

    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Result<Self, InputError> {
        Self::new(Matrix3::from_diagonal(&Vector3::new(a, b, c)))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn lattice_vector(&self, axis: usize) -> Vector3<f64> {
        self.matrix.row(axis).transpose()
    }

    pub fn volume(&self) -> f64 {
        self.matrix.determinant()
    }

    pub fn to_fractional(&self, position: &Point3<f64>) -> Vector3<f64> {
        self.inverse.transpose() * position.coords
    }

    pub fn to_cartesian(&self, fractional: &Vector3<f64>) -> Point3<f64> {
        Point3::from(self.matrix.transpose() * fractional)
    }

    /// Cartesian translation of an integer lattice shift.
    pub fn shift_vector(&self, shift: &Vector3<i32>) -> Vector3<f64> {
        self.matrix.transpose() * shift.map(f64::from)
    }

    /// Distances between adjacent lattice planes normal to each axis.
    ///
    /// A sphere of radius `r` around any point crosses at most `ceil(r / d_k)`
    /// planes on each side along axis `k`.
    pub fn plane_spacings(&self) -> [f64; 3] {
        let volume = self.volume();
        let a = self.lattice_vector(0);
        let b = self.lattice_vector(1);
        let c = self.lattice_vector(2);
        [
            volume / b.cross(&c).norm(),
            volume / c.cross(&a).norm(),
            volume / a.cross(&b).norm(),
        ]
    }

    /// The cell after the homogeneous deformation `H' = H (I + ε)`.
    pub fn strained(&self, strain: &Matrix3<f64>) -> Result<Self, InputError> {
        Self::new(self.matrix * (Matrix3::identity() + strain))
    }
}

use super::cutoff::CutoffKind;
use crate::core::autodiff::{Graph, Var};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BasisKind {
    /// Powers of the cutoff envelope, `f_c(r)^k` for `k = 1..=n`.
    #[default]
    Polynomial,
    /// `exp(−γ(r − μ_k)²)·f_c(r)` with centers evenly spaced on `[0, r_c]`.
    Gaussian { gamma: f64 },
}

/// Radial expansion of pair distances into `n_basis` smooth functions, each of
/// which vanishes with zero slope at the cutoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadialBasis {
    kind: BasisKind,
    cutoff_kind: CutoffKind,
    cutoff: f64,
    n_basis: usize,
}

impl RadialBasis {
    pub fn new(kind: BasisKind, cutoff_kind: CutoffKind, cutoff: f64, n_basis: usize) -> Self {
        Self {
            kind,
            cutoff_kind,
            cutoff,
            n_basis,
        }
    }

    pub fn n_basis(&self) -> usize {
        self.n_basis
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn center(&self, k: usize) -> f64 {
        if self.n_basis > 1 {
            self.cutoff * k as f64 / (self.n_basis - 1) as f64
        } else {
            0.0
        }
    }

    pub fn evaluate(&self, r: f64) -> Vec<f64> {
        let fc = self.cutoff_kind.evaluate(r, self.cutoff);
        (0..self.n_basis)
            .map(|k| match self.kind {
                BasisKind::Polynomial => fc.powi(k as i32 + 1),
                BasisKind::Gaussian { gamma } => {
                    (-gamma * (r - self.center(k)).powi(2)).exp() * fc
                }
            })
            .collect()
    }

    /// Expands a `(pairs, 1)` distance column into `(pairs, n_basis)`.
    pub(crate) fn forward(&self, graph: &mut Graph, r: Var) -> Var {
        let fc = self.cutoff_kind.apply(graph, r, self.cutoff);
        let mut columns = Vec::with_capacity(self.n_basis);
        match self.kind {
            BasisKind::Polynomial => {
                let mut power = fc;
                columns.push(power);
                for _ in 1..self.n_basis {
                    power = graph.mul(power, fc);
                    columns.push(power);
                }
            }
            BasisKind::Gaussian { gamma } => {
                for k in 0..self.n_basis {
                    let offset = graph.affine(r, 1.0, -self.center(k));
                    let sq = graph.square(offset);
                    let arg = graph.scale(sq, -gamma);
                    let g = graph.exp(arg);
                    columns.push(graph.mul(g, fc));
                }
            }
        }
        graph.concat_cols(&columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn check_graph_matches_scalar(basis: RadialBasis) {
        let distances = [0.4, 1.1, 2.5, 2.95];
        let mut graph = Graph::new();
        let r = graph.constant(DMatrix::from_column_slice(4, 1, &distances));
        let expanded = basis.forward(&mut graph, r);
        assert_eq!(graph.shape(expanded), (4, basis.n_basis()));
        for (p, &d) in distances.iter().enumerate() {
            for (k, expected) in basis.evaluate(d).into_iter().enumerate() {
                assert!((graph.value(expanded)[(p, k)] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn polynomial_basis_matches_scalar_evaluation() {
        check_graph_matches_scalar(RadialBasis::new(
            BasisKind::Polynomial,
            CutoffKind::Cosine,
            3.0,
            4,
        ));
    }

    #[test]
    fn gaussian_basis_matches_scalar_evaluation() {
        check_graph_matches_scalar(RadialBasis::new(
            BasisKind::Gaussian { gamma: 3.0 },
            CutoffKind::Hip,
            3.0,
            6,
        ));
    }

    #[test]
    fn every_function_vanishes_at_cutoff() {
        let basis = RadialBasis::new(BasisKind::Gaussian { gamma: 1.0 }, CutoffKind::Tanh3, 3.0, 5);
        assert!(basis.evaluate(3.0).iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn gaussian_centers_span_zero_to_cutoff() {
        let basis = RadialBasis::new(BasisKind::Gaussian { gamma: 1.0 }, CutoffKind::Cosine, 3.0, 4);
        assert_eq!(basis.center(0), 0.0);
        assert!((basis.center(3) - 3.0).abs() < 1e-12);
    }
}

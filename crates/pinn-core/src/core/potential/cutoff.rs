use crate::core::autodiff::{Graph, Var};
use serde::Deserialize;
use std::f64::consts::PI;

/// Smooth envelope `f_c(r)` that goes to zero, with zero slope, at the cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CutoffKind {
    /// `½(cos(πr/r_c) + 1)`
    #[default]
    Cosine,
    /// `tanh³(1 − r/r_c)`
    Tanh3,
    /// `cos²(πr/2r_c)`
    Hip,
}

impl CutoffKind {
    pub fn evaluate(self, r: f64, cutoff: f64) -> f64 {
        if r >= cutoff {
            return 0.0;
        }
        match self {
            CutoffKind::Cosine => 0.5 * ((PI * r / cutoff).cos() + 1.0),
            CutoffKind::Tanh3 => (1.0 - r / cutoff).tanh().powi(3),
            CutoffKind::Hip => (0.5 * PI * r / cutoff).cos().powi(2),
        }
    }

    /// Records the envelope of the `(pairs, 1)` distance column `r`.
    ///
    /// Distances are assumed to lie in `(0, cutoff]`, which the neighbor list
    /// guarantees.
    pub(crate) fn apply(self, graph: &mut Graph, r: Var, cutoff: f64) -> Var {
        match self {
            CutoffKind::Cosine => {
                let angle = graph.scale(r, PI / cutoff);
                let c = graph.cos(angle);
                graph.affine(c, 0.5, 0.5)
            }
            CutoffKind::Tanh3 => {
                let x = graph.affine(r, -1.0 / cutoff, 1.0);
                let t = graph.tanh(x);
                let t2 = graph.square(t);
                graph.mul(t2, t)
            }
            CutoffKind::Hip => {
                let angle = graph.scale(r, 0.5 * PI / cutoff);
                let c = graph.cos(angle);
                graph.square(c)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    const KINDS: [CutoffKind; 3] = [CutoffKind::Cosine, CutoffKind::Tanh3, CutoffKind::Hip];

    #[test]
    fn envelopes_start_at_one_or_below_and_vanish_at_cutoff() {
        for kind in KINDS {
            assert!(kind.evaluate(0.0, 4.0) <= 1.0 + 1e-12);
            assert!(kind.evaluate(0.0, 4.0) > 0.4);
            assert!(kind.evaluate(4.0, 4.0).abs() < 1e-12);
            assert_eq!(kind.evaluate(4.5, 4.0), 0.0);
        }
    }

    #[test]
    fn envelopes_have_zero_slope_at_cutoff() {
        let h = 1e-4;
        for kind in KINDS {
            let slope = (kind.evaluate(4.0, 4.0) - kind.evaluate(4.0 - h, 4.0)) / h;
            assert!(slope.abs() < 1e-3, "{kind:?} slope {slope}");
        }
    }

    #[test]
    fn graph_envelope_matches_scalar_evaluation() {
        let distances = [0.3, 1.7, 3.2, 3.999];
        for kind in KINDS {
            let mut graph = Graph::new();
            let r = graph.constant(DMatrix::from_column_slice(4, 1, &distances));
            let fc = kind.apply(&mut graph, r, 4.0);
            for (k, &d) in distances.iter().enumerate() {
                assert!((graph.value(fc)[(k, 0)] - kind.evaluate(d, 4.0)).abs() < 1e-12);
            }
        }
    }
}

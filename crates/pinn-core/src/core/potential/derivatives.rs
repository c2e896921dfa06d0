use super::input::ModelInput;
use crate::core::autodiff::{Graph, Var};
use nalgebra::{Matrix3, Vector3};
use std::array;

/// Which spatial derivatives to record on top of the energy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Derivatives {
    pub forces: bool,
    pub stress: bool,
}

impl Derivatives {
    pub const NONE: Self = Self {
        forces: false,
        stress: false,
    };
    pub const ALL: Self = Self {
        forces: true,
        stress: true,
    };

    pub fn any(self) -> bool {
        self.forces || self.stress
    }
}

/// Graph handles produced by the model's forward pass.
#[derive(Debug, Clone, Copy)]
pub struct ForwardVars {
    /// `(atoms, 3)` position leaf.
    pub positions: Var,
    /// `(pairs, 3)` pair displacements `x_j − x_i + S·H`.
    pub displacements: Var,
    /// `(atoms, 1)` per-atom energies including the dress.
    pub atomic_energy: Var,
    /// `(configs, 1)` total energies.
    pub energy: Var,
}

/// Energy and its requested derivatives, still on the graph so a loss can be
/// built from them.
#[derive(Debug, Clone, Copy)]
pub struct PredictionVars {
    pub energy: Var,
    /// `(atoms, 3)`.
    pub forces: Option<Var>,
    /// `(configs, 9)`, row-major per configuration; zero rows for open systems.
    pub stress: Option<Var>,
}

/// Inference result for one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub energy: f64,
    pub forces: Vec<Vector3<f64>>,
    /// `None` for non-periodic configurations.
    pub stress: Option<Matrix3<f64>>,
}

/// Records forces `−∂E/∂X` and the virial stress on `graph`.
///
/// Both come from one reverse sweep of the total energy with respect to the
/// positions and the pair displacements. A homogeneous strain `ε` maps each
/// displacement `d` to `d(I + ε)`, so `∂E/∂ε_mk = Σ_p d_pm ∂E/∂d_pk`; dividing
/// by the cell volume gives the stress.
pub(crate) fn differentiate(
    graph: &mut Graph,
    forward: &ForwardVars,
    input: &ModelInput,
    derivatives: Derivatives,
) -> PredictionVars {
    if !derivatives.any() {
        return PredictionVars {
            energy: forward.energy,
            forces: None,
            stress: None,
        };
    }

    let total = graph.sum_all(forward.energy);
    let grads = graph.grad(total, &[forward.positions, forward.displacements]);

    let forces = derivatives.forces.then(|| graph.neg(grads[0]));
    let stress = derivatives
        .stress
        .then(|| virial_stress(graph, forward.displacements, grads[1], input));

    PredictionVars {
        energy: forward.energy,
        forces,
        stress,
    }
}

fn virial_stress(graph: &mut Graph, displacements: Var, d_energy: Var, input: &ModelInput) -> Var {
    let d: [Var; 3] = array::from_fn(|m| graph.slice_cols(displacements, m, 1));
    let g: [Var; 3] = array::from_fn(|k| graph.slice_cols(d_energy, k, 1));
    let mut components = Vec::with_capacity(9);
    for m in 0..3 {
        for k in 0..3 {
            components.push(graph.mul(d[m], g[k]));
        }
    }
    let per_pair = graph.concat_cols(&components);
    let per_config = graph.scatter_add(per_pair, input.pair_config.clone(), input.n_configs);
    let inverse_volume = graph.column(&input.inverse_volume);
    graph.mul_col(per_config, inverse_volume)
}

impl PredictionVars {
    /// Reads configuration `c` out of the recorded values.
    pub fn extract(&self, graph: &Graph, input: &ModelInput, c: usize) -> Prediction {
        let energy = graph.value(self.energy)[(c, 0)];
        let forces = self
            .forces
            .map(|f| {
                let m = graph.value(f);
                input
                    .atom_range(c)
                    .map(|a| Vector3::new(m[(a, 0)], m[(a, 1)], m[(a, 2)]))
                    .collect()
            })
            .unwrap_or_default();
        let stress = self
            .stress
            .filter(|_| input.is_periodic(c))
            .map(|s| {
                let m = graph.value(s);
                Matrix3::from_fn(|i, j| m[(c, 3 * i + j)])
            });
        Prediction {
            energy,
            forces,
            stress,
        }
    }
}

use super::config::ConfigError;
use crate::core::autodiff::{Graph, Var};
use crate::core::models::label::LabeledConfiguration;
use crate::core::potential::derivatives::{Derivatives, PredictionVars};
use crate::core::potential::input::ModelInput;
use nalgebra::DMatrix;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Residual {
    #[default]
    Squared,
    /// Quadratic within `delta`, linear beyond it.
    Huber { delta: f64 },
}

impl Residual {
    fn apply(self, graph: &mut Graph, x: Var) -> Var {
        match self {
            Residual::Squared => graph.square(x),
            Residual::Huber { delta } => graph.huber(x, delta),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LossConfig {
    pub energy_weight: f64,
    pub force_weight: f64,
    pub stress_weight: f64,
    /// Weight of Σ‖W‖² over dense-layer kernels.
    pub l2_weight: f64,
    pub residual: Residual,
    /// Divide energy residuals by the atom count of their configuration.
    pub per_atom_energy: bool,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            energy_weight: 1.0,
            force_weight: 1.0,
            stress_weight: 0.0,
            l2_weight: 0.0,
            residual: Residual::Squared,
            per_atom_energy: true,
        }
    }
}

impl LossConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, weight) in [
            ("loss.energy_weight", self.energy_weight),
            ("loss.force_weight", self.force_weight),
            ("loss.stress_weight", self.stress_weight),
            ("loss.l2_weight", self.l2_weight),
        ] {
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(ConfigError::invalid(
                    name,
                    format!("must be finite and non-negative, got {weight}"),
                ));
            }
        }
        if self.energy_weight + self.force_weight + self.stress_weight == 0.0 {
            return Err(ConfigError::invalid(
                "loss",
                "energy, force and stress weights are all zero",
            ));
        }
        if let Residual::Huber { delta } = self.residual {
            if !(delta.is_finite() && delta > 0.0) {
                return Err(ConfigError::invalid(
                    "loss.residual.delta",
                    format!("must be positive, got {delta}"),
                ));
            }
        }
        Ok(())
    }

    /// Derivatives the loss actually consumes.
    pub fn required_derivatives(&self) -> Derivatives {
        Derivatives {
            forces: self.force_weight > 0.0,
            stress: self.stress_weight > 0.0,
        }
    }
}

/// Label counts of a whole batch.
///
/// Shards of a batch share one `LossNorms`, so their losses (and gradients)
/// add up to those of the unsharded batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LossNorms {
    pub energy_configs: usize,
    pub force_configs: usize,
    pub stress_configs: usize,
}

impl LossNorms {
    pub fn of<'a>(records: impl IntoIterator<Item = &'a LabeledConfiguration>) -> Self {
        records.into_iter().fold(Self::default(), |mut norms, record| {
            let label = &record.label;
            norms.energy_configs += usize::from(label.energy.is_some());
            norms.force_configs += usize::from(label.forces.is_some());
            norms.stress_configs +=
                usize::from(label.stress.is_some() && record.configuration.is_periodic());
            norms
        })
    }
}

/// Loss terms recorded on a graph.
#[derive(Debug, Clone, Copy)]
pub struct LossTerms {
    pub total: Var,
    pub energy: Var,
    pub forces: Var,
    pub stress: Var,
    pub l2: Option<Var>,
}

/// Unweighted loss terms and the weighted total, as numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossBreakdown {
    pub total: f64,
    pub energy: f64,
    pub forces: f64,
    pub stress: f64,
    pub l2: f64,
}

impl LossBreakdown {
    pub fn is_finite(&self) -> bool {
        self.total.is_finite()
    }
}

impl std::ops::AddAssign for LossBreakdown {
    fn add_assign(&mut self, other: Self) {
        self.total += other.total;
        self.energy += other.energy;
        self.forces += other.forces;
        self.stress += other.stress;
        self.l2 += other.l2;
    }
}

impl LossTerms {
    pub fn values(&self, graph: &Graph) -> LossBreakdown {
        LossBreakdown {
            total: graph.scalar_value(self.total),
            energy: graph.scalar_value(self.energy),
            forces: graph.scalar_value(self.forces),
            stress: graph.scalar_value(self.stress),
            l2: self.l2.map_or(0.0, |v| graph.scalar_value(v)),
        }
    }
}

fn weight_of(count: usize) -> f64 {
    if count > 0 { 1.0 / count as f64 } else { 0.0 }
}

/// Records `w_E·L_E + w_F·L_F + w_S·L_S (+ w_L2·l2)` for one shard.
///
/// `records` must be in the order they were assembled into `input`. Missing
/// labels get zero weight, so they never contribute.
pub fn assemble(
    graph: &mut Graph,
    config: &LossConfig,
    prediction: &PredictionVars,
    input: &ModelInput,
    records: &[&LabeledConfiguration],
    norms: &LossNorms,
    l2: Option<Var>,
) -> LossTerms {
    let n_configs = records.len();

    let energy = {
        let mut target = vec![0.0; n_configs];
        let mut scale = vec![1.0; n_configs];
        let mut weight = vec![0.0; n_configs];
        for (c, record) in records.iter().enumerate() {
            if let Some(e) = record.label.energy {
                target[c] = e;
                weight[c] = weight_of(norms.energy_configs);
                if config.per_atom_energy {
                    scale[c] = 1.0 / record.configuration.n_atoms().max(1) as f64;
                }
            }
        }
        let target = graph.column(&target);
        let scale = graph.column(&scale);
        let weight = graph.column(&weight);
        let diff = graph.sub(prediction.energy, target);
        let normalized = graph.mul(diff, scale);
        let rho = config.residual.apply(graph, normalized);
        let weighted = graph.mul(rho, weight);
        graph.sum_all(weighted)
    };

    let forces = match prediction.forces {
        Some(forces) => {
            let mut target = DMatrix::zeros(input.n_atoms(), 3);
            let mut weight = vec![0.0; input.n_atoms()];
            for (c, record) in records.iter().enumerate() {
                let Some(labels) = &record.label.forces else {
                    continue;
                };
                let per_atom = weight_of(norms.force_configs) / (3 * labels.len()).max(1) as f64;
                for (a, f) in input.atom_range(c).zip(labels) {
                    for k in 0..3 {
                        target[(a, k)] = f[k];
                    }
                    weight[a] = per_atom;
                }
            }
            let target = graph.constant(target);
            let weight = graph.column(&weight);
            let diff = graph.sub(forces, target);
            let rho = config.residual.apply(graph, diff);
            let per_atom = graph.sum_cols(rho);
            let weighted = graph.mul(per_atom, weight);
            graph.sum_all(weighted)
        }
        None => graph.scalar(0.0),
    };

    let stress = match prediction.stress {
        Some(stress) => {
            let mut target = DMatrix::zeros(n_configs, 9);
            let mut weight = vec![0.0; n_configs];
            for (c, record) in records.iter().enumerate() {
                if let (Some(labels), true) = (&record.label.stress, input.is_periodic(c)) {
                    for i in 0..3 {
                        for j in 0..3 {
                            target[(c, 3 * i + j)] = labels[(i, j)];
                        }
                    }
                    weight[c] = weight_of(norms.stress_configs) / 9.0;
                }
            }
            let target = graph.constant(target);
            let weight = graph.column(&weight);
            let diff = graph.sub(stress, target);
            let rho = config.residual.apply(graph, diff);
            let per_config = graph.sum_cols(rho);
            let weighted = graph.mul(per_config, weight);
            graph.sum_all(weighted)
        }
        None => graph.scalar(0.0),
    };

    let weighted_energy = graph.scale(energy, config.energy_weight);
    let weighted_forces = graph.scale(forces, config.force_weight);
    let weighted_stress = graph.scale(stress, config.stress_weight);
    let mut total = graph.add(weighted_energy, weighted_forces);
    total = graph.add(total, weighted_stress);
    if let Some(penalty) = l2 {
        let weighted = graph.scale(penalty, config.l2_weight);
        total = graph.add(total, weighted);
    }

    LossTerms {
        total,
        energy,
        forces,
        stress,
        l2,
    }
}

use crate::core::models::label::LabeledConfiguration;
use crate::core::potential::derivatives::Prediction;

/// Held-out error statistics. Force errors are taken per Cartesian
/// component; statistics without any matching label are `None`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationMetrics {
    pub loss: f64,
    pub energy_rmse: Option<f64>,
    pub energy_mae: Option<f64>,
    pub energy_per_atom_rmse: Option<f64>,
    pub force_rmse: Option<f64>,
    pub force_mae: Option<f64>,
    pub stress_rmse: Option<f64>,
    pub n_configs: usize,
    pub n_atoms: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct ErrorSums {
    squared: f64,
    absolute: f64,
    count: usize,
}

impl ErrorSums {
    fn add(&mut self, error: f64) {
        self.squared += error * error;
        self.absolute += error.abs();
        self.count += 1;
    }

    fn merge(&mut self, other: &Self) {
        self.squared += other.squared;
        self.absolute += other.absolute;
        self.count += other.count;
    }

    fn rmse(&self) -> Option<f64> {
        (self.count > 0).then(|| (self.squared / self.count as f64).sqrt())
    }

    fn mae(&self) -> Option<f64> {
        (self.count > 0).then(|| self.absolute / self.count as f64)
    }
}

/// Running sums over predictions; partial accumulators from parallel
/// evaluation chunks are combined with [`merge`](Self::merge).
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricAccumulator {
    loss: f64,
    energy: ErrorSums,
    energy_per_atom: ErrorSums,
    forces: ErrorSums,
    stress: ErrorSums,
    n_configs: usize,
    n_atoms: usize,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an already normalized loss contribution.
    pub fn add_loss(&mut self, loss: f64) {
        self.loss += loss;
    }

    pub fn record(&mut self, record: &LabeledConfiguration, prediction: &Prediction) {
        let n_atoms = record.configuration.n_atoms();
        self.n_configs += 1;
        self.n_atoms += n_atoms;

        let label = &record.label;
        if let Some(energy) = label.energy {
            let error = prediction.energy - energy;
            self.energy.add(error);
            self.energy_per_atom.add(error / n_atoms.max(1) as f64);
        }
        if let Some(forces) = &label.forces {
            for (predicted, target) in prediction.forces.iter().zip(forces) {
                for k in 0..3 {
                    self.forces.add(predicted[k] - target[k]);
                }
            }
        }
        if let (Some(stress), Some(predicted)) = (&label.stress, &prediction.stress) {
            for (p, t) in predicted.iter().zip(stress.iter()) {
                self.stress.add(p - t);
            }
        }
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.loss += other.loss;
        self.energy.merge(&other.energy);
        self.energy_per_atom.merge(&other.energy_per_atom);
        self.forces.merge(&other.forces);
        self.stress.merge(&other.stress);
        self.n_configs += other.n_configs;
        self.n_atoms += other.n_atoms;
        self
    }

    pub fn finish(&self) -> EvaluationMetrics {
        EvaluationMetrics {
            loss: self.loss,
            energy_rmse: self.energy.rmse(),
            energy_mae: self.energy.mae(),
            energy_per_atom_rmse: self.energy_per_atom.rmse(),
            force_rmse: self.forces.rmse(),
            force_mae: self.forces.mae(),
            stress_rmse: self.stress.rmse(),
            n_configs: self.n_configs,
            n_atoms: self.n_atoms,
        }
    }
}

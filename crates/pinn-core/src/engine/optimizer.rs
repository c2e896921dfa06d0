use super::config::ConfigError;
use crate::core::nn::params::{Gradients, ModelParameters};
use nalgebra::DMatrix;
use serde::Deserialize;

const fn default_beta1() -> f64 {
    0.9
}

const fn default_beta2() -> f64 {
    0.999
}

const fn default_epsilon() -> f64 {
    1e-8
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum OptimizerKind {
    Adam {
        #[serde(default = "default_beta1")]
        beta1: f64,
        #[serde(default = "default_beta2")]
        beta2: f64,
        #[serde(default = "default_epsilon")]
        epsilon: f64,
    },
    Sgd {
        #[serde(default)]
        momentum: f64,
    },
}

impl Default for OptimizerKind {
    fn default() -> Self {
        OptimizerKind::Adam {
            beta1: default_beta1(),
            beta2: default_beta2(),
            epsilon: default_epsilon(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum LearningRateSchedule {
    #[default]
    Constant,
    /// `lr · decay_rate^(step / decay_steps)`.
    ExponentialDecay { decay_rate: f64, decay_steps: u64 },
}

impl LearningRateSchedule {
    pub fn learning_rate(&self, base: f64, step: u64) -> f64 {
        match *self {
            LearningRateSchedule::Constant => base,
            LearningRateSchedule::ExponentialDecay {
                decay_rate,
                decay_steps,
            } => base * decay_rate.powf(step as f64 / decay_steps as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    pub kind: OptimizerKind,
    pub learning_rate: f64,
    pub schedule: LearningRateSchedule,
    /// Rescale gradients whose global norm exceeds this value.
    pub clip_norm: Option<f64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            kind: OptimizerKind::default(),
            learning_rate: 1e-3,
            schedule: LearningRateSchedule::Constant,
            clip_norm: None,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::invalid(
                "optimizer.learning_rate",
                format!("must be positive, got {}", self.learning_rate),
            ));
        }
        match self.kind {
            OptimizerKind::Adam {
                beta1,
                beta2,
                epsilon,
            } => {
                if !((0.0..1.0).contains(&beta1) && (0.0..1.0).contains(&beta2)) {
                    return Err(ConfigError::invalid(
                        "optimizer.beta",
                        "Adam decay rates must lie in [0, 1)",
                    ));
                }
                if !(epsilon.is_finite() && epsilon > 0.0) {
                    return Err(ConfigError::invalid("optimizer.epsilon", "must be positive"));
                }
            }
            OptimizerKind::Sgd { momentum } => {
                if !(0.0..1.0).contains(&momentum) {
                    return Err(ConfigError::invalid(
                        "optimizer.momentum",
                        "must lie in [0, 1)",
                    ));
                }
            }
        }
        if let LearningRateSchedule::ExponentialDecay {
            decay_rate,
            decay_steps,
        } = self.schedule
        {
            if !(decay_rate > 0.0 && decay_rate <= 1.0) || decay_steps == 0 {
                return Err(ConfigError::invalid(
                    "optimizer.schedule",
                    "decay_rate must lie in (0, 1] and decay_steps must be positive",
                ));
            }
        }
        if let Some(clip) = self.clip_norm {
            if !(clip.is_finite() && clip > 0.0) {
                return Err(ConfigError::invalid("optimizer.clip_norm", "must be positive"));
            }
        }
        Ok(())
    }
}

/// First-order optimizer; the only mutator of [`ModelParameters`].
#[derive(Debug, Clone)]
pub struct Optimizer {
    config: OptimizerConfig,
    updates: u64,
    first_moment: Vec<DMatrix<f64>>,
    second_moment: Vec<DMatrix<f64>>,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig, params: &ModelParameters) -> Self {
        let zeros: Vec<DMatrix<f64>> = params
            .iter()
            .map(|(_, p)| DMatrix::zeros(p.value.nrows(), p.value.ncols()))
            .collect();
        let second_moment = match config.kind {
            OptimizerKind::Adam { .. } => zeros.clone(),
            OptimizerKind::Sgd { .. } => Vec::new(),
        };
        Self {
            config,
            updates: 0,
            first_moment: zeros,
            second_moment,
        }
    }

    /// Number of committed updates.
    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn learning_rate(&self) -> f64 {
        self.config
            .schedule
            .learning_rate(self.config.learning_rate, self.updates)
    }

    /// Applies one update and commits it. Returns the learning rate used.
    pub fn apply(&mut self, params: &mut ModelParameters, gradients: &Gradients) -> f64 {
        let lr = self.learning_rate();
        let clip_factor = match self.config.clip_norm {
            Some(limit) => {
                let norm = gradients.global_norm();
                if norm > limit { limit / norm } else { 1.0 }
            }
            None => 1.0,
        };

        let t = (self.updates + 1) as f64;
        for (id, grad) in gradients.iter() {
            let g = grad * clip_factor;
            let i = id.index();
            match self.config.kind {
                OptimizerKind::Adam {
                    beta1,
                    beta2,
                    epsilon,
                } => {
                    let m = &mut self.first_moment[i];
                    *m = &*m * beta1 + &g * (1.0 - beta1);
                    let v = &mut self.second_moment[i];
                    *v = &*v * beta2 + g.component_mul(&g) * (1.0 - beta2);

                    let m_correction = 1.0 - beta1.powf(t);
                    let v_correction = 1.0 - beta2.powf(t);
                    let m = &self.first_moment[i];
                    let v = &self.second_moment[i];
                    let value = params.value_mut(id);
                    value.zip_zip_apply(m, v, |theta, m, v| {
                        *theta -= lr * (m / m_correction) / ((v / v_correction).sqrt() + epsilon);
                    });
                }
                OptimizerKind::Sgd { momentum } => {
                    let velocity = &mut self.first_moment[i];
                    *velocity = &*velocity * momentum + &g;
                    *params.value_mut(id) -= &*velocity * lr;
                }
            }
        }

        self.updates += 1;
        params.commit();
        lr
    }
}

use super::loss::LossConfig;
use super::optimizer::OptimizerConfig;
use crate::core::neighbors::builder::NeighborSettings;
use crate::core::potential::config::ModelConfig;
use crate::core::potential::error::ModelConfigError;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error(transparent)]
    Model(#[from] ModelConfigError),

    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file '{path}': {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EarlyStopping {
    /// Evaluations without sufficient improvement before stopping.
    pub patience: usize,
    #[serde(default)]
    pub min_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub batch_size: usize,
    pub shuffle_buffer: usize,
    pub seed: u64,
    pub max_steps: u64,
    pub eval_interval: u64,
    /// Limit on the number of evaluation chunks; `None` evaluates everything.
    pub eval_batches: Option<usize>,
    pub early_stopping: Option<EarlyStopping>,
    pub target_loss: Option<f64>,
    pub max_consecutive_nonfinite: usize,
    pub workers: usize,
    pub prefetch_depth: usize,
    /// Refit the per-species reference energies on the training set.
    pub regen_dress: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle_buffer: 100,
            seed: 0,
            max_steps: 1000,
            eval_interval: 100,
            eval_batches: None,
            early_stopping: None,
            target_loss: None,
            max_consecutive_nonfinite: 10,
            workers: 1,
            prefetch_depth: 2,
            regen_dress: false,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("run.batch_size", self.batch_size as u64),
            ("run.max_steps", self.max_steps),
            ("run.eval_interval", self.eval_interval),
            ("run.workers", self.workers as u64),
            ("run.prefetch_depth", self.prefetch_depth as u64),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(name, "must be at least 1"));
            }
        }
        if self.eval_batches == Some(0) {
            return Err(ConfigError::invalid("run.eval_batches", "must be at least 1"));
        }
        if let Some(early) = self.early_stopping {
            if early.patience == 0 {
                return Err(ConfigError::invalid(
                    "run.early_stopping.patience",
                    "must be at least 1",
                ));
            }
            if !(early.min_delta.is_finite() && early.min_delta >= 0.0) {
                return Err(ConfigError::invalid(
                    "run.early_stopping.min_delta",
                    format!("must be finite and non-negative, got {}", early.min_delta),
                ));
            }
        }
        if let Some(target) = self.target_loss {
            if !(target.is_finite() && target >= 0.0) {
                return Err(ConfigError::invalid(
                    "run.target_loss",
                    format!("must be finite and non-negative, got {target}"),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub neighbors: NeighborSettings,
    #[serde(default)]
    pub loss: LossConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub run: RunConfig,
}

impl TrainingConfig {
    /// Reads, parses and validates a TOML training configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let path_str = path.to_string_lossy().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path_str.clone(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Toml {
            path: path_str,
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every hyperparameter; nothing trains on a config that fails this.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model.validate()?;
        if self.neighbors.max_images == 0 {
            return Err(ConfigError::invalid(
                "neighbors.max_images",
                "must be at least 1",
            ));
        }
        if self.neighbors.max_pairs == Some(0) {
            return Err(ConfigError::invalid("neighbors.max_pairs", "must be at least 1"));
        }
        self.loss.validate()?;
        self.optimizer.validate()?;
        self.run.validate()
    }
}

#[derive(Default)]
pub struct TrainingConfigBuilder {
    model: Option<ModelConfig>,
    neighbors: Option<NeighborSettings>,
    loss: Option<LossConfig>,
    optimizer: Option<OptimizerConfig>,
    run: Option<RunConfig>,
}

impl TrainingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: ModelConfig) -> Self {
        self.model = Some(model);
        self
    }
    pub fn neighbors(mut self, settings: NeighborSettings) -> Self {
        self.neighbors = Some(settings);
        self
    }
    pub fn loss(mut self, loss: LossConfig) -> Self {
        self.loss = Some(loss);
        self
    }
    pub fn optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = Some(optimizer);
        self
    }
    pub fn run(mut self, run: RunConfig) -> Self {
        self.run = Some(run);
        self
    }

    pub fn build(self) -> Result<TrainingConfig, ConfigError> {
        let config = TrainingConfig {
            model: self.model.ok_or(ConfigError::MissingParameter("model"))?,
            neighbors: self.neighbors.unwrap_or_default(),
            loss: self.loss.unwrap_or_default(),
            optimizer: self.optimizer.unwrap_or_default(),
            run: self.run.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }
}

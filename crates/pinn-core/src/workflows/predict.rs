use crate::core::models::configuration::AtomicConfiguration;
use crate::core::nn::params::ModelParameters;
use crate::core::potential::derivatives::Prediction;
use crate::core::potential::error::PredictionError;
use crate::core::potential::model::PotentialModel;
use crate::engine::config::TrainingConfig;
use crate::engine::data::Dataset;
use crate::engine::error::{EngineError, RejectedConfiguration};
use crate::engine::metrics::EvaluationMetrics;
use crate::engine::progress::ProgressReporter;
use crate::engine::trainer::Trainer;
use tracing::{info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Predicts every configuration independently, so one invalid configuration
/// does not affect the others. Errors carry the configuration's position.
#[instrument(skip_all, name = "prediction_workflow")]
pub fn predict_all(
    model: &PotentialModel,
    params: &ModelParameters,
    configurations: &[AtomicConfiguration],
) -> Vec<Result<Prediction, PredictionError>> {
    #[cfg(feature = "parallel")]
    let iter = configurations.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iter = configurations.iter();

    let results: Vec<_> = iter
        .enumerate()
        .map(|(index, configuration)| {
            model
                .predict(params, configuration)
                .map_err(|error| reindex(error, index))
        })
        .collect();

    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        warn!(failed, "Some configurations could not be predicted.");
    }
    results
}

fn reindex(error: PredictionError, index: usize) -> PredictionError {
    match error {
        PredictionError::Input { source, .. } => PredictionError::Input { index, source },
        PredictionError::Neighbors { source, .. } => PredictionError::Neighbors { index, source },
    }
}

/// Scores trained parameters against labeled data with the loss and batch
/// settings of `config`.
#[instrument(skip_all, name = "scoring_workflow")]
pub fn score(
    model: &PotentialModel,
    params: &ModelParameters,
    config: &TrainingConfig,
    data: &Dataset,
) -> Result<(Option<EvaluationMetrics>, Vec<RejectedConfiguration>), EngineError> {
    let reporter = ProgressReporter::new();
    let (metrics, rejected) = Trainer::new(model, config, &reporter).evaluate(params, data)?;
    if let Some(metrics) = &metrics {
        info!(
            configurations = metrics.n_configs,
            loss = metrics.loss,
            energy_rmse = metrics.energy_rmse,
            force_rmse = metrics.force_rmse,
            "Scoring finished."
        );
    }
    Ok((metrics, rejected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::configuration::Species;
    use crate::core::models::error::InputError;
    use crate::core::models::label::{ConfigId, Label, LabeledConfiguration};
    use crate::core::potential::config::ModelConfig;
    use crate::engine::config::TrainingConfigBuilder;
    use nalgebra::Point3;

    fn model_config() -> ModelConfig {
        ModelConfig {
            cutoff: 3.0,
            atom_types: vec![1],
            depth: 1,
            embedding_dim: 4,
            pp_nodes: vec![4],
            pi_nodes: vec![4],
            ii_nodes: vec![4],
            en_nodes: vec![4],
            ..ModelConfig::default()
        }
    }

    fn dimer(species: u32, r: f64) -> AtomicConfiguration {
        AtomicConfiguration::new(
            vec![Species(species), Species(1)],
            vec![Point3::origin(), Point3::new(r, 0.0, 0.0)],
            None,
        )
        .unwrap()
    }

    #[test]
    fn predict_all_isolates_failures_and_reports_positions() {
        let (model, params) = PotentialModel::initialize(model_config(), 1).unwrap();
        let configurations = vec![dimer(1, 1.0), dimer(6, 1.0), dimer(1, 1.5)];
        let results = predict_all(&model, &params, &configurations);
        assert!(results[0].is_ok());
        assert_eq!(
            results[1],
            Err(PredictionError::Input {
                index: 1,
                source: InputError::UnknownSpecies(Species(6)),
            })
        );
        let direct = model.predict(&params, &configurations[2]).unwrap();
        assert_eq!(results[2].as_ref().unwrap(), &direct);
    }

    #[test]
    fn score_reports_metrics_and_rejections() {
        let (model, params) = PotentialModel::initialize(model_config(), 1).unwrap();
        let config = TrainingConfigBuilder::new().model(model_config()).build().unwrap();
        let data: Dataset = [(0, 1), (1, 6), (2, 1)]
            .into_iter()
            .map(|(id, species)| {
                LabeledConfiguration::new(ConfigId(id), dimer(species, 1.2), Label::new().with_energy(0.0))
                    .unwrap()
            })
            .collect();

        let (metrics, rejected) = score(&model, &params, &config, &data).unwrap();
        let metrics = metrics.unwrap();
        assert_eq!(metrics.n_configs, 2);
        assert!(metrics.energy_rmse.is_some());
        assert_eq!(metrics.force_rmse, None);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].id, ConfigId(1));
    }
}

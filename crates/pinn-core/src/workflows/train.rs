use crate::core::nn::params::ModelParameters;
use crate::core::potential::dress::fit_atomic_dress;
use crate::core::potential::model::PotentialModel;
use crate::engine::config::TrainingConfig;
use crate::engine::data::Dataset;
use crate::engine::error::EngineError;
use crate::engine::progress::ProgressReporter;
use crate::engine::state::TrainingOutcome;
use crate::engine::trainer::Trainer;
use std::sync::atomic::AtomicBool;
use tracing::{info, instrument};

/// A trained model with the outcome of the run that produced it.
#[derive(Debug, Clone)]
pub struct TrainedPotential {
    pub model: PotentialModel,
    pub outcome: TrainingOutcome,
}

impl TrainedPotential {
    pub fn parameters(&self) -> &ModelParameters {
        &self.outcome.parameters
    }
}

#[instrument(skip_all, name = "training_workflow")]
pub fn run(
    config: &TrainingConfig,
    train: &Dataset,
    eval: &Dataset,
    reporter: &ProgressReporter,
    cancel: Option<&AtomicBool>,
) -> Result<TrainedPotential, EngineError> {
    // === Phase 0: Validation and model construction ===
    let (model, params) = reporter.phase("Preparation", || -> Result<_, EngineError> {
        config.validate()?;
        if train.is_empty() {
            return Err(EngineError::EmptyDataset("training"));
        }
        info!(
            train = train.len(),
            eval = eval.len(),
            "Building model and preparing datasets."
        );

        let (model, params) = PotentialModel::initialize(config.model.clone(), config.run.seed)?;
        let mut model = model.configure_neighbors(&config.neighbors)?;
        info!(
            parameters = params.n_scalars(),
            "Initialized model parameters."
        );

        if config.run.regen_dress {
            let fit = fit_atomic_dress(train.iter(), model.species())?;
            info!(
                dress = ?fit.dress,
                skipped = fit.skipped.len(),
                "Regenerated atomic energy dress from the training set."
            );
            reporter.message(|| format!("Fitted atomic dress for {} species.", fit.dress.len()));
            model.set_energy_dress(fit.dress)?;
        }
        Ok((model, params))
    })?;

    // === Phase 1: Training ===
    let outcome = reporter.phase("Training", || {
        let mut trainer = Trainer::new(&model, config, reporter);
        if let Some(flag) = cancel {
            trainer = trainer.with_cancellation(flag);
        }
        let source = train.batches(
            config.run.batch_size,
            config.run.shuffle_buffer,
            config.run.seed,
        );
        trainer.run(params, source, eval)
    })?;

    info!(
        status = ?outcome.status,
        steps = outcome.steps,
        "Training workflow complete."
    );
    Ok(TrainedPotential { model, outcome })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::configuration::{AtomicConfiguration, Species};
    use crate::core::models::label::{ConfigId, Label, LabeledConfiguration};
    use crate::core::potential::config::ModelConfig;
    use crate::engine::config::{RunConfig, TrainingConfigBuilder};
    use crate::engine::progress::Progress;
    use crate::engine::state::RunStatus;
    use nalgebra::Point3;
    use std::sync::Mutex;

    fn config(regen_dress: bool) -> TrainingConfig {
        TrainingConfigBuilder::new()
            .model(ModelConfig {
                cutoff: 3.0,
                atom_types: vec![1, 8],
                depth: 1,
                embedding_dim: 4,
                pp_nodes: vec![4],
                pi_nodes: vec![4],
                ii_nodes: vec![4],
                en_nodes: vec![4],
                ..ModelConfig::default()
            })
            .run(RunConfig {
                batch_size: 2,
                max_steps: 3,
                eval_interval: 2,
                regen_dress,
                ..RunConfig::default()
            })
            .build()
            .unwrap()
    }

    fn isolated_atoms(id: u64, species: &[u32], energy: f64) -> LabeledConfiguration {
        let positions = (0..species.len())
            .map(|i| Point3::new(10.0 * i as f64, 0.0, 0.0))
            .collect();
        let configuration = AtomicConfiguration::new(
            species.iter().copied().map(Species).collect(),
            positions,
            None,
        )
        .unwrap();
        LabeledConfiguration::new(ConfigId(id), configuration, Label::new().with_energy(energy))
            .unwrap()
    }

    fn data() -> Dataset {
        vec![
            isolated_atoms(0, &[1], -0.5),
            isolated_atoms(1, &[8], -75.0),
            isolated_atoms(2, &[8, 1], -75.5),
            isolated_atoms(3, &[1, 1], -1.0),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn run_rejects_empty_training_set() {
        let result = run(
            &config(false),
            &Dataset::default(),
            &data(),
            &ProgressReporter::new(),
            None,
        );
        assert!(matches!(result, Err(EngineError::EmptyDataset("training"))));
    }

    #[test]
    fn run_regenerates_dress_before_training() {
        let data = data();
        let trained = run(&config(true), &data, &data, &ProgressReporter::new(), None).unwrap();
        let dress = trained.model.energy_dress();
        assert!((dress[0] + 0.5).abs() < 1e-8);
        assert!((dress[1] + 75.0).abs() < 1e-8);
        assert_eq!(trained.outcome.status, RunStatus::MaxStepsReached);
        assert_eq!(trained.parameters().version(), 3);
    }

    #[test]
    fn dress_regeneration_skips_configurations_with_unknown_species() {
        let mut records: Vec<LabeledConfiguration> = data().iter().cloned().collect();
        records[3] = isolated_atoms(3, &[6], -37.8);
        let data: Dataset = records.into_iter().collect();
        let mut config = config(true);
        config.run.shuffle_buffer = 1;

        let trained = run(&config, &data, &data, &ProgressReporter::new(), None).unwrap();
        let dress = trained.model.energy_dress();
        assert!((dress[0] + 0.5).abs() < 1e-8);
        assert!((dress[1] + 75.0).abs() < 1e-8);
        assert_eq!(trained.outcome.status, RunStatus::MaxStepsReached);
        assert!(
            trained
                .outcome
                .rejected
                .iter()
                .any(|r| r.id == ConfigId(3))
        );
    }

    #[test]
    fn run_reports_phases_and_evaluations() {
        let events = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            events.lock().unwrap().push(event);
        }));
        let data = data();
        run(&config(false), &data, &data, &reporter, None).unwrap();
        drop(reporter);

        let events = events.into_inner().unwrap();
        let phases: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                Progress::PhaseStart { name } => Some(*name),
                _ => None,
            })
            .collect();
        assert_eq!(phases, vec!["Preparation", "Training"]);
        let evaluated: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                Progress::Evaluation { step, .. } => Some(*step),
                _ => None,
            })
            .collect();
        assert_eq!(evaluated, vec![0, 2, 3]);
        let increments: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                Progress::TaskIncrement { step, loss } => {
                    assert!(loss.is_some_and(f64::is_finite));
                    Some(*step)
                }
                _ => None,
            })
            .collect();
        assert_eq!(increments, vec![1, 2, 3]);
        assert!(events.contains(&Progress::TaskFinish {
            status: RunStatus::MaxStepsReached,
            steps: 3,
        }));
        assert_eq!(events.last(), Some(&Progress::PhaseFinish));
    }

    #[test]
    fn run_announces_dress_regeneration() {
        let events = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            events.lock().unwrap().push(event);
        }));
        let data = data();
        run(&config(true), &data, &data, &reporter, None).unwrap();
        drop(reporter);

        let events = events.into_inner().unwrap();
        assert!(events.contains(&Progress::Message(
            "Fitted atomic dress for 2 species.".to_string()
        )));
    }
}

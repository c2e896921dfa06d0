use nalgebra::{Point3, Unit, Vector3};
use pinnrs::core::models::configuration::{AtomicConfiguration, Species};
use pinnrs::core::models::label::{ConfigId, Label, LabeledConfiguration};
use pinnrs::core::potential::basis::BasisKind;
use pinnrs::core::potential::config::ModelConfig;
use pinnrs::engine::config::{RunConfig, TrainingConfig, TrainingConfigBuilder};
use pinnrs::engine::data::Dataset;
use pinnrs::engine::optimizer::{LearningRateSchedule, OptimizerConfig, OptimizerKind};
use pinnrs::engine::progress::ProgressReporter;
use pinnrs::engine::state::RunStatus;
use pinnrs::workflows::{predict, train};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MORSE_DEPTH: f64 = 1.0;
const MORSE_WIDTH: f64 = 1.5;
const MORSE_EQUILIBRIUM: f64 = 1.1;

fn morse(r: f64) -> (f64, f64) {
    let decay = (-MORSE_WIDTH * (r - MORSE_EQUILIBRIUM)).exp();
    let energy = MORSE_DEPTH * (1.0 - decay).powi(2);
    let derivative = 2.0 * MORSE_DEPTH * MORSE_WIDTH * (1.0 - decay) * decay;
    (energy, derivative)
}

fn morse_dataset(n: u64, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|id| {
            let r = rng.gen_range(0.9..1.6);
            let direction = Unit::new_normalize(Vector3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0) + 1e-3,
            ));
            let origin = Point3::new(
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-2.0..2.0),
            );
            let (energy, derivative) = morse(r);
            let force = direction.into_inner() * derivative;
            let configuration = AtomicConfiguration::new(
                vec![Species(1), Species(1)],
                vec![origin, origin + direction.into_inner() * r],
                None,
            )
            .unwrap();
            let label = Label::new()
                .with_energy(energy)
                .with_forces(vec![force, -force]);
            LabeledConfiguration::new(ConfigId(id), configuration, label).unwrap()
        })
        .collect()
}

fn config(max_steps: u64, optimizer: OptimizerConfig, workers: usize) -> TrainingConfig {
    TrainingConfigBuilder::new()
        .model(ModelConfig {
            cutoff: 3.0,
            basis: BasisKind::Gaussian { gamma: 5.0 },
            n_basis: 8,
            atom_types: vec![1],
            depth: 2,
            embedding_dim: 8,
            pp_nodes: vec![16],
            pi_nodes: vec![16],
            ii_nodes: vec![16],
            en_nodes: vec![16],
            ..ModelConfig::default()
        })
        .optimizer(optimizer)
        .run(RunConfig {
            batch_size: 10,
            shuffle_buffer: 40,
            seed: 42,
            max_steps,
            eval_interval: 100,
            workers,
            regen_dress: true,
            ..RunConfig::default()
        })
        .build()
        .unwrap()
}

#[test]
fn training_on_a_morse_dimer_reduces_the_evaluation_loss() {
    let (train_set, eval_set) = morse_dataset(50, 2024).split(0.2, 7);
    let optimizer = OptimizerConfig {
        learning_rate: 0.01,
        schedule: LearningRateSchedule::ExponentialDecay {
            decay_rate: 0.5,
            decay_steps: 400,
        },
        ..OptimizerConfig::default()
    };
    let config = config(800, optimizer, 2);

    let trained = train::run(&config, &train_set, &eval_set, &ProgressReporter::new(), None).unwrap();
    let outcome = &trained.outcome;

    assert_eq!(outcome.status, RunStatus::MaxStepsReached);
    assert!(outcome.rejected.is_empty());
    assert_eq!(outcome.skipped_batches, 0);
    let initial = outcome.initial_evaluation.unwrap().metrics;
    let last = outcome.final_evaluation.unwrap().metrics;
    assert!(
        last.loss < initial.loss,
        "final {} not below initial {}",
        last.loss,
        initial.loss
    );
    assert!(last.loss < 0.05, "final evaluation loss {}", last.loss);
    assert!(last.force_rmse.unwrap() < initial.force_rmse.unwrap());
    assert_eq!(last.n_configs, 10);

    let (scored, rejected) =
        predict::score(&trained.model, trained.parameters(), &config, &eval_set).unwrap();
    assert!(rejected.is_empty());
    assert!((scored.unwrap().loss - last.loss).abs() < 1e-12);
}

#[test]
fn sharded_training_follows_the_same_trajectory() {
    let data = morse_dataset(20, 5);
    let sgd = OptimizerConfig {
        kind: OptimizerKind::Sgd { momentum: 0.5 },
        learning_rate: 0.02,
        ..OptimizerConfig::default()
    };
    let reporter = ProgressReporter::new();
    let single = train::run(&config(15, sgd.clone(), 1), &data, &data, &reporter, None).unwrap();
    let sharded = train::run(&config(15, sgd, 4), &data, &data, &reporter, None).unwrap();

    assert_eq!(single.parameters().version(), 15);
    assert_eq!(sharded.parameters().version(), 15);
    for ((_, a), (_, b)) in single.parameters().iter().zip(sharded.parameters().iter()) {
        assert_eq!(a.name, b.name);
        assert!((&a.value - &b.value).amax() < 1e-8, "{} diverged", a.name);
    }
}

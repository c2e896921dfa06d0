use super::basis::RadialBasis;
use super::config::ModelConfig;
use super::derivatives::{self, Derivatives, ForwardVars, Prediction, PredictionVars};
use super::error::{ModelConfigError, PredictionError};
use super::input::{ModelInput, SpeciesIndex};
use super::interaction::{InteractionLayer, LayerShape, Readout};
use crate::core::autodiff::Graph;
use crate::core::models::configuration::AtomicConfiguration;
use crate::core::neighbors::builder::{NeighborError, NeighborListBuilder, NeighborSettings};
use crate::core::neighbors::list::NeighborList;
use crate::core::nn::params::{ModelParameters, ParamBinding, ParamId, ParamKind};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// A pairwise-interaction neural-network potential.
///
/// The model holds the architecture and parameter handles; the learnable
/// values live in a separate [`ModelParameters`] so the model can be shared
/// immutably between threads while the optimizer owns the parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PotentialModel {
    config: ModelConfig,
    species: SpeciesIndex,
    neighbors: NeighborListBuilder,
    basis: RadialBasis,
    embedding: ParamId,
    layers: Vec<InteractionLayer>,
    readout: Readout,
    dress: Vec<f64>,
}

impl PotentialModel {
    /// Builds the architecture and draws initial parameters from `seed`.
    pub fn initialize(
        config: ModelConfig,
        seed: u64,
    ) -> Result<(Self, ModelParameters), ModelConfigError> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut params = ModelParameters::new();

        let species = SpeciesIndex::new(&config.atom_types);
        let table = DMatrix::from_fn(species.len(), config.embedding_dim, |_, _| {
            rng.gen_range(-1.0..1.0)
        });
        let embedding = params.register("embedding", ParamKind::Embedding, table);

        let shape = LayerShape {
            pp_nodes: &config.pp_nodes,
            pi_nodes: &config.pi_nodes,
            ii_nodes: &config.ii_nodes,
            n_basis: config.n_basis,
        };
        let mut width = config.embedding_dim;
        let mut layers = Vec::with_capacity(config.depth);
        for t in 0..config.depth {
            let layer = InteractionLayer::new(&mut params, &format!("layer-{t}"), width, shape, &mut rng);
            width = layer.out_dim();
            layers.push(layer);
        }
        let readout = Readout::new(&mut params, width, &config.en_nodes, &mut rng);

        let neighbors = NeighborListBuilder::new(config.cutoff)
            .map_err(|e| ModelConfigError::invalid("cutoff", e.to_string()))?;
        let basis = RadialBasis::new(config.basis, config.cutoff_kind, config.cutoff, config.n_basis);
        let dress = aligned_dress(&config.energy_dress, species.len());

        debug!(
            depth = config.depth,
            tensors = params.len(),
            scalars = params.n_scalars(),
            "Initialized potential model."
        );

        Ok((
            Self {
                config,
                species,
                neighbors,
                basis,
                embedding,
                layers,
                readout,
                dress,
            },
            params,
        ))
    }

    /// Applies neighbor-search settings; the cutoff always stays the model's.
    pub fn configure_neighbors(mut self, settings: &NeighborSettings) -> Result<Self, ModelConfigError> {
        self.neighbors = settings
            .builder(self.config.cutoff)
            .map_err(|e| ModelConfigError::invalid("neighbors", e.to_string()))?;
        Ok(self)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn species(&self) -> &SpeciesIndex {
        &self.species
    }

    pub fn cutoff(&self) -> f64 {
        self.config.cutoff
    }

    pub fn neighbor_builder(&self) -> &NeighborListBuilder {
        &self.neighbors
    }

    pub fn energy_dress(&self) -> &[f64] {
        &self.dress
    }

    /// Replaces the per-species reference energies (aligned with `atom_types`).
    pub fn set_energy_dress(&mut self, dress: Vec<f64>) -> Result<(), ModelConfigError> {
        self.config.validate_dress(&dress)?;
        self.dress = aligned_dress(&dress, self.species.len());
        self.config.energy_dress = dress;
        Ok(())
    }

    pub fn neighbor_list(&self, configuration: &AtomicConfiguration) -> Result<NeighborList, NeighborError> {
        self.neighbors.build(configuration)
    }

    /// Builds the neighbor lists of `configurations` and flattens everything
    /// into one model input.
    pub fn prepare(&self, configurations: &[&AtomicConfiguration]) -> Result<ModelInput, PredictionError> {
        #[cfg(feature = "parallel")]
        let iter = configurations.par_iter();
        #[cfg(not(feature = "parallel"))]
        let iter = configurations.iter();

        let lists = iter
            .enumerate()
            .map(|(index, configuration)| {
                self.neighbors
                    .build(configuration)
                    .map_err(|source| PredictionError::Neighbors { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        ModelInput::assemble(configurations, &lists, &self.species)
    }

    /// Records the energy pipeline for `input` on `graph`.
    pub fn forward(&self, graph: &mut Graph, binding: &ParamBinding, input: &ModelInput) -> ForwardVars {
        let positions = graph.variable(input.positions.clone());
        let shifts = graph.constant(input.shift_vectors.clone());
        let at_neighbor = graph.gather(positions, input.pair_neighbor.clone());
        let at_center = graph.gather(positions, input.pair_center.clone());
        let relative = graph.sub(at_neighbor, at_center);
        let displacements = graph.add(relative, shifts);

        let squared = graph.square(displacements);
        let r2 = graph.sum_cols(squared);
        let distances = graph.sqrt(r2);
        let basis = self.basis.forward(graph, distances);

        let mut features = graph.gather(binding.get(self.embedding), input.type_index.clone());
        for layer in &self.layers {
            features = layer.forward(graph, binding, features, basis, input);
        }

        let raw = self.readout.forward(graph, binding, features);
        let scaled = graph.scale(raw, self.config.energy_scale);
        let dress: Vec<f64> = input.type_index.iter().map(|&t| self.dress[t]).collect();
        let dress = graph.column(&dress);
        let atomic_energy = graph.add(scaled, dress);
        let energy = graph.scatter_add(atomic_energy, input.atom_config.clone(), input.n_configs);

        ForwardVars {
            positions,
            displacements,
            atomic_energy,
            energy,
        }
    }

    /// Forward pass plus the requested derivatives.
    pub fn evaluate(
        &self,
        graph: &mut Graph,
        binding: &ParamBinding,
        input: &ModelInput,
        derivatives: Derivatives,
    ) -> PredictionVars {
        let forward = self.forward(graph, binding, input);
        derivatives::differentiate(graph, &forward, input, derivatives)
    }

    pub fn predict(
        &self,
        params: &ModelParameters,
        configuration: &AtomicConfiguration,
    ) -> Result<Prediction, PredictionError> {
        let input = self.prepare(&[configuration])?;
        let mut graph = Graph::new();
        let binding = params.bind(&mut graph);
        let vars = self.evaluate(&mut graph, &binding, &input, Derivatives::ALL);
        Ok(vars.extract(&graph, &input, 0))
    }

    /// Predicts every configuration in one graph. Fails on the first invalid
    /// configuration, naming its position.
    pub fn predict_batch(
        &self,
        params: &ModelParameters,
        configurations: &[&AtomicConfiguration],
    ) -> Result<Vec<Prediction>, PredictionError> {
        let input = self.prepare(configurations)?;
        let mut graph = Graph::new();
        let binding = params.bind(&mut graph);
        let vars = self.evaluate(&mut graph, &binding, &input, Derivatives::ALL);
        Ok((0..input.n_configs())
            .map(|c| vars.extract(&graph, &input, c))
            .collect())
    }
}

fn aligned_dress(dress: &[f64], n_types: usize) -> Vec<f64> {
    if dress.is_empty() {
        vec![0.0; n_types]
    } else {
        dress.to_vec()
    }
}

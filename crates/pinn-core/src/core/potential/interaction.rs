use super::input::ModelInput;
use crate::core::autodiff::{Graph, Var};
use crate::core::nn::dense::{Activation, Dense, FeedForward};
use crate::core::nn::params::{ModelParameters, ParamBinding};
use rand::rngs::StdRng;

/// One pairwise-interaction block.
///
/// Atom features are first refined per atom (PP), combined per directed pair
/// and weighted by the radial basis (PI), transformed per pair (II) and
/// summed into the center atom (IP). The result is added to the refined
/// features, projected when the widths differ.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionLayer {
    pp: FeedForward,
    pi_center: Dense,
    pi_neighbor: Dense,
    pi_hidden: FeedForward,
    pi_out: Dense,
    ii: FeedForward,
    residual: Option<Dense>,
    n_basis: usize,
    pi_width: usize,
}

/// Layer widths shared by every interaction block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LayerShape<'a> {
    pub pp_nodes: &'a [usize],
    pub pi_nodes: &'a [usize],
    pub ii_nodes: &'a [usize],
    pub n_basis: usize,
}

impl InteractionLayer {
    pub(crate) fn new(
        params: &mut ModelParameters,
        name: &str,
        in_dim: usize,
        shape: LayerShape,
        rng: &mut StdRng,
    ) -> Self {
        let pp = FeedForward::new(
            params,
            &format!("{name}/pp"),
            in_dim,
            shape.pp_nodes,
            true,
            Activation::Tanh,
            rng,
        );
        let atom_width = pp.out_dim();

        let (first, rest) = match shape.pi_nodes.split_first() {
            Some((&first, rest)) => (first, rest),
            None => (atom_width, &[][..]),
        };
        let pi_center = Dense::new(
            params,
            &format!("{name}/pi-center"),
            atom_width,
            first,
            true,
            Activation::Identity,
            rng,
        );
        let pi_neighbor = Dense::new(
            params,
            &format!("{name}/pi-neighbor"),
            atom_width,
            first,
            false,
            Activation::Identity,
            rng,
        );
        let pi_hidden = FeedForward::new(
            params,
            &format!("{name}/pi-hidden"),
            first,
            rest,
            true,
            Activation::Tanh,
            rng,
        );
        let pi_width = pi_hidden.out_dim();
        let pi_out = Dense::new(
            params,
            &format!("{name}/pi-out"),
            pi_width,
            shape.n_basis * pi_width,
            false,
            Activation::Identity,
            rng,
        );

        let ii = FeedForward::new(
            params,
            &format!("{name}/ii"),
            pi_width,
            shape.ii_nodes,
            false,
            Activation::Tanh,
            rng,
        );
        let residual = (ii.out_dim() != atom_width).then(|| {
            Dense::new(
                params,
                &format!("{name}/residual"),
                atom_width,
                ii.out_dim(),
                false,
                Activation::Identity,
                rng,
            )
        });

        Self {
            pp,
            pi_center,
            pi_neighbor,
            pi_hidden,
            pi_out,
            ii,
            residual,
            n_basis: shape.n_basis,
            pi_width,
        }
    }

    pub fn out_dim(&self) -> usize {
        self.ii.out_dim()
    }

    /// Updates `(atoms, d_in)` features to `(atoms, d_out)` given the
    /// `(pairs, n_basis)` radial basis of the batch.
    pub(crate) fn forward(
        &self,
        graph: &mut Graph,
        binding: &ParamBinding,
        features: Var,
        basis: Var,
        input: &ModelInput,
    ) -> Var {
        let refined = self.pp.forward(graph, binding, features);

        let at_center = graph.gather(refined, input.pair_center.clone());
        let at_neighbor = graph.gather(refined, input.pair_neighbor.clone());
        let hc = self.pi_center.forward(graph, binding, at_center);
        let hn = self.pi_neighbor.forward(graph, binding, at_neighbor);
        let combined = graph.add(hc, hn);
        let mut pair = graph.tanh(combined);
        pair = self.pi_hidden.forward(graph, binding, pair);
        let weights = self.pi_out.forward(graph, binding, pair);

        let mut interaction = None;
        for b in 0..self.n_basis {
            let block = graph.slice_cols(weights, b * self.pi_width, self.pi_width);
            let radial = graph.slice_cols(basis, b, 1);
            let term = graph.mul_col(block, radial);
            interaction = Some(match interaction {
                Some(acc) => graph.add(acc, term),
                None => term,
            });
        }
        let interaction = interaction.unwrap_or(weights);
        let interaction = self.ii.forward(graph, binding, interaction);

        let aggregated = graph.scatter_add(interaction, input.pair_center.clone(), input.n_atoms);
        let carried = match &self.residual {
            Some(projection) => projection.forward(graph, binding, refined),
            None => refined,
        };
        graph.add(carried, aggregated)
    }
}

/// Per-atom energy head: a tanh network followed by a bias-free scalar map.
#[derive(Debug, Clone, PartialEq)]
pub struct Readout {
    hidden: FeedForward,
    output: Dense,
}

impl Readout {
    pub(crate) fn new(
        params: &mut ModelParameters,
        in_dim: usize,
        en_nodes: &[usize],
        rng: &mut StdRng,
    ) -> Self {
        let hidden = FeedForward::new(params, "readout", in_dim, en_nodes, true, Activation::Tanh, rng);
        let output = Dense::new(
            params,
            "readout/energy",
            hidden.out_dim(),
            1,
            false,
            Activation::Identity,
            rng,
        );
        Self { hidden, output }
    }

    /// `(atoms, d)` features to `(atoms, 1)` raw atomic energies.
    pub(crate) fn forward(&self, graph: &mut Graph, binding: &ParamBinding, features: Var) -> Var {
        let h = self.hidden.forward(graph, binding, features);
        self.output.forward(graph, binding, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::configuration::{AtomicConfiguration, Species};
    use crate::core::neighbors::builder::NeighborListBuilder;
    use crate::core::potential::input::SpeciesIndex;
    use nalgebra::{DMatrix, Point3};
    use rand::SeedableRng;
    use std::sync::Arc;

    const N_BASIS: usize = 2;

    fn layer(params: &mut ModelParameters) -> InteractionLayer {
        let shape = LayerShape {
            pp_nodes: &[5],
            pi_nodes: &[6],
            ii_nodes: &[3],
            n_basis: N_BASIS,
        };
        InteractionLayer::new(params, "layer0", 4, shape, &mut StdRng::seed_from_u64(3))
    }

    /// A bonded pair plus one atom far outside the cutoff.
    fn dimer_and_loner() -> ModelInput {
        let configuration = AtomicConfiguration::new(
            vec![Species(1); 3],
            vec![
                Point3::origin(),
                Point3::new(1.0, 0.2, 0.0),
                Point3::new(20.0, 0.0, 0.0),
            ],
            None,
        )
        .unwrap();
        let list = NeighborListBuilder::new(3.0)
            .unwrap()
            .build(&configuration)
            .unwrap();
        ModelInput::assemble(&[&configuration], &[list], &SpeciesIndex::new(&[1])).unwrap()
    }

    fn features() -> DMatrix<f64> {
        DMatrix::from_fn(3, 4, |i, j| 0.3 * i as f64 - 0.2 * j as f64 + 0.1)
    }

    fn basis(n_pairs: usize, scale: f64) -> DMatrix<f64> {
        DMatrix::from_fn(n_pairs, N_BASIS, |p, b| scale * (0.5 + 0.25 * (p + b) as f64))
    }

    /// Layer output and the residual path alone, as values.
    fn run(
        layer: &InteractionLayer,
        params: &ModelParameters,
        input: &ModelInput,
        basis: DMatrix<f64>,
    ) -> (DMatrix<f64>, DMatrix<f64>) {
        let mut graph = Graph::new();
        let binding = params.bind(&mut graph);
        let features = graph.constant(features());
        let basis = graph.constant(basis);
        let out = layer.forward(&mut graph, &binding, features, basis, input);

        let refined = layer.pp.forward(&mut graph, &binding, features);
        let carried = match &layer.residual {
            Some(projection) => projection.forward(&mut graph, &binding, refined),
            None => refined,
        };
        (graph.value(out).clone(), graph.value(carried).clone())
    }

    #[test]
    fn output_has_one_row_per_atom_and_the_ii_width() {
        let mut params = ModelParameters::new();
        let layer = layer(&mut params);
        let input = dimer_and_loner();
        assert_eq!(input.pair_center.len(), 2);
        let (out, _) = run(&layer, &params, &input, basis(2, 1.0));
        assert_eq!(layer.out_dim(), 3);
        assert_eq!(out.shape(), (3, 3));
        assert!(layer.residual.is_some());
    }

    #[test]
    fn atoms_without_neighbors_only_carry_the_residual() {
        let mut params = ModelParameters::new();
        let layer = layer(&mut params);
        let (out, carried) = run(&layer, &params, &dimer_and_loner(), basis(2, 1.0));
        let messages = &out - &carried;
        assert!(messages.row(2).amax() < 1e-14);
        assert!(messages.row(0).amax() > 1e-6);
        assert!(messages.row(1).amax() > 1e-6);
    }

    #[test]
    fn zero_basis_sends_no_messages() {
        let mut params = ModelParameters::new();
        let layer = layer(&mut params);
        let (out, carried) = run(&layer, &params, &dimer_and_loner(), basis(2, 0.0));
        assert!((out - carried).amax() < 1e-14);
    }

    #[test]
    fn aggregation_ignores_pair_order() {
        let mut params = ModelParameters::new();
        let layer = layer(&mut params);
        let input = dimer_and_loner();
        let pair_basis = basis(2, 1.0);

        let mut reversed = input.clone();
        reversed.pair_center = input.pair_center.iter().rev().copied().collect::<Arc<[usize]>>();
        reversed.pair_neighbor = input.pair_neighbor.iter().rev().copied().collect::<Arc<[usize]>>();
        let reversed_basis = DMatrix::from_fn(2, N_BASIS, |p, b| pair_basis[(1 - p, b)]);

        let (out, _) = run(&layer, &params, &input, pair_basis);
        let (out_reversed, _) = run(&layer, &params, &reversed, reversed_basis);
        assert!((out - out_reversed).amax() < 1e-12);
    }
}

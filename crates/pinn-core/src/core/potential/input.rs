use super::error::PredictionError;
use crate::core::models::configuration::{AtomicConfiguration, Species};
use crate::core::models::error::InputError;
use crate::core::neighbors::list::NeighborList;
use nalgebra::DMatrix;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps species onto rows of the embedding table, in `atom_types` order.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesIndex {
    species: Vec<Species>,
    lookup: HashMap<Species, usize>,
}

impl SpeciesIndex {
    pub fn new(atom_types: &[u32]) -> Self {
        let species: Vec<Species> = atom_types.iter().copied().map(Species).collect();
        let lookup = species.iter().enumerate().map(|(i, &s)| (s, i)).collect();
        Self { species, lookup }
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn index_of(&self, species: Species) -> Result<usize, InputError> {
        self.lookup
            .get(&species)
            .copied()
            .ok_or(InputError::UnknownSpecies(species))
    }

    pub fn check(&self, configuration: &AtomicConfiguration) -> Result<(), InputError> {
        configuration
            .species()
            .iter()
            .try_for_each(|&s| self.index_of(s).map(|_| ()))
    }
}

/// Flattened tensors of a batch of configurations and their neighbor lists.
///
/// Atoms of all configurations are stacked in order; pair indices refer to
/// rows of the stacked position matrix.
#[derive(Debug, Clone)]
pub struct ModelInput {
    pub(crate) n_atoms: usize,
    pub(crate) n_configs: usize,
    pub(crate) type_index: Arc<[usize]>,
    pub(crate) positions: DMatrix<f64>,
    pub(crate) atom_config: Arc<[usize]>,
    pub(crate) atom_offsets: Vec<usize>,
    pub(crate) pair_center: Arc<[usize]>,
    pub(crate) pair_neighbor: Arc<[usize]>,
    pub(crate) pair_config: Arc<[usize]>,
    /// Cartesian lattice translation `S·H` of every pair.
    pub(crate) shift_vectors: DMatrix<f64>,
    /// `1/V` per configuration, zero for open systems.
    pub(crate) inverse_volume: Vec<f64>,
    pub(crate) periodic: Vec<bool>,
}

impl ModelInput {
    pub fn assemble(
        configurations: &[&AtomicConfiguration],
        neighbor_lists: &[NeighborList],
        species: &SpeciesIndex,
    ) -> Result<Self, PredictionError> {
        debug_assert_eq!(configurations.len(), neighbor_lists.len());
        let n_atoms: usize = configurations.iter().map(|c| c.n_atoms()).sum();
        let n_pairs: usize = neighbor_lists.iter().map(NeighborList::len).sum();

        let mut type_index = Vec::with_capacity(n_atoms);
        let mut positions = DMatrix::zeros(n_atoms, 3);
        let mut atom_config = Vec::with_capacity(n_atoms);
        let mut atom_offsets = Vec::with_capacity(configurations.len());
        let mut pair_center = Vec::with_capacity(n_pairs);
        let mut pair_neighbor = Vec::with_capacity(n_pairs);
        let mut pair_config = Vec::with_capacity(n_pairs);
        let mut shift_vectors = DMatrix::zeros(n_pairs, 3);
        let mut inverse_volume = Vec::with_capacity(configurations.len());
        let mut periodic = Vec::with_capacity(configurations.len());

        let mut offset = 0;
        for (c, (configuration, list)) in configurations.iter().zip(neighbor_lists).enumerate() {
            atom_offsets.push(offset);
            for (a, (&s, p)) in configuration
                .species()
                .iter()
                .zip(configuration.positions())
                .enumerate()
            {
                let t = species
                    .index_of(s)
                    .map_err(|source| PredictionError::Input { index: c, source })?;
                type_index.push(t);
                atom_config.push(c);
                for k in 0..3 {
                    positions[(offset + a, k)] = p[k];
                }
            }
            for pair in list.iter() {
                let row = pair_center.len();
                pair_center.push(offset + pair.center);
                pair_neighbor.push(offset + pair.neighbor);
                pair_config.push(c);
                if let Some(cell) = configuration.cell() {
                    let shift = cell.shift_vector(&pair.shift);
                    for k in 0..3 {
                        shift_vectors[(row, k)] = shift[k];
                    }
                }
            }
            inverse_volume.push(configuration.cell().map_or(0.0, |cell| 1.0 / cell.volume()));
            periodic.push(configuration.is_periodic());
            offset += configuration.n_atoms();
        }

        Ok(Self {
            n_atoms,
            n_configs: configurations.len(),
            type_index: type_index.into(),
            positions,
            atom_config: atom_config.into(),
            atom_offsets,
            pair_center: pair_center.into(),
            pair_neighbor: pair_neighbor.into(),
            pair_config: pair_config.into(),
            shift_vectors,
            inverse_volume,
            periodic,
        })
    }

    pub fn n_atoms(&self) -> usize {
        self.n_atoms
    }

    pub fn n_configs(&self) -> usize {
        self.n_configs
    }

    pub fn n_pairs(&self) -> usize {
        self.pair_center.len()
    }

    /// Row range of configuration `c` in the stacked atom matrix.
    pub fn atom_range(&self, c: usize) -> std::ops::Range<usize> {
        let start = self.atom_offsets[c];
        let end = self
            .atom_offsets
            .get(c + 1)
            .copied()
            .unwrap_or(self.n_atoms);
        start..end
    }

    pub fn is_periodic(&self, c: usize) -> bool {
        self.periodic[c]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::cell::Cell;
    use crate::core::neighbors::builder::NeighborListBuilder;
    use nalgebra::Point3;

    fn dimer(cell: Option<Cell>) -> AtomicConfiguration {
        AtomicConfiguration::new(
            vec![Species(1), Species(8)],
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, 1.0)],
            cell,
        )
        .unwrap()
    }

    #[test]
    fn species_index_follows_atom_types_order() {
        let index = SpeciesIndex::new(&[8, 1]);
        assert_eq!(index.index_of(Species(1)), Ok(1));
        assert_eq!(
            index.index_of(Species(6)),
            Err(InputError::UnknownSpecies(Species(6)))
        );
    }

    #[test]
    fn assemble_offsets_pairs_into_stacked_atoms() {
        let builder = NeighborListBuilder::new(1.5).unwrap();
        let open = dimer(None);
        let periodic = dimer(Some(Cell::cubic(10.0).unwrap()));
        let lists = vec![builder.build(&open).unwrap(), builder.build(&periodic).unwrap()];
        let input =
            ModelInput::assemble(&[&open, &periodic], &lists, &SpeciesIndex::new(&[1, 8])).unwrap();

        assert_eq!(input.n_atoms(), 4);
        assert_eq!(input.n_pairs(), 4);
        assert_eq!(&*input.pair_center, &[0, 1, 2, 3]);
        assert_eq!(&*input.pair_neighbor, &[1, 0, 3, 2]);
        assert_eq!(&*input.pair_config, &[0, 0, 1, 1]);
        assert_eq!(&*input.type_index, &[0, 1, 0, 1]);
        assert_eq!(input.atom_range(1), 2..4);
        assert_eq!(input.inverse_volume[0], 0.0);
        assert!((input.inverse_volume[1] - 1e-3).abs() < 1e-15);
    }

    #[test]
    fn assemble_rejects_unknown_species() {
        let builder = NeighborListBuilder::new(1.5).unwrap();
        let config = dimer(None);
        let lists = vec![builder.build(&config).unwrap()];
        let result = ModelInput::assemble(&[&config], &lists, &SpeciesIndex::new(&[1]));
        assert!(matches!(
            result,
            Err(PredictionError::Input {
                index: 0,
                source: InputError::UnknownSpecies(Species(8))
            })
        ));
    }
}

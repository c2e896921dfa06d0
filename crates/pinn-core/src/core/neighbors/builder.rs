use super::list::{NeighborList, NeighborPair};
use crate::core::models::cell::Cell;
use crate::core::models::configuration::AtomicConfiguration;
use itertools::iproduct;
use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use std::array;
use std::collections::HashMap;
use thiserror::Error;
use tracing::trace;

pub const DEFAULT_BINNING_THRESHOLD: usize = 64;
pub const DEFAULT_MAX_IMAGES: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NeighborStrategy {
    /// Binned at or above the binning threshold, brute force below it.
    #[default]
    Auto,
    BruteForce,
    Binned,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NeighborError {
    #[error("Cutoff radius must be positive and finite, got {0}")]
    InvalidCutoff(f64),

    #[error("Neighbor list exceeds the budget of {limit} pairs")]
    PairBudgetExceeded { limit: usize },

    #[error("Cutoff {cutoff} needs {required} periodic image offsets, budget is {limit}")]
    ImageBudgetExceeded {
        cutoff: f64,
        required: f64,
        limit: usize,
    },
}

/// Search settings that do not depend on the cutoff, which the model owns.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NeighborSettings {
    pub strategy: NeighborStrategy,
    pub binning_threshold: usize,
    pub max_pairs: Option<usize>,
    pub max_images: usize,
}

impl Default for NeighborSettings {
    fn default() -> Self {
        Self {
            strategy: NeighborStrategy::Auto,
            binning_threshold: DEFAULT_BINNING_THRESHOLD,
            max_pairs: None,
            max_images: DEFAULT_MAX_IMAGES,
        }
    }
}

impl NeighborSettings {
    pub fn builder(&self, cutoff: f64) -> Result<NeighborListBuilder, NeighborError> {
        Ok(NeighborListBuilder::new(cutoff)?
            .with_strategy(self.strategy)
            .with_binning_threshold(self.binning_threshold)
            .with_max_pairs(self.max_pairs)
            .with_max_images(self.max_images))
    }
}

/// Builds bidirectional neighbor lists within a fixed cutoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborListBuilder {
    cutoff: f64,
    strategy: NeighborStrategy,
    binning_threshold: usize,
    max_pairs: Option<usize>,
    max_images: usize,
}

impl NeighborListBuilder {
    pub fn new(cutoff: f64) -> Result<Self, NeighborError> {
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(NeighborError::InvalidCutoff(cutoff));
        }
        Ok(Self {
            cutoff,
            strategy: NeighborStrategy::Auto,
            binning_threshold: DEFAULT_BINNING_THRESHOLD,
            max_pairs: None,
            max_images: DEFAULT_MAX_IMAGES,
        })
    }

    pub fn with_strategy(mut self, strategy: NeighborStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_binning_threshold(mut self, atoms: usize) -> Self {
        self.binning_threshold = atoms;
        self
    }

    pub fn with_max_pairs(mut self, limit: Option<usize>) -> Self {
        self.max_pairs = limit;
        self
    }

    pub fn with_max_images(mut self, limit: usize) -> Self {
        self.max_images = limit;
        self
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn strategy(&self) -> NeighborStrategy {
        self.strategy
    }

    /// Enumerates every `(i, j, S)` with `0 < |x_j + S·H − x_i| ≤ cutoff`.
    ///
    /// # Errors
    ///
    /// Fails with a budget error instead of truncating the list when the
    /// configuration would need more pairs or image offsets than allowed.
    pub fn build(&self, configuration: &AtomicConfiguration) -> Result<NeighborList, NeighborError> {
        let n_atoms = configuration.n_atoms();
        if n_atoms == 0 || (n_atoms == 1 && !configuration.is_periodic()) {
            return Ok(NeighborList::empty(self.cutoff, n_atoms));
        }

        let binned = match self.strategy {
            NeighborStrategy::Auto => n_atoms >= self.binning_threshold,
            NeighborStrategy::BruteForce => false,
            NeighborStrategy::Binned => true,
        };

        let mut collector = PairCollector {
            positions: configuration.positions(),
            cell: configuration.cell(),
            cutoff_sq: self.cutoff * self.cutoff,
            max_pairs: self.max_pairs,
            pairs: Vec::new(),
        };

        match (configuration.cell(), binned) {
            (Some(cell), false) => self.periodic_brute_force(cell, &mut collector)?,
            (Some(cell), true) => self.periodic_binned(cell, &mut collector)?,
            (None, false) => open_brute_force(&mut collector)?,
            (None, true) => self.open_binned(&mut collector)?,
        }

        trace!(
            atoms = n_atoms,
            pairs = collector.pairs.len(),
            binned,
            "Neighbor list built."
        );
        Ok(NeighborList::new(self.cutoff, n_atoms, collector.pairs))
    }

    fn periodic_brute_force(
        &self,
        cell: &Cell,
        collector: &mut PairCollector,
    ) -> Result<(), NeighborError> {
        let spacings = cell.plane_spacings();
        let reach: [i32; 3] = array::from_fn(|k| (self.cutoff / spacings[k]).ceil() as i32);
        self.check_image_budget(&reach)?;

        let frame = WrappedFrame::new(collector.positions, cell);
        let n_atoms = collector.positions.len();
        for (i, j) in iproduct!(0..n_atoms, 0..n_atoms) {
            let base = frame.wraps[i] - frame.wraps[j];
            for (a, b, c) in iproduct!(
                -reach[0]..=reach[0],
                -reach[1]..=reach[1],
                -reach[2]..=reach[2]
            ) {
                collector.consider(i, j, base + Vector3::new(a, b, c))?;
            }
        }
        Ok(())
    }

    fn periodic_binned(&self, cell: &Cell, collector: &mut PairCollector) -> Result<(), NeighborError> {
        let spacings = cell.plane_spacings();
        let bins: [i64; 3] = array::from_fn(|k| ((spacings[k] / self.cutoff).floor() as i64).max(1));
        // Bins are at least one cutoff wide unless the cell itself is thinner.
        let reach: [i64; 3] = array::from_fn(|k| {
            let width = spacings[k] / bins[k] as f64;
            (self.cutoff / width).floor() as i64 + 1
        });
        self.check_image_budget(&reach.map(|r| r as i32))?;

        let frame = WrappedFrame::new(collector.positions, cell);
        let bin_of = |s: &Vector3<f64>| -> [i64; 3] {
            array::from_fn(|k| ((s[k] * bins[k] as f64).floor() as i64).clamp(0, bins[k] - 1))
        };

        let mut grid: HashMap<[i64; 3], Vec<usize>> = HashMap::new();
        for (i, s) in frame.fractional.iter().enumerate() {
            grid.entry(bin_of(s)).or_default().push(i);
        }

        for (i, s) in frame.fractional.iter().enumerate() {
            let home = bin_of(s);
            for (ox, oy, oz) in iproduct!(
                -reach[0]..=reach[0],
                -reach[1]..=reach[1],
                -reach[2]..=reach[2]
            ) {
                let target = [home[0] + ox, home[1] + oy, home[2] + oz];
                let wrapped: [i64; 3] = array::from_fn(|k| target[k].rem_euclid(bins[k]));
                let Some(members) = grid.get(&wrapped) else {
                    continue;
                };
                let image = Vector3::new(
                    target[0].div_euclid(bins[0]) as i32,
                    target[1].div_euclid(bins[1]) as i32,
                    target[2].div_euclid(bins[2]) as i32,
                );
                for &j in members {
                    collector.consider(i, j, image + frame.wraps[i] - frame.wraps[j])?;
                }
            }
        }
        Ok(())
    }

    fn open_binned(&self, collector: &mut PairCollector) -> Result<(), NeighborError> {
        let origin = collector
            .positions
            .iter()
            .fold(Vector3::repeat(f64::INFINITY), |acc, p| acc.inf(&p.coords));
        let bin_of = |p: &Point3<f64>| -> [i64; 3] {
            array::from_fn(|k| ((p[k] - origin[k]) / self.cutoff).floor() as i64)
        };

        let mut grid: HashMap<[i64; 3], Vec<usize>> = HashMap::new();
        for (i, p) in collector.positions.iter().enumerate() {
            grid.entry(bin_of(p)).or_default().push(i);
        }

        let positions = collector.positions;
        for (i, p) in positions.iter().enumerate() {
            let home = bin_of(p);
            for (ox, oy, oz) in iproduct!(-1..=1, -1..=1, -1..=1) {
                let target = [home[0] + ox, home[1] + oy, home[2] + oz];
                if let Some(members) = grid.get(&target) {
                    for &j in members {
                        collector.consider(i, j, Vector3::zeros())?;
                    }
                }
            }
        }
        Ok(())
    }

    fn check_image_budget(&self, reach: &[i32; 3]) -> Result<(), NeighborError> {
        let required: f64 = reach.iter().map(|&r| 2.0 * f64::from(r) + 1.0).product();
        if required > self.max_images as f64 {
            return Err(NeighborError::ImageBudgetExceeded {
                cutoff: self.cutoff,
                required,
                limit: self.max_images,
            });
        }
        Ok(())
    }
}

fn open_brute_force(collector: &mut PairCollector) -> Result<(), NeighborError> {
    let n_atoms = collector.positions.len();
    for (i, j) in iproduct!(0..n_atoms, 0..n_atoms) {
        collector.consider(i, j, Vector3::zeros())?;
    }
    Ok(())
}

/// Positions folded into the home cell.
///
/// `wraps[i]` is the lattice translation removed from atom `i`, so a shift `S'`
/// between wrapped atoms corresponds to `S' + wraps[i] − wraps[j]` between the
/// caller's positions.
struct WrappedFrame {
    fractional: Vec<Vector3<f64>>,
    wraps: Vec<Vector3<i32>>,
}

impl WrappedFrame {
    fn new(positions: &[Point3<f64>], cell: &Cell) -> Self {
        let (fractional, wraps) = positions
            .iter()
            .map(|p| {
                let s = cell.to_fractional(p);
                let w = s.map(f64::floor);
                (s - w, w.map(|v| v as i32))
            })
            .unzip();
        Self { fractional, wraps }
    }
}

/// Shared distance filter. Both algorithms funnel every candidate through
/// `consider`, which recomputes the displacement from the original positions.
struct PairCollector<'a> {
    positions: &'a [Point3<f64>],
    cell: Option<&'a Cell>,
    cutoff_sq: f64,
    max_pairs: Option<usize>,
    pairs: Vec<NeighborPair>,
}

impl PairCollector<'_> {
    #[inline]
    fn consider(&mut self, center: usize, neighbor: usize, shift: Vector3<i32>) -> Result<(), NeighborError> {
        if center == neighbor && shift == Vector3::zeros() {
            return Ok(());
        }
        let offset = match self.cell {
            Some(cell) => cell.shift_vector(&shift),
            None => Vector3::zeros(),
        };
        let displacement = self.positions[neighbor] - self.positions[center] + offset;
        let distance_sq = displacement.norm_squared();
        if distance_sq > self.cutoff_sq || distance_sq == 0.0 {
            return Ok(());
        }
        if let Some(limit) = self.max_pairs {
            if self.pairs.len() >= limit {
                return Err(NeighborError::PairBudgetExceeded { limit });
            }
        }
        self.pairs.push(NeighborPair {
            center,
            neighbor,
            shift,
            displacement,
            distance: distance_sq.sqrt(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::configuration::Species;
    use nalgebra::Matrix3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn build_with(
        strategy: NeighborStrategy,
        cutoff: f64,
        config: &AtomicConfiguration,
    ) -> NeighborList {
        NeighborListBuilder::new(cutoff)
            .unwrap()
            .with_strategy(strategy)
            .build(config)
            .unwrap()
    }

    fn random_periodic(n_atoms: usize, seed: u64) -> AtomicConfiguration {
        let mut rng = StdRng::seed_from_u64(seed);
        let cell =
            Cell::new(Matrix3::new(5.0, 0.0, 0.0, 1.0, 4.5, 0.0, 0.5, 0.8, 4.0)).unwrap();
        let fractional: Vec<Vector3<f64>> = (0..n_atoms)
            .map(|_| {
                Vector3::new(
                    rng.gen_range(-0.5..1.5),
                    rng.gen_range(0.0..1.0),
                    rng.gen_range(0.0..1.0),
                )
            })
            .collect();
        AtomicConfiguration::from_fractional(vec![Species(1); n_atoms], &fractional, cell).unwrap()
    }

    fn random_open(n_atoms: usize, seed: u64) -> AtomicConfiguration {
        let mut rng = StdRng::seed_from_u64(seed);
        let positions = (0..n_atoms)
            .map(|_| {
                Point3::new(
                    rng.gen_range(-6.0..6.0),
                    rng.gen_range(-6.0..6.0),
                    rng.gen_range(-6.0..6.0),
                )
            })
            .collect();
        AtomicConfiguration::new(vec![Species(1); n_atoms], positions, None).unwrap()
    }

    #[test]
    fn new_rejects_non_positive_cutoff() {
        assert_eq!(
            NeighborListBuilder::new(0.0),
            Err(NeighborError::InvalidCutoff(0.0))
        );
        assert!(NeighborListBuilder::new(f64::NAN).is_err());
    }

    #[test]
    fn settings_carry_over_to_builder() {
        let settings = NeighborSettings {
            strategy: NeighborStrategy::BruteForce,
            max_pairs: Some(5),
            ..NeighborSettings::default()
        };
        let builder = settings.builder(2.5).unwrap();
        assert_eq!(builder.cutoff(), 2.5);
        assert_eq!(builder.strategy(), NeighborStrategy::BruteForce);
        assert!(settings.builder(-1.0).is_err());
    }

    #[test]
    fn empty_configuration_yields_empty_list() {
        let config = AtomicConfiguration::new(vec![], vec![], None).unwrap();
        let list = build_with(NeighborStrategy::Auto, 3.0, &config);
        assert!(list.is_empty());
    }

    #[test]
    fn single_open_atom_yields_empty_list() {
        let config =
            AtomicConfiguration::new(vec![Species(1)], vec![Point3::origin()], None).unwrap();
        assert!(build_with(NeighborStrategy::Binned, 3.0, &config).is_empty());
    }

    #[test]
    fn dimer_produces_both_directions() {
        let config = AtomicConfiguration::new(
            vec![Species(1), Species(1)],
            vec![Point3::origin(), Point3::new(0.0, 0.0, 1.5)],
            None,
        )
        .unwrap();
        let list = build_with(NeighborStrategy::BruteForce, 2.0, &config);
        assert_eq!(list.len(), 2);
        assert!(list.is_symmetric());
        assert!((list.pairs()[0].displacement.z - 1.5).abs() < 1e-12);
        assert!((list.pairs()[1].displacement.z + 1.5).abs() < 1e-12);
    }

    #[test]
    fn pair_exactly_at_cutoff_is_included() {
        let config = AtomicConfiguration::new(
            vec![Species(1), Species(1)],
            vec![Point3::origin(), Point3::new(2.0, 0.0, 0.0)],
            None,
        )
        .unwrap();
        assert_eq!(build_with(NeighborStrategy::BruteForce, 2.0, &config).len(), 2);
        assert_eq!(build_with(NeighborStrategy::BruteForce, 1.999, &config).len(), 0);
    }

    #[test]
    fn cutoff_beyond_cell_size_enumerates_all_images() {
        // Integer vectors with 0 < |S|² ≤ (4.5 / 2)² = 5.0625: 6 + 12 + 8 + 6 + 24.
        let cell = Cell::cubic(2.0).unwrap();
        let config = AtomicConfiguration::new(vec![Species(1)], vec![Point3::new(0.3, 0.2, 0.1)], Some(cell))
            .unwrap();
        for strategy in [NeighborStrategy::BruteForce, NeighborStrategy::Binned] {
            let list = build_with(strategy, 4.5, &config);
            assert_eq!(list.len(), 56, "strategy {strategy:?}");
            assert!(list.iter().all(|p| p.center == 0 && p.neighbor == 0));
            assert!(list.is_symmetric());
        }
    }

    #[test]
    fn displacements_match_unwrapped_positions() {
        let config = random_periodic(20, 3);
        let cell = config.cell().unwrap();
        let list = build_with(NeighborStrategy::Binned, 3.0, &config);
        assert!(!list.is_empty());
        for pair in list.iter() {
            let expected = config.positions()[pair.neighbor] + cell.shift_vector(&pair.shift)
                - config.positions()[pair.center];
            assert!((expected - pair.displacement).norm() < 1e-12);
            assert!(pair.distance <= 3.0 && pair.distance > 0.0);
        }
    }

    #[test]
    fn binned_and_brute_force_agree_on_periodic_cell() {
        let config = random_periodic(80, 11);
        let brute = build_with(NeighborStrategy::BruteForce, 3.0, &config);
        let binned = build_with(NeighborStrategy::Binned, 3.0, &config);
        assert!(!brute.is_empty());
        assert_eq!(brute.keys(), binned.keys());
        assert_eq!(brute, binned);
        assert!(binned.is_symmetric());
    }

    #[test]
    fn binned_and_brute_force_agree_with_multiple_images() {
        let config = random_periodic(12, 5);
        let brute = build_with(NeighborStrategy::BruteForce, 7.5, &config);
        let binned = build_with(NeighborStrategy::Binned, 7.5, &config);
        assert_eq!(brute.keys(), binned.keys());
        assert!(brute.iter().any(|p| p.shift.iter().any(|s| s.abs() >= 2)));
    }

    #[test]
    fn binned_and_brute_force_agree_on_open_system() {
        let config = random_open(150, 42);
        let brute = build_with(NeighborStrategy::BruteForce, 2.5, &config);
        let binned = build_with(NeighborStrategy::Binned, 2.5, &config);
        assert!(!brute.is_empty());
        assert_eq!(brute, binned);
    }

    #[test]
    fn pair_budget_is_reported_not_truncated() {
        let config = random_periodic(30, 9);
        let result = NeighborListBuilder::new(3.0)
            .unwrap()
            .with_max_pairs(Some(10))
            .build(&config);
        assert_eq!(result, Err(NeighborError::PairBudgetExceeded { limit: 10 }));
    }

    #[test]
    fn image_budget_rejects_thin_cells() {
        let cell = Cell::orthorhombic(0.01, 5.0, 5.0).unwrap();
        let config =
            AtomicConfiguration::new(vec![Species(1)], vec![Point3::origin()], Some(cell)).unwrap();
        let result = NeighborListBuilder::new(4.0)
            .unwrap()
            .with_max_images(1_000)
            .build(&config);
        assert!(matches!(result, Err(NeighborError::ImageBudgetExceeded { .. })));
    }
}

use nalgebra::Vector3;
use std::collections::BTreeSet;

/// One directed interaction `center ← neighbor + shift`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborPair {
    pub center: usize,
    pub neighbor: usize,
    /// Integer lattice translation applied to the neighbor.
    pub shift: Vector3<i32>,
    /// `x[neighbor] + shift·H − x[center]`.
    pub displacement: Vector3<f64>,
    pub distance: f64,
}

impl NeighborPair {
    pub fn key(&self) -> PairKey {
        (self.center, self.neighbor, [self.shift.x, self.shift.y, self.shift.z])
    }
}

pub type PairKey = (usize, usize, [i32; 3]);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborList {
    cutoff: f64,
    n_atoms: usize,
    pairs: Vec<NeighborPair>,
}

impl NeighborList {
    pub(crate) fn new(cutoff: f64, n_atoms: usize, mut pairs: Vec<NeighborPair>) -> Self {
        pairs.sort_by(|a, b| a.key().cmp(&b.key()));
        Self {
            cutoff,
            n_atoms,
            pairs,
        }
    }

    pub fn empty(cutoff: f64, n_atoms: usize) -> Self {
        Self::new(cutoff, n_atoms, Vec::new())
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn n_atoms(&self) -> usize {
        self.n_atoms
    }

    pub fn pairs(&self) -> &[NeighborPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NeighborPair> {
        self.pairs.iter()
    }

    /// Pairs whose center is `atom`. Pairs are sorted by center, so this is a
    /// contiguous slice.
    pub fn neighbors_of(&self, atom: usize) -> &[NeighborPair] {
        let start = self.pairs.partition_point(|p| p.center < atom);
        let end = self.pairs.partition_point(|p| p.center <= atom);
        &self.pairs[start..end]
    }

    pub fn coordination_numbers(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_atoms];
        for pair in &self.pairs {
            counts[pair.center] += 1;
        }
        counts
    }

    /// The list as an unordered set of `(center, neighbor, shift)`.
    pub fn keys(&self) -> BTreeSet<PairKey> {
        self.pairs.iter().map(NeighborPair::key).collect()
    }

    /// True when every `(i, j, S)` has a matching `(j, i, −S)` at the same distance.
    pub fn is_symmetric(&self) -> bool {
        let keys = self.keys();
        self.pairs.iter().all(|p| {
            keys.contains(&(
                p.neighbor,
                p.center,
                [-p.shift.x, -p.shift.y, -p.shift.z],
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(center: usize, neighbor: usize, shift: [i32; 3]) -> NeighborPair {
        NeighborPair {
            center,
            neighbor,
            shift: Vector3::from(shift),
            displacement: Vector3::zeros(),
            distance: 1.0,
        }
    }

    #[test]
    fn new_sorts_pairs_by_center_then_neighbor() {
        let list = NeighborList::new(
            2.0,
            3,
            vec![pair(2, 0, [0, 0, 0]), pair(0, 1, [0, 0, 0]), pair(0, 0, [1, 0, 0])],
        );
        let centers: Vec<_> = list.iter().map(|p| (p.center, p.neighbor)).collect();
        assert_eq!(centers, vec![(0, 0), (0, 1), (2, 0)]);
    }

    #[test]
    fn neighbors_of_returns_contiguous_block() {
        let list = NeighborList::new(
            2.0,
            3,
            vec![pair(1, 0, [0, 0, 0]), pair(0, 1, [0, 0, 0]), pair(1, 2, [0, 0, 0])],
        );
        assert_eq!(list.neighbors_of(1).len(), 2);
        assert_eq!(list.neighbors_of(2).len(), 0);
        assert_eq!(list.coordination_numbers(), vec![1, 2, 0]);
    }

    #[test]
    fn is_symmetric_detects_missing_partner() {
        let symmetric = NeighborList::new(
            2.0,
            2,
            vec![pair(0, 1, [1, 0, 0]), pair(1, 0, [-1, 0, 0])],
        );
        assert!(symmetric.is_symmetric());
        let lopsided = NeighborList::new(2.0, 2, vec![pair(0, 1, [1, 0, 0])]);
        assert!(!lopsided.is_symmetric());
    }
}

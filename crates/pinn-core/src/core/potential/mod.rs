//! # Potential Module
//!
//! The neural-network potential: from atomic configurations to energies,
//! forces and stress.
//!
//! ## Architecture
//!
//! 1. Pair displacements are rebuilt on the autodiff graph from the position
//!    leaf and the constant lattice translations of the neighbor list.
//! 2. Distances are expanded into a smooth radial basis that vanishes at the
//!    cutoff ([`basis`], [`cutoff`]).
//! 3. Species embeddings are refined by a stack of pairwise-interaction layers
//!    ([`interaction`]).
//! 4. A readout network turns the final atom features into atomic energies,
//!    scaled and offset by per-species reference energies; their sum is the
//!    configuration energy ([`model`]).
//! 5. Forces and stress are recorded by differentiating the energy on the same
//!    graph ([`derivatives`]), so losses on them can be trained.
//!
//! Only pair distances enter the network, which makes energies invariant to
//! rigid motion and atom permutation by construction.

pub mod basis;
pub mod config;
pub mod cutoff;
pub mod derivatives;
pub mod dress;
pub mod error;
pub mod input;
pub mod interaction;
pub mod model;

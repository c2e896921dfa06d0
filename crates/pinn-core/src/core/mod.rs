//! # Core Module
//!
//! This module provides the fundamental building blocks of the potential: how atomic
//! configurations are represented, how interacting pairs are found, and how a smooth,
//! symmetry-preserving energy and its derivatives are computed from them.
//!
//! ## Architecture
//!
//! - **Atomic Data** ([`models`]) - Configurations, periodic cells, labels and batches
//! - **Neighbor Search** ([`neighbors`]) - Periodic pair enumeration within a cutoff
//! - **Differentiation** ([`autodiff`]) - Reverse-mode graph supporting double backward
//! - **Network Blocks** ([`nn`]) - Learnable parameters and dense layers
//! - **Potential Model** ([`potential`]) - Basis, interaction layers, readout, forces and stress
//!
//! ## Physical Guarantees
//!
//! - **Translation and rotation invariance** by consuming pair distances only
//! - **Permutation invariance** by summing messages and atomic energies
//! - **Size extensivity** because every atom contributes a local energy
//! - **Continuous forces** because every radial function vanishes smoothly at the cutoff

pub mod autodiff;
pub mod models;
pub mod neighbors;
pub mod nn;
pub mod potential;

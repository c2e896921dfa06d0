//! # Neighbor Search Module
//!
//! Enumerates every interacting atom pair of a configuration within the cutoff
//! radius, including periodic images.
//!
//! ## Conventions
//!
//! - Pairs are **bidirectional**: `(i, j, S)` is always accompanied by `(j, i, -S)`.
//!   Each directed pair carries exactly one message into its center atom, so
//!   nothing is halved downstream.
//! - Every pair stores its integer lattice shift explicitly. Later stages never
//!   reconstruct images through modular arithmetic.
//! - Self-pairs only appear for non-zero shifts, i.e. an atom seeing its own image.
//!
//! ## Strategies
//!
//! - [`builder::NeighborStrategy::BruteForce`] - all pairs times all images
//! - [`builder::NeighborStrategy::Binned`] - sparse cell list with near-linear cost
//! - [`builder::NeighborStrategy::Auto`] - binned above an atom-count threshold
//!
//! Both algorithms share the final distance filter and return identical lists.

pub mod builder;
pub mod list;

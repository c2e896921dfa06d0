//! # PiNN-RS Core Library
//!
//! Training and evaluation of pairwise-interaction neural network (PiNN) potentials
//! for atomistic simulation. Given labeled atomic configurations (species, positions,
//! optional periodic cell, and reference energies, forces or stresses), the library
//! learns a model that predicts the energy of unseen configurations together with its
//! exact derivatives.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`AtomicConfiguration`,
//!   `Label`, `ConfigBatch`), periodic neighbor lists, a reverse-mode automatic
//!   differentiation graph, neural-network building blocks and the potential model
//!   itself (radial basis, interaction layers, readout, force and stress derivation).
//!
//! - **[`engine`]: The Logic Core.** The stateful training machinery: configuration
//!   and validation, loss assembly, optimizers, evaluation metrics, batch sources with
//!   prefetching and the `Trainer` state machine.
//!
//! - **[`workflows`]: The Public API.** End-to-end procedures that tie `engine` and
//!   `core` together, such as training a model from two datasets or scoring a trained
//!   model against labeled data.

pub mod core;
pub mod engine;
pub mod workflows;

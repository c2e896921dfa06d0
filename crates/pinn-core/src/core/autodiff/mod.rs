//! # Autodiff Module
//!
//! Reverse-mode automatic differentiation over dense `f64` matrices.
//!
//! ## Overview
//!
//! A [`Graph`] is a tape of operations. Every call on the graph evaluates the
//! operation eagerly and records it, returning a lightweight [`Var`] handle.
//! [`Graph::grad`] walks the tape backwards and, crucially, records the
//! vector-Jacobian products as ordinary graph operations. The gradients it
//! returns are therefore themselves differentiable, which is what a force or
//! stress loss needs: the loss depends on `∂E/∂x`, and training needs
//! `∂loss/∂θ` through it.
//!
//! ## Key Components
//!
//! - [`Graph`]: the tape, its leaf constructors and value accessors.
//! - [`Var`]: handle to a recorded value.
//! - `ops`: the operation set (element-wise maps, matrix products, reductions,
//!   row gather/scatter and column slicing).
//! - `backward`: [`Graph::grad`].
//!
//! Graphs are single-threaded and short-lived: one is built per forward pass
//! (per shard during data-parallel training) and dropped afterwards.

mod backward;
mod graph;
mod ops;

pub use graph::{Graph, Var};

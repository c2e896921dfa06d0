//! Learnable parameters and dense feed-forward layers.
//!
//! [`params::ModelParameters`] owns every learnable matrix of a model. Layers
//! only hold [`params::ParamId`] handles; at the start of each forward pass the
//! parameters are bound onto a fresh autodiff graph as variables, which keeps
//! the model itself immutable and shareable across threads.

pub mod dense;
pub mod params;

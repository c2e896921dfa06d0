//! # Engine Module
//!
//! Stateful training machinery for neural-network potentials: everything that
//! turns a model definition and a stream of labeled configurations into
//! trained parameters.
//!
//! ## Overview
//!
//! The engine owns the only mutable state of a run, the [`ModelParameters`](crate::core::nn::params::ModelParameters).
//! Each step draws a batch, screens out configurations the model cannot
//! handle, evaluates the physical loss with its parameter gradients, and
//! commits a single optimizer update. Held-out evaluation runs at fixed
//! intervals and drives the stopping criteria.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Training hyperparameters, validation and TOML loading
//! - **Loss** ([`loss`]) - Masked, batch-normalized energy, force and stress residuals
//! - **Optimizer** ([`optimizer`]) - Adam and SGD updates with learning-rate schedules
//! - **Data** ([`data`]) - Batch sources, in-memory datasets and shuffle buffers
//! - **Metrics** ([`metrics`]) - Energy, force and stress error statistics
//! - **Training** ([`trainer`]) - The step loop with sharding, prefetch and stop conditions
//! - **State Tracking** ([`state`]) - Run status and training outcome
//! - **Progress Monitoring** ([`progress`]) - Progress callbacks for callers
//! - **Error Handling** ([`error`]) - Run-level and per-step error types
//!
//! ## Key Capabilities
//!
//! - **Data-parallel steps** whose shard gradients sum to the full-batch gradient
//! - **Prefetching** of batches on a producer thread behind a bounded channel
//! - **Fault isolation** for malformed configurations and non-finite batches
//! - **Early stopping** and target-loss convergence on held-out data

pub mod config;
pub mod data;
pub mod error;
pub mod loss;
pub mod metrics;
pub mod optimizer;
pub mod progress;
pub mod state;
pub mod trainer;

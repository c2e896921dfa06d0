//! # Workflows Module
//!
//! High-level entry points that tie the engine and the potential model together.
//!
//! ## Overview
//!
//! Workflows validate their inputs, build what they need, report progress and
//! return structured results. Callers that only want a trained potential, or
//! predictions from one, should not need anything below this layer.
//!
//! ## Architecture
//!
//! - **Training Workflow** ([`train`]) - Validation, model construction, optional
//!   atomic-dress regeneration and the training run itself.
//! - **Prediction Workflow** ([`predict`]) - Per-configuration predictions with
//!   isolated failures, and scoring of trained parameters against labeled data.

pub mod predict;
pub mod train;

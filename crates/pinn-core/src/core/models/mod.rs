//! # Core Models Module
//!
//! Data structures describing what the potential is trained on and evaluated for.
//!
//! ## Key Components
//!
//! - [`cell`] - Periodic simulation cell with fractional/Cartesian conversion
//! - [`configuration`] - Validated atomic configuration (species, positions, cell)
//! - [`label`] - Reference energy, forces and stress with explicit missing markers
//! - [`batch`] - A batch of labeled configurations handed to the engine
//! - [`error`] - Validation errors for malformed input
//!
//! ```ignore
//! use pinnrs::core::models::{cell::Cell, configuration::{AtomicConfiguration, Species}};
//!
//! let cell = Cell::cubic(10.0)?;
//! let config = AtomicConfiguration::new(
//!     vec![Species(1), Species(1)],
//!     vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.74, 0.0, 0.0)],
//!     Some(cell),
//! )?;
//! ```

pub mod batch;
pub mod cell;
pub mod configuration;
pub mod error;
pub mod label;

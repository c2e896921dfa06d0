use super::basis::BasisKind;
use super::cutoff::CutoffKind;
use super::error::ModelConfigError;
use serde::Deserialize;
use std::collections::HashSet;

/// Architecture hyperparameters of a [`PotentialModel`](super::model::PotentialModel).
///
/// Node lists give the widths of each feed-forward block: `pp_nodes` act on
/// atom features, `pi_nodes` on pair features, `ii_nodes` on pair interactions
/// and `en_nodes` on the final atom features before the energy readout.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub cutoff: f64,
    pub cutoff_kind: CutoffKind,
    pub basis: BasisKind,
    pub n_basis: usize,
    pub atom_types: Vec<u32>,
    pub depth: usize,
    pub embedding_dim: usize,
    pub pp_nodes: Vec<usize>,
    pub pi_nodes: Vec<usize>,
    pub ii_nodes: Vec<usize>,
    pub en_nodes: Vec<usize>,
    pub energy_scale: f64,
    /// Per-species reference energies aligned with `atom_types`; empty means
    /// all zero.
    pub energy_dress: Vec<f64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            cutoff: 5.0,
            cutoff_kind: CutoffKind::Cosine,
            basis: BasisKind::Polynomial,
            n_basis: 4,
            atom_types: vec![1, 6, 7, 8],
            depth: 4,
            embedding_dim: 8,
            pp_nodes: vec![16, 16],
            pi_nodes: vec![16, 16],
            ii_nodes: vec![16, 16],
            en_nodes: vec![16, 16],
            energy_scale: 1.0,
            energy_dress: Vec::new(),
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), ModelConfigError> {
        if !(self.cutoff.is_finite() && self.cutoff > 0.0) {
            return Err(ModelConfigError::invalid(
                "cutoff",
                format!("must be positive and finite, got {}", self.cutoff),
            ));
        }
        if self.depth == 0 {
            return Err(ModelConfigError::invalid("depth", "must be at least 1"));
        }
        if self.n_basis == 0 {
            return Err(ModelConfigError::invalid("n_basis", "must be at least 1"));
        }
        if self.embedding_dim == 0 {
            return Err(ModelConfigError::invalid("embedding_dim", "must be at least 1"));
        }
        if self.atom_types.is_empty() {
            return Err(ModelConfigError::invalid("atom_types", "must not be empty"));
        }
        let unique: HashSet<_> = self.atom_types.iter().collect();
        if unique.len() != self.atom_types.len() {
            return Err(ModelConfigError::invalid("atom_types", "contains duplicates"));
        }
        for (name, nodes) in [
            ("pp_nodes", &self.pp_nodes),
            ("pi_nodes", &self.pi_nodes),
            ("ii_nodes", &self.ii_nodes),
            ("en_nodes", &self.en_nodes),
        ] {
            if nodes.is_empty() {
                return Err(ModelConfigError::invalid(name, "must not be empty"));
            }
            if nodes.contains(&0) {
                return Err(ModelConfigError::invalid(name, "layer widths must be positive"));
            }
        }
        if let BasisKind::Gaussian { gamma } = self.basis {
            if !(gamma.is_finite() && gamma > 0.0) {
                return Err(ModelConfigError::invalid(
                    "basis.gamma",
                    format!("must be positive and finite, got {gamma}"),
                ));
            }
        }
        if !(self.energy_scale.is_finite() && self.energy_scale != 0.0) {
            return Err(ModelConfigError::invalid(
                "energy_scale",
                "must be finite and non-zero",
            ));
        }
        self.validate_dress(&self.energy_dress)
    }

    pub(crate) fn validate_dress(&self, dress: &[f64]) -> Result<(), ModelConfigError> {
        if !dress.is_empty() && dress.len() != self.atom_types.len() {
            return Err(ModelConfigError::invalid(
                "energy_dress",
                format!(
                    "has {} entries for {} atom types",
                    dress.len(),
                    self.atom_types.len()
                ),
            ));
        }
        if dress.iter().any(|v| !v.is_finite()) {
            return Err(ModelConfigError::invalid("energy_dress", "must be finite"));
        }
        Ok(())
    }
}

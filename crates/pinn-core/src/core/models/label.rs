use super::cell::Cell;
use super::configuration::{AtomicConfiguration, Species};
use super::error::InputError;
use nalgebra::{Matrix3, Point3, Vector3};

/// Caller-assigned identity of a configuration, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigId(pub u64);

impl std::fmt::Display for ConfigId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference values for one configuration. `None` marks a missing label; it is
/// never replaced by zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Label {
    pub energy: Option<f64>,
    pub forces: Option<Vec<Vector3<f64>>>,
    pub stress: Option<Matrix3<f64>>,
}

impl Label {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = Some(energy);
        self
    }

    pub fn with_forces(mut self, forces: Vec<Vector3<f64>>) -> Self {
        self.forces = Some(forces);
        self
    }

    pub fn with_stress(mut self, stress: Matrix3<f64>) -> Self {
        self.stress = Some(stress);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.energy.is_none() && self.forces.is_none() && self.stress.is_none()
    }

    pub fn validate(&self, configuration: &AtomicConfiguration) -> Result<(), InputError> {
        if let Some(energy) = self.energy {
            if !energy.is_finite() {
                return Err(InputError::NonFiniteLabel { field: "energy" });
            }
        }
        if let Some(forces) = &self.forces {
            if forces.len() != configuration.n_atoms() {
                return Err(InputError::ForceCountMismatch {
                    expected: configuration.n_atoms(),
                    found: forces.len(),
                });
            }
            if forces.iter().flat_map(|f| f.iter()).any(|v| !v.is_finite()) {
                return Err(InputError::NonFiniteLabel { field: "forces" });
            }
        }
        if let Some(stress) = &self.stress {
            if !configuration.is_periodic() {
                return Err(InputError::StressWithoutCell);
            }
            if stress.iter().any(|v| !v.is_finite()) {
                return Err(InputError::NonFiniteLabel { field: "stress" });
            }
        }
        Ok(())
    }
}

/// A configuration paired with its reference values.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledConfiguration {
    pub id: ConfigId,
    pub configuration: AtomicConfiguration,
    pub label: Label,
}

impl LabeledConfiguration {
    pub fn new(
        id: ConfigId,
        configuration: AtomicConfiguration,
        label: Label,
    ) -> Result<Self, InputError> {
        label.validate(&configuration)?;
        Ok(Self {
            id,
            configuration,
            label,
        })
    }
}

/// Unvalidated record as handed over by a dataset reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub id: u64,
    pub species: Vec<u32>,
    pub positions: Vec<[f64; 3]>,
    pub cell: Option<[[f64; 3]; 3]>,
    pub energy: Option<f64>,
    pub forces: Option<Vec<[f64; 3]>>,
    pub stress: Option<[[f64; 3]; 3]>,
}

impl TryFrom<RawRecord> for LabeledConfiguration {
    type Error = InputError;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        // An all-zero cell marks an open system.
        let cell = raw
            .cell
            .filter(|rows| rows.iter().flatten().any(|&x| x != 0.0))
            .map(|rows| Cell::new(matrix_from_rows(&rows)))
            .transpose()?;
        let configuration = AtomicConfiguration::new(
            raw.species.into_iter().map(Species).collect(),
            raw.positions
                .iter()
                .map(|p| Point3::new(p[0], p[1], p[2]))
                .collect(),
            cell,
        )?;
        let label = Label {
            energy: raw.energy,
            forces: raw
                .forces
                .map(|fs| fs.iter().map(|f| Vector3::new(f[0], f[1], f[2])).collect()),
            stress: raw.stress.map(|rows| matrix_from_rows(&rows)),
        };
        Self::new(ConfigId(raw.id), configuration, label)
    }
}

fn matrix_from_rows(rows: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::from_fn(|i, j| rows[i][j])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dimer_record() -> RawRecord {
        RawRecord {
            id: 7,
            species: vec![1, 1],
            positions: vec![[0.0, 0.0, 0.0], [0.0, 0.0, 0.74]],
            energy: Some(-1.2),
            forces: Some(vec![[0.0, 0.0, 0.1], [0.0, 0.0, -0.1]]),
            ..RawRecord::default()
        }
    }

    #[test]
    fn raw_record_converts_with_all_labels() {
        let labeled = LabeledConfiguration::try_from(dimer_record()).unwrap();
        assert_eq!(labeled.id, ConfigId(7));
        assert_eq!(labeled.configuration.n_atoms(), 2);
        assert_eq!(labeled.label.energy, Some(-1.2));
        assert_eq!(labeled.label.forces.as_ref().unwrap()[1].z, -0.1);
        assert!(labeled.label.stress.is_none());
    }

    #[test]
    fn missing_labels_stay_missing() {
        let mut record = dimer_record();
        record.energy = None;
        record.forces = None;
        let labeled = LabeledConfiguration::try_from(record).unwrap();
        assert!(labeled.label.is_empty());
    }

    #[test]
    fn force_count_mismatch_is_rejected() {
        let mut record = dimer_record();
        record.forces = Some(vec![[0.0; 3]]);
        assert_eq!(
            LabeledConfiguration::try_from(record),
            Err(InputError::ForceCountMismatch {
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn nan_energy_is_rejected() {
        let mut record = dimer_record();
        record.energy = Some(f64::NAN);
        assert_eq!(
            LabeledConfiguration::try_from(record),
            Err(InputError::NonFiniteLabel { field: "energy" })
        );
    }

    #[test]
    fn stress_on_open_system_is_rejected() {
        let mut record = dimer_record();
        record.stress = Some([[0.0; 3]; 3]);
        assert_eq!(
            LabeledConfiguration::try_from(record),
            Err(InputError::StressWithoutCell)
        );
    }

    #[test]
    fn degenerate_cell_is_rejected() {
        let mut record = dimer_record();
        record.cell = Some([[1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        assert!(matches!(
            LabeledConfiguration::try_from(record),
            Err(InputError::NonPositiveVolume { .. })
        ));
    }

    #[test]
    fn zero_cell_marks_an_open_system() {
        let mut record = dimer_record();
        record.cell = Some([[0.0; 3]; 3]);
        let labeled = LabeledConfiguration::try_from(record).unwrap();
        assert!(!labeled.configuration.is_periodic());
        assert!(labeled.configuration.cell().is_none());
    }

    #[test]
    fn zero_cell_still_rejects_stress_labels() {
        let mut record = dimer_record();
        record.cell = Some([[0.0; 3]; 3]);
        record.stress = Some([[0.0; 3]; 3]);
        assert_eq!(
            LabeledConfiguration::try_from(record),
            Err(InputError::StressWithoutCell)
        );
    }
}

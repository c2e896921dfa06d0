use super::label::LabeledConfiguration;
use std::sync::Arc;

/// A batch of labeled configurations, the unit of work of one training step.
///
/// Records are shared behind `Arc` so batches can be assembled on a prefetch
/// thread without copying coordinates.
#[derive(Debug, Clone, Default)]
pub struct ConfigBatch {
    records: Vec<Arc<LabeledConfiguration>>,
}

impl ConfigBatch {
    pub fn new(records: Vec<Arc<LabeledConfiguration>>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Arc<LabeledConfiguration>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn n_atoms(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.configuration.n_atoms())
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabeledConfiguration> {
        self.records.iter().map(Arc::as_ref)
    }
}

impl From<Vec<LabeledConfiguration>> for ConfigBatch {
    fn from(records: Vec<LabeledConfiguration>) -> Self {
        Self::new(records.into_iter().map(Arc::new).collect())
    }
}

impl FromIterator<Arc<LabeledConfiguration>> for ConfigBatch {
    fn from_iter<I: IntoIterator<Item = Arc<LabeledConfiguration>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

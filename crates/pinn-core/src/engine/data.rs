use super::error::RejectedConfiguration;
use crate::core::models::batch::ConfigBatch;
use crate::core::models::label::{ConfigId, LabeledConfiguration, RawRecord};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::warn;

/// Producer of training batches.
///
/// `None` means the source is exhausted. Sources run on a prefetch thread, so
/// they must be `Send`.
pub trait BatchSource: Send {
    fn next_batch(&mut self) -> Option<ConfigBatch>;
}

impl<I> BatchSource for I
where
    I: Iterator<Item = ConfigBatch> + Send,
{
    fn next_batch(&mut self) -> Option<ConfigBatch> {
        self.next()
    }
}

/// In-memory set of validated labeled configurations.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<Arc<LabeledConfiguration>>,
}

impl Dataset {
    pub fn new(records: Vec<LabeledConfiguration>) -> Self {
        Self {
            records: records.into_iter().map(Arc::new).collect(),
        }
    }

    /// Validates raw records, keeping the good ones and reporting the rest
    /// without stopping.
    pub fn from_raw(
        records: impl IntoIterator<Item = RawRecord>,
    ) -> (Self, Vec<RejectedConfiguration>) {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for raw in records {
            let id = ConfigId(raw.id);
            match LabeledConfiguration::try_from(raw) {
                Ok(record) => accepted.push(Arc::new(record)),
                Err(error) => {
                    warn!(%id, %error, "Rejected malformed configuration.");
                    rejected.push(RejectedConfiguration {
                        id,
                        reason: error.into(),
                    });
                }
            }
        }
        (Self { records: accepted }, rejected)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Arc<LabeledConfiguration>] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabeledConfiguration> {
        self.records.iter().map(Arc::as_ref)
    }

    /// Randomly splits off `eval_fraction` of the records, returning
    /// `(train, eval)`.
    pub fn split(&self, eval_fraction: f64, seed: u64) -> (Self, Self) {
        let mut order: Vec<usize> = (0..self.records.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));
        let n_eval = ((self.records.len() as f64) * eval_fraction.clamp(0.0, 1.0)).round() as usize;
        let pick = |indices: &[usize]| Self {
            records: indices.iter().map(|&i| self.records[i].clone()).collect(),
        };
        (pick(&order[n_eval..]), pick(&order[..n_eval]))
    }

    /// Endless stream of batches drawn through a shuffle buffer.
    pub fn batches(&self, batch_size: usize, shuffle_buffer: usize, seed: u64) -> ShuffledBatches {
        ShuffledBatches {
            records: self.records.clone(),
            cursor: 0,
            buffer: Vec::with_capacity(shuffle_buffer.max(1)),
            buffer_size: shuffle_buffer.max(1),
            batch_size: batch_size.max(1),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// One deterministic pass in storage order.
    pub fn chunks(&self, batch_size: usize) -> impl Iterator<Item = ConfigBatch> + '_ {
        self.records
            .chunks(batch_size.max(1))
            .map(|chunk| ConfigBatch::new(chunk.to_vec()))
    }
}

impl FromIterator<LabeledConfiguration> for Dataset {
    fn from_iter<I: IntoIterator<Item = LabeledConfiguration>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().map(Arc::new).collect(),
        }
    }
}

/// Repeats a dataset forever, emitting each record from a fixed-size buffer
/// at a random position. A buffer of one keeps storage order.
#[derive(Debug)]
pub struct ShuffledBatches {
    records: Vec<Arc<LabeledConfiguration>>,
    cursor: usize,
    buffer: Vec<Arc<LabeledConfiguration>>,
    buffer_size: usize,
    batch_size: usize,
    rng: StdRng,
}

impl ShuffledBatches {
    fn next_record(&mut self) -> Option<Arc<LabeledConfiguration>> {
        if self.records.is_empty() {
            return None;
        }
        while self.buffer.len() < self.buffer_size {
            self.buffer.push(self.records[self.cursor].clone());
            self.cursor = (self.cursor + 1) % self.records.len();
        }
        let pick = self.rng.gen_range(0..self.buffer.len());
        Some(self.buffer.swap_remove(pick))
    }
}

impl Iterator for ShuffledBatches {
    type Item = ConfigBatch;

    fn next(&mut self) -> Option<ConfigBatch> {
        let records = (0..self.batch_size)
            .map(|_| self.next_record())
            .collect::<Option<Vec<_>>>()?;
        Some(ConfigBatch::new(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::error::InputError;
    use crate::engine::error::RejectionReason;
    use std::collections::HashMap;

    fn raw(id: u64) -> RawRecord {
        RawRecord {
            id,
            species: vec![1],
            positions: vec![[0.0, 0.0, id as f64]],
            energy: Some(id as f64),
            ..RawRecord::default()
        }
    }

    fn dataset(n: u64) -> Dataset {
        Dataset::from_raw((0..n).map(raw)).0
    }

    fn ids(batch: &ConfigBatch) -> Vec<u64> {
        batch.iter().map(|r| r.id.0).collect()
    }

    #[test]
    fn from_raw_rejects_malformed_records_and_keeps_the_rest() {
        let mut bad = raw(7);
        bad.positions.push([1.0, 0.0, 0.0]);
        let (data, rejected) = Dataset::from_raw([raw(1), bad, raw(2)]);
        assert_eq!(data.len(), 2);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].id, ConfigId(7));
        assert!(matches!(
            rejected[0].reason,
            RejectionReason::Input(InputError::AtomCountMismatch { .. })
        ));
    }

    #[test]
    fn split_partitions_all_records() {
        let data = dataset(20);
        let (train, eval) = data.split(0.25, 3);
        assert_eq!(train.len(), 15);
        assert_eq!(eval.len(), 5);
        let mut all: Vec<u64> = train.iter().chain(eval.iter()).map(|r| r.id.0).collect();
        all.sort_unstable();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn chunks_cover_the_dataset_once_in_order() {
        let chunks: Vec<ConfigBatch> = dataset(5).chunks(2).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(ids(&chunks[0]), vec![0, 1]);
        assert_eq!(ids(&chunks[2]), vec![4]);
    }

    #[test]
    fn unit_buffer_preserves_storage_order_and_repeats() {
        let mut batches = dataset(3).batches(2, 1, 0);
        assert_eq!(ids(&batches.next().unwrap()), vec![0, 1]);
        assert_eq!(ids(&batches.next().unwrap()), vec![2, 0]);
    }

    #[test]
    fn shuffled_batches_are_seeded_and_fair() {
        let data = dataset(10);
        let first: Vec<Vec<u64>> = data.batches(5, 4, 11).take(20).map(|b| ids(&b)).collect();
        let second: Vec<Vec<u64>> = data.batches(5, 4, 11).take(20).map(|b| ids(&b)).collect();
        assert_eq!(first, second);

        let mut counts: HashMap<u64, usize> = HashMap::new();
        for id in first.iter().flatten() {
            *counts.entry(*id).or_default() += 1;
        }
        assert_eq!(counts.len(), 10);
        // A record can be held back by at most the buffer size.
        assert!(counts.values().all(|&c| (6..=14).contains(&c)));
    }

    #[test]
    fn empty_dataset_yields_no_batches() {
        assert!(Dataset::default().batches(4, 8, 0).next().is_none());
    }

    #[test]
    fn iterators_are_batch_sources() {
        let mut source = dataset(4).chunks(2).collect::<Vec<_>>().into_iter();
        assert_eq!(source.next_batch().map(|b| b.len()), Some(2));
        assert_eq!(source.next_batch().map(|b| b.len()), Some(2));
        assert!(source.next_batch().is_none());
    }
}

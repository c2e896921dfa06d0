use super::config::TrainingConfig;
use super::data::{BatchSource, Dataset};
use super::error::{EngineError, RejectedConfiguration, RejectionReason, StepError};
use super::loss::{self, LossBreakdown, LossNorms};
use super::metrics::{EvaluationMetrics, MetricAccumulator};
use super::optimizer::Optimizer;
use super::progress::{Progress, ProgressReporter};
use super::state::{EarlyStoppingTracker, EvaluationRecord, RunStatus, TrainingOutcome};
use crate::core::autodiff::Graph;
use crate::core::models::batch::ConfigBatch;
use crate::core::models::configuration::AtomicConfiguration;
use crate::core::models::label::LabeledConfiguration;
use crate::core::neighbors::list::NeighborList;
use crate::core::nn::params::{Gradients, ModelParameters};
use crate::core::potential::derivatives::Derivatives;
use crate::core::potential::error::PredictionError;
use crate::core::potential::input::ModelInput;
use crate::core::potential::model::PotentialModel;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Configurations that passed species and neighbor-list checks, with their
/// neighbor lists in the same order.
#[derive(Debug, Default)]
struct Screened {
    records: Vec<Arc<LabeledConfiguration>>,
    lists: Vec<NeighborList>,
}

impl Screened {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn norms(&self) -> LossNorms {
        LossNorms::of(self.records.iter().map(Arc::as_ref))
    }

    /// Contiguous index ranges of at most `size` records.
    fn ranges(&self, size: usize) -> Vec<std::ops::Range<usize>> {
        let size = size.max(1);
        (0..self.len())
            .step_by(size)
            .map(|start| start..(start + size).min(self.len()))
            .collect()
    }
}

/// Result of a committed training step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub loss: LossBreakdown,
    pub learning_rate: f64,
    pub n_configs: usize,
}

/// Drives the optimization of one model's parameters.
#[derive(Clone, Copy)]
pub struct Trainer<'a> {
    model: &'a PotentialModel,
    config: &'a TrainingConfig,
    reporter: &'a ProgressReporter<'a>,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Trainer<'a> {
    pub fn new(
        model: &'a PotentialModel,
        config: &'a TrainingConfig,
        reporter: &'a ProgressReporter<'a>,
    ) -> Self {
        Self {
            model,
            config,
            reporter,
            cancel: None,
        }
    }

    /// Stops the run when `flag` is set; checked between steps only.
    pub fn with_cancellation(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn screen(&self, records: &[Arc<LabeledConfiguration>]) -> (Screened, Vec<RejectedConfiguration>) {
        #[cfg(feature = "parallel")]
        let iter = records.par_iter();
        #[cfg(not(feature = "parallel"))]
        let iter = records.iter();

        let results: Vec<Result<NeighborList, RejectionReason>> = iter
            .map(|record| -> Result<NeighborList, RejectionReason> {
                self.model.species().check(&record.configuration)?;
                Ok(self.model.neighbor_list(&record.configuration)?)
            })
            .collect();

        let mut screened = Screened::default();
        let mut rejected = Vec::new();
        for (record, result) in records.iter().zip(results) {
            match result {
                Ok(list) => {
                    screened.records.push(record.clone());
                    screened.lists.push(list);
                }
                Err(reason) => {
                    warn!(id = %record.id, %reason, "Rejected configuration.");
                    rejected.push(RejectedConfiguration {
                        id: record.id,
                        reason,
                    });
                }
            }
        }
        (screened, rejected)
    }

    fn model_input(
        &self,
        records: &[Arc<LabeledConfiguration>],
        lists: &[NeighborList],
    ) -> Result<ModelInput, PredictionError> {
        let configurations: Vec<&AtomicConfiguration> =
            records.iter().map(|r| &r.configuration).collect();
        ModelInput::assemble(&configurations, lists, self.model.species())
    }

    /// Loss and parameter gradients of one shard, normalized over the whole
    /// batch.
    fn shard_gradients(
        &self,
        params: &ModelParameters,
        records: &[Arc<LabeledConfiguration>],
        lists: &[NeighborList],
        norms: &LossNorms,
        with_l2: bool,
    ) -> Result<(LossBreakdown, Gradients), PredictionError> {
        let input = self.model_input(records, lists)?;
        let mut graph = Graph::new();
        let binding = params.bind(&mut graph);
        let prediction = self.model.evaluate(
            &mut graph,
            &binding,
            &input,
            self.config.loss.required_derivatives(),
        );
        let l2 = (with_l2 && self.config.loss.l2_weight > 0.0)
            .then(|| binding.l2_penalty(&mut graph, params));
        let refs: Vec<&LabeledConfiguration> = records.iter().map(Arc::as_ref).collect();
        let terms = loss::assemble(
            &mut graph,
            &self.config.loss,
            &prediction,
            &input,
            &refs,
            norms,
            l2,
        );
        let breakdown = terms.values(&graph);
        let gradients = binding.gradients(&mut graph, terms.total);
        Ok((breakdown, gradients))
    }

    /// Splits the batch into `workers` shards, evaluates them in parallel and
    /// sums their losses and gradients.
    fn batch_gradients(
        &self,
        params: &ModelParameters,
        batch: &Screened,
    ) -> Result<(LossBreakdown, Gradients), PredictionError> {
        let norms = batch.norms();
        let workers = self.config.run.workers.max(1);
        let ranges = batch.ranges(batch.len().div_ceil(workers));

        #[cfg(feature = "parallel")]
        let iter = ranges.par_iter();
        #[cfg(not(feature = "parallel"))]
        let iter = ranges.iter();

        let shards: Vec<Result<(LossBreakdown, Gradients), PredictionError>> = iter
            .map(|range| {
                self.shard_gradients(
                    params,
                    &batch.records[range.clone()],
                    &batch.lists[range.clone()],
                    &norms,
                    range.start == 0,
                )
            })
            .collect();

        let mut loss = LossBreakdown::default();
        let mut gradients = Gradients::zeros_like(params);
        for shard in shards {
            let (shard_loss, shard_gradients) = shard?;
            loss += shard_loss;
            gradients.accumulate(&shard_gradients);
        }
        Ok((loss, gradients))
    }

    /// Runs one training step. Rejected configurations are appended to
    /// `rejected`; on error the parameters are left untouched.
    pub fn step(
        &self,
        params: &mut ModelParameters,
        optimizer: &mut Optimizer,
        batch: &ConfigBatch,
        rejected: &mut Vec<RejectedConfiguration>,
    ) -> Result<StepReport, StepError> {
        let (screened, mut dropped) = self.screen(batch.records());
        rejected.append(&mut dropped);
        if screened.is_empty() {
            return Err(StepError::EmptyBatch);
        }

        let (loss, gradients) = self.batch_gradients(params, &screened)?;
        let gradient_finite = gradients.all_finite();
        if !loss.is_finite() || !gradient_finite {
            return Err(StepError::NumericalDivergence {
                loss: loss.total,
                gradient_finite,
                configs: screened.records.iter().map(|r| r.id).collect(),
            });
        }

        let learning_rate = optimizer.apply(params, &gradients);
        Ok(StepReport {
            loss,
            learning_rate,
            n_configs: screened.len(),
        })
    }

    /// Forward-only evaluation over already screened configurations. The
    /// loss excludes the L2 penalty.
    fn evaluate_screened(
        &self,
        params: &ModelParameters,
        eval: &Screened,
    ) -> Result<Option<EvaluationMetrics>, PredictionError> {
        let mut ranges = eval.ranges(self.config.run.batch_size);
        if let Some(limit) = self.config.run.eval_batches {
            ranges.truncate(limit);
        }
        let Some(last) = ranges.last() else {
            return Ok(None);
        };
        let norms = LossNorms::of(eval.records[..last.end].iter().map(Arc::as_ref));

        #[cfg(feature = "parallel")]
        let iter = ranges.par_iter();
        #[cfg(not(feature = "parallel"))]
        let iter = ranges.iter();

        let chunks: Vec<Result<MetricAccumulator, PredictionError>> = iter
            .map(|range| -> Result<MetricAccumulator, PredictionError> {
                let records = &eval.records[range.clone()];
                let input = self.model_input(records, &eval.lists[range.clone()])?;
                let mut graph = Graph::new();
                let binding = params.bind(&mut graph);
                let prediction =
                    self.model
                        .evaluate(&mut graph, &binding, &input, Derivatives::ALL);
                let refs: Vec<&LabeledConfiguration> = records.iter().map(Arc::as_ref).collect();
                let terms = loss::assemble(
                    &mut graph,
                    &self.config.loss,
                    &prediction,
                    &input,
                    &refs,
                    &norms,
                    None,
                );

                let mut acc = MetricAccumulator::new();
                acc.add_loss(terms.values(&graph).total);
                for (c, record) in refs.iter().enumerate() {
                    acc.record(record, &prediction.extract(&graph, &input, c));
                }
                Ok(acc)
            })
            .collect();

        let mut total = MetricAccumulator::new();
        for chunk in chunks {
            total = total.merge(chunk?);
        }
        Ok(Some(total.finish()))
    }

    /// Evaluates `params` on `eval`, returning the metrics and any rejected
    /// configurations. `None` when nothing could be evaluated.
    pub fn evaluate(
        &self,
        params: &ModelParameters,
        eval: &Dataset,
    ) -> Result<(Option<EvaluationMetrics>, Vec<RejectedConfiguration>), EngineError> {
        let (screened, rejected) = self.screen(eval.records());
        Ok((self.evaluate_screened(params, &screened)?, rejected))
    }

    fn record_evaluation(
        &self,
        params: &ModelParameters,
        eval: &Screened,
        step: u64,
    ) -> Result<Option<EvaluationRecord>, EngineError> {
        let Some(metrics) = self.evaluate_screened(params, eval)? else {
            return Ok(None);
        };
        info!(
            step,
            loss = metrics.loss,
            energy_rmse = metrics.energy_rmse,
            force_rmse = metrics.force_rmse,
            "Evaluation finished."
        );
        self.reporter.report(Progress::Evaluation {
            step,
            loss: metrics.loss,
        });
        Ok(Some(EvaluationRecord { step, metrics }))
    }

    /// Trains `params` on batches from `source` until a terminal condition.
    ///
    /// The source runs on a producer thread feeding a bounded channel, so
    /// batches are assembled while the previous step computes. Steps are
    /// strictly sequential.
    #[instrument(skip_all, name = "training_task")]
    pub fn run<S: BatchSource>(
        &self,
        params: ModelParameters,
        source: S,
        eval: &Dataset,
    ) -> Result<TrainingOutcome, EngineError> {
        let run = &self.config.run;
        let mut params = params;
        let mut optimizer = Optimizer::new(self.config.optimizer.clone(), &params);
        let (eval_set, mut rejected) = self.screen(eval.records());
        if eval_set.is_empty() {
            warn!("No usable evaluation configurations; evaluation is disabled.");
        }

        let mut history: Vec<EvaluationRecord> = Vec::new();
        let mut early_stopping = run.early_stopping.map(EarlyStoppingTracker::new);
        // Returns a stop status when the new evaluation triggers one.
        let mut observe = |record: EvaluationRecord, history: &mut Vec<EvaluationRecord>| {
            history.push(record);
            let loss = record.metrics.loss;
            if run.target_loss.is_some_and(|target| loss <= target) {
                info!(step = record.step, loss, "Target loss reached.");
                return Some(RunStatus::Converged);
            }
            if early_stopping.as_mut().is_some_and(|t| t.observe(loss)) {
                info!(step = record.step, loss, "Evaluation loss stopped improving.");
                return Some(RunStatus::EarlyStopped);
            }
            None
        };

        let mut steps = 0u64;
        let mut skipped = 0u64;
        let mut last_evaluated = None;

        let mut status = None;
        if let Some(record) = self.record_evaluation(&params, &eval_set, 0)? {
            last_evaluated = Some(0);
            status = observe(record, &mut history);
        }

        self.reporter.report(Progress::TaskStart {
            total_steps: run.max_steps,
        });
        info!(max_steps = run.max_steps, "Starting training loop.");

        let status = match status {
            Some(status) => status,
            None => std::thread::scope(|scope| -> Result<RunStatus, EngineError> {
                let (sender, receiver) = mpsc::sync_channel::<ConfigBatch>(run.prefetch_depth);
                scope.spawn(move || {
                    let mut source = source;
                    while let Some(batch) = source.next_batch() {
                        if sender.send(batch).is_err() {
                            break;
                        }
                    }
                });

                let mut consecutive_nonfinite = 0usize;
                let status = loop {
                    if self.cancelled() {
                        info!(steps, "Cancellation requested.");
                        break RunStatus::Interrupted;
                    }
                    if steps >= run.max_steps {
                        break RunStatus::MaxStepsReached;
                    }
                    let Ok(batch) = receiver.recv() else {
                        info!(steps, "Batch source exhausted.");
                        break RunStatus::DataExhausted;
                    };
                    steps += 1;

                    let loss = match self.step(&mut params, &mut optimizer, &batch, &mut rejected) {
                        Ok(report) => {
                            consecutive_nonfinite = 0;
                            debug!(
                                step = steps,
                                loss = report.loss.total,
                                learning_rate = report.learning_rate,
                                "Committed update."
                            );
                            Some(report.loss.total)
                        }
                        Err(error @ StepError::NumericalDivergence { .. }) => {
                            skipped += 1;
                            consecutive_nonfinite += 1;
                            warn!(step = steps, %error, "Skipped batch.");
                            if consecutive_nonfinite > run.max_consecutive_nonfinite {
                                warn!(
                                    consecutive_nonfinite,
                                    "Aborting after repeated numerical divergence."
                                );
                                self.reporter.report(Progress::TaskIncrement {
                                    step: steps,
                                    loss: None,
                                });
                                break RunStatus::AbortedOnDivergence;
                            }
                            None
                        }
                        Err(error) => {
                            skipped += 1;
                            warn!(step = steps, %error, "Skipped batch.");
                            None
                        }
                    };
                    self.reporter.report(Progress::TaskIncrement { step: steps, loss });

                    if steps % run.eval_interval == 0 {
                        if let Some(record) = self.record_evaluation(&params, &eval_set, steps)? {
                            last_evaluated = Some(steps);
                            if let Some(stop) = observe(record, &mut history) {
                                break stop;
                            }
                        }
                    }
                };
                drop(receiver);
                Ok(status)
            })?,
        };
        self.reporter.report(Progress::TaskFinish { status, steps });

        if last_evaluated != Some(steps) {
            if let Some(record) = self.record_evaluation(&params, &eval_set, steps)? {
                history.push(record);
            }
        }

        let best_evaluation = history
            .iter()
            .copied()
            .min_by(|a, b| a.metrics.loss.total_cmp(&b.metrics.loss));
        info!(
            ?status,
            steps,
            updates = optimizer.updates(),
            skipped,
            rejected = rejected.len(),
            "Training finished."
        );

        Ok(TrainingOutcome {
            status,
            steps,
            updates: optimizer.updates(),
            skipped_batches: skipped,
            initial_evaluation: history.first().copied().filter(|r| r.step == 0),
            final_evaluation: history.last().copied(),
            best_evaluation,
            history,
            rejected,
            parameters: params,
        })
    }
}

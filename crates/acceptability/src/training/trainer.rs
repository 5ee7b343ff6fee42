//! Reference training loop driving the checkpoint manager.

use super::config::TrainerConfig;
use super::data::SyntheticCorpus;
use super::early_stopping::{EarlyStopping, EarlyStoppingState};
use crate::checkpoint::{
    CheckpointConfig, CheckpointManager, Checkpointable, ResumeSource, Stateful,
};
use crate::model::{Classifier, EmbeddingTable, Linear, Module};
use crate::optim::Sgd;
use crate::{AcceptabilityError, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Trainer state visible to the checkpoint manager.
pub trait TrainerState {
    fn model(&self) -> &dyn Module;
    fn model_mut(&mut self) -> &mut dyn Module;

    fn optimizer(&self) -> &dyn Stateful;
    fn optimizer_mut(&mut self) -> &mut dyn Stateful;

    /// Number of completed epochs.
    fn current_epoch(&self) -> u64;
    fn set_current_epoch(&mut self, epoch: u64);

    fn early_stopping_state(&self) -> EarlyStoppingState;
    fn set_early_stopping_state(&mut self, state: EarlyStoppingState);

    fn embedding(&self) -> &dyn Checkpointable;
    fn embedding_mut(&mut self) -> &mut dyn Checkpointable;
}

/// Validation results of one epoch.
#[derive(Clone, Debug, PartialEq)]
pub struct EpochMetrics {
    pub epoch: u64,
    pub train_loss: f64,
    pub valid_loss: f64,
    pub accuracy: f64,
    /// Matthews correlation coefficient (binary tasks)
    pub mcc: f64,
}

impl EpochMetrics {
    /// Metrics stored next to the monitored validation loss.
    pub fn other_metrics(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        metrics.insert("accuracy".to_string(), self.accuracy);
        metrics.insert("mcc".to_string(), self.mcc);
        metrics.insert("train_loss".to_string(), self.train_loss);
        metrics
    }
}

/// Outcome of `Trainer::fit`.
#[derive(Clone, Debug)]
pub struct TrainSummary {
    pub resumed_from: Option<ResumeSource>,
    pub start_epoch: u64,
    pub final_epoch: u64,
    pub stopped_early: bool,
    pub best: EarlyStoppingState,
    pub checkpoint: PathBuf,
    pub final_model: PathBuf,
}

/// Trains a classifier over mean-pooled embeddings of a synthetic corpus.
///
/// The embedding is updated only when the checkpoint config marks it
/// trainable. Validation loss is the monitored metric.
pub struct Trainer<M: Classifier> {
    config: TrainerConfig,
    model: M,
    optimizer: Sgd,
    embedding: EmbeddingTable,
    early_stopping: EarlyStopping,
    current_epoch: u64,
    checkpoint: CheckpointManager,
    train_set: SyntheticCorpus,
    valid_set: SyntheticCorpus,
}

impl Trainer<Linear> {
    /// Trainer over a freshly initialised `Linear` classifier.
    pub fn linear(config: TrainerConfig) -> Self {
        let model = Linear::new(config.embedding_dim, config.num_classes, config.seed);
        Self::new(config, model)
    }
}

impl<M: Classifier> Trainer<M> {
    pub fn new(config: TrainerConfig, model: M) -> Self {
        let optimizer = Sgd::new(config.learning_rate, config.momentum);
        let embedding = EmbeddingTable::new(config.vocab_size, config.embedding_dim, config.seed);
        let early_stopping = EarlyStopping::new(config.monitor_mode, config.patience);
        let checkpoint = CheckpointManager::new(config.checkpoint.clone());
        let train_set = SyntheticCorpus::generate(
            config.train_size,
            config.vocab_size,
            config.max_len,
            config.seed.wrapping_add(1),
        );
        let valid_set = SyntheticCorpus::generate(
            config.valid_size,
            config.vocab_size,
            config.max_len,
            config.seed.wrapping_add(2),
        );

        Self {
            config,
            model,
            optimizer,
            embedding,
            early_stopping,
            current_epoch: 0,
            checkpoint,
            train_set,
            valid_set,
        }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn checkpoint_config(&self) -> &CheckpointConfig {
        self.checkpoint.config()
    }

    pub fn checkpoint_manager(&self) -> &CheckpointManager {
        &self.checkpoint
    }

    pub fn classifier(&self) -> &M {
        &self.model
    }

    pub fn sgd(&self) -> &Sgd {
        &self.optimizer
    }

    pub fn embedding_table(&self) -> &EmbeddingTable {
        &self.embedding
    }

    pub fn early_stopping(&self) -> &EarlyStopping {
        &self.early_stopping
    }

    /// Load the resumable state, if any, into this trainer.
    pub fn resume(&mut self) -> Result<Option<ResumeSource>> {
        let state = match self.checkpoint.load_state_dict()? {
            Some(state) => state,
            None => {
                tracing::info!("No checkpoint to resume from, starting fresh");
                return Ok(None);
            }
        };

        if let Some(data) = &state.embedding {
            self.check_embedding(&EmbeddingTable::from_bytes(data)?)?;
        }

        let source = state.source.clone();
        state.apply(self)?;
        Ok(Some(source))
    }

    /// A resumed table must feed the classifier and cover the vocabulary.
    fn check_embedding(&self, table: &EmbeddingTable) -> Result<()> {
        if table.dim() != self.config.embedding_dim {
            return Err(AcceptabilityError::InvalidState(format!(
                "embedding dimension {} does not match classifier input {}",
                table.dim(),
                self.config.embedding_dim
            )));
        }
        if table.vocab_size() < self.config.vocab_size {
            return Err(AcceptabilityError::InvalidState(format!(
                "embedding has {} rows, vocabulary needs {}",
                table.vocab_size(),
                self.config.vocab_size
            )));
        }
        Ok(())
    }

    /// Reload only the classifier weights from the experiment checkpoint.
    pub fn restore(&mut self) -> Result<bool> {
        self.checkpoint.restore(&mut self.model)
    }

    /// One pass over the training set. Returns the mean batch loss.
    pub fn train_epoch(&mut self) -> f64 {
        let update_embedding = self.checkpoint.config().embedding_trainable();
        let embedding_lr = self.config.embedding_lr as f32;

        let mut total = 0.0f64;
        let mut batches = 0usize;
        for (sentences, labels) in self.train_set.batches(self.config.batch_size) {
            let x = self.embedding.mean_pool(sentences);
            let grads = self.model.backward(&x, labels);
            self.model.apply_gradients(&grads, &mut self.optimizer);
            if update_embedding {
                self.embedding.update(sentences, &grads.input, embedding_lr);
            }

            total += grads.loss as f64;
            batches += 1;
        }

        if batches == 0 {
            0.0
        } else {
            total / batches as f64
        }
    }

    /// Loss, accuracy and MCC on the validation set.
    pub fn evaluate(&self) -> (f64, f64, f64) {
        let labels = self.valid_set.labels();
        if labels.is_empty() {
            return (0.0, 0.0, 0.0);
        }

        let x = self.embedding.mean_pool(self.valid_set.sentences());
        let loss = self.model.backward(&x, labels).loss as f64;
        let predictions = self.model.predict(&x);
        let correct = predictions
            .iter()
            .zip(labels)
            .filter(|(p, l)| p == l)
            .count();

        (
            loss,
            correct as f64 / labels.len() as f64,
            matthews_corrcoef(&predictions, labels),
        )
    }

    /// Resume if configured, train the remaining epochs, then finalize.
    pub fn fit(&mut self) -> Result<TrainSummary> {
        let resumed_from = self.resume()?;
        let start_epoch = self.current_epoch;
        let interval = self.config.checkpoint_interval;
        let mut stopped_early = false;

        tracing::info!(
            start_epoch,
            epochs = self.config.epochs,
            resumed = resumed_from.is_some(),
            "Starting training"
        );

        while self.current_epoch < self.config.epochs {
            if self.early_stopping.should_stop(self.current_epoch) {
                tracing::info!(
                    epoch = self.current_epoch,
                    best_epoch = self.early_stopping.state().best_monitored_epoch,
                    "Early stopping"
                );
                stopped_early = true;
                break;
            }

            let metrics = self.run_epoch();
            let improved = self.early_stopping.observe(
                metrics.epoch,
                metrics.valid_loss,
                &metrics.other_metrics(),
            );
            tracing::info!(
                epoch = metrics.epoch,
                train_loss = metrics.train_loss,
                valid_loss = metrics.valid_loss,
                accuracy = metrics.accuracy,
                mcc = metrics.mcc,
                improved,
                "Epoch complete"
            );

            if self.current_epoch.is_multiple_of(interval) {
                self.checkpoint.save(self)?;
            }
        }

        let checkpoint = self.checkpoint.save(self)?;
        let final_model = self.checkpoint.finalize(self)?;

        Ok(TrainSummary {
            resumed_from,
            start_epoch,
            final_epoch: self.current_epoch,
            stopped_early,
            best: self.early_stopping.state().clone(),
            checkpoint,
            final_model,
        })
    }

    fn run_epoch(&mut self) -> EpochMetrics {
        let train_loss = self.train_epoch();
        self.current_epoch += 1;
        let (valid_loss, accuracy, mcc) = self.evaluate();

        EpochMetrics {
            epoch: self.current_epoch,
            train_loss,
            valid_loss,
            accuracy,
            mcc,
        }
    }
}

impl<M: Classifier> TrainerState for Trainer<M> {
    fn model(&self) -> &dyn Module {
        &self.model
    }

    fn model_mut(&mut self) -> &mut dyn Module {
        &mut self.model
    }

    fn optimizer(&self) -> &dyn Stateful {
        &self.optimizer
    }

    fn optimizer_mut(&mut self) -> &mut dyn Stateful {
        &mut self.optimizer
    }

    fn current_epoch(&self) -> u64 {
        self.current_epoch
    }

    fn set_current_epoch(&mut self, epoch: u64) {
        self.current_epoch = epoch;
    }

    fn early_stopping_state(&self) -> EarlyStoppingState {
        self.early_stopping.state().clone()
    }

    fn set_early_stopping_state(&mut self, state: EarlyStoppingState) {
        self.early_stopping.set_state(state);
    }

    fn embedding(&self) -> &dyn Checkpointable {
        &self.embedding
    }

    fn embedding_mut(&mut self) -> &mut dyn Checkpointable {
        &mut self.embedding
    }
}

/// Binary MCC treating class `1` as positive; 0 when undefined.
fn matthews_corrcoef(predictions: &[usize], labels: &[usize]) -> f64 {
    let (mut tp, mut tn, mut fp, mut fn_) = (0f64, 0f64, 0f64, 0f64);
    for (&p, &l) in predictions.iter().zip(labels) {
        match (p == 1, l == 1) {
            (true, true) => tp += 1.0,
            (false, false) => tn += 1.0,
            (true, false) => fp += 1.0,
            (false, true) => fn_ += 1.0,
        }
    }

    let denom = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (tp * tn - fp * fn_) / denom
    }
}

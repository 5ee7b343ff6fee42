//! Trainer configuration.

use super::early_stopping::MonitorMode;
use crate::checkpoint::CheckpointConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration for the acceptability trainer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    // Training
    /// Number of epochs to train for
    pub epochs: u64,
    /// Sentences per optimizer step
    pub batch_size: usize,
    /// Classifier learning rate
    pub learning_rate: f64,
    /// SGD momentum
    pub momentum: f64,
    /// Learning rate for the embedding when it is trainable
    pub embedding_lr: f64,

    // Model
    /// Vocabulary size of the embedding table
    pub vocab_size: usize,
    /// Embedding dimension (classifier input size)
    pub embedding_dim: usize,
    /// Number of output classes
    pub num_classes: usize,
    /// Replicate the classifier over this many devices (0 to disable)
    pub data_parallel: usize,

    // Data
    /// Number of training sentences
    pub train_size: usize,
    /// Number of validation sentences
    pub valid_size: usize,
    /// Maximum sentence length in tokens
    pub max_len: usize,

    // Early stopping
    /// Validation loss is monitored in this mode
    pub monitor_mode: MonitorMode,
    /// Epochs without improvement before stopping (0 to disable)
    pub patience: u64,

    // Checkpointing
    /// Checkpoint interval (epochs)
    pub checkpoint_interval: u64,
    /// Artifact locations and resume behaviour
    pub checkpoint: CheckpointConfig,

    // Random seed
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 32,
            learning_rate: 0.5,
            momentum: 0.9,
            embedding_lr: 0.5,

            vocab_size: 64,
            embedding_dim: 16,
            num_classes: 2,
            data_parallel: 0,

            train_size: 512,
            valid_size: 128,
            max_len: 12,

            monitor_mode: MonitorMode::Min,
            patience: 0,

            checkpoint_interval: 1,
            checkpoint: CheckpointConfig::default(),

            seed: 42,
        }
    }
}

impl TrainerConfig {
    /// Read a JSON config file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Set number of epochs
    pub fn with_epochs(mut self, epochs: u64) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set learning rate
    pub fn with_lr(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set patience
    pub fn with_patience(mut self, patience: u64) -> Self {
        self.patience = patience;
        self
    }

    /// Set checkpoint interval
    pub fn with_checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Set data-parallel device count
    pub fn with_data_parallel(mut self, devices: usize) -> Self {
        self.data_parallel = devices;
        self
    }

    /// Set checkpoint config
    pub fn with_checkpoint(mut self, checkpoint: CheckpointConfig) -> Self {
        self.checkpoint = checkpoint;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"epochs": 3, "checkpoint": {"experiment_name": "cola", "glove": false}}"#,
        )
        .unwrap();

        let config = TrainerConfig::from_json_file(&path).unwrap();
        assert_eq!(config.epochs, 3);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.checkpoint.experiment_name, "cola");
        assert_eq!(config.checkpoint.save_loc, PathBuf::from("save"));
        assert!(config.checkpoint.embedding_trainable());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ epochs: ").unwrap();

        let err = TrainerConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, crate::AcceptabilityError::Config(_)));
    }

    #[test]
    fn test_builders() {
        let config = TrainerConfig::default()
            .with_epochs(5)
            .with_lr(0.1)
            .with_data_parallel(2)
            .with_checkpoint(CheckpointConfig::new("/tmp/x", "run"));

        assert_eq!(config.epochs, 5);
        assert_eq!(config.learning_rate, 0.1);
        assert_eq!(config.data_parallel, 2);
        assert_eq!(config.checkpoint.experiment_name, "run");
    }
}

//! # acceptability
//!
//! Checkpoint persistence for resumable model training.
//!
//! ## Overview
//!
//! The crate maps the mutable state of a training loop onto three files:
//! - `<save_loc>/<experiment>.ckpt` - resumable record (weights, optimizer, epoch, early stopping)
//! - `<save_loc>/<experiment>.pth` - final model artifact
//! - `<save_loc>/<experiment>.emb` - trainable embedding table
//!
//! Collaborators plug in through traits:
//! - `Stateful` - state-dict export/import (models, optimizers)
//! - `Checkpointable` - whole-object persistence (final model, embedding)
//! - `Module` - models, with an optional inner-model accessor for replication wrappers
//! - `TrainerState` - what the checkpoint manager reads from and writes to a trainer
//!
//! ## Features
//!
//! - `default` - ndarray-backed reference model, optimizer and trainer
//! - `torch` - implement the traits for `tch::nn::VarStore` (requires libtorch)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use acceptability::prelude::*;
//!
//! let config = CheckpointConfig::new("save", "cola_lstm").resume(true);
//! let manager = CheckpointManager::new(config);
//!
//! if let Some(resumed) = manager.load_state_dict()? {
//!     resumed.apply(&mut trainer)?;
//! }
//! // ... train ...
//! manager.save(&trainer)?;
//! manager.finalize(&trainer)?;
//! ```

pub mod checkpoint;
pub mod model;
pub mod optim;
pub mod training;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::checkpoint::{
        CheckpointConfig, CheckpointManager, CheckpointPaths, CheckpointRecord, Checkpointable,
        ResumeSource, ResumeState, StateDict, StateValue, Stateful,
    };
    pub use crate::model::{
        unwrap_model, unwrap_model_mut, Classifier, DataParallel, EmbeddingTable, Linear, Module,
    };
    pub use crate::optim::Sgd;
    pub use crate::training::{
        EarlyStopping, EarlyStoppingState, EpochMetrics, MonitorMode, SyntheticCorpus, TrainSummary,
        Trainer, TrainerConfig, TrainerState,
    };
    pub use crate::{AcceptabilityError, Result};
}

/// Library version, stamped into every checkpoint record
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum AcceptabilityError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Missing parameter in state dict: {0}")]
    MissingParameter(String),

    #[error("Shape mismatch for '{name}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[cfg(feature = "torch")]
    #[error("Tensor error: {0}")]
    Tensor(#[from] tch::TchError),
}

pub type Result<T> = std::result::Result<T, AcceptabilityError>;

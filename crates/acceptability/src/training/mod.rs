//! Training-side collaborators of the checkpoint manager.
//!
//! Provides:
//! - `TrainerState` - what the manager reads from and writes into a trainer
//! - `EarlyStopping` - monitored-metric tracker whose state is persisted
//! - `Trainer` - reference training loop with resume/save/finalize

mod config;
mod data;
mod early_stopping;
mod trainer;

pub use config::TrainerConfig;
pub use data::SyntheticCorpus;
pub use early_stopping::{EarlyStopping, EarlyStoppingState, MonitorMode};
pub use trainer::{EpochMetrics, TrainSummary, Trainer, TrainerState};

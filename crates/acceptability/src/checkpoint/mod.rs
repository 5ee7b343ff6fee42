//! Checkpointing system for resumable training.
//!
//! Provides:
//! - `Stateful` / `Checkpointable` traits for components that can be saved/restored
//! - `CheckpointRecord` for the complete resumable training state
//! - `CheckpointManager` for mapping a trainer onto its `.ckpt`, `.pth` and `.emb` files

mod manager;
mod state;

pub use manager::{CheckpointConfig, CheckpointManager, CheckpointPaths, ResumeSource, ResumeState};
pub use state::{
    float_entry, int_entry, tensor_entry, CheckpointRecord, Checkpointable, StateDict, StateValue,
    Stateful,
};

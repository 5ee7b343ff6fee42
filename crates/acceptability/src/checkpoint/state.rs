//! Checkpoint record and the state traits collaborators implement.

use crate::training::{EarlyStoppingState, TrainerState};
use crate::{AcceptabilityError, Result};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trait for objects that are persisted whole (architecture and contents).
///
/// Used for the final model artifact and the embedding artifact, where the
/// file must be enough to rebuild the object without knowing its shape.
///
/// # Example
///
/// ```ignore
/// impl Checkpointable for MyEmbedding {
///     fn save_state(&self) -> Result<Vec<u8>> {
///         Ok(bincode::serialize(&self.table)?)
///     }
///
///     fn load_state(&mut self, data: &[u8]) -> Result<()> {
///         self.table = bincode::deserialize(data)?;
///         Ok(())
///     }
/// }
/// ```
pub trait Checkpointable {
    /// Serialize the whole object to bytes.
    fn save_state(&self) -> Result<Vec<u8>>;

    /// Replace the object with the one encoded in `data`.
    fn load_state(&mut self, data: &[u8]) -> Result<()>;
}

/// A single entry of a state dict.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum StateValue {
    /// Parameter or buffer tensor
    Tensor(ArrayD<f32>),
    /// Floating point hyperparameter (learning rate, momentum, ...)
    Float(f64),
    /// Integer counter (step count, ...)
    Int(i64),
}

impl StateValue {
    pub fn as_tensor(&self) -> Option<&ArrayD<f32>> {
        match self {
            StateValue::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            StateValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            StateValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Tensor shape; scalars report an empty shape.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            StateValue::Tensor(t) => t.shape().to_vec(),
            _ => Vec::new(),
        }
    }
}

impl From<ArrayD<f32>> for StateValue {
    fn from(t: ArrayD<f32>) -> Self {
        StateValue::Tensor(t)
    }
}

impl From<f64> for StateValue {
    fn from(v: f64) -> Self {
        StateValue::Float(v)
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        StateValue::Int(v)
    }
}

/// Mapping from parameter name to value.
///
/// Ordered so that equal states always encode to equal bytes.
pub type StateDict = BTreeMap<String, StateValue>;

/// Look up a tensor and check its shape.
pub fn tensor_entry(state: &StateDict, name: &str, expected: &[usize]) -> Result<ArrayD<f32>> {
    let value = state
        .get(name)
        .ok_or_else(|| AcceptabilityError::MissingParameter(name.to_string()))?;
    let tensor = value.as_tensor().ok_or_else(|| {
        AcceptabilityError::InvalidState(format!("'{}' is not a tensor", name))
    })?;
    if tensor.shape() != expected {
        return Err(AcceptabilityError::ShapeMismatch {
            name: name.to_string(),
            expected: expected.to_vec(),
            actual: tensor.shape().to_vec(),
        });
    }
    Ok(tensor.clone())
}

/// Look up a float scalar.
pub fn float_entry(state: &StateDict, name: &str) -> Result<f64> {
    state
        .get(name)
        .ok_or_else(|| AcceptabilityError::MissingParameter(name.to_string()))?
        .as_float()
        .ok_or_else(|| AcceptabilityError::InvalidState(format!("'{}' is not a float", name)))
}

/// Look up an integer scalar.
pub fn int_entry(state: &StateDict, name: &str) -> Result<i64> {
    state
        .get(name)
        .ok_or_else(|| AcceptabilityError::MissingParameter(name.to_string()))?
        .as_int()
        .ok_or_else(|| AcceptabilityError::InvalidState(format!("'{}' is not an integer", name)))
}

/// Trait for components exporting and importing a state dict.
pub trait Stateful {
    /// Snapshot of every parameter and buffer.
    fn state_dict(&self) -> StateDict;

    /// Restore from a snapshot produced by an equivalent component.
    fn load_state_dict(&mut self, state: &StateDict) -> Result<()>;
}

/// Complete resumable training state.
///
/// All fields are required: a record missing any of them fails to decode.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CheckpointRecord {
    /// Crate version that wrote the record
    pub version: String,
    /// Parameters of the unwrapped model
    pub model: StateDict,
    /// Optimizer state
    pub optimizer: StateDict,
    /// Epoch the trainer was at when saved
    pub current_epoch: u64,
    /// Best monitored metric so far
    pub best_metric: f64,
    /// Epoch at which `best_metric` was reached
    pub best_epoch: u64,
    /// Other metrics recorded at the best epoch
    pub other_metrics: BTreeMap<String, f64>,
}

impl CheckpointRecord {
    pub fn new(
        model: StateDict,
        optimizer: StateDict,
        current_epoch: u64,
        early_stopping: EarlyStoppingState,
    ) -> Self {
        Self {
            version: crate::VERSION.to_string(),
            model,
            optimizer,
            current_epoch,
            best_metric: early_stopping.best_monitored_metric,
            best_epoch: early_stopping.best_monitored_epoch,
            other_metrics: early_stopping.other_metrics,
        }
    }

    /// Snapshot a trainer. The model is unwrapped first, so replicated and
    /// plain models produce the same record.
    pub fn capture<T: TrainerState + ?Sized>(trainer: &T) -> Self {
        let model = crate::model::unwrap_model(trainer.model());
        Self::new(
            model.state_dict(),
            trainer.optimizer().state_dict(),
            trainer.current_epoch(),
            trainer.early_stopping_state(),
        )
    }

    /// Early-stopping fields of the record.
    pub fn early_stopping(&self) -> EarlyStoppingState {
        EarlyStoppingState {
            best_monitored_metric: self.best_metric,
            best_monitored_epoch: self.best_epoch,
            other_metrics: self.other_metrics.clone(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

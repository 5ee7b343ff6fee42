//! Models whose state the checkpoint manager persists.
//!
//! Provides:
//! - `Module` trait with the inner-model capability used for unwrapping
//! - `DataParallel` - replication wrapper exposing the real model
//! - `Classifier` - models trainable by the reference trainer
//! - `Linear` - dense softmax classifier
//! - `EmbeddingTable` - trainable token embedding

mod embedding;
mod linear;
mod parallel;
#[cfg(feature = "torch")]
mod torch;

pub use embedding::EmbeddingTable;
pub use linear::Linear;
pub use parallel::DataParallel;

use crate::checkpoint::{Checkpointable, Stateful};
use crate::optim::Sgd;
use crate::{AcceptabilityError, Result};
use ndarray::{Array2, ArrayD, Axis};
use std::collections::BTreeMap;

/// A model: exports/imports its parameters and persists as a whole.
///
/// Wrappers that run another model (replication across devices, ...)
/// return it from `inner_module`; every checkpoint operation works on that
/// inner model.
pub trait Module: Stateful + Checkpointable {
    /// The wrapped model, if this is a wrapper.
    fn inner_module(&self) -> Option<&dyn Module> {
        None
    }

    /// Mutable access to the wrapped model, if this is a wrapper.
    fn inner_module_mut(&mut self) -> Option<&mut dyn Module> {
        None
    }
}

/// The model to read state from: the wrapped one if any, else `model`.
pub fn unwrap_model(model: &dyn Module) -> &dyn Module {
    match model.inner_module() {
        Some(inner) => inner,
        None => model,
    }
}

/// The model to write state into: the wrapped one if any, else `model`.
///
/// Fails when a wrapper exposes its inner model only immutably.
pub fn unwrap_model_mut(model: &mut dyn Module) -> Result<&mut dyn Module> {
    if model.inner_module().is_none() {
        return Ok(model);
    }
    model.inner_module_mut().ok_or_else(|| {
        AcceptabilityError::InvalidState(
            "wrapper exposes inner_module but not inner_module_mut".to_string(),
        )
    })
}

/// Result of a backward pass.
#[derive(Clone, Debug)]
pub struct Gradients {
    /// Mean loss over the batch
    pub loss: f32,
    /// Gradient per parameter, keyed like the state dict
    pub params: BTreeMap<String, ArrayD<f32>>,
    /// Gradient with respect to the input rows
    pub input: Array2<f32>,
}

/// A model mapping feature rows to class logits.
pub trait Classifier: Module {
    /// Logits, one row per input row.
    fn forward(&self, x: &Array2<f32>) -> Array2<f32>;

    /// Mean cross-entropy loss and gradients for a labelled batch.
    fn backward(&self, x: &Array2<f32>, labels: &[usize]) -> Gradients;

    /// Apply one optimizer step.
    fn apply_gradients(&mut self, grads: &Gradients, optimizer: &mut Sgd);

    /// Most likely class per row.
    fn predict(&self, x: &Array2<f32>) -> Vec<usize> {
        self.forward(x)
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                        if v > best.1 {
                            (i, v)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect()
    }
}

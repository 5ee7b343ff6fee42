//! Dense softmax classifier.

use super::{Classifier, Gradients, Module};
use crate::checkpoint::{tensor_entry, Checkpointable, StateDict, StateValue, Stateful};
use crate::optim::Sgd;
use crate::{AcceptabilityError, Result};
use ndarray::{Array1, Array2, Axis, Ix1, Ix2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `logits = x W + b`, trained with softmax cross-entropy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    /// `[in_features, out_features]`
    weight: Array2<f32>,
    /// `[out_features]`
    bias: Array1<f32>,
}

impl Linear {
    /// Create a layer with weights drawn uniformly from `±1/sqrt(in_features)`.
    pub fn new(in_features: usize, out_features: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let bound = 1.0 / (in_features.max(1) as f32).sqrt();
        let weight = Array2::from_shape_fn((in_features, out_features), |_| {
            rng.gen_range(-bound..bound)
        });
        Self {
            weight,
            bias: Array1::zeros(out_features),
        }
    }

    /// Decode a model written by `save_state` (the final model artifact).
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }

    pub fn in_features(&self) -> usize {
        self.weight.nrows()
    }

    pub fn out_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn weight(&self) -> &Array2<f32> {
        &self.weight
    }

    pub fn bias(&self) -> &Array1<f32> {
        &self.bias
    }
}

fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut probs = logits.clone();
    for mut row in probs.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    probs
}

impl Classifier for Linear {
    fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut logits = x.dot(&self.weight);
        logits += &self.bias;
        logits
    }

    fn backward(&self, x: &Array2<f32>, labels: &[usize]) -> Gradients {
        let n = x.nrows().max(1) as f32;
        let probs = softmax_rows(&self.forward(x));

        let mut loss = 0.0f32;
        let mut dlogits = probs.clone();
        for (i, &label) in labels.iter().enumerate() {
            loss -= probs[[i, label]].max(1e-12).ln();
            dlogits[[i, label]] -= 1.0;
        }
        dlogits.mapv_inplace(|v| v / n);

        let mut params = BTreeMap::new();
        params.insert("weight".to_string(), x.t().dot(&dlogits).into_dyn());
        params.insert("bias".to_string(), dlogits.sum_axis(Axis(0)).into_dyn());

        Gradients {
            loss: loss / n,
            params,
            input: dlogits.dot(&self.weight.t()),
        }
    }

    fn apply_gradients(&mut self, grads: &Gradients, optimizer: &mut Sgd) {
        if let Some(g) = grads.params.get("weight") {
            optimizer.update("weight", self.weight.view_mut().into_dyn(), g);
        }
        if let Some(g) = grads.params.get("bias") {
            optimizer.update("bias", self.bias.view_mut().into_dyn(), g);
        }
        optimizer.advance();
    }
}

impl Stateful for Linear {
    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        state.insert("weight".into(), StateValue::Tensor(self.weight.clone().into_dyn()));
        state.insert("bias".into(), StateValue::Tensor(self.bias.clone().into_dyn()));
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        let weight = tensor_entry(state, "weight", self.weight.shape())?
            .into_dimensionality::<Ix2>()
            .map_err(|e| AcceptabilityError::InvalidState(e.to_string()))?;
        let bias = tensor_entry(state, "bias", self.bias.shape())?
            .into_dimensionality::<Ix1>()
            .map_err(|e| AcceptabilityError::InvalidState(e.to_string()))?;
        self.weight = weight;
        self.bias = bias;
        Ok(())
    }
}

impl Checkpointable for Linear {
    fn save_state(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        *self = Self::from_bytes(data)?;
        Ok(())
    }
}

impl Module for Linear {}

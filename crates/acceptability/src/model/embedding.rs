//! Token embedding table.

use crate::checkpoint::{tensor_entry, Checkpointable, StateDict, StateValue, Stateful};
use crate::{AcceptabilityError, Result};
use ndarray::{Array2, ArrayView1, Ix2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// `[vocab_size, dim]` lookup table.
///
/// Token ids passed to `mean_pool`/`update` must be below `vocab_size`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingTable {
    weight: Array2<f32>,
}

impl EmbeddingTable {
    pub fn new(vocab_size: usize, dim: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let weight = Array2::from_shape_fn((vocab_size, dim), |_| rng.gen_range(-0.5f32..0.5));
        Self { weight }
    }

    /// Decode a table written by `save_state` (the embedding artifact).
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }

    pub fn vocab_size(&self) -> usize {
        self.weight.nrows()
    }

    pub fn dim(&self) -> usize {
        self.weight.ncols()
    }

    pub fn lookup(&self, token: usize) -> ArrayView1<'_, f32> {
        self.weight.row(token)
    }

    /// Average embedding of each sequence; empty sequences map to zeros.
    pub fn mean_pool(&self, batch: &[Vec<usize>]) -> Array2<f32> {
        let mut pooled = Array2::zeros((batch.len(), self.dim()));
        for (i, tokens) in batch.iter().enumerate() {
            if tokens.is_empty() {
                continue;
            }
            let mut row = pooled.row_mut(i);
            for &token in tokens {
                row += &self.weight.row(token);
            }
            row /= tokens.len() as f32;
        }
        pooled
    }

    /// Plain SGD step given the gradient of the loss wrt the pooled rows.
    pub fn update(&mut self, batch: &[Vec<usize>], pooled_grad: &Array2<f32>, lr: f32) {
        for (i, tokens) in batch.iter().enumerate() {
            if tokens.is_empty() {
                continue;
            }
            let scale = lr / tokens.len() as f32;
            let grad = pooled_grad.row(i);
            for &token in tokens {
                self.weight
                    .row_mut(token)
                    .scaled_add(-scale, &grad);
            }
        }
    }
}

impl Stateful for EmbeddingTable {
    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        state.insert("weight".into(), StateValue::Tensor(self.weight.clone().into_dyn()));
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        self.weight = tensor_entry(state, "weight", self.weight.shape())?
            .into_dimensionality::<Ix2>()
            .map_err(|e| AcceptabilityError::InvalidState(e.to_string()))?;
        Ok(())
    }
}

// The whole table is replaced on load: a pretrained table may differ in
// vocabulary size from the freshly initialised one.
impl Checkpointable for EmbeddingTable {
    fn save_state(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        *self = Self::from_bytes(data)?;
        Ok(())
    }
}

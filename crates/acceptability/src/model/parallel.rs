//! Data-parallel replication wrapper.

use super::{Classifier, Gradients, Module};
use crate::checkpoint::{Checkpointable, StateDict, Stateful};
use crate::optim::Sgd;
use crate::{AcceptabilityError, Result};
use ndarray::{s, Array2, ArrayD, IxDyn};
use std::collections::BTreeMap;

const PREFIX: &str = "module.";

/// Runs one model over several devices by splitting each batch.
///
/// Each device computes gradients on its shard; shard gradients are
/// averaged (weighted by shard size) before a single optimizer step, so a
/// step matches the unwrapped model's step on the whole batch.
///
/// Its own state dict prefixes every key with `module.`. Checkpointing goes
/// through `inner_module` and never sees the prefix.
#[derive(Clone, Debug)]
pub struct DataParallel<M> {
    module: M,
    device_ids: Vec<usize>,
}

impl<M: Module> DataParallel<M> {
    pub fn new(module: M, device_ids: Vec<usize>) -> Self {
        Self { module, device_ids }
    }

    /// Replicate over devices `0..num_devices`.
    pub fn with_devices(module: M, num_devices: usize) -> Self {
        Self::new(module, (0..num_devices).collect())
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut M {
        &mut self.module
    }

    pub fn into_inner(self) -> M {
        self.module
    }

    pub fn device_ids(&self) -> &[usize] {
        &self.device_ids
    }

    /// Row ranges assigned to each device for a batch of `rows`.
    fn shards(&self, rows: usize) -> Vec<std::ops::Range<usize>> {
        let devices = self.device_ids.len().max(1);
        let chunk = rows.div_ceil(devices).max(1);
        (0..rows)
            .step_by(chunk)
            .map(|start| start..(start + chunk).min(rows))
            .collect()
    }
}

impl<M: Module> Stateful for DataParallel<M> {
    fn state_dict(&self) -> StateDict {
        self.module
            .state_dict()
            .into_iter()
            .map(|(name, value)| (format!("{}{}", PREFIX, name), value))
            .collect()
    }

    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        let mut inner = StateDict::new();
        for (name, value) in state {
            let stripped = name.strip_prefix(PREFIX).ok_or_else(|| {
                AcceptabilityError::InvalidState(format!(
                    "'{}' is not a replicated parameter",
                    name
                ))
            })?;
            inner.insert(stripped.to_string(), value.clone());
        }
        self.module.load_state_dict(&inner)
    }
}

impl<M: Module> Checkpointable for DataParallel<M> {
    fn save_state(&self) -> Result<Vec<u8>> {
        self.module.save_state()
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        self.module.load_state(data)
    }
}

impl<M: Module> Module for DataParallel<M> {
    fn inner_module(&self) -> Option<&dyn Module> {
        Some(&self.module)
    }

    fn inner_module_mut(&mut self) -> Option<&mut dyn Module> {
        Some(&mut self.module)
    }
}

impl<M: Classifier> Classifier for DataParallel<M> {
    fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        self.module.forward(x)
    }

    fn backward(&self, x: &Array2<f32>, labels: &[usize]) -> Gradients {
        let rows = x.nrows();
        let mut loss = 0.0f32;
        let mut params: BTreeMap<String, ArrayD<f32>> = BTreeMap::new();
        let mut input = Array2::zeros(x.raw_dim());

        for shard in self.shards(rows) {
            let weight = shard.len() as f32 / rows as f32;
            let grads = self
                .module
                .backward(&x.slice(s![shard.clone(), ..]).to_owned(), &labels[shard.clone()]);

            loss += grads.loss * weight;
            for (name, grad) in grads.params {
                params
                    .entry(name)
                    .or_insert_with(|| ArrayD::zeros(IxDyn(grad.shape())))
                    .scaled_add(weight, &grad);
            }
            input
                .slice_mut(s![shard, ..])
                .scaled_add(weight, &grads.input);
        }

        Gradients {
            loss,
            params,
            input,
        }
    }

    fn apply_gradients(&mut self, grads: &Gradients, optimizer: &mut Sgd) {
        self.module.apply_gradients(grads, optimizer);
    }
}

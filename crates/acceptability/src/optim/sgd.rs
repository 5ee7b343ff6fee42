//! Stochastic gradient descent with momentum.

use crate::checkpoint::{float_entry, int_entry, StateDict, StateValue, Stateful};
use crate::{AcceptabilityError, Result};
use ndarray::{ArrayD, ArrayViewMutD, IxDyn};
use std::collections::BTreeMap;

const VELOCITY_PREFIX: &str = "velocity.";

/// SGD with classical momentum:
///
/// ```text
/// v = momentum * v + grad
/// p = p - lr * v
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Sgd {
    lr: f64,
    momentum: f64,
    step: u64,
    velocity: BTreeMap<String, ArrayD<f32>>,
}

impl Sgd {
    pub fn new(lr: f64, momentum: f64) -> Self {
        Self {
            lr,
            momentum,
            step: 0,
            velocity: BTreeMap::new(),
        }
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    pub fn set_lr(&mut self, lr: f64) {
        self.lr = lr;
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }

    /// Number of completed optimizer steps.
    pub fn steps(&self) -> u64 {
        self.step
    }

    /// Update one named parameter in place.
    pub fn update(&mut self, name: &str, mut param: ArrayViewMutD<'_, f32>, grad: &ArrayD<f32>) {
        let lr = self.lr as f32;
        let momentum = self.momentum as f32;

        let velocity = self
            .velocity
            .entry(name.to_string())
            .or_insert_with(|| ArrayD::zeros(IxDyn(grad.shape())));
        if velocity.shape() != grad.shape() {
            tracing::warn!(name, "Velocity shape changed, resetting momentum");
            *velocity = ArrayD::zeros(IxDyn(grad.shape()));
        }

        velocity.zip_mut_with(grad, |v, &g| *v = momentum * *v + g);
        param.scaled_add(-lr, &*velocity);
    }

    /// Mark the end of an optimizer step.
    pub fn advance(&mut self) {
        self.step += 1;
    }
}

impl Stateful for Sgd {
    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        state.insert("lr".into(), StateValue::Float(self.lr));
        state.insert("momentum".into(), StateValue::Float(self.momentum));
        state.insert("step".into(), StateValue::Int(self.step as i64));
        for (name, v) in &self.velocity {
            state.insert(
                format!("{}{}", VELOCITY_PREFIX, name),
                StateValue::Tensor(v.clone()),
            );
        }
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        let lr = float_entry(state, "lr")?;
        let momentum = float_entry(state, "momentum")?;
        let step = int_entry(state, "step")?;

        let mut velocity = BTreeMap::new();
        for (key, value) in state {
            if let Some(name) = key.strip_prefix(VELOCITY_PREFIX) {
                let tensor = value.as_tensor().ok_or_else(|| {
                    AcceptabilityError::InvalidState(format!("'{}' is not a tensor", key))
                })?;
                velocity.insert(name.to_string(), tensor.clone());
            }
        }

        self.lr = lr;
        self.momentum = momentum;
        self.step = step.max(0) as u64;
        self.velocity = velocity;
        Ok(())
    }
}

//! Checkpoint traits for tch variable stores.

use super::Module;
use crate::checkpoint::{tensor_entry, Checkpointable, StateDict, StateValue, Stateful};
use crate::{AcceptabilityError, Result};
use ndarray::{ArrayD, IxDyn};
use std::io::Cursor;
use tch::{nn::VarStore, Device, Kind, Tensor};

fn to_array(tensor: &Tensor) -> Result<ArrayD<f32>> {
    let shape: Vec<usize> = tensor.size().iter().map(|&d| d as usize).collect();
    let flat = tensor
        .flatten(0, -1)
        .to_kind(Kind::Float)
        .to_device(Device::Cpu);
    let data = Vec::<f32>::try_from(&flat)?;
    ArrayD::from_shape_vec(IxDyn(&shape), data)
        .map_err(|e| AcceptabilityError::InvalidState(e.to_string()))
}

impl Stateful for VarStore {
    /// Every variable as an `f32` tensor entry.
    ///
    /// A variable that cannot be copied to host memory is logged at error
    /// level and left out, so the returned record may be partial.
    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        for (name, tensor) in self.variables() {
            match to_array(&tensor) {
                Ok(array) => {
                    state.insert(name, StateValue::Tensor(array));
                }
                Err(e) => tracing::error!(name = %name, "Variable left out of state dict: {}", e),
            }
        }
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        for (name, mut var) in self.variables() {
            let shape: Vec<usize> = var.size().iter().map(|&d| d as usize).collect();
            let array = tensor_entry(state, &name, &shape)?;
            let dims: Vec<i64> = shape.iter().map(|&d| d as i64).collect();
            let data: Vec<f32> = array.iter().copied().collect();
            let src = Tensor::from_slice(&data)
                .reshape(dims.as_slice())
                .to_kind(var.kind())
                .to_device(var.device());
            tch::no_grad(|| var.copy_(&src));
        }
        Ok(())
    }
}

impl Checkpointable for VarStore {
    fn save_state(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.save_to_stream(&mut buffer)?;
        Ok(buffer)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        self.load_from_stream(Cursor::new(data))?;
        Ok(())
    }
}

impl Module for VarStore {}

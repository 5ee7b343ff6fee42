//! Optimizers whose state is checkpointed alongside the model.

mod sgd;

pub use sgd::Sgd;

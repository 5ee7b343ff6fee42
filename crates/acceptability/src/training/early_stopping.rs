//! Early-stopping tracker.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether lower or higher values of the monitored metric are better.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    Min,
    Max,
}

impl MonitorMode {
    /// Value every real metric improves on.
    pub fn worst(self) -> f64 {
        match self {
            MonitorMode::Min => f64::INFINITY,
            MonitorMode::Max => f64::NEG_INFINITY,
        }
    }

    pub fn is_better(self, candidate: f64, best: f64) -> bool {
        match self {
            MonitorMode::Min => candidate < best,
            MonitorMode::Max => candidate > best,
        }
    }
}

/// Bookkeeping persisted in checkpoints.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EarlyStoppingState {
    pub best_monitored_metric: f64,
    pub best_monitored_epoch: u64,
    /// Other metrics observed at the best epoch
    pub other_metrics: BTreeMap<String, f64>,
}

/// Stops training once the monitored metric has not improved for
/// `patience` epochs. A patience of zero never stops.
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    mode: MonitorMode,
    patience: u64,
    state: EarlyStoppingState,
}

impl EarlyStopping {
    pub fn new(mode: MonitorMode, patience: u64) -> Self {
        Self {
            mode,
            patience,
            state: EarlyStoppingState {
                best_monitored_metric: mode.worst(),
                best_monitored_epoch: 0,
                other_metrics: BTreeMap::new(),
            },
        }
    }

    pub fn mode(&self) -> MonitorMode {
        self.mode
    }

    pub fn patience(&self) -> u64 {
        self.patience
    }

    /// Record the metrics of `epoch`. Returns true on improvement.
    pub fn observe(
        &mut self,
        epoch: u64,
        metric: f64,
        other_metrics: &BTreeMap<String, f64>,
    ) -> bool {
        if !self.mode.is_better(metric, self.state.best_monitored_metric) {
            return false;
        }

        self.state.best_monitored_metric = metric;
        self.state.best_monitored_epoch = epoch;
        self.state.other_metrics = other_metrics.clone();
        true
    }

    pub fn should_stop(&self, current_epoch: u64) -> bool {
        self.patience > 0
            && current_epoch.saturating_sub(self.state.best_monitored_epoch) >= self.patience
    }

    pub fn state(&self) -> &EarlyStoppingState {
        &self.state
    }

    pub fn set_state(&mut self, state: EarlyStoppingState) {
        self.state = state;
    }
}

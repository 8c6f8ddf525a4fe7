use serde::{Deserialize, Serialize};
use tracing::info;

/// Where the training loop stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingState {
    Running,
    /// The configured convergence criterion was met.
    Converged,
    /// The iteration budget ran out first. Not an error: the weights are still usable.
    MaxIterationsReached,
}

/// Progress of a single training iteration, handed to the observer of
/// [`Network::train_with`](crate::Network::train_with).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationReport {
    /// Number of completed iterations, starting at 1.
    pub iteration: usize,
    /// Cost after this iteration's weight update.
    pub cost: f64,
    /// Smallest `|learning_rate * gradient / weight|` of this iteration's update.
    pub min_weight_fractional_change: Option<f64>,
    pub state: TrainingState,
}

/// Cost per iteration and how training ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    costs: Vec<f64>,
    state: TrainingState,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self {
            costs: Vec::new(),
            state: TrainingState::Running,
        }
    }

    pub fn record(&mut self, cost: f64) {
        self.costs.push(cost);
    }

    pub fn finish(&mut self, state: TrainingState) {
        self.state = state;
    }

    pub fn costs(&self) -> &[f64] {
        &self.costs
    }

    pub fn last_cost(&self) -> Option<f64> {
        self.costs.last().copied()
    }

    pub fn iterations(&self) -> usize {
        self.costs.len()
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    pub fn converged(&self) -> bool {
        self.state == TrainingState::Converged
    }

    /// `|cost[-1] - cost[-2]| / cost[-1]`, once two costs have been recorded.
    pub fn cost_fractional_change(&self) -> Option<f64> {
        match self.costs.as_slice() {
            [.., previous, last] => Some((last - previous).abs() / last),
            _ => None,
        }
    }

    /// Logs the outcome of training.
    pub fn log_summary(&self) {
        info!(
            iterations = self.iterations(),
            state = ?self.state,
            first_cost = self.costs.first().copied().unwrap_or(f64::NAN),
            final_cost = self.last_cost().unwrap_or(f64::NAN),
            "training finished"
        );
    }
}

impl Default for TrainingHistory {
    fn default() -> Self {
        Self::new()
    }
}

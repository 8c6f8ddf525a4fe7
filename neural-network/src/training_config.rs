use crate::error::ConfigError;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Hyperparameters for building and training a network.
///
/// A `TrainingConfig` is immutable once built: use [`TrainingConfigBuilder`] or
/// [`TrainingConfig::load`], both of which validate every field.
///
/// # Example
///
/// ```
/// use neural_network::TrainingConfigBuilder;
///
/// let config = TrainingConfigBuilder::default()
///     .layer_node_counts(vec![4, 5, 3])
///     .learning_rate(0.5)
///     .build()
///     .unwrap();
/// assert_eq!(config.training_examples_percent(), 80);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(build_fn(private, name = "build_unchecked", error = "ConfigError"))]
pub struct TrainingConfig {
    /// Non-bias node count of every layer, input layer first and output layer last.
    #[builder(setter(into))]
    layer_node_counts: Vec<usize>,

    /// Share of the examples, in percent, used for training. The rest is held out for
    /// testing.
    #[builder(default = "80")]
    #[serde(default = "defaults::training_examples_percent")]
    training_examples_percent: u32,

    /// L2 regularization constant (lambda).
    #[builder(default = "0.1")]
    #[serde(default = "defaults::regularization_constant")]
    regularization_constant: f64,

    #[builder(default = "0.2")]
    #[serde(default = "defaults::learning_rate")]
    learning_rate: f64,

    /// Training has converged once the smallest fractional weight change of an update
    /// falls below this value. Only used when `use_cost_func_convergence` is false.
    #[builder(default = "1e-7")]
    #[serde(default = "defaults::weight_grad_frac_change_threshold")]
    weight_grad_frac_change_threshold: f64,

    /// Training has converged once the fractional change of the cost between two
    /// iterations falls below this value.
    #[builder(default = "1e-8")]
    #[serde(default = "defaults::cost_func_frac_change_threshold")]
    cost_func_frac_change_threshold: f64,

    #[builder(default = "true")]
    #[serde(default = "defaults::use_cost_func_convergence")]
    use_cost_func_convergence: bool,

    #[builder(default = "30")]
    #[serde(default = "defaults::max_iterations")]
    max_iterations: usize,

    /// Zero-based iterations at which the analytic gradients are verified numerically.
    #[builder(default, setter(into))]
    #[serde(default)]
    iterations_to_check_gradient: BTreeSet<usize>,
}

mod defaults {
    pub(super) fn training_examples_percent() -> u32 {
        80
    }

    pub(super) fn regularization_constant() -> f64 {
        0.1
    }

    pub(super) fn learning_rate() -> f64 {
        0.2
    }

    pub(super) fn weight_grad_frac_change_threshold() -> f64 {
        1e-7
    }

    pub(super) fn cost_func_frac_change_threshold() -> f64 {
        1e-8
    }

    pub(super) fn use_cost_func_convergence() -> bool {
        true
    }

    pub(super) fn max_iterations() -> usize {
        30
    }
}

impl TrainingConfigBuilder {
    /// Builds and validates the configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when a required field is missing or any field is out of
    /// range.
    pub fn build(&self) -> Result<TrainingConfig, ConfigError> {
        let config = self.build_unchecked()?;
        config.validate()?;
        Ok(config)
    }
}

impl TrainingConfig {
    /// Loads a configuration from a JSON file and validates it.
    ///
    /// Every field except `layer_node_counts` may be omitted and takes its default.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use neural_network::TrainingConfig;
    ///
    /// let config = TrainingConfig::load("config.json").unwrap();
    /// ```
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        Self::from_json(&json)
    }

    /// Parses a configuration from a JSON string and validates it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: TrainingConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Read(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.layer_node_counts.len() < 2 {
            return Err(ConfigError::TooFewLayers(self.layer_node_counts.len()));
        }
        if let Some(index) = self.layer_node_counts.iter().position(|&nodes| nodes == 0) {
            return Err(ConfigError::EmptyLayer { index });
        }
        if !(1..=100).contains(&self.training_examples_percent) {
            return Err(ConfigError::PercentOutOfRange(
                self.training_examples_percent,
            ));
        }
        for (name, value) in [
            ("regularization_constant", self.regularization_constant),
            ("learning_rate", self.learning_rate),
            (
                "weight_grad_frac_change_threshold",
                self.weight_grad_frac_change_threshold,
            ),
            (
                "cost_func_frac_change_threshold",
                self.cost_func_frac_change_threshold,
            ),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidValue { name, value });
            }
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::NoIterations);
        }
        Ok(())
    }

    pub fn layer_node_counts(&self) -> &[usize] {
        &self.layer_node_counts
    }

    pub fn training_examples_percent(&self) -> u32 {
        self.training_examples_percent
    }

    pub fn regularization_constant(&self) -> f64 {
        self.regularization_constant
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn weight_grad_frac_change_threshold(&self) -> f64 {
        self.weight_grad_frac_change_threshold
    }

    pub fn cost_func_frac_change_threshold(&self) -> f64 {
        self.cost_func_frac_change_threshold
    }

    pub fn use_cost_func_convergence(&self) -> bool {
        self.use_cost_func_convergence
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn iterations_to_check_gradient(&self) -> &BTreeSet<usize> {
        &self.iterations_to_check_gradient
    }

    /// Whether the numerical gradient check runs at zero-based `iteration`.
    pub fn checks_gradient_at(&self, iteration: usize) -> bool {
        self.iterations_to_check_gradient.contains(&iteration)
    }
}

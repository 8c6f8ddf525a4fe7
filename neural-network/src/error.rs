//! Error types for configuring, building and training a network.

use crate::layer::LayerKind;
use derive_builder::UninitializedFieldError;
use thiserror::Error;

/// Invalid hyperparameters or a configuration that does not fit the data.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("A network needs at least an input and an output layer, got {0} layer(s)")]
    TooFewLayers(usize),
    #[error("Layer {index} must have at least one node")]
    EmptyLayer { index: usize },
    #[error("Training examples percent must be between 1 and 100 inclusive, got {0}")]
    PercentOutOfRange(u32),
    /// A real-valued hyperparameter that is negative, NaN or infinite
    #[error("{name} must be a non-negative finite number, got {value}")]
    InvalidValue { name: &'static str, value: f64 },
    #[error("Max iterations must be positive")]
    NoIterations,
    #[error(
        "The input layer must have the same number of (non-bias) nodes as the number of \
         columns in the data set: {nodes} != {columns}"
    )]
    InputWidth { nodes: usize, columns: usize },
    #[error(
        "The output layer must have the same number of (non-bias) nodes as the number of \
         unique data labels: {nodes} != {labels}"
    )]
    OutputWidth { nodes: usize, labels: usize },
    #[error("Missing configuration field: {0}")]
    MissingField(String),
    #[error("Could not read configuration: {0}")]
    Read(String),
}

impl From<UninitializedFieldError> for ConfigError {
    fn from(error: UninitializedFieldError) -> Self {
        ConfigError::MissingField(error.field_name().to_string())
    }
}

/// Errors raised while running a network.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A layer was updated before [`Layer::initialize`](crate::Layer::initialize)
    #[error("Layer {index} has not been initialized")]
    Uninitialized { index: usize },
    #[error("{kind:?} layer {index} was initialized with the wrong neighbours")]
    Neighbours { kind: LayerKind, index: usize },
    /// A forward or backward signal that the layer kind cannot consume
    #[error("{kind:?} layer {index} cannot take a {signal} signal")]
    Signal {
        kind: LayerKind,
        index: usize,
        signal: &'static str,
    },
    #[error("{what} has {actual} values, expected {expected}")]
    Shape {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error(
        "Gradient check failed for layer {layer} weight ({row}, {col}): analytic {analytic}, \
         numerical {numerical} (fractional difference {difference})"
    )]
    GradientCheck {
        layer: usize,
        row: usize,
        col: usize,
        analytic: f64,
        numerical: f64,
        difference: f64,
    },
    #[error("Got {predictions} predictions for {labels} labels")]
    PredictionCount { predictions: usize, labels: usize },
    #[error("The testing split has no examples")]
    EmptyTestingSet,
    #[error("The cached training output is stale; run a forward pass first")]
    StaleForwardPass,
}

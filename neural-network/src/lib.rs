// Modules
mod activations;
mod error;
mod layer;
mod network;
mod training_config;
mod training_history;

pub use activations::Sigmoid;
pub use error::{ConfigError, NetworkError};
pub use layer::{BackwardSignal, ForwardSignal, Layer, LayerKind};
pub use matrix::Matrix;
pub use network::{GRADIENT_CHECK_EPSILON, GRADIENT_CHECK_TOLERANCE, Network};
pub use training_config::{TrainingConfig, TrainingConfigBuilder};
pub use training_history::{IterationReport, TrainingHistory, TrainingState};

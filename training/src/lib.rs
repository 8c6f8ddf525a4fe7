mod error;
mod report;
mod training;

pub use error::TrainingError;
pub use report::TrainingReport;
pub use training::Trainer;

pub mod prelude {
    pub use crate::Trainer;
    pub use crate::TrainingError;
    pub use crate::TrainingReport;
    pub use neural_network::{TrainingConfig, TrainingConfigBuilder, TrainingState};
}

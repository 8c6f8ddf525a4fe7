use labelled_data::DataError;
use neural_network::NetworkError;
use thiserror::Error;

/// Errors that can occur while preparing or running a training session
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("Invalid progress bar template: {0}")]
    Progress(#[from] indicatif::style::TemplateError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not serialize the training report: {0}")]
    Json(#[from] serde_json::Error),
}

pub mod dataset;
pub mod split;

pub use crate::dataset::{DataError, LabelledDataSet, read_feature_matrix, read_labels};
pub use crate::split::LabelledDataSplit;

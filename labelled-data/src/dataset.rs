//! Labelled tabular data loaded into memory.
//!
//! Features are read from a comma delimited file with one example per line and no header.
//! Labels are read from a second file where every cell is one label, in order, so both a
//! single column and a single row layout are accepted. The feature matrix is
//! orientation-normalized against the label count before it is handed out.

use csv::StringRecord;
use matrix::Matrix;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while loading or splitting labelled data
#[derive(Debug, Error)]
pub enum DataError {
    /// Wrapper for standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for errors raised by the CSV reader
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// A cell could not be parsed into the expected type
    #[error("Could not parse {value:?} on line {line} of the {kind} file")]
    Parse {
        kind: &'static str,
        line: usize,
        value: String,
    },
    /// Feature rows of differing widths
    #[error("Ragged feature rows: line {line} has {actual} values, expected {expected}")]
    RaggedRow {
        line: usize,
        expected: usize,
        actual: usize,
    },
    /// Neither dimension of the feature matrix matches the label count
    #[error("One data set dimension ({rows} x {cols}) must match the number of labels ({labels})")]
    RowCountMismatch {
        rows: usize,
        cols: usize,
        labels: usize,
    },
    /// Training percentage outside `1..=100`
    #[error("Training examples percent must be between 1 and 100 inclusive, got {0}")]
    PercentOutOfRange(u32),
    /// No examples to work with
    #[error("The data set contains no examples")]
    Empty,
    #[error("Matrix shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Raw feature matrix together with one label per row.
#[derive(Debug, Clone)]
pub struct LabelledDataSet<L> {
    features: Matrix,
    labels: Vec<L>,
}

impl<L> LabelledDataSet<L> {
    /// Pairs a feature matrix with its labels.
    ///
    /// When the number of rows does not match the number of labels but the number of
    /// columns does, the matrix is transposed so that rows are examples.
    ///
    /// # Errors
    /// * `DataError::Empty` if there are no labels or no features
    /// * `DataError::RowCountMismatch` if neither dimension matches the label count
    pub fn new(features: Matrix, labels: Vec<L>) -> Result<Self, DataError> {
        if labels.is_empty() || features.is_empty() {
            return Err(DataError::Empty);
        }

        let features = if features.nrows() == labels.len() {
            features
        } else if features.ncols() == labels.len() {
            features.t().as_standard_layout().into_owned()
        } else {
            return Err(DataError::RowCountMismatch {
                rows: features.nrows(),
                cols: features.ncols(),
                labels: labels.len(),
            });
        };

        Ok(Self { features, labels })
    }

    /// Loads the features and labels from two CSV files.
    pub fn from_csv(
        features_path: impl AsRef<Path>,
        labels_path: impl AsRef<Path>,
    ) -> Result<Self, DataError>
    where
        L: FromStr,
    {
        let features = read_feature_matrix(features_path)?;
        let labels = read_labels(labels_path)?;
        Self::new(features, labels)
    }

    pub fn features(&self) -> &Matrix {
        &self.features
    }

    pub fn labels(&self) -> &[L] {
        &self.labels
    }

    /// Number of examples (rows).
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of features (columns) per example.
    pub fn feature_count(&self) -> usize {
        self.features.ncols()
    }

    pub(crate) fn into_parts(self) -> (Matrix, Vec<L>) {
        (self.features, self.labels)
    }
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

/// Reads a dense feature matrix from a CSV file.
///
/// # Errors
/// Fails on I/O errors, unparsable cells and rows of differing widths.
pub fn read_feature_matrix(path: impl AsRef<Path>) -> Result<Matrix, DataError> {
    parse_feature_matrix(File::open(path)?)
}

/// Parses a dense feature matrix from any CSV source.
pub fn parse_feature_matrix<R: Read>(reader: R) -> Result<Matrix, DataError> {
    let mut data = Vec::new();
    let mut rows = 0;
    let mut cols = None;

    for (index, record) in csv_reader(reader).records().enumerate() {
        let record = record?;
        let line = index + 1;
        let values = cells(&record);
        if values.is_empty() {
            continue;
        }

        let before = data.len();
        for cell in values {
            let value = cell.parse::<f64>().map_err(|_| DataError::Parse {
                kind: "feature",
                line,
                value: cell.to_string(),
            })?;
            data.push(value);
        }
        let width = data.len() - before;

        match cols {
            None => cols = Some(width),
            Some(expected) if expected != width => {
                return Err(DataError::RaggedRow {
                    line,
                    expected,
                    actual: width,
                });
            }
            Some(_) => {}
        }
        rows += 1;
    }

    Ok(Matrix::from_shape_vec((rows, cols.unwrap_or(0)), data)?)
}

/// Reads every cell of a CSV file as one label, in file order.
pub fn read_labels<L: FromStr>(path: impl AsRef<Path>) -> Result<Vec<L>, DataError> {
    parse_labels(File::open(path)?)
}

/// Parses labels from any CSV source.
pub fn parse_labels<L: FromStr, R: Read>(reader: R) -> Result<Vec<L>, DataError> {
    let mut labels = Vec::new();
    for (index, record) in csv_reader(reader).records().enumerate() {
        let record = record?;
        for cell in cells(&record) {
            let label = cell.parse::<L>().map_err(|_| DataError::Parse {
                kind: "label",
                line: index + 1,
                value: cell.to_string(),
            })?;
            labels.push(label);
        }
    }
    Ok(labels)
}

/// The cells of a record, ignoring one trailing empty cell left by a trailing delimiter.
/// Interior empty cells are kept so they fail to parse.
fn cells(record: &StringRecord) -> Vec<&str> {
    let mut cells: Vec<&str> = record.iter().collect();
    if cells.last().is_some_and(|cell| cell.is_empty()) {
        cells.pop();
    }
    cells
}

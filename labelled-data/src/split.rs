//! Random training/testing split of a labelled data set with one-hot targets.

use crate::dataset::{DataError, LabelledDataSet};
use matrix::{Matrix, one_hot, select_rows};
use rand::Rng;
use tracing::info;

/// A labelled data set divided into disjoint training and testing rows.
///
/// The sorted distinct labels define the output index of every label: the one-hot target
/// of a row has its single `1.0` at the position of the row's label in
/// [`distinct_labels`](Self::distinct_labels).
#[derive(Debug, Clone)]
pub struct LabelledDataSplit<L> {
    features: Matrix,
    labels: Vec<L>,
    distinct_labels: Vec<L>,
    training_indices: Vec<usize>,
    testing_indices: Vec<usize>,
    training_set: Matrix,
    training_targets: Matrix,
    testing_set: Matrix,
    testing_targets: Matrix,
    testing_labels: Vec<L>,
}

impl<L: Ord + Clone> LabelledDataSplit<L> {
    /// Splits `data` so that `max(1, round(percent / 100 * rows))` rows are kept for
    /// training.
    ///
    /// Rows are moved one at a time, chosen uniformly from the remaining training rows,
    /// into the testing set. Testing indices are kept sorted; training indices keep their
    /// original relative order.
    ///
    /// # Errors
    /// Returns `DataError::PercentOutOfRange` unless `1 <= training_percent <= 100`.
    pub fn new<R: Rng>(
        data: LabelledDataSet<L>,
        training_percent: u32,
        rng: &mut R,
    ) -> Result<Self, DataError> {
        if !(1..=100).contains(&training_percent) {
            return Err(DataError::PercentOutOfRange(training_percent));
        }
        if data.is_empty() {
            return Err(DataError::Empty);
        }

        let (features, labels) = data.into_parts();
        let mut distinct_labels = labels.clone();
        distinct_labels.sort();
        distinct_labels.dedup();

        let training_count = training_count(training_percent, labels.len());
        let mut training_indices: Vec<usize> = (0..labels.len()).collect();
        let mut testing_indices = Vec::with_capacity(labels.len() - training_count);
        while training_indices.len() > training_count {
            let removed = rng.random_range(0..training_indices.len());
            testing_indices.push(training_indices.remove(removed));
        }
        testing_indices.sort_unstable();

        let training_set = select_rows(features.view(), &training_indices);
        let testing_set = select_rows(features.view(), &testing_indices);
        let training_targets = one_hot_targets(&labels, &distinct_labels, &training_indices);
        let testing_targets = one_hot_targets(&labels, &distinct_labels, &testing_indices);
        let testing_labels = testing_indices
            .iter()
            .filter_map(|&index| labels.get(index).cloned())
            .collect();

        info!(
            training = training_indices.len(),
            testing = testing_indices.len(),
            labels = distinct_labels.len(),
            "split labelled data"
        );

        Ok(Self {
            features,
            labels,
            distinct_labels,
            training_indices,
            testing_indices,
            training_set,
            training_targets,
            testing_set,
            testing_targets,
            testing_labels,
        })
    }

    /// Position of `label` in the sorted distinct labels.
    pub fn label_index(&self, label: &L) -> Option<usize> {
        self.distinct_labels.binary_search(label).ok()
    }
}

impl<L> LabelledDataSplit<L> {
    /// The full feature matrix, rows are examples.
    pub fn features(&self) -> &Matrix {
        &self.features
    }

    pub fn labels(&self) -> &[L] {
        &self.labels
    }

    /// Sorted distinct labels; index `i` is output node `i`.
    pub fn distinct_labels(&self) -> &[L] {
        &self.distinct_labels
    }

    pub fn feature_count(&self) -> usize {
        self.features.ncols()
    }

    pub fn training_indices(&self) -> &[usize] {
        &self.training_indices
    }

    pub fn testing_indices(&self) -> &[usize] {
        &self.testing_indices
    }

    pub fn training_set(&self) -> &Matrix {
        &self.training_set
    }

    pub fn training_targets(&self) -> &Matrix {
        &self.training_targets
    }

    pub fn testing_set(&self) -> &Matrix {
        &self.testing_set
    }

    pub fn testing_targets(&self) -> &Matrix {
        &self.testing_targets
    }

    /// True labels of the testing rows, in testing order.
    pub fn testing_labels(&self) -> &[L] {
        &self.testing_labels
    }
}

fn training_count(training_percent: u32, rows: usize) -> usize {
    let wanted = (f64::from(training_percent) / 100.0 * rows as f64).round() as usize;
    wanted.clamp(1, rows.max(1))
}

fn one_hot_targets<L: Ord>(labels: &[L], distinct: &[L], indices: &[usize]) -> Matrix {
    let mut targets = Matrix::zeros((indices.len(), distinct.len()));
    for (mut target, &index) in targets.rows_mut().into_iter().zip(indices) {
        if let Some(label) = labels.get(index) {
            if let Ok(hot) = distinct.binary_search(label) {
                target.assign(&one_hot(hot, distinct.len()));
            }
        }
    }
    targets
}

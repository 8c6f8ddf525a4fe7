use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use rand::Rng;

/// Dense row-major matrix of `f64` values.
pub type Matrix = Array2<f64>;

/// Dense vector of `f64` values.
pub type Vector = Array1<f64>;

/// Value held by every bias node.
pub const BIAS: f64 = 1.0;

/// Returns a copy of `matrix` with a column of [`BIAS`] values in front of column 0.
#[must_use]
pub fn prepend_bias_column(matrix: ArrayView2<f64>) -> Matrix {
    let mut biased = Matrix::from_elem((matrix.nrows(), matrix.ncols() + 1), BIAS);
    biased.slice_mut(s![.., 1..]).assign(&matrix);
    biased
}

/// View of every column of `matrix` except the leading bias column.
///
/// A matrix without columns yields an empty view.
#[must_use]
pub fn without_bias_column(matrix: ArrayView2<f64>) -> ArrayView2<f64> {
    if matrix.ncols() == 0 {
        return matrix;
    }
    matrix.slice_move(s![.., 1..])
}

/// Copy of `matrix` whose leading bias column is set to zero.
#[must_use]
pub fn with_bias_column_zeroed(matrix: ArrayView2<f64>) -> Matrix {
    let mut zeroed = matrix.to_owned();
    if zeroed.ncols() > 0 {
        zeroed.column_mut(0).fill(0.0);
    }
    zeroed
}

/// Matrix of shape `rows x cols` drawn uniformly from `[-epsilon, epsilon]`.
#[must_use]
pub fn uniform<R: Rng>(rows: usize, cols: usize, epsilon: f64, rng: &mut R) -> Matrix {
    if epsilon <= 0.0 {
        return Matrix::zeros((rows, cols));
    }
    Matrix::from_shape_fn((rows, cols), |_| rng.random_range(-epsilon..=epsilon))
}

/// Outer product `column · rowᵀ`.
#[must_use]
pub fn outer(column: ArrayView1<f64>, row: ArrayView1<f64>) -> Matrix {
    let column = column.insert_axis(Axis(1));
    let row = row.insert_axis(Axis(0));
    column.dot(&row)
}

/// New matrix holding the rows of `matrix` listed in `indices`, in that order.
#[must_use]
pub fn select_rows(matrix: ArrayView2<f64>, indices: &[usize]) -> Matrix {
    matrix.select(Axis(0), indices)
}

/// Vector of length `width` holding `1.0` at `hot` and `0.0` elsewhere.
///
/// An out of range `hot` index yields an all-zero vector.
#[must_use]
pub fn one_hot(hot: usize, width: usize) -> Vector {
    let mut encoded = Vector::zeros(width);
    if let Some(slot) = encoded.get_mut(hot) {
        *slot = 1.0;
    }
    encoded
}

/// Index of the largest value, first occurrence winning ties. `None` when empty.
#[must_use]
pub fn argmax(values: ArrayView1<f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, &value) in values.iter().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index)
}

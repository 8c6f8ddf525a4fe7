pub mod matrix;

pub use crate::matrix::{
    BIAS, Matrix, Vector, argmax, one_hot, outer, prepend_bias_column, select_rows, uniform,
    with_bias_column_zeroed, without_bias_column,
};

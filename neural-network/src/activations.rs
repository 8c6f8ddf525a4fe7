//! The sigmoid activation shared by every hidden and output node.

/// Logistic sigmoid `1 / (1 + e^-x)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sigmoid;

impl Sigmoid {
    #[inline]
    #[must_use]
    pub fn value(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    /// Evaluates the derivative from the *output* `a = value(x)` rather than from `x`.
    ///
    /// Layers keep their activations but not always their raw inputs, so the derivative is
    /// taken as `a * (1 - a)`.
    #[inline]
    #[must_use]
    pub fn derivative_from_value(a: f64) -> f64 {
        a * (1.0 - a)
    }
}

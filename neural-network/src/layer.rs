//! A single layer of the network and the numeric state it carries between passes.
//!
//! Every layer has a [`LayerKind`] fixed at construction. Input and hidden layers hold a
//! bias node at activation index 0 (always [`BIAS`]) and own the weights leading to the
//! next layer, column 0 of which is the bias column. The output layer has neither.
//!
//! Layers do not know their neighbours. The [`Network`](crate::Network) keeps them in a
//! vector and passes the neighbour in through a [`ForwardSignal`] or [`BackwardSignal`],
//! together with the one fresh input or target vector an update consumes.

use crate::activations::Sigmoid;
use crate::error::NetworkError;
use matrix::{BIAS, Matrix, Vector, outer, uniform, without_bias_column};
use ndarray::{ArrayView1, s};
use rand::Rng;

/// Role of a layer within the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Input,
    Hidden,
    Output,
}

/// What a forward update consumes.
#[derive(Debug, Clone, Copy)]
pub enum ForwardSignal<'a> {
    /// A fresh example for the input layer.
    Input(ArrayView1<'a, f64>),
    /// The already updated previous layer, for hidden and output layers.
    Previous(&'a Layer),
}

/// What a backward update consumes.
#[derive(Debug, Clone, Copy)]
pub enum BackwardSignal<'a> {
    /// A fresh target vector for the output layer.
    Target(ArrayView1<'a, f64>),
    /// The already updated next layer, for input and hidden layers.
    Next(&'a Layer),
}

impl ForwardSignal<'_> {
    fn name(&self) -> &'static str {
        match self {
            ForwardSignal::Input(_) => "input",
            ForwardSignal::Previous(_) => "previous layer",
        }
    }
}

impl BackwardSignal<'_> {
    fn name(&self) -> &'static str {
        match self {
            BackwardSignal::Target(_) => "target",
            BackwardSignal::Next(_) => "next layer",
        }
    }
}

/// Weights leading out of a layer and the deltas accumulated for them over a batch.
#[derive(Debug, Clone, PartialEq)]
struct Connection {
    weights: Matrix,
    accumulated_deltas: Matrix,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    index: usize,
    kind: LayerKind,
    node_count: usize,
    /// Includes the bias node at index 0 unless this is the output layer.
    activations: Vector,
    raw_values: Vector,
    gradients: Vector,
    /// Empty for the input layer.
    deltas: Vector,
    outgoing: Option<Connection>,
    initialized: bool,
}

impl Layer {
    /// Creates an uninitialized layer with `node_count` non-bias nodes at position `index`.
    pub fn new(index: usize, node_count: usize, kind: LayerKind) -> Self {
        let activations = match kind {
            LayerKind::Output => Vector::zeros(node_count),
            LayerKind::Input | LayerKind::Hidden => {
                let mut activations = Vector::zeros(node_count + 1);
                activations[0] = BIAS;
                activations
            }
        };
        let deltas = match kind {
            LayerKind::Input => Vector::zeros(0),
            LayerKind::Hidden | LayerKind::Output => Vector::zeros(node_count),
        };

        Self {
            index,
            kind,
            node_count,
            activations,
            raw_values: Vector::zeros(node_count),
            gradients: Vector::zeros(node_count),
            deltas,
            outgoing: None,
            initialized: false,
        }
    }

    /// Checks the neighbours this layer's kind requires and allocates its weights.
    ///
    /// Input layers need only a next layer, output layers only a previous one, hidden
    /// layers both. Weights are drawn uniformly from `[-ε, ε]` with
    /// `ε = sqrt(6 / (node_count + next.node_count))`.
    pub fn initialize<R: Rng>(
        &mut self,
        previous: Option<&Layer>,
        next: Option<&Layer>,
        rng: &mut R,
    ) -> Result<(), NetworkError> {
        let next = match (self.kind, previous, next) {
            (LayerKind::Input, None, Some(next)) | (LayerKind::Hidden, Some(_), Some(next)) => {
                Some(next)
            }
            (LayerKind::Output, Some(_), None) => None,
            _ => {
                return Err(NetworkError::Neighbours {
                    kind: self.kind,
                    index: self.index,
                });
            }
        };

        self.outgoing = next.map(|next| {
            let rows = next.node_count;
            let cols = self.node_count + 1;
            let epsilon = (6.0 / (self.node_count + next.node_count) as f64).sqrt();
            Connection {
                weights: uniform(rows, cols, epsilon, rng),
                accumulated_deltas: Matrix::zeros((rows, cols)),
            }
        });
        self.initialized = true;
        Ok(())
    }

    /// Recomputes activations and gradients from `signal`.
    ///
    /// The input layer copies the input into its non-bias activations. Hidden and output
    /// layers compute `raw = previous.weights · previous.activations` and apply the
    /// sigmoid. Gradients are always the sigmoid derivative at the new activations.
    pub fn forward_update(&mut self, signal: ForwardSignal<'_>) -> Result<(), NetworkError> {
        self.check_initialized()?;
        match (self.kind, signal) {
            (LayerKind::Input, ForwardSignal::Input(input)) => {
                self.check_len("input vector", input.len())?;
                self.node_activations_mut().assign(&input);
            }
            (LayerKind::Hidden | LayerKind::Output, ForwardSignal::Previous(previous)) => {
                let weights = previous.weights()?;
                let raw_values = weights.dot(&previous.activations);
                self.check_len("weighted input", raw_values.len())?;
                self.node_activations_mut()
                    .assign(&raw_values.mapv(Sigmoid::value));
                self.raw_values = raw_values;
            }
            (_, signal) => return Err(self.wrong_signal(signal.name())),
        }
        self.gradients = self
            .node_activations()
            .mapv(Sigmoid::derivative_from_value);
        Ok(())
    }

    /// Computes this layer's deltas and accumulates the gradient of its outgoing weights.
    ///
    /// The output layer takes the target: `deltas = activations - target`. A hidden layer
    /// takes the next layer: `deltas = (weights without bias)ᵀ · next.deltas ⊙ gradients`.
    /// Input and hidden layers then add `outer(next.deltas, activations)` to their
    /// accumulated deltas.
    pub fn backward_update(&mut self, signal: BackwardSignal<'_>) -> Result<(), NetworkError> {
        self.check_initialized()?;
        match (self.kind, signal) {
            (LayerKind::Output, BackwardSignal::Target(target)) => {
                self.check_len("target vector", target.len())?;
                self.deltas = &self.activations - &target;
                Ok(())
            }
            (LayerKind::Hidden, BackwardSignal::Next(next)) => {
                let weights = self.weights()?;
                if next.deltas.len() != weights.nrows() {
                    return Err(NetworkError::Shape {
                        what: "next layer deltas",
                        expected: weights.nrows(),
                        actual: next.deltas.len(),
                    });
                }
                let propagated = without_bias_column(weights.view()).t().dot(&next.deltas);
                self.deltas = propagated * &self.gradients;
                self.accumulate(next)
            }
            (LayerKind::Input, BackwardSignal::Next(next)) => self.accumulate(next),
            (_, signal) => Err(self.wrong_signal(signal.name())),
        }
    }

    /// Zeroes the accumulated deltas ahead of a new batch.
    pub fn reset_accumulated_deltas(&mut self) {
        if let Some(connection) = self.outgoing.as_mut() {
            connection.accumulated_deltas.fill(0.0);
        }
    }

    fn accumulate(&mut self, next: &Layer) -> Result<(), NetworkError> {
        let index = self.index;
        let increment = outer(next.deltas.view(), self.activations.view());
        let connection = self
            .outgoing
            .as_mut()
            .ok_or(NetworkError::Uninitialized { index })?;
        if connection.accumulated_deltas.dim() != increment.dim() {
            return Err(NetworkError::Shape {
                what: "next layer deltas",
                expected: connection.accumulated_deltas.nrows(),
                actual: increment.nrows(),
            });
        }
        connection.accumulated_deltas += &increment;
        Ok(())
    }

    fn check_initialized(&self) -> Result<(), NetworkError> {
        if self.initialized {
            Ok(())
        } else {
            Err(NetworkError::Uninitialized { index: self.index })
        }
    }

    fn check_len(&self, what: &'static str, actual: usize) -> Result<(), NetworkError> {
        if actual == self.node_count {
            Ok(())
        } else {
            Err(NetworkError::Shape {
                what,
                expected: self.node_count,
                actual,
            })
        }
    }

    fn wrong_signal(&self, signal: &'static str) -> NetworkError {
        NetworkError::Signal {
            kind: self.kind,
            index: self.index,
            signal,
        }
    }

    fn bias_offset(&self) -> usize {
        match self.kind {
            LayerKind::Output => 0,
            LayerKind::Input | LayerKind::Hidden => 1,
        }
    }

    fn node_activations_mut(&mut self) -> ndarray::ArrayViewMut1<'_, f64> {
        let offset = self.bias_offset();
        self.activations.slice_mut(s![offset..])
    }

    /// Activations of the non-bias nodes.
    pub fn node_activations(&self) -> ArrayView1<'_, f64> {
        self.activations.slice(s![self.bias_offset()..])
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    /// Number of non-bias nodes.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// All activations, bias node first for input and hidden layers.
    pub fn activations(&self) -> &Vector {
        &self.activations
    }

    pub fn raw_values(&self) -> &Vector {
        &self.raw_values
    }

    pub fn gradients(&self) -> &Vector {
        &self.gradients
    }

    pub fn deltas(&self) -> &Vector {
        &self.deltas
    }

    /// Outgoing weights, one row per node of the next layer and a leading bias column.
    ///
    /// # Errors
    /// `NetworkError::Uninitialized` for output layers and layers not yet initialized.
    pub fn weights(&self) -> Result<&Matrix, NetworkError> {
        self.outgoing
            .as_ref()
            .map(|connection| &connection.weights)
            .ok_or(NetworkError::Uninitialized { index: self.index })
    }

    pub(crate) fn weights_mut(&mut self) -> Result<&mut Matrix, NetworkError> {
        let index = self.index;
        self.outgoing
            .as_mut()
            .map(|connection| &mut connection.weights)
            .ok_or(NetworkError::Uninitialized { index })
    }

    /// Deltas accumulated since the last [`reset_accumulated_deltas`](Self::reset_accumulated_deltas).
    pub fn accumulated_deltas(&self) -> Result<&Matrix, NetworkError> {
        self.outgoing
            .as_ref()
            .map(|connection| &connection.accumulated_deltas)
            .ok_or(NetworkError::Uninitialized { index: self.index })
    }
}

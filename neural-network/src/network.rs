use crate::activations::Sigmoid;
use crate::error::{ConfigError, NetworkError};
use crate::layer::{BackwardSignal, ForwardSignal, Layer, LayerKind};
use crate::training_config::TrainingConfig;
use crate::training_history::{IterationReport, TrainingHistory, TrainingState};
use labelled_data::LabelledDataSplit;
use matrix::{Matrix, argmax, prepend_bias_column, with_bias_column_zeroed, without_bias_column};
use ndarray::{ArrayView1, ArrayView2, s};
use rand::Rng;
use tracing::{debug, info, warn};

/// Step used for the central-difference gradient estimate.
pub const GRADIENT_CHECK_EPSILON: f64 = 1e-3;
/// Largest fractional difference between analytic and numerical gradients that passes.
pub const GRADIENT_CHECK_TOLERANCE: f64 = 0.01;
/// Gradients smaller than this are compared in absolute rather than relative terms.
const GRADIENT_CHECK_FLOOR: f64 = 1e-4;
/// Predictions are clamped this far away from 0 and 1 before taking logarithms.
const PROBABILITY_FLOOR: f64 = 1e-15;

/// A fully connected sigmoid network trained by batch gradient descent on a labelled
/// data split.
///
/// The network owns its configuration, the data split and one [`Layer`] per entry of
/// `layer_node_counts`. Output node `i` stands for the `i`-th of the split's sorted
/// distinct labels.
///
/// # Examples
///
/// ```
/// use labelled_data::{LabelledDataSet, LabelledDataSplit};
/// use matrix::Matrix;
/// use neural_network::{Network, TrainingConfigBuilder};
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
///
/// let mut rng = StdRng::seed_from_u64(7);
/// let features =
///     Matrix::from_shape_fn((20, 2), |(row, col)| if row % 2 == col { 3.0 } else { 0.0 });
/// let labels = (0..20).map(|row| row % 2).collect();
/// let data = LabelledDataSet::new(features, labels).unwrap();
/// let split = LabelledDataSplit::new(data, 80, &mut rng).unwrap();
///
/// let config = TrainingConfigBuilder::default()
///     .layer_node_counts(vec![2, 3, 2])
///     .build()
///     .unwrap();
/// let mut network = Network::new(config, split, &mut rng).unwrap();
/// let history = network.train().unwrap();
///
/// assert!(history.iterations() <= 30);
/// assert_eq!(network.predict_all().unwrap().len(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct Network<L> {
    config: TrainingConfig,
    data: LabelledDataSplit<L>,
    layers: Vec<Layer>,
    /// Batch forward pass over the training set, bias column included. `None` once the
    /// weights have changed.
    training_output: Option<Matrix>,
    /// Smallest `|learning_rate * gradient / weight|` per weighted layer of the last update.
    weight_fractional_changes: Vec<f64>,
}

impl<L: Clone + PartialEq> Network<L> {
    /// Builds the layers described by `config` and initializes them in order.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] (wrapped in [`NetworkError::Config`]) when the input
    /// layer width differs from the number of feature columns or the output layer width
    /// differs from the number of distinct labels. Hidden layers narrower than the output
    /// layer are allowed but logged as a warning.
    pub fn new<R: Rng>(
        config: TrainingConfig,
        data: LabelledDataSplit<L>,
        rng: &mut R,
    ) -> Result<Self, NetworkError> {
        config.validate()?;
        let counts = config.layer_node_counts();
        let (Some(&input_nodes), Some(&output_nodes)) = (counts.first(), counts.last()) else {
            return Err(ConfigError::TooFewLayers(counts.len()).into());
        };

        if input_nodes != data.feature_count() {
            return Err(ConfigError::InputWidth {
                nodes: input_nodes,
                columns: data.feature_count(),
            }
            .into());
        }
        let last = counts.len() - 1;
        for (index, &nodes) in counts.iter().enumerate().take(last).skip(1) {
            if nodes < output_nodes {
                warn!(
                    layer = index,
                    nodes,
                    output_nodes,
                    "hidden layer has fewer nodes than the output layer"
                );
            }
        }
        if output_nodes != data.distinct_labels().len() {
            return Err(ConfigError::OutputWidth {
                nodes: output_nodes,
                labels: data.distinct_labels().len(),
            }
            .into());
        }

        let mut layers: Vec<Layer> = counts
            .iter()
            .enumerate()
            .map(|(index, &nodes)| {
                let kind = match index {
                    0 => LayerKind::Input,
                    index if index == last => LayerKind::Output,
                    _ => LayerKind::Hidden,
                };
                Layer::new(index, nodes, kind)
            })
            .collect();
        for index in 0..layers.len() {
            let (before, rest) = layers.split_at_mut(index);
            if let Some((layer, after)) = rest.split_first_mut() {
                layer.initialize(before.last(), after.first(), rng)?;
            }
        }
        info!(layers = ?counts, "initialized network");

        Ok(Self {
            config,
            data,
            layers,
            training_output: None,
            weight_fractional_changes: Vec::new(),
        })
    }

    /// Runs a single example through every layer, input layer first.
    pub fn forward_propagate(&mut self, input: ArrayView1<'_, f64>) -> Result<(), NetworkError> {
        propagate_forward(&mut self.layers, input)
    }

    /// Propagates the error of the last forward pass back from the output layer,
    /// accumulating the weight deltas of every weighted layer.
    pub fn back_propagate(&mut self, target: ArrayView1<'_, f64>) -> Result<(), NetworkError> {
        propagate_backward(&mut self.layers, target)
    }

    /// Runs every row of `dataset` through the network at once.
    ///
    /// Returns one row per example: a leading bias column followed by the output layer
    /// activations. The layers' per-example state is left untouched.
    ///
    /// # Errors
    ///
    /// `NetworkError::Shape` when `dataset` does not have one column per input node.
    pub fn forward_propagate_batch(
        &self,
        dataset: ArrayView2<'_, f64>,
    ) -> Result<Matrix, NetworkError> {
        let expected = self.input_node_count();
        if dataset.ncols() != expected {
            return Err(NetworkError::Shape {
                what: "data set row",
                expected,
                actual: dataset.ncols(),
            });
        }

        let mut activations = prepend_bias_column(dataset);
        for layer in self.weighted_layers() {
            let raw_values = activations.dot(&layer.weights()?.t());
            activations = prepend_bias_column(raw_values.mapv(Sigmoid::value).view());
        }
        Ok(activations)
    }

    /// Regularized cross-entropy cost over the training set.
    ///
    /// `J = -1/m Σ [y ln ŷ + (1 - y) ln(1 - ŷ)] + λ/(2m) Σ w²`, where the last sum skips
    /// every bias weight. The batch forward pass behind it is cached until the weights
    /// change.
    pub fn cost(&mut self) -> Result<f64, NetworkError> {
        self.refresh_training_output()?;
        self.training_output().map(|output| self.cost_of(output))
    }

    /// Computes the training set forward pass unless the cached one is still valid.
    pub fn refresh_training_output(&mut self) -> Result<&Matrix, NetworkError> {
        let output = match self.training_output.take() {
            Some(output) => output,
            None => self.forward_propagate_batch(self.data.training_set().view())?,
        };
        Ok(&*self.training_output.insert(output))
    }

    /// The cached training set forward pass.
    ///
    /// # Errors
    ///
    /// `NetworkError::StaleForwardPass` when the weights changed since it was computed.
    pub fn training_output(&self) -> Result<&Matrix, NetworkError> {
        self.training_output
            .as_ref()
            .ok_or(NetworkError::StaleForwardPass)
    }

    fn cost_of(&self, output: &Matrix) -> f64 {
        let targets = self.data.training_targets();
        let examples = targets.nrows() as f64;
        let predictions = without_bias_column(output.view());

        let cross_entropy: f64 = targets
            .iter()
            .zip(predictions.iter())
            .map(|(&y, &p)| {
                let p = p.clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR);
                -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
            })
            .sum();
        let squared_weights: f64 = self
            .weighted_layers()
            .iter()
            .filter_map(|layer| layer.weights().ok())
            .map(|weights| {
                without_bias_column(weights.view())
                    .iter()
                    .map(|w| w * w)
                    .sum::<f64>()
            })
            .sum();

        cross_entropy / examples
            + self.config.regularization_constant() / (2.0 * examples) * squared_weights
    }

    fn evaluate_training_cost(&self) -> Result<f64, NetworkError> {
        let output = self.forward_propagate_batch(self.data.training_set().view())?;
        Ok(self.cost_of(&output))
    }

    /// Back-propagates every training example and returns one gradient matrix per
    /// weighted layer: `accumulated / m + λ/m · weights`, with the bias column left
    /// unregularized.
    pub fn find_weight_gradients(&mut self) -> Result<Vec<Matrix>, NetworkError> {
        let Self { data, layers, .. } = &mut *self;
        for layer in layers.iter_mut() {
            layer.reset_accumulated_deltas();
        }
        for (input, target) in data
            .training_set()
            .rows()
            .into_iter()
            .zip(data.training_targets().rows())
        {
            propagate_forward(layers, input)?;
            propagate_backward(layers, target)?;
        }

        let examples = self.data.training_set().nrows() as f64;
        let lambda = self.config.regularization_constant();
        self.weighted_layers()
            .iter()
            .map(|layer| {
                let accumulated = layer.accumulated_deltas()?;
                let weights = with_bias_column_zeroed(layer.weights()?.view());
                Ok(accumulated / examples + weights * (lambda / examples))
            })
            .collect()
    }

    /// Compares `analytic` gradients against central differences of the cost, using
    /// [`GRADIENT_CHECK_EPSILON`]. Returns the largest fractional difference found.
    pub fn check_weight_gradients(&mut self, analytic: &[Matrix]) -> Result<f64, NetworkError> {
        self.check_weight_gradients_with(analytic, GRADIENT_CHECK_EPSILON)
    }

    /// Like [`check_weight_gradients`](Self::check_weight_gradients) with an explicit
    /// perturbation `epsilon`.
    ///
    /// Every non-bias weight is moved by `±epsilon` in turn and restored afterwards, so the
    /// weights and the cached forward pass are the same before and after the call.
    ///
    /// # Errors
    ///
    /// `NetworkError::GradientCheck` for the first weight whose fractional difference
    /// exceeds [`GRADIENT_CHECK_TOLERANCE`].
    pub fn check_weight_gradients_with(
        &mut self,
        analytic: &[Matrix],
        epsilon: f64,
    ) -> Result<f64, NetworkError> {
        self.check_gradient_shapes(analytic)?;

        let mut worst: f64 = 0.0;
        for (layer, gradient) in analytic.iter().enumerate() {
            for ((row, col), &analytic_value) in gradient.indexed_iter() {
                if col == 0 {
                    continue;
                }
                let numerical = self.numerical_gradient(layer, row, col, epsilon)?;
                let difference = fractional_difference(analytic_value, numerical);
                if difference > GRADIENT_CHECK_TOLERANCE {
                    return Err(NetworkError::GradientCheck {
                        layer,
                        row,
                        col,
                        analytic: analytic_value,
                        numerical,
                        difference,
                    });
                }
                worst = worst.max(difference);
            }
        }
        info!(worst, "gradient check passed");
        Ok(worst)
    }

    fn numerical_gradient(
        &mut self,
        layer: usize,
        row: usize,
        col: usize,
        epsilon: f64,
    ) -> Result<f64, NetworkError> {
        let original = *self.weight_mut(layer, row, col)?;

        *self.weight_mut(layer, row, col)? = original + epsilon;
        let plus = self.evaluate_training_cost();
        *self.weight_mut(layer, row, col)? = original - epsilon;
        let minus = self.evaluate_training_cost();
        *self.weight_mut(layer, row, col)? = original;

        Ok((plus? - minus?) / (2.0 * epsilon))
    }

    fn weight_mut(&mut self, layer: usize, row: usize, col: usize) -> Result<&mut f64, NetworkError> {
        let weights = self
            .layers
            .get_mut(layer)
            .ok_or(NetworkError::Uninitialized { index: layer })?
            .weights_mut()?;
        let (rows, cols) = weights.dim();
        weights.get_mut((row, col)).ok_or(NetworkError::Shape {
            what: "weight index",
            expected: rows * cols,
            actual: row * cols + col,
        })
    }

    fn check_gradient_shapes(&self, gradients: &[Matrix]) -> Result<(), NetworkError> {
        let layers = self.weighted_layers();
        if gradients.len() != layers.len() {
            return Err(NetworkError::Shape {
                what: "gradient list",
                expected: layers.len(),
                actual: gradients.len(),
            });
        }
        for (layer, gradient) in layers.iter().zip(gradients) {
            let weights = layer.weights()?;
            if weights.dim() != gradient.dim() {
                return Err(NetworkError::Shape {
                    what: "gradient matrix",
                    expected: weights.len(),
                    actual: gradient.len(),
                });
            }
        }
        Ok(())
    }

    /// Takes one gradient descent step: `w -= learning_rate * gradient` for every non-bias
    /// weight. Bias weights keep their initial values.
    ///
    /// Records the smallest fractional weight change of each layer and invalidates the
    /// cached forward pass.
    pub fn update_weights(&mut self, gradients: &[Matrix]) -> Result<(), NetworkError> {
        self.check_gradient_shapes(gradients)?;

        let learning_rate = self.config.learning_rate();
        let mut changes = Vec::with_capacity(gradients.len());
        for (layer, gradient) in self.weighted_layers_mut().iter_mut().zip(gradients) {
            let step = without_bias_column(gradient.view()).mapv(|g| learning_rate * g);
            let mut node_weights = layer.weights_mut()?.slice_mut(s![.., 1..]);
            let smallest = step
                .iter()
                .zip(node_weights.iter())
                .map(|(s, w)| (s / w).abs())
                .fold(f64::INFINITY, f64::min);
            node_weights -= &step;
            changes.push(smallest);
        }

        self.weight_fractional_changes = changes;
        self.training_output = None;
        Ok(())
    }

    /// Smallest fractional weight change of the last [`update_weights`](Self::update_weights).
    pub fn min_weight_fractional_change(&self) -> Option<f64> {
        self.weight_fractional_changes
            .iter()
            .copied()
            .reduce(f64::min)
    }

    /// Trains until convergence or `max_iterations`, whichever comes first.
    pub fn train(&mut self) -> Result<TrainingHistory, NetworkError> {
        self.train_with(|_| {})
    }

    /// Trains like [`train`](Self::train), calling `observe` after every iteration.
    ///
    /// Each iteration finds the gradients, verifies them numerically when the zero-based
    /// iteration index is listed in `iterations_to_check_gradient`, updates the weights and
    /// records the new cost. Convergence is tested before the iteration budget.
    pub fn train_with<F>(&mut self, mut observe: F) -> Result<TrainingHistory, NetworkError>
    where
        F: FnMut(&IterationReport),
    {
        let mut history = TrainingHistory::new();
        let mut state = TrainingState::Running;

        while state == TrainingState::Running {
            let iteration = history.iterations();
            let gradients = self.find_weight_gradients()?;
            if self.config.checks_gradient_at(iteration) {
                self.check_weight_gradients(&gradients)?;
            }
            self.update_weights(&gradients)?;

            let cost = self.cost()?;
            history.record(cost);
            state = self.training_state(&history);

            let report = IterationReport {
                iteration: history.iterations(),
                cost,
                min_weight_fractional_change: self.min_weight_fractional_change(),
                state,
            };
            debug!(
                iteration = report.iteration,
                cost,
                min_weight_fractional_change = ?report.min_weight_fractional_change,
                ?state,
                "finished iteration"
            );
            observe(&report);
        }

        history.finish(state);
        history.log_summary();
        Ok(history)
    }

    fn training_state(&self, history: &TrainingHistory) -> TrainingState {
        let converged = if self.config.use_cost_func_convergence() {
            history
                .cost_fractional_change()
                .is_some_and(|change| change < self.config.cost_func_frac_change_threshold())
        } else {
            self.min_weight_fractional_change()
                .is_some_and(|change| change < self.config.weight_grad_frac_change_threshold())
        };

        if converged {
            TrainingState::Converged
        } else if history.iterations() >= self.config.max_iterations() {
            TrainingState::MaxIterationsReached
        } else {
            TrainingState::Running
        }
    }

    /// Predicts a label for every row of `dataset`: the label of the most active output
    /// node, the lowest index winning ties.
    pub fn predict(&self, dataset: ArrayView2<'_, f64>) -> Result<Vec<L>, NetworkError> {
        let output = self.forward_propagate_batch(dataset)?;
        let labels = self.data.distinct_labels();
        without_bias_column(output.view())
            .rows()
            .into_iter()
            .map(|row| {
                argmax(row)
                    .and_then(|index| labels.get(index))
                    .cloned()
                    .ok_or(NetworkError::Shape {
                        what: "output layer",
                        expected: labels.len(),
                        actual: row.len(),
                    })
            })
            .collect()
    }

    /// Predicts a label for every testing example, in testing order.
    pub fn predict_all(&self) -> Result<Vec<L>, NetworkError> {
        self.predict(self.data.testing_set().view())
    }

    /// Fraction of testing examples whose prediction equals their label.
    ///
    /// # Errors
    ///
    /// `NetworkError::EmptyTestingSet` when every example was used for training.
    pub fn accuracy(&self) -> Result<f64, NetworkError> {
        let labels = self.data.testing_labels();
        if labels.is_empty() {
            return Err(NetworkError::EmptyTestingSet);
        }

        let predictions = self.predict_all()?;
        if predictions.len() != labels.len() {
            return Err(NetworkError::PredictionCount {
                predictions: predictions.len(),
                labels: labels.len(),
            });
        }
        let correct = predictions
            .iter()
            .zip(labels)
            .filter(|(prediction, label)| prediction == label)
            .count();
        Ok(correct as f64 / labels.len() as f64)
    }
}

impl<L> Network<L> {
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn data(&self) -> &LabelledDataSplit<L> {
        &self.data
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Output activations of the last single-example forward pass.
    pub fn output(&self) -> Option<ArrayView1<'_, f64>> {
        self.layers.last().map(Layer::node_activations)
    }

    /// Weight matrices of the input and hidden layers, input layer first.
    pub fn weights(&self) -> Result<Vec<&Matrix>, NetworkError> {
        self.weighted_layers().iter().map(Layer::weights).collect()
    }

    fn input_node_count(&self) -> usize {
        self.layers.first().map_or(0, Layer::node_count)
    }

    /// Every layer except the output layer.
    fn weighted_layers(&self) -> &[Layer] {
        self.layers
            .split_last()
            .map(|(_, rest)| rest)
            .unwrap_or_default()
    }

    fn weighted_layers_mut(&mut self) -> &mut [Layer] {
        self.layers
            .split_last_mut()
            .map(|(_, rest)| rest)
            .unwrap_or_default()
    }
}

fn propagate_forward(layers: &mut [Layer], input: ArrayView1<'_, f64>) -> Result<(), NetworkError> {
    for index in 0..layers.len() {
        let (before, rest) = layers.split_at_mut(index);
        let Some(layer) = rest.first_mut() else {
            break;
        };
        let signal = match before.last() {
            Some(previous) => ForwardSignal::Previous(previous),
            None => ForwardSignal::Input(input.reborrow()),
        };
        layer.forward_update(signal)?;
    }
    Ok(())
}

fn propagate_backward(layers: &mut [Layer], target: ArrayView1<'_, f64>) -> Result<(), NetworkError> {
    for index in (0..layers.len()).rev() {
        let (before, after) = layers.split_at_mut(index + 1);
        let Some(layer) = before.last_mut() else {
            break;
        };
        let signal = match after.first() {
            Some(next) => BackwardSignal::Next(next),
            None => BackwardSignal::Target(target.reborrow()),
        };
        layer.backward_update(signal)?;
    }
    Ok(())
}

fn fractional_difference(analytic: f64, numerical: f64) -> f64 {
    let scale = analytic.abs().max(numerical.abs()).max(GRADIENT_CHECK_FLOOR);
    (analytic - numerical).abs() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training_config::TrainingConfigBuilder;
    use approx::assert_relative_eq;
    use labelled_data::LabelledDataSet;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::error::Error;
    use std::io;
    use std::sync::{Arc, Mutex};

    type TestResult = Result<(), Box<dyn Error>>;

    /// Collects formatted log output in memory.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .map_err(|_| io::Error::other("log buffer poisoned"))?
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> Result<String, Box<dyn Error>> {
            let bytes = self.0.lock().map_err(|_| "log buffer poisoned")?.clone();
            Ok(String::from_utf8(bytes)?)
        }
    }

    /// `rows` examples of uniformly random features labelled `row % classes`.
    fn toy_split(
        rows: usize,
        features: usize,
        classes: usize,
        percent: u32,
        seed: u64,
    ) -> Result<LabelledDataSplit<usize>, Box<dyn Error>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let matrix = Matrix::from_shape_fn((rows, features), |_| rng.random_range(0.0..1.0));
        let labels = (0..rows).map(|row| row % classes).collect();
        let data = LabelledDataSet::new(matrix, labels)?;
        Ok(LabelledDataSplit::new(data, percent, &mut rng)?)
    }

    fn config(layers: &[usize]) -> TrainingConfigBuilder {
        let mut builder = TrainingConfigBuilder::default();
        builder.layer_node_counts(layers.to_vec());
        builder
    }

    fn network(builder: &TrainingConfigBuilder, seed: u64) -> Result<Network<usize>, Box<dyn Error>> {
        let config = builder.build()?;
        let split = toy_split(10, config.layer_node_counts()[0], 2, 80, seed)?;
        Ok(Network::new(config, split, &mut StdRng::seed_from_u64(seed))?)
    }

    #[test]
    fn test_rejects_input_width_mismatch() -> TestResult {
        let split = toy_split(10, 3, 2, 80, 1)?;
        let result = Network::new(
            config(&[4, 4, 2]).build()?,
            split,
            &mut StdRng::seed_from_u64(1),
        );
        assert!(matches!(
            result,
            Err(NetworkError::Config(ConfigError::InputWidth {
                nodes: 4,
                columns: 3
            }))
        ));
        Ok(())
    }

    #[test]
    fn test_rejects_output_width_mismatch() -> TestResult {
        let split = toy_split(10, 3, 2, 80, 1)?;
        let result = Network::new(
            config(&[3, 4, 3]).build()?,
            split,
            &mut StdRng::seed_from_u64(1),
        );
        assert!(matches!(
            result,
            Err(NetworkError::Config(ConfigError::OutputWidth {
                nodes: 3,
                labels: 2
            }))
        ));
        Ok(())
    }

    #[test]
    fn test_narrow_hidden_layer_is_allowed_with_warning() -> TestResult {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let narrow = tracing::subscriber::with_default(subscriber, || {
            network(&config(&[3, 1, 2]), 2)
        })?;

        assert_eq!(narrow.layers().len(), 3);
        let output = logs.contents()?;
        assert!(output.contains("WARN"), "{output}");
        assert!(output.contains("hidden layer has fewer nodes than the output layer"));
        Ok(())
    }

    #[test]
    fn test_wide_hidden_layer_logs_no_warning() -> TestResult {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || network(&config(&[3, 4, 2]), 2))?;

        assert!(!logs.contents()?.contains("WARN"));
        Ok(())
    }

    #[test]
    fn test_layers_are_built_and_initialized() -> TestResult {
        let network = network(&config(&[3, 4, 2]), 3)?;

        let kinds: Vec<LayerKind> = network.layers().iter().map(Layer::kind).collect();
        assert_eq!(
            kinds,
            vec![LayerKind::Input, LayerKind::Hidden, LayerKind::Output]
        );
        assert!(network.layers().iter().all(Layer::is_initialized));

        let dims: Vec<(usize, usize)> = network.weights()?.iter().map(|w| w.dim()).collect();
        assert_eq!(dims, vec![(4, 4), (2, 5)]);
        Ok(())
    }

    #[test]
    fn test_batch_forward_matches_single_examples() -> TestResult {
        let mut network = network(&config(&[3, 4, 2]), 4)?;
        let training_set = network.data().training_set().clone();
        let batch = network.forward_propagate_batch(training_set.view())?;

        assert_eq!(batch.dim(), (training_set.nrows(), 3));
        for (example, row) in training_set.rows().into_iter().zip(batch.rows()) {
            network.forward_propagate(example)?;
            let output = network.output().ok_or("no output layer")?;
            assert_eq!(row[0], 1.0);
            for (a, b) in output.iter().zip(row.iter().skip(1)) {
                assert_relative_eq!(*a, *b, epsilon = 1e-12);
            }
        }
        Ok(())
    }

    #[test]
    fn test_batch_forward_rejects_wrong_width() -> TestResult {
        let network = network(&config(&[3, 4, 2]), 4)?;
        let result = network.forward_propagate_batch(Matrix::zeros((2, 4)).view());
        assert!(matches!(
            result,
            Err(NetworkError::Shape {
                expected: 3,
                actual: 4,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn test_cost_caches_training_output() -> TestResult {
        let mut network = network(&config(&[3, 4, 2]), 5)?;
        assert!(matches!(
            network.training_output(),
            Err(NetworkError::StaleForwardPass)
        ));

        let cost = network.cost()?;
        assert!(cost > 0.0);
        assert!(network.training_output().is_ok());
        assert_eq!(network.cost()?, cost);
        Ok(())
    }

    #[test]
    fn test_regularization_skips_bias_weights() -> TestResult {
        let mut plain = network(&config(&[3, 4, 2]).regularization_constant(0.0), 6)?;
        let mut regularized = network(&config(&[3, 4, 2]).regularization_constant(2.0), 6)?;

        let squared: f64 = regularized
            .weights()?
            .iter()
            .map(|w| without_bias_column(w.view()).iter().map(|x| x * x).sum::<f64>())
            .sum();
        let examples = regularized.data().training_set().nrows() as f64;

        let difference = regularized.cost()? - plain.cost()?;
        assert_relative_eq!(difference, 2.0 / (2.0 * examples) * squared, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_gradients_match_numerical_estimate() -> TestResult {
        let mut network = network(&config(&[3, 4, 2]).regularization_constant(0.5), 7)?;
        let gradients = network.find_weight_gradients()?;

        let worst = network.check_weight_gradients(&gradients)?;
        assert!(worst < GRADIENT_CHECK_TOLERANCE);
        Ok(())
    }

    #[test]
    fn test_gradient_check_without_hidden_layers() -> TestResult {
        let mut network = network(&config(&[3, 2]).regularization_constant(0.3), 8)?;
        let gradients = network.find_weight_gradients()?;

        assert_eq!(gradients.len(), 1);
        assert!(network.check_weight_gradients(&gradients).is_ok());
        Ok(())
    }

    #[test]
    fn test_gradient_check_rejects_wrong_gradients() -> TestResult {
        let mut network = network(&config(&[3, 4, 2]).regularization_constant(0.5), 7)?;
        let mut gradients = network.find_weight_gradients()?;
        gradients[0][[0, 1]] += 1.0;
        let before: Vec<Matrix> = network.weights()?.into_iter().cloned().collect();

        let result = network.check_weight_gradients(&gradients);
        assert!(matches!(
            result,
            Err(NetworkError::GradientCheck {
                layer: 0,
                row: 0,
                col: 1,
                ..
            })
        ));

        let after: Vec<Matrix> = network.weights()?.into_iter().cloned().collect();
        assert_eq!(before, after);
        Ok(())
    }

    #[test]
    fn test_bias_gradients_are_not_regularized() -> TestResult {
        let mut network = network(&config(&[3, 4, 2]).regularization_constant(5.0), 9)?;
        let gradients = network.find_weight_gradients()?;
        let examples = network.data().training_set().nrows() as f64;

        for (layer, gradient) in network.layers().iter().zip(&gradients) {
            let accumulated = layer.accumulated_deltas()?;
            let weights = layer.weights()?;
            for ((row, col), &value) in gradient.indexed_iter() {
                let mut expected = accumulated[[row, col]] / examples;
                if col > 0 {
                    expected += 5.0 / examples * weights[[row, col]];
                }
                assert_relative_eq!(value, expected, epsilon = 1e-12);
            }
        }
        Ok(())
    }

    #[test]
    fn test_update_weights_skips_bias_column() -> TestResult {
        let mut network = network(&config(&[3, 4, 2]).learning_rate(0.5), 10)?;
        network.cost()?;
        let before: Vec<Matrix> = network.weights()?.into_iter().cloned().collect();
        let gradients = network.find_weight_gradients()?;

        network.update_weights(&gradients)?;

        assert!(matches!(
            network.training_output(),
            Err(NetworkError::StaleForwardPass)
        ));
        let mut smallest = f64::INFINITY;
        for ((old, new), gradient) in before.iter().zip(network.weights()?).zip(&gradients) {
            assert_eq!(old.column(0), new.column(0));
            for ((row, col), &weight) in new.indexed_iter().filter(|((_, col), _)| *col > 0) {
                let step = 0.5 * gradient[[row, col]];
                assert_relative_eq!(weight, old[[row, col]] - step, epsilon = 1e-12);
                smallest = smallest.min((step / old[[row, col]]).abs());
            }
        }
        assert_eq!(network.min_weight_fractional_change(), Some(smallest));
        Ok(())
    }

    #[test]
    fn test_cost_decreases_with_small_steps() -> TestResult {
        let mut network = network(&config(&[3, 4, 2]).learning_rate(0.1), 11)?;
        let mut previous = network.cost()?;

        for _ in 0..5 {
            let gradients = network.find_weight_gradients()?;
            network.update_weights(&gradients)?;
            let cost = network.cost()?;
            assert!(cost <= previous + 1e-12, "{cost} > {previous}");
            previous = cost;
        }
        Ok(())
    }

    #[test]
    fn test_training_stops_at_max_iterations() -> TestResult {
        let builder = config(&[3, 4, 2])
            .cost_func_frac_change_threshold(0.0)
            .max_iterations(7_usize)
            .clone();
        let mut network = network(&builder, 12)?;
        let mut reports = Vec::new();

        let history = network.train_with(|report| reports.push(*report))?;

        assert_eq!(history.state(), TrainingState::MaxIterationsReached);
        assert_eq!(history.iterations(), 7);
        assert_eq!(reports.len(), 7);
        assert_eq!(reports[6].state, TrainingState::MaxIterationsReached);
        assert!(reports[..6].iter().all(|r| r.state == TrainingState::Running));
        assert_eq!(
            reports.iter().map(|r| r.cost).collect::<Vec<_>>(),
            history.costs()
        );
        Ok(())
    }

    #[test]
    fn test_training_converges_on_cost_change() -> TestResult {
        let mut network = network(&config(&[3, 4, 2]).cost_func_frac_change_threshold(1.0), 13)?;

        let history = network.train()?;

        assert!(history.converged());
        assert_eq!(history.iterations(), 2);
        Ok(())
    }

    #[test]
    fn test_training_converges_on_weight_change() -> TestResult {
        let builder = config(&[3, 4, 2])
            .use_cost_func_convergence(false)
            .weight_grad_frac_change_threshold(1e6)
            .clone();
        let mut network = network(&builder, 14)?;

        let history = network.train()?;

        assert!(history.converged());
        assert_eq!(history.iterations(), 1);
        Ok(())
    }

    #[test]
    fn test_training_checks_gradients_when_asked() -> TestResult {
        let builder = config(&[3, 4, 2])
            .cost_func_frac_change_threshold(0.0)
            .max_iterations(3_usize)
            .iterations_to_check_gradient([0, 2])
            .clone();
        let mut network = network(&builder, 15)?;

        let history = network.train()?;

        assert_eq!(history.iterations(), 3);
        Ok(())
    }

    #[test]
    fn test_predictions_and_accuracy() -> TestResult {
        let mut network = network(&config(&[3, 4, 2]), 16)?;
        network.train()?;

        let predictions = network.predict_all()?;
        let labels = network.data().testing_labels();
        assert_eq!(predictions.len(), labels.len());
        assert!(predictions.iter().all(|p| *p < 2));

        let correct = predictions.iter().zip(labels).filter(|(p, l)| p == l).count();
        assert_relative_eq!(network.accuracy()?, correct as f64 / labels.len() as f64);
        Ok(())
    }

    #[test]
    fn test_accuracy_needs_testing_examples() -> TestResult {
        let config = config(&[3, 4, 2]).build()?;
        let split = toy_split(10, 3, 2, 100, 17)?;
        let network = Network::new(config, split, &mut StdRng::seed_from_u64(17))?;

        assert!(matches!(
            network.accuracy(),
            Err(NetworkError::EmptyTestingSet)
        ));
        Ok(())
    }

    #[test]
    fn test_fractional_difference() {
        assert_relative_eq!(fractional_difference(2.0, 1.0), 0.5);
        assert_relative_eq!(fractional_difference(1e-7, 0.0), 1e-3);
        assert_eq!(fractional_difference(0.0, 0.0), 0.0);
    }
}

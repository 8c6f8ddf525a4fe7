//! Training sessions for the classifier.
//!
//! A [`Trainer`] wires a labelled data set, a [`TrainingConfig`] and a random source into
//! a train/test split and a network, then runs gradient descent with an optional progress
//! bar and summarizes the result in a [`TrainingReport`].

use crate::error::TrainingError;
use crate::report::TrainingReport;
use indicatif::{ProgressBar, ProgressStyle};
use labelled_data::{LabelledDataSet, LabelledDataSplit};
use neural_network::{Network, NetworkError, TrainingConfig, TrainingState};
use rand::Rng;
use tracing::{info, warn};

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>5}/{len:5} Iteration {msg}";

/// Trainer manages a single training session.
pub struct Trainer<L> {
    network: Network<L>,
    show_progress: bool,
}

impl<L: Ord + Clone> Trainer<L> {
    /// Splits `data` by the configured training percentage and builds the network.
    ///
    /// `rng` drives both the split and the weight initialization, so a seeded generator
    /// makes the whole session reproducible.
    ///
    /// # Errors
    /// A [`TrainingError`] when the split or the network cannot be built from `config`.
    pub fn new<R: Rng>(
        config: TrainingConfig,
        data: LabelledDataSet<L>,
        rng: &mut R,
    ) -> Result<Self, TrainingError> {
        let split = LabelledDataSplit::new(data, config.training_examples_percent(), rng)?;
        let network = Network::new(config, split, rng)?;
        Ok(Self {
            network,
            show_progress: true,
        })
    }

    /// Shows or hides the progress bar. Shown by default.
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn network(&self) -> &Network<L> {
        &self.network
    }

    pub fn into_network(self) -> Network<L> {
        self.network
    }

    /// Trains the network and evaluates it on the testing examples.
    ///
    /// Reaching the iteration limit is not an error; it is reported as the termination
    /// mode. A split without testing examples yields a report without accuracy.
    pub fn run(&mut self) -> Result<TrainingReport, TrainingError> {
        let config = self.network.config();
        let progress = if self.show_progress {
            ProgressBar::new(config.max_iterations() as u64)
        } else {
            ProgressBar::hidden()
        };
        progress.set_style(create_progress_style(PROGRESS_TEMPLATE)?);

        info!(
            layers = ?config.layer_node_counts(),
            learning_rate = config.learning_rate(),
            max_iterations = config.max_iterations(),
            "starting training"
        );
        let history = self.network.train_with(|report| {
            progress.set_position(report.iteration as u64);
            progress.set_message(format!("- Cost: {:.6}", report.cost));
        })?;

        match history.state() {
            TrainingState::Converged => progress.finish_with_message("- Converged"),
            _ => progress.finish_with_message("- Iteration limit reached"),
        }

        let accuracy = match self.network.accuracy() {
            Ok(accuracy) => {
                info!(accuracy, "evaluated testing examples");
                Some(accuracy)
            }
            Err(NetworkError::EmptyTestingSet) => {
                warn!("no testing examples, skipping accuracy");
                None
            }
            Err(error) => return Err(error.into()),
        };

        let data = self.network.data();

        Ok(TrainingReport {
            layer_node_counts: self.network.config().layer_node_counts().to_vec(),
            training_examples: data.training_indices().len(),
            testing_examples: data.testing_indices().len(),
            iterations: history.iterations(),
            termination: history.state(),
            costs: history.costs().to_vec(),
            accuracy,
        })
    }
}

/// Creates a progress bar style with the specified template.
fn create_progress_style(template: &str) -> Result<ProgressStyle, TrainingError> {
    Ok(ProgressStyle::with_template(template)?.progress_chars("##-"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelled_data::DataError;
    use matrix::Matrix;
    use neural_network::{ConfigError, TrainingConfigBuilder};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// `rows` examples in three balanced classes. Class `k` raises feature `k` to about 4;
    /// the last feature is noise.
    fn clustered_data(rows: usize, seed: u64) -> Result<LabelledDataSet<u8>, DataError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let features = Matrix::from_shape_fn((rows, 4), |(row, col)| {
            let noise = rng.random_range(0.0..0.3);
            if col == row % 3 { 4.0 + noise } else { noise }
        });
        let labels = (0..rows).map(|row| [10, 20, 30][row % 3]).collect();
        LabelledDataSet::new(features, labels)
    }

    #[test]
    fn test_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
        let config = TrainingConfigBuilder::default()
            .layer_node_counts(vec![4, 5, 3])
            .training_examples_percent(80_u32)
            .regularization_constant(0.01)
            .learning_rate(2.0)
            .cost_func_frac_change_threshold(1e-9)
            .max_iterations(50_usize)
            .build()?;
        let mut rng = StdRng::seed_from_u64(42);

        let mut trainer = Trainer::new(config, clustered_data(30, 7)?, &mut rng)?.show_progress(false);
        let report = trainer.run()?;

        assert!(report.iterations <= 50);
        assert_eq!(report.costs.len(), report.iterations);
        assert!(
            report.costs.windows(2).all(|pair| pair[1] <= pair[0]),
            "costs increased: {:?}",
            report.costs
        );
        assert_eq!(report.training_examples, 24);
        assert_eq!(report.testing_examples, 6);
        let accuracy = report.accuracy.ok_or("missing accuracy")?;
        assert!(accuracy > 1.0 / 3.0, "accuracy {accuracy}");
        assert_eq!(trainer.network().weights()?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_sessions_are_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let config = TrainingConfigBuilder::default()
            .layer_node_counts(vec![4, 3, 3])
            .max_iterations(5_usize)
            .build()?;

        let mut first = Trainer::new(
            config.clone(),
            clustered_data(15, 1)?,
            &mut StdRng::seed_from_u64(9),
        )?
        .show_progress(false);
        let mut second =
            Trainer::new(config, clustered_data(15, 1)?, &mut StdRng::seed_from_u64(9))?
                .show_progress(false);

        assert_eq!(first.run()?, second.run()?);
        Ok(())
    }

    #[test]
    fn test_all_examples_for_training() -> Result<(), Box<dyn std::error::Error>> {
        let config = TrainingConfigBuilder::default()
            .layer_node_counts(vec![4, 3, 3])
            .training_examples_percent(100_u32)
            .max_iterations(3_usize)
            .build()?;

        let mut trainer = Trainer::new(config, clustered_data(9, 2)?, &mut StdRng::seed_from_u64(3))?
            .show_progress(false);
        let report = trainer.run()?;

        assert_eq!(report.testing_examples, 0);
        assert_eq!(report.accuracy, None);
        assert_eq!(report.termination, TrainingState::MaxIterationsReached);
        Ok(())
    }

    #[test]
    fn test_rejects_mismatched_layers() -> Result<(), Box<dyn std::error::Error>> {
        let config = TrainingConfigBuilder::default()
            .layer_node_counts(vec![4, 3, 2])
            .build()?;

        let result = Trainer::new(config, clustered_data(9, 2)?, &mut StdRng::seed_from_u64(3));

        assert!(matches!(
            result,
            Err(TrainingError::Network(NetworkError::Config(
                ConfigError::OutputWidth { nodes: 2, labels: 3 }
            )))
        ));
        Ok(())
    }

    #[test]
    fn test_progress_style() {
        assert!(create_progress_style(PROGRESS_TEMPLATE).is_ok());
    }
}

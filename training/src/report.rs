use crate::error::TrainingError;
use neural_network::TrainingState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Outcome of a training session: how it ended, the cost history and the test accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub layer_node_counts: Vec<usize>,
    pub training_examples: usize,
    pub testing_examples: usize,
    pub iterations: usize,
    pub termination: TrainingState,
    /// Cost after every iteration.
    pub costs: Vec<f64>,
    /// Fraction of correctly classified testing examples. `None` when every example was
    /// used for training.
    pub accuracy: Option<f64>,
}

impl TrainingReport {
    pub fn final_cost(&self) -> Option<f64> {
        self.costs.last().copied()
    }

    /// Writes the report as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TrainingError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let termination = match self.termination {
            TrainingState::Converged => "converged",
            TrainingState::MaxIterationsReached => "reached the iteration limit",
            TrainingState::Running => "was interrupted",
        };
        writeln!(
            f,
            "Training {termination} after {} iteration(s) on {} example(s)",
            self.iterations, self.training_examples
        )?;
        if let Some(cost) = self.final_cost() {
            writeln!(f, "Final cost: {cost:.6}")?;
        }
        match self.accuracy {
            Some(accuracy) => write!(
                f,
                "Accuracy: {:.2}% on {} testing example(s)",
                accuracy * 100.0,
                self.testing_examples
            ),
            None => write!(f, "Accuracy: n/a (no testing examples)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn report() -> TrainingReport {
        TrainingReport {
            layer_node_counts: vec![2, 2],
            training_examples: 8,
            testing_examples: 2,
            iterations: 3,
            termination: TrainingState::MaxIterationsReached,
            costs: vec![0.9, 0.8, 0.75],
            accuracy: Some(0.5),
        }
    }

    #[test]
    fn test_summary() {
        let summary = report().to_string();
        assert!(summary.contains("reached the iteration limit after 3 iteration(s)"));
        assert!(summary.contains("Final cost: 0.750000"));
        assert!(summary.contains("Accuracy: 50.00% on 2 testing example(s)"));
    }

    #[test]
    fn test_summary_without_testing_examples() {
        let report = TrainingReport {
            accuracy: None,
            testing_examples: 0,
            ..report()
        };
        assert!(report.to_string().ends_with("Accuracy: n/a (no testing examples)"));
    }

    #[test]
    fn test_save_writes_json() -> Result<(), Box<dyn std::error::Error>> {
        let file = NamedTempFile::new()?;
        report().save(file.path())?;

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(file.path())?)?;
        assert_eq!(json["termination"], "MaxIterationsReached");
        assert_eq!(json["iterations"], 3);
        assert_eq!(json["accuracy"], 0.5);
        assert_eq!(json["costs"], serde_json::json!([0.9, 0.8, 0.75]));
        assert!(json.get("weights").is_none());
        Ok(())
    }
}

use anyhow::{Context, Result};
use clap::Parser;
use labelled_data::LabelledDataSet;
use neural_network::TrainingConfig;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;
use training::{Trainer, TrainingReport};

/// Train a sigmoid feed-forward classifier on labelled CSV data.
#[derive(Parser, Debug)]
#[command(name = "train_classifier", version, about, long_about = None)]
struct Cli {
    /// Comma separated feature file, one example per line, no header
    #[arg(long)]
    features: PathBuf,

    /// Label file with one integer label per cell, in example order
    #[arg(long)]
    labels: PathBuf,

    /// JSON training configuration; only `layer_node_counts` is required
    #[arg(long)]
    config: PathBuf,

    /// Seed for the train/test split and the initial weights
    #[arg(long)]
    seed: Option<u64>,

    /// Write the training report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log every iteration
    #[arg(short, long)]
    verbose: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let report = run(&cli)?;
    println!("\n{report}");
    Ok(())
}

fn run(cli: &Cli) -> Result<TrainingReport> {
    let config = TrainingConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    let data: LabelledDataSet<i64> = LabelledDataSet::from_csv(&cli.features, &cli.labels)
        .with_context(|| {
            format!(
                "loading labelled data from {} and {}",
                cli.features.display(),
                cli.labels.display()
            )
        })?;
    info!(
        examples = data.len(),
        features = data.feature_count(),
        "loaded labelled data"
    );

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut trainer = Trainer::new(config, data, &mut rng)
        .context("preparing the training session")?
        .show_progress(!cli.no_progress);
    let report = trainer.run().context("training the network")?;

    if let Some(path) = &cli.report {
        report
            .save(path)
            .with_context(|| format!("writing the report to {}", path.display()))?;
        info!(path = %path.display(), "wrote training report");
    }
    Ok(report)
}

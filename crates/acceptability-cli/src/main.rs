//! Acceptability CLI
//!
//! Command-line interface for training the reference classifier and
//! inspecting or restoring its checkpoints.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use acceptability::prelude::*;

#[derive(Parser)]
#[command(name = "acpt")]
#[command(version, about = "Acceptability - checkpointed classifier training", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the reference classifier, resuming if configured
    Train {
        /// JSON trainer config; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory for checkpoint artifacts
        #[arg(long)]
        save_loc: Option<PathBuf>,

        /// Experiment name (artifact file stem)
        #[arg(long)]
        experiment_name: Option<String>,

        /// Number of epochs
        #[arg(long)]
        epochs: Option<u64>,

        /// Resume from the experiment checkpoint if it exists
        #[arg(long)]
        resume: bool,

        /// Resume from this checkpoint instead
        #[arg(long)]
        resume_file: Option<PathBuf>,

        /// Embedding to load when the experiment has none
        #[arg(long)]
        embedding_path: Option<PathBuf>,

        /// Train and persist the embedding
        #[arg(long)]
        trainable_embedding: bool,

        /// Replicate the classifier over N devices
        #[arg(long)]
        data_parallel: Option<usize>,
    },

    /// Print the contents of a checkpoint file
    Inspect {
        /// Path to a .ckpt file
        file: PathBuf,
    },

    /// Restore model weights from an experiment and evaluate them
    Restore {
        /// JSON trainer config describing the model
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory for checkpoint artifacts
        #[arg(long)]
        save_loc: Option<PathBuf>,

        /// Experiment name (artifact file stem)
        #[arg(long)]
        experiment_name: Option<String>,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            config,
            save_loc,
            experiment_name,
            epochs,
            resume,
            resume_file,
            embedding_path,
            trainable_embedding,
            data_parallel,
        } => {
            let mut config = load_config(config, save_loc, experiment_name)?;
            if let Some(epochs) = epochs {
                config = config.with_epochs(epochs);
            }
            if let Some(devices) = data_parallel {
                config = config.with_data_parallel(devices);
            }
            let checkpoint = &mut config.checkpoint;
            checkpoint.resume |= resume;
            checkpoint.resume_file = resume_file.or(checkpoint.resume_file.take());
            checkpoint.embedding_path = embedding_path.or(checkpoint.embedding_path.take());
            if trainable_embedding {
                checkpoint.glove = false;
            }

            train(config)?;
        }
        Commands::Inspect { file } => {
            inspect(&file)?;
        }
        Commands::Restore {
            config,
            save_loc,
            experiment_name,
        } => {
            restore(load_config(config, save_loc, experiment_name)?)?;
        }
    }

    Ok(())
}

fn load_config(
    path: Option<PathBuf>,
    save_loc: Option<PathBuf>,
    experiment_name: Option<String>,
) -> Result<TrainerConfig> {
    let mut config = match path {
        Some(path) => TrainerConfig::from_json_file(&path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => TrainerConfig::default(),
    };
    if let Some(save_loc) = save_loc {
        config.checkpoint.save_loc = save_loc;
    }
    if let Some(name) = experiment_name {
        config.checkpoint.experiment_name = name;
    }
    Ok(config)
}

fn train(config: TrainerConfig) -> Result<()> {
    tracing::info!(
        experiment = %config.checkpoint.experiment_name,
        save_loc = %config.checkpoint.save_loc.display(),
        epochs = config.epochs,
        data_parallel = config.data_parallel,
        "Starting training"
    );

    let summary = if config.data_parallel > 0 {
        let devices = config.data_parallel;
        let layer = Linear::new(config.embedding_dim, config.num_classes, config.seed);
        Trainer::new(config, DataParallel::with_devices(layer, devices)).fit()?
    } else {
        Trainer::linear(config).fit()?
    };

    if let Some(source) = &summary.resumed_from {
        println!("Resumed from: {}", source.path().display());
    }
    println!("Epochs: {} -> {}", summary.start_epoch, summary.final_epoch);
    if summary.stopped_early {
        println!("Stopped early");
    }
    println!(
        "Best epoch: {} (valid_loss {:.4})",
        summary.best.best_monitored_epoch, summary.best.best_monitored_metric
    );
    println!("Checkpoint: {}", summary.checkpoint.display());
    println!("Final model: {}", summary.final_model.display());
    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let record = CheckpointManager::read_record(path)
        .with_context(|| format!("reading checkpoint {}", path.display()))?;

    println!("Checkpoint: {}", path.display());
    println!("Version: {}", record.version);
    println!("Epoch: {}", record.current_epoch);
    println!("Best metric: {}", record.best_metric);
    println!("Best epoch: {}", record.best_epoch);
    println!("Other metrics: {}", serde_json::to_string(&record.other_metrics)?);

    println!("Model parameters:");
    for (name, value) in &record.model {
        println!("  {} {:?}", name, value.shape());
    }
    println!("Optimizer state:");
    for (name, value) in &record.optimizer {
        match value {
            StateValue::Tensor(t) => println!("  {} {:?}", name, t.shape()),
            StateValue::Float(v) => println!("  {} = {}", name, v),
            StateValue::Int(v) => println!("  {} = {}", name, v),
        }
    }
    Ok(())
}

fn restore(config: TrainerConfig) -> Result<()> {
    let mut trainer = Trainer::linear(config);
    let path = trainer.checkpoint_manager().paths().checkpoint.clone();

    if !trainer.restore()? {
        anyhow::bail!("no checkpoint at {}", path.display());
    }

    let (loss, accuracy, mcc) = trainer.evaluate();
    println!("Restored: {}", path.display());
    println!("valid_loss: {:.4}", loss);
    println!("accuracy: {:.4}", accuracy);
    println!("mcc: {:.4}", mcc);
    Ok(())
}

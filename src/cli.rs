//! Command-line surface for the pipeline binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::models::{SourceKind, TrainingMode};

#[derive(Debug, Parser)]
#[command(name = "energy-pipeline", version, about = "Energy price and weather ingestion, training and serving")]
pub struct Cli {
    /// Use the in-process store instead of Postgres (nothing is persisted).
    #[arg(long, global = true)]
    pub memory: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Routine extraction from each series' watermark up to now.
    Extract(SeriesArgs),
    /// Historical load; empty series start at the configured historical date.
    Backfill(BackfillArgs),
    /// Train the price model and save the artifact.
    Train(TrainArgs),
    /// Score the saved artifact against stored data.
    Evaluate(EvaluateArgs),
    /// Row counts and watermarks per series.
    Stats,
    /// Serve predictions over HTTP.
    Serve,
    /// Run extraction and training on their configured intervals.
    Schedule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeriesArg {
    Price,
    Weather,
    All,
}

impl SeriesArg {
    pub fn kinds(self) -> Vec<SourceKind> {
        match self {
            SeriesArg::Price => vec![SourceKind::Price],
            SeriesArg::Weather => vec![SourceKind::Weather],
            SeriesArg::All => vec![SourceKind::Price, SourceKind::Weather],
        }
    }
}

#[derive(Debug, Clone, Parser)]
pub struct SeriesArgs {
    #[arg(long, value_enum, default_value_t = SeriesArg::All)]
    pub series: SeriesArg,
}

#[derive(Debug, Clone, Parser)]
pub struct BackfillArgs {
    #[arg(long, value_enum, default_value_t = SeriesArg::All)]
    pub series: SeriesArg,

    /// Stop starting new windows after this many seconds.
    #[arg(long)]
    pub deadline_secs: Option<u64>,
}

#[derive(Debug, Clone, Parser)]
pub struct TrainArgs {
    /// full | streaming (defaults to TRAINING_MODE).
    #[arg(long)]
    pub mode: Option<TrainingMode>,
}

#[derive(Debug, Clone, Parser)]
pub struct EvaluateArgs {
    /// Number of joined rows to score (defaults to EVALUATION_SAMPLE_SIZE).
    #[arg(long)]
    pub sample: Option<usize>,

    /// Write per-row predictions to this CSV file.
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

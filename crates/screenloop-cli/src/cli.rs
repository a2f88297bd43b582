use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "screenloop - iterative surrogate-guided screening of very large candidate libraries.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads used to parse result and prediction files.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a candidate library into the population database.
    Import(ImportArgs),
    /// Select the next evaluation batch and write its shard files.
    Select(ScreenArgs),
    /// Merge evaluator score files into the screen's result table.
    ImportResults(ImportResultsArgs),
    /// Export the training split and run the configured trainer.
    Train(ScreenArgs),
    /// Write calibration samples, or derive the prediction cutoff from their predictions.
    Calibrate(ScreenArgs),
    /// Write per-worker prediction chunk jobs for the whole population.
    ShardPredictions(ScreenArgs),
    /// Run one or more prediction chunk jobs (worker entry point).
    RunChunk(RunChunkArgs),
    /// Load filtered chunk predictions into the screen's prediction table.
    ImportPredictions(ScreenArgs),
    /// Show the screen's state, best score and hit counts.
    Status(ScreenArgs),
    /// Export results (and optionally predictions) at or below a cutoff.
    Export(ExportArgs),
    /// Measure recall against a fully evaluated reference library.
    Analyze(AnalyzeArgs),
    /// Write evaluator-style score files for the current batch from a reference library.
    Simulate(SimulateArgs),
    /// Run every action automatically until `stop-after` iterations are evaluated.
    Run(RunArgs),
}

/// Arguments for the `import` subcommand.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Library file with one `representation label` row per candidate.
    #[arg(required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Population database to create or extend.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub database: PathBuf,

    /// Field delimiter of the library file ('space', 'tab' or a single character).
    #[arg(long, default_value = "space", value_name = "DELIM")]
    pub delimiter: String,

    /// Rows buffered per bulk insert.
    #[arg(long, default_value_t = 1_000_000, value_name = "INT")]
    pub chunk_size: usize,
}

/// Options shared by every command that works on a screen.
#[derive(Args, Debug, Clone, Default)]
pub struct ScreenArgs {
    /// Path to the screening protocol file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub protocol: Option<PathBuf>,

    /// Override the screen name from the protocol file.
    #[arg(short, long, value_name = "NAME")]
    pub name: Option<String>,

    /// Override the population database path.
    #[arg(short, long, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Override the working directory for batch, training and prediction files.
    #[arg(short, long, value_name = "PATH")]
    pub workdir: Option<PathBuf>,

    /// Override the number of evaluation shards.
    #[arg(long, value_name = "INT")]
    pub workers: Option<usize>,

    /// Override the fraction of the population evaluated per iteration.
    #[arg(long, value_name = "FLOAT")]
    pub batch_fraction: Option<f64>,

    /// Override the random seed.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Set a specific protocol value, overriding the protocol file.
    /// Can be used multiple times. Example: -S calibration.sigma-offset=1.0
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE")]
    pub set_values: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ImportResultsArgs {
    #[command(flatten)]
    pub screen: ScreenArgs,

    /// Score files to import. Defaults to every result file in the batch directory.
    #[arg(value_name = "PATH")]
    pub files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RunChunkArgs {
    /// Chunk job files written by `shard-predictions`.
    #[arg(required = true, value_name = "JOB")]
    pub jobs: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(flatten)]
    pub screen: ScreenArgs,

    /// CSV file receiving every result at or below the cutoff.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Score cutoff. Defaults to the screen's hit threshold.
    #[arg(long, value_name = "FLOAT", allow_negative_numbers = true)]
    pub cutoff: Option<f64>,

    /// Also write unscored candidates predicted at or below the current cutoff.
    #[arg(long, value_name = "PATH")]
    pub predicted: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub screen: ScreenArgs,

    /// Reference file with one `score label` row per candidate.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub reference: PathBuf,

    /// Fraction of the reference library counted as true hits.
    #[arg(long, default_value_t = 0.01, value_name = "FLOAT")]
    pub top_fraction: f64,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub screen: ScreenArgs,

    /// Reference file with one `score label` row per candidate.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub reference: PathBuf,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub screen: ScreenArgs,

    /// Override the number of iterations to evaluate.
    #[arg(long, value_name = "INT")]
    pub stop_after: Option<u32>,
}

use super::jobs::CommandTemplate;
use crate::core::io::table::ScoreColumns;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Parameter '{parameter}' must be positive, got {value}")]
    NonPositive { parameter: &'static str, value: f64 },
    #[error("Parameter '{parameter}' must be {expected}, got {value}")]
    OutOfRange {
        parameter: &'static str,
        value: f64,
        expected: &'static str,
    },
    #[error("Screen name '{0}' must be non-empty and contain only letters, digits, '-', '_' or '.'")]
    InvalidName(String),
    #[error("'{parameter}' of {fraction} selects no candidates from a population of {population}")]
    EmptyQuota {
        parameter: &'static str,
        fraction: f64,
        population: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionConfig {
    /// Fraction of the population evaluated per iteration.
    pub batch_fraction: f64,
    pub workers: usize,
    pub job_template: Option<PathBuf>,
}

/// How evaluator scores that are missing, unparseable, non-finite or above
/// the ceiling are replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationConfig {
    pub columns: ScoreColumns,
    pub score_ceiling: Option<f64>,
    pub failure_penalty: Option<f64>,
    pub penalize_missing: bool,
    pub results_suffix: String,
    pub command: Option<CommandTemplate>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            columns: ScoreColumns::new("identifier", "score", b','),
            score_ceiling: None,
            failure_penalty: None,
            penalize_missing: false,
            results_suffix: ".scores.csv".to_string(),
            command: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainSplit {
    pub train: f64,
    pub valid: f64,
    pub test: f64,
}

impl Default for TrainSplit {
    fn default() -> Self {
        Self {
            train: 0.8,
            valid: 0.1,
            test: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainingConfig {
    pub split: TrainSplit,
    pub command: Option<CommandTemplate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationConfig {
    pub sample_fraction: f64,
    pub workers: usize,
    /// Number of standard deviations subtracted from the sample mean.
    pub sigma_offset: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            sample_fraction: 0.01,
            workers: 1,
            sigma_offset: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionConfig {
    pub chunk_size: u64,
    pub workers: usize,
    /// Columns of the predictor's raw output.
    pub columns: ScoreColumns,
    pub command: Option<CommandTemplate>,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100_000,
            workers: 1,
            columns: ScoreColumns::new("identifier", "predicted_score", b','),
            command: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportConfig {
    /// A result is a hit when its score is at or below `hit_fraction × best`.
    pub hit_fraction: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { hit_fraction: 0.9 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenConfig {
    pub name: String,
    pub database: PathBuf,
    pub workdir: PathBuf,
    pub random_seed: u64,
    pub stop_after: Option<u32>,
    pub selection: SelectionConfig,
    pub evaluation: EvaluationConfig,
    pub training: TrainingConfig,
    pub calibration: CalibrationConfig,
    pub prediction: PredictionConfig,
    pub report: ReportConfig,
}

impl ScreenConfig {
    pub fn batch_quota(&self, population: u64) -> Result<usize, ConfigError> {
        quota("batch-fraction", self.selection.batch_fraction, population)
    }

    /// Calibration always draws at least two candidates.
    pub fn calibration_quota(&self, population: u64) -> usize {
        let raw = (self.calibration.sample_fraction * population as f64).round();
        (raw as usize).max(2)
    }
}

/// `round(fraction × population)`, rejected when it rounds to zero.
pub fn quota(parameter: &'static str, fraction: f64, population: u64) -> Result<usize, ConfigError> {
    let raw = (fraction * population as f64).round();
    if raw < 1.0 {
        return Err(ConfigError::EmptyQuota {
            parameter,
            fraction,
            population,
        });
    }
    Ok(raw as usize)
}

#[derive(Default)]
pub struct ScreenConfigBuilder {
    name: Option<String>,
    database: Option<PathBuf>,
    workdir: Option<PathBuf>,
    random_seed: Option<u64>,
    stop_after: Option<u32>,
    batch_fraction: Option<f64>,
    workers: Option<usize>,
    job_template: Option<PathBuf>,
    evaluation: EvaluationConfig,
    training: TrainingConfig,
    calibration: CalibrationConfig,
    prediction: PredictionConfig,
    report: ReportConfig,
}

impl ScreenConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
    pub fn database(mut self, path: PathBuf) -> Self {
        self.database = Some(path);
        self
    }
    pub fn workdir(mut self, path: PathBuf) -> Self {
        self.workdir = Some(path);
        self
    }
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }
    pub fn stop_after(mut self, iterations: Option<u32>) -> Self {
        self.stop_after = iterations;
        self
    }
    pub fn batch_fraction(mut self, fraction: f64) -> Self {
        self.batch_fraction = Some(fraction);
        self
    }
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }
    pub fn job_template(mut self, path: Option<PathBuf>) -> Self {
        self.job_template = path;
        self
    }
    pub fn evaluation(mut self, evaluation: EvaluationConfig) -> Self {
        self.evaluation = evaluation;
        self
    }
    pub fn training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }
    pub fn calibration(mut self, calibration: CalibrationConfig) -> Self {
        self.calibration = calibration;
        self
    }
    pub fn prediction(mut self, prediction: PredictionConfig) -> Self {
        self.prediction = prediction;
        self
    }
    pub fn report(mut self, report: ReportConfig) -> Self {
        self.report = report;
        self
    }

    pub fn build(self) -> Result<ScreenConfig, ConfigError> {
        let name = self.name.ok_or(ConfigError::MissingParameter("name"))?;
        if !is_valid_name(&name) {
            return Err(ConfigError::InvalidName(name));
        }

        let batch_fraction = self
            .batch_fraction
            .ok_or(ConfigError::MissingParameter("batch-fraction"))?;
        check_fraction("batch-fraction", batch_fraction)?;
        let workers = self
            .workers
            .ok_or(ConfigError::MissingParameter("workers"))?;
        check_count("workers", workers as u64)?;

        check_fraction("calibration.sample-fraction", self.calibration.sample_fraction)?;
        check_count("calibration.workers", self.calibration.workers as u64)?;
        check_finite("calibration.sigma-offset", self.calibration.sigma_offset)?;
        check_count("prediction.chunk-size", self.prediction.chunk_size)?;
        check_count("prediction.workers", self.prediction.workers as u64)?;
        check_fraction("report.hit-fraction", self.report.hit_fraction)?;
        check_split(&self.training.split)?;
        if let Some(ceiling) = self.evaluation.score_ceiling {
            check_finite("evaluation.score-ceiling", ceiling)?;
        }
        if let Some(penalty) = self.evaluation.failure_penalty {
            check_finite("evaluation.failure-penalty", penalty)?;
        }
        if let Some(stop) = self.stop_after {
            check_count("stop-after", stop as u64)?;
        }

        Ok(ScreenConfig {
            name,
            database: self
                .database
                .ok_or(ConfigError::MissingParameter("database"))?,
            workdir: self
                .workdir
                .ok_or(ConfigError::MissingParameter("workdir"))?,
            random_seed: self
                .random_seed
                .ok_or(ConfigError::MissingParameter("random-seed"))?,
            stop_after: self.stop_after,
            selection: SelectionConfig {
                batch_fraction,
                workers,
                job_template: self.job_template,
            },
            evaluation: self.evaluation,
            training: self.training,
            calibration: self.calibration,
            prediction: self.prediction,
            report: self.report,
        })
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn check_count(parameter: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::NonPositive {
            parameter,
            value: 0.0,
        });
    }
    Ok(())
}

fn check_finite(parameter: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::OutOfRange {
            parameter,
            value,
            expected: "a finite number",
        });
    }
    Ok(())
}

fn check_fraction(parameter: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_nan() || value <= 0.0 {
        return Err(ConfigError::NonPositive { parameter, value });
    }
    if value > 1.0 {
        return Err(ConfigError::OutOfRange {
            parameter,
            value,
            expected: "at most 1",
        });
    }
    Ok(())
}

fn check_split(split: &TrainSplit) -> Result<(), ConfigError> {
    check_fraction("training.split.train", split.train)?;
    for (parameter, value) in [
        ("training.split.valid", split.valid),
        ("training.split.test", split.test),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::OutOfRange {
                parameter,
                value,
                expected: "between 0 and 1",
            });
        }
    }
    let total = split.train + split.valid + split.test;
    if total > 1.0 + 1e-9 {
        return Err(ConfigError::OutOfRange {
            parameter: "training.split",
            value: total,
            expected: "fractions summing to at most 1",
        });
    }
    Ok(())
}

use super::defaults::DefaultsConfig;
use super::file::{
    FileCalibrationConfig, FileConfig, FileEvaluationConfig, FilePredictionConfig,
    FileSplitConfig, FileTrainingConfig,
};
use crate::cli::ScreenArgs;
use crate::error::{CliError, Result};
use crate::utils::parser::{self, ParseError};
use screenloop::core::io::table::ScoreColumns;
use screenloop::engine::config::{
    self as core_config, ScreenConfig, ScreenConfigBuilder, TrainSplit,
};
use std::path::PathBuf;
use tracing::debug;

/// Resolves the screen configuration from built-in defaults, the protocol
/// file, `-S` overrides and dedicated flags, in increasing precedence.
pub fn build_config(args: &ScreenArgs, stop_after: Option<u32>) -> Result<ScreenConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = if let Some(protocol) = &args.protocol {
        FileConfig::from_file(protocol)?
    } else {
        FileConfig::default()
    };
    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let selection = file_config.selection.take().unwrap_or_default();
    let evaluation = merge_evaluation(file_config.evaluation.take())?;
    let training = merge_training(file_config.training.take());
    let calibration = merge_calibration(file_config.calibration.take());
    let prediction = merge_prediction(file_config.prediction.take())?;
    let report = core_config::ReportConfig {
        hit_fraction: file_config
            .report
            .take()
            .and_then(|r| r.hit_fraction)
            .unwrap_or(core_config::ReportConfig::default().hit_fraction),
    };

    let mut builder = ScreenConfigBuilder::new()
        .workdir(
            args.workdir
                .clone()
                .or(file_config.workdir)
                .unwrap_or(defaults.workdir),
        )
        .random_seed(args.seed.or(file_config.random_seed).unwrap_or(defaults.random_seed))
        .stop_after(stop_after.or(file_config.stop_after))
        .batch_fraction(
            args.batch_fraction
                .or(selection.batch_fraction)
                .unwrap_or(defaults.batch_fraction),
        )
        .workers(args.workers.or(selection.workers).unwrap_or(defaults.workers))
        .job_template(selection.job_template)
        .evaluation(evaluation)
        .training(training)
        .calibration(calibration)
        .prediction(prediction)
        .report(report);

    if let Some(name) = args.name.clone().or(file_config.name) {
        builder = builder.name(name);
    }
    if let Some(database) = args.database.clone().or(file_config.database) {
        builder = builder.database(database);
    }

    let config = builder.build().map_err(|e| CliError::Config(e.to_string()))?;
    debug!("Resolved screen configuration: {:?}", config);
    Ok(config)
}

fn delimiter(raw: Option<&str>, default: u8) -> Result<u8> {
    match raw {
        Some(raw) => parser::parse_delimiter(raw).map_err(|e| CliError::Config(e.to_string())),
        None => Ok(default),
    }
}

fn merge_evaluation(file_val: Option<FileEvaluationConfig>) -> Result<core_config::EvaluationConfig> {
    let file_val = file_val.unwrap_or_default();
    let defaults = core_config::EvaluationConfig::default();
    Ok(core_config::EvaluationConfig {
        columns: ScoreColumns::new(
            file_val
                .id_column
                .as_deref()
                .unwrap_or(defaults.columns.id_column.as_str()),
            file_val
                .score_column
                .as_deref()
                .unwrap_or(defaults.columns.score_column.as_str()),
            delimiter(file_val.delimiter.as_deref(), defaults.columns.delimiter)?,
        ),
        score_ceiling: file_val.score_ceiling.or(defaults.score_ceiling),
        failure_penalty: file_val.failure_penalty.or(defaults.failure_penalty),
        penalize_missing: file_val
            .penalize_missing
            .unwrap_or(defaults.penalize_missing),
        results_suffix: file_val.results_suffix.unwrap_or(defaults.results_suffix),
        command: file_val.command,
    })
}

fn merge_training(file_val: Option<FileTrainingConfig>) -> core_config::TrainingConfig {
    let file_val = file_val.unwrap_or_default();
    let split = file_val.split.unwrap_or_default();
    let defaults = TrainSplit::default();
    core_config::TrainingConfig {
        split: TrainSplit {
            train: split.train.unwrap_or(defaults.train),
            valid: split.valid.unwrap_or(defaults.valid),
            test: split.test.unwrap_or(defaults.test),
        },
        command: file_val.command,
    }
}

fn merge_calibration(file_val: Option<FileCalibrationConfig>) -> core_config::CalibrationConfig {
    let file_val = file_val.unwrap_or_default();
    let defaults = core_config::CalibrationConfig::default();
    core_config::CalibrationConfig {
        sample_fraction: file_val.sample_fraction.unwrap_or(defaults.sample_fraction),
        workers: file_val.workers.unwrap_or(defaults.workers),
        sigma_offset: file_val.sigma_offset.unwrap_or(defaults.sigma_offset),
    }
}

fn merge_prediction(file_val: Option<FilePredictionConfig>) -> Result<core_config::PredictionConfig> {
    let file_val = file_val.unwrap_or_default();
    let defaults = core_config::PredictionConfig::default();
    Ok(core_config::PredictionConfig {
        chunk_size: file_val.chunk_size.unwrap_or(defaults.chunk_size),
        workers: file_val.workers.unwrap_or(defaults.workers),
        columns: ScoreColumns::new(
            file_val
                .id_column
                .as_deref()
                .unwrap_or(defaults.columns.id_column.as_str()),
            file_val
                .score_column
                .as_deref()
                .unwrap_or(defaults.columns.score_column.as_str()),
            delimiter(file_val.delimiter.as_deref(), defaults.columns.delimiter)?,
        ),
        command: file_val.command,
    })
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for raw in set_values {
        apply_set_value(&mut config, raw).map_err(|e| CliError::Config(e.to_string()))?;
    }
    Ok(config)
}

fn apply_set_value(config: &mut FileConfig, raw: &str) -> std::result::Result<(), SetError> {
    let (key, value) = parser::parse_assignment(raw)?;
    let text = || value.to_string();

    match key {
        "name" => config.name = Some(text()),
        "database" => config.database = Some(PathBuf::from(value)),
        "workdir" => config.workdir = Some(PathBuf::from(value)),
        "random-seed" => config.random_seed = Some(parser::parse_integer(key, value)?),
        "stop-after" => config.stop_after = Some(parser::parse_integer(key, value)?),

        "selection.batch-fraction" => {
            config.selection.get_or_insert_with(Default::default).batch_fraction =
                Some(parser::parse_float(key, value)?);
        }
        "selection.workers" => {
            config.selection.get_or_insert_with(Default::default).workers =
                Some(parser::parse_integer(key, value)?);
        }
        "selection.job-template" => {
            config.selection.get_or_insert_with(Default::default).job_template =
                Some(PathBuf::from(value));
        }

        "evaluation.id-column" => {
            config.evaluation.get_or_insert_with(Default::default).id_column = Some(text());
        }
        "evaluation.score-column" => {
            config.evaluation.get_or_insert_with(Default::default).score_column = Some(text());
        }
        "evaluation.delimiter" => {
            config.evaluation.get_or_insert_with(Default::default).delimiter = Some(text());
        }
        "evaluation.score-ceiling" => {
            config.evaluation.get_or_insert_with(Default::default).score_ceiling =
                Some(parser::parse_float(key, value)?);
        }
        "evaluation.failure-penalty" => {
            config.evaluation.get_or_insert_with(Default::default).failure_penalty =
                Some(parser::parse_float(key, value)?);
        }
        "evaluation.penalize-missing" => {
            config.evaluation.get_or_insert_with(Default::default).penalize_missing =
                Some(parser::parse_bool(key, value)?);
        }
        "evaluation.results-suffix" => {
            config.evaluation.get_or_insert_with(Default::default).results_suffix = Some(text());
        }

        "training.split.train" | "training.split.valid" | "training.split.test" => {
            let fraction = parser::parse_float(key, value)?;
            let split: &mut FileSplitConfig = config
                .training
                .get_or_insert_with(Default::default)
                .split
                .get_or_insert_with(Default::default);
            match key {
                "training.split.train" => split.train = Some(fraction),
                "training.split.valid" => split.valid = Some(fraction),
                _ => split.test = Some(fraction),
            }
        }

        "calibration.sample-fraction" => {
            config.calibration.get_or_insert_with(Default::default).sample_fraction =
                Some(parser::parse_float(key, value)?);
        }
        "calibration.workers" => {
            config.calibration.get_or_insert_with(Default::default).workers =
                Some(parser::parse_integer(key, value)?);
        }
        "calibration.sigma-offset" => {
            config.calibration.get_or_insert_with(Default::default).sigma_offset =
                Some(parser::parse_float(key, value)?);
        }

        "prediction.chunk-size" => {
            config.prediction.get_or_insert_with(Default::default).chunk_size =
                Some(parser::parse_integer(key, value)?);
        }
        "prediction.workers" => {
            config.prediction.get_or_insert_with(Default::default).workers =
                Some(parser::parse_integer(key, value)?);
        }
        "prediction.id-column" => {
            config.prediction.get_or_insert_with(Default::default).id_column = Some(text());
        }
        "prediction.score-column" => {
            config.prediction.get_or_insert_with(Default::default).score_column = Some(text());
        }
        "prediction.delimiter" => {
            config.prediction.get_or_insert_with(Default::default).delimiter = Some(text());
        }

        "report.hit-fraction" => {
            config.report.get_or_insert_with(Default::default).hit_fraction =
                Some(parser::parse_float(key, value)?);
        }

        _ => return Err(SetError::UnsupportedKey(key.to_string())),
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum SetError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Unsupported configuration key for --set: '{0}'")]
    UnsupportedKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use once_cell::sync::Lazy;
    use std::fs;
    use std::path::Path;
    use tempfile::{TempDir, tempdir};

    static TEST_DIR: Lazy<TempDir> = Lazy::new(|| tempdir().expect("Failed to create temp dir"));

    fn write_protocol(name: &str, content: &str) -> PathBuf {
        let path = TEST_DIR.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn screen_args(protocol: &Path, extra: &[&str]) -> ScreenArgs {
        let mut argv = vec![
            "screenloop".to_string(),
            "status".to_string(),
            "-p".to_string(),
            protocol.to_str().unwrap().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        match Cli::parse_from(argv).command {
            Commands::Status(args) => args,
            _ => panic!("Expected 'status' subcommand"),
        }
    }

    const MINIMAL: &str = r#"
        name = "kinase"
        database = "lib.redb"
    "#;

    #[test]
    fn minimal_protocol_takes_defaults() {
        let protocol = write_protocol("minimal.toml", MINIMAL);
        let config = build_config(&screen_args(&protocol, &[]), None).unwrap();

        assert_eq!(config.name, "kinase");
        assert_eq!(config.database, PathBuf::from("lib.redb"));
        assert_eq!(config.workdir, PathBuf::from("."));
        assert_eq!(config.random_seed, 42);
        assert_eq!(config.selection.batch_fraction, 0.01);
        assert_eq!(config.selection.workers, 1);
        assert_eq!(config.evaluation, core_config::EvaluationConfig::default());
        assert_eq!(config.prediction, core_config::PredictionConfig::default());
        assert_eq!(config.stop_after, None);
    }

    #[test]
    fn flags_override_set_values_which_override_the_file() {
        let protocol = write_protocol(
            "override.toml",
            r#"
            name = "kinase"
            database = "lib.redb"

            [selection]
            batch-fraction = 0.05
            workers = 2

            [calibration]
            sigma-offset = 0.5
            "#,
        );
        let args = screen_args(
            &protocol,
            &[
                "-S",
                "selection.workers=6",
                "-S",
                "selection.batch-fraction=0.2",
                "-S",
                "calibration.sigma-offset=1.5",
                "--workers",
                "3",
                "--name",
                "kinase-b",
            ],
        );
        let config = build_config(&args, Some(5)).unwrap();

        assert_eq!(config.name, "kinase-b");
        assert_eq!(config.selection.workers, 3);
        assert_eq!(config.selection.batch_fraction, 0.2);
        assert_eq!(config.calibration.sigma_offset, 1.5);
        assert_eq!(config.stop_after, Some(5));
    }

    #[test]
    fn delimiters_and_columns_are_resolved() {
        let protocol = write_protocol(
            "columns.toml",
            r#"
            name = "kinase"
            database = "lib.redb"

            [evaluation]
            id-column = "title"
            score-column = "r_i_docking_score"
            delimiter = "tab"
            "#,
        );
        let args = screen_args(&protocol, &["-S", "prediction.delimiter=;"]);
        let config = build_config(&args, None).unwrap();

        assert_eq!(
            config.evaluation.columns,
            ScoreColumns::new("title", "r_i_docking_score", b'\t')
        );
        assert_eq!(config.prediction.columns.delimiter, b';');
    }

    #[test]
    fn missing_database_is_a_config_error() {
        let protocol = write_protocol("no-db.toml", "name = \"kinase\"\n");
        let result = build_config(&screen_args(&protocol, &[]), None);
        match result {
            Err(CliError::Config(msg)) => assert!(msg.contains("database")),
            other => panic!("Expected config error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_values_are_rejected() {
        let protocol = write_protocol("invalid.toml", MINIMAL);
        for set in [
            "selection.workers=many",
            "evaluation.shape=round",
            "workers",
            "evaluation.delimiter=;;",
        ] {
            let result = build_config(&screen_args(&protocol, &["-S", set]), None);
            assert!(
                matches!(result, Err(CliError::Config(_))),
                "{set} should be rejected"
            );
        }
    }

    #[test]
    fn out_of_range_fraction_fails_core_validation() {
        let protocol = write_protocol("range.toml", MINIMAL);
        let result = build_config(&screen_args(&protocol, &["--batch-fraction", "1.5"]), None);
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}

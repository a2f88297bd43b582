use crate::error::{CliError, Result};
use screenloop::engine::jobs::CommandTemplate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSelectionConfig {
    pub batch_fraction: Option<f64>,
    pub workers: Option<usize>,
    pub job_template: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileEvaluationConfig {
    pub id_column: Option<String>,
    pub score_column: Option<String>,
    pub delimiter: Option<String>,
    pub score_ceiling: Option<f64>,
    pub failure_penalty: Option<f64>,
    pub penalize_missing: Option<bool>,
    pub results_suffix: Option<String>,
    pub command: Option<CommandTemplate>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSplitConfig {
    pub train: Option<f64>,
    pub valid: Option<f64>,
    pub test: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileTrainingConfig {
    pub split: Option<FileSplitConfig>,
    pub command: Option<CommandTemplate>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileCalibrationConfig {
    pub sample_fraction: Option<f64>,
    pub workers: Option<usize>,
    pub sigma_offset: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FilePredictionConfig {
    pub chunk_size: Option<u64>,
    pub workers: Option<usize>,
    pub id_column: Option<String>,
    pub score_column: Option<String>,
    pub delimiter: Option<String>,
    pub command: Option<CommandTemplate>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileReportConfig {
    pub hit_fraction: Option<f64>,
}

/// A protocol file as written; every value is optional until merged.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub name: Option<String>,
    pub database: Option<PathBuf>,
    pub workdir: Option<PathBuf>,
    pub random_seed: Option<u64>,
    pub stop_after: Option<u32>,
    pub selection: Option<FileSelectionConfig>,
    pub evaluation: Option<FileEvaluationConfig>,
    pub training: Option<FileTrainingConfig>,
    pub calibration: Option<FileCalibrationConfig>,
    pub prediction: Option<FilePredictionConfig>,
    pub report: Option<FileReportConfig>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading protocol from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_protocol_parses() {
        let config: FileConfig = toml::from_str(
            r#"
            name = "kinase"
            database = "lib.redb"
            random-seed = 3
            stop-after = 4

            [selection]
            batch-fraction = 0.02
            workers = 8

            [evaluation]
            score-column = "docking_score"
            delimiter = "tab"
            score-ceiling = 0.0
            command = { program = "dock", args = ["{input}", "{output}"] }

            [training]
            split = { train = 0.7, valid = 0.2, test = 0.1 }

            [prediction]
            chunk-size = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.name.as_deref(), Some("kinase"));
        assert_eq!(config.stop_after, Some(4));
        let evaluation = config.evaluation.unwrap();
        assert_eq!(evaluation.delimiter.as_deref(), Some("tab"));
        assert_eq!(evaluation.command.unwrap().args, vec!["{input}", "{output}"]);
        assert_eq!(config.training.unwrap().split.unwrap().valid, Some(0.2));
        assert_eq!(config.prediction.unwrap().chunk_size, Some(5000));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: std::result::Result<FileConfig, _> = toml::from_str(
            r#"
            [selection]
            batch-size = 100
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn unreadable_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileConfig::from_file(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(CliError::Io(_))));
    }
}

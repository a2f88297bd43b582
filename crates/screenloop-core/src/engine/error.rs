use super::config::ConfigError;
use super::jobs::JobError;
use super::state::{Action, IterationState};
use crate::core::io::table::TableIoError;
use crate::core::io::template::TemplateError;
use crate::core::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Storage access failed: {0}")]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Table(#[from] TableIoError),

    #[error("External job failed: {0}")]
    Job(#[from] JobError),

    #[error("Action '{action}' cannot run while screen is '{state}'; run '{required}' first")]
    NotAllowed {
        action: Action,
        state: IterationState,
        required: Action,
    },

    #[error("Action '{action}' is missing {artifact}; run '{producer}' first")]
    Precondition {
        action: Action,
        artifact: String,
        producer: &'static str,
    },

    #[error("No cutoff recorded for iteration {iteration}; run 'calibrate' first")]
    MissingCutoff { iteration: u32 },

    #[error("Calibration needs at least 2 valid predicted scores, found {valid}")]
    InsufficientSample { valid: usize },

    #[error("Parse error at {path}:{line}: {message}", path = path.display())]
    Parse {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("File I/O error for '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

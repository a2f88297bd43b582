//! External process invocation.
//!
//! Evaluators, trainers and predictors are opaque programs. A
//! [`CommandTemplate`] from the protocol file is rendered into a concrete
//! [`ExternalJobSpec`], which a [`JobLauncher`] runs.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("'{program}' exited with {status}")]
    Failed { program: String, status: String },
    #[error("Failed to open stdout file '{path}': {source}", path = path.display())]
    Stdout {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{failed} of {total} jobs failed; first failure: {first}")]
    Batch {
        failed: usize,
        total: usize,
        first: Box<JobError>,
    },
}

/// A program and argument list with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Values substituted into a [`CommandTemplate`]. Placeholders without a
/// value are left as written.
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    values: Vec<(&'static str, String)>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, key: &'static str, value: String) -> Self {
        self.values.push((key, value));
        self
    }

    pub fn input(self, path: &Path) -> Self {
        self.with("{input}", path.display().to_string())
    }
    pub fn output(self, path: &Path) -> Self {
        self.with("{output}", path.display().to_string())
    }
    pub fn job(self, path: &Path) -> Self {
        self.with("{job}", path.display().to_string())
    }
    pub fn model(self, path: &Path) -> Self {
        self.with("{model}", path.display().to_string())
    }
    pub fn iteration(self, iteration: u32) -> Self {
        self.with("{iteration}", iteration.to_string())
    }
    pub fn train(self, path: &Path) -> Self {
        self.with("{train}", path.display().to_string())
    }
    pub fn valid(self, path: &Path) -> Self {
        self.with("{valid}", path.display().to_string())
    }
    pub fn test(self, path: &Path) -> Self {
        self.with("{test}", path.display().to_string())
    }

    fn apply(&self, text: &str) -> String {
        self.values
            .iter()
            .fold(text.to_string(), |acc, (key, value)| acc.replace(key, value))
    }
}

impl CommandTemplate {
    pub fn render(&self, values: &Placeholders) -> ExternalJobSpec {
        ExternalJobSpec {
            program: values.apply(&self.program),
            args: self.args.iter().map(|a| values.apply(a)).collect(),
            stdout: None,
            working_dir: None,
        }
    }
}

/// A fully resolved external process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ExternalJobSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// File receiving the process's standard output; inherited when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl ExternalJobSpec {
    pub fn with_stdout(mut self, path: PathBuf) -> Self {
        self.stdout = Some(path);
        self
    }
}

pub trait JobLauncher: Sync {
    /// Runs one job to completion.
    fn launch(&self, job: &ExternalJobSpec) -> Result<(), JobError>;

    /// Runs every job and returns once all of them have finished.
    fn launch_all(&self, jobs: &[ExternalJobSpec]) -> Result<(), JobError> {
        for job in jobs {
            self.launch(job)?;
        }
        Ok(())
    }
}

/// Runs jobs as child processes, without a shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    fn spawn(job: &ExternalJobSpec) -> Result<Child, JobError> {
        let mut command = Command::new(&job.program);
        command.args(&job.args).stdin(Stdio::null());
        if let Some(dir) = &job.working_dir {
            command.current_dir(dir);
        }
        if let Some(path) = &job.stdout {
            let file = File::create(path).map_err(|source| JobError::Stdout {
                path: path.clone(),
                source,
            })?;
            command.stdout(Stdio::from(file));
        }
        debug!(program = %job.program, args = ?job.args, "Spawning job");
        command.spawn().map_err(|source| JobError::Spawn {
            program: job.program.clone(),
            source,
        })
    }

    fn wait(job: &ExternalJobSpec, mut child: Child) -> Result<(), JobError> {
        let status = child.wait().map_err(|source| JobError::Spawn {
            program: job.program.clone(),
            source,
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(JobError::Failed {
                program: job.program.clone(),
                status: status.to_string(),
            })
        }
    }
}

impl JobLauncher for ProcessLauncher {
    fn launch(&self, job: &ExternalJobSpec) -> Result<(), JobError> {
        let child = Self::spawn(job)?;
        Self::wait(job, child)
    }

    /// Starts all jobs before waiting on any of them.
    fn launch_all(&self, jobs: &[ExternalJobSpec]) -> Result<(), JobError> {
        info!("Launching {} external jobs", jobs.len());
        let mut errors = Vec::new();
        let mut running = Vec::with_capacity(jobs.len());
        for job in jobs {
            match Self::spawn(job) {
                Ok(child) => running.push((job, child)),
                Err(e) => errors.push(e),
            }
        }
        for (job, child) in running {
            if let Err(e) = Self::wait(job, child) {
                warn!("{}", e);
                errors.push(e);
            }
        }
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            failed => Err(JobError::Batch {
                failed,
                total: jobs.len(),
                first: Box::new(errors.remove(0)),
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    type Hook = Box<dyn Fn(&ExternalJobSpec) -> std::io::Result<()> + Send + Sync>;

    /// Records every launched job and optionally runs a hook standing in for
    /// the external program.
    #[derive(Default)]
    pub struct RecordingLauncher {
        pub launched: Mutex<Vec<ExternalJobSpec>>,
        hook: Option<Hook>,
    }

    impl RecordingLauncher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_hook(
            hook: impl Fn(&ExternalJobSpec) -> std::io::Result<()> + Send + Sync + 'static,
        ) -> Self {
            Self {
                launched: Mutex::new(Vec::new()),
                hook: Some(Box::new(hook)),
            }
        }

        pub fn jobs(&self) -> Vec<ExternalJobSpec> {
            self.launched.lock().unwrap().clone()
        }
    }

    impl JobLauncher for RecordingLauncher {
        fn launch(&self, job: &ExternalJobSpec) -> Result<(), JobError> {
            self.launched.lock().unwrap().push(job.clone());
            if let Some(hook) = &self.hook {
                hook(job).map_err(|source| JobError::Spawn {
                    program: job.program.clone(),
                    source,
                })?;
            }
            Ok(())
        }
    }
}

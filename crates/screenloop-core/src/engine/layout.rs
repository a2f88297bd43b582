use super::error::EngineError;
use std::path::{Path, PathBuf};

/// Which training export file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitPart {
    Train,
    Valid,
    Test,
}

impl SplitPart {
    pub const ALL: [SplitPart; 3] = [SplitPart::Train, SplitPart::Valid, SplitPart::Test];

    fn file_name(self) -> &'static str {
        match self {
            Self::Train => "train.csv",
            Self::Valid => "valid.csv",
            Self::Test => "test.csv",
        }
    }
}

/// File locations of one screen under the working directory.
///
/// ```text
/// <workdir>/<screen>/iter_001/batch/shard_001.smi
///                            /train/train.csv
///                            /model
///                            /calibration/sample_001.input.csv
///                            /predict/worker_01/chunk_00001.input.csv
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenLayout {
    root: PathBuf,
}

impl ScreenLayout {
    pub fn new(workdir: &Path, screen: &str) -> Self {
        Self {
            root: workdir.join(screen),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn iteration_dir(&self, iteration: u32) -> PathBuf {
        self.root.join(format!("iter_{iteration:03}"))
    }

    pub fn batch_dir(&self, iteration: u32) -> PathBuf {
        self.iteration_dir(iteration).join("batch")
    }

    pub fn shard_work_list(&self, iteration: u32, shard: usize) -> PathBuf {
        self.batch_dir(iteration).join(format!("shard_{shard:03}.smi"))
    }

    pub fn shard_descriptor(&self, iteration: u32, shard: usize, extension: &str) -> PathBuf {
        self.batch_dir(iteration)
            .join(format!("shard_{shard:03}.{extension}"))
    }

    /// Default location of the evaluator output for a shard.
    pub fn shard_scores(&self, iteration: u32, shard: usize, suffix: &str) -> PathBuf {
        self.batch_dir(iteration)
            .join(format!("shard_{shard:03}{suffix}"))
    }

    pub fn train_dir(&self, iteration: u32) -> PathBuf {
        self.iteration_dir(iteration).join("train")
    }

    pub fn train_file(&self, iteration: u32, part: SplitPart) -> PathBuf {
        self.train_dir(iteration).join(part.file_name())
    }

    pub fn trainer_log(&self, iteration: u32) -> PathBuf {
        self.train_dir(iteration).join("trainer.log")
    }

    pub fn model_path(&self, iteration: u32) -> PathBuf {
        self.iteration_dir(iteration).join("model")
    }

    pub fn calibration_dir(&self, iteration: u32) -> PathBuf {
        self.iteration_dir(iteration).join("calibration")
    }

    pub fn sample_file(&self, iteration: u32, sample: usize, kind: &str) -> PathBuf {
        self.calibration_dir(iteration)
            .join(format!("sample_{sample:03}.{kind}"))
    }

    pub fn cutoff_file(&self, iteration: u32) -> PathBuf {
        self.calibration_dir(iteration).join("cutoff.txt")
    }

    pub fn predict_dir(&self, iteration: u32) -> PathBuf {
        self.iteration_dir(iteration).join("predict")
    }

    pub fn worker_dir(&self, iteration: u32, worker: usize) -> PathBuf {
        self.predict_dir(iteration)
            .join(format!("worker_{worker:02}"))
    }

    pub fn chunk_file(&self, iteration: u32, worker: usize, chunk: u64, kind: &str) -> PathBuf {
        self.worker_dir(iteration, worker)
            .join(format!("chunk_{chunk:05}.{kind}"))
    }
}

/// Files directly inside `dir` whose names start with `prefix` and end with
/// `suffix`, sorted by name. A missing directory yields no files.
pub fn list_files(dir: &Path, prefix: &str, suffix: &str) -> Result<Vec<PathBuf>, EngineError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(EngineError::io(dir, e)),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::io(dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(prefix) && name.ends_with(suffix) && entry.path().is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Creates `dir` and removes any files in it starting with `prefix`.
pub fn prepare_dir(dir: &Path, prefix: &str) -> Result<(), EngineError> {
    std::fs::create_dir_all(dir).map_err(|e| EngineError::io(dir, e))?;
    for stale in list_files(dir, prefix, "")? {
        std::fs::remove_file(&stale).map_err(|e| EngineError::io(&stale, e))?;
    }
    Ok(())
}

pub fn create_dir(dir: &Path) -> Result<(), EngineError> {
    std::fs::create_dir_all(dir).map_err(|e| EngineError::io(dir, e))
}

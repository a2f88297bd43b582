//! Surrogate scoring of the whole unscored population.
//!
//! The identifier space is cut into fixed-size chunks dealt round-robin to
//! workers. Each chunk gets an input file of its unscored candidates and a
//! [`ChunkJob`] that a worker process executes with [`run_chunk`]. The
//! filtered outputs are then loaded into a fresh prediction table.

use super::context::ScreenContext;
use super::error::EngineError;
use super::jobs::{ExternalJobSpec, JobLauncher, Placeholders};
use super::layout::{create_dir, list_files};
use super::progress::Progress;
use super::state::Action;
use crate::core::io::table::{ScoreColumns, StructureCsvWriter, read_score_rows, write_records};
use crate::core::models::ids::CandidateId;
use crate::core::store::PredictionLoad;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

const FILTERED_ID: &str = "identifier";
const FILTERED_SCORE: &str = "predicted_score";

/// One contiguous identifier range and the worker it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    /// 1-based chunk number.
    pub chunk: u64,
    /// 1-based worker number.
    pub worker: usize,
    pub first: CandidateId,
    pub last: CandidateId,
}

/// Chunk `c` covers `[(c-1)·size+1, min(c·size, population)]` and goes to
/// worker `((c-1) mod workers)+1`.
pub fn plan_chunks(population: u64, chunk_size: u64, workers: usize) -> Vec<ChunkPlan> {
    if population == 0 || chunk_size == 0 || workers == 0 {
        return Vec::new();
    }
    let count = population.div_ceil(chunk_size);
    (1..=count)
        .map(|chunk| ChunkPlan {
            chunk,
            worker: ((chunk - 1) % workers as u64) as usize + 1,
            first: CandidateId((chunk - 1) * chunk_size + 1),
            last: CandidateId((chunk * chunk_size).min(population)),
        })
        .collect()
}

/// Self-contained instructions for one worker chunk, stored as TOML next to
/// the chunk's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ChunkJob {
    pub chunk: u64,
    pub input: PathBuf,
    /// Where the predictor writes its unfiltered output.
    pub raw_output: PathBuf,
    /// Filtered `identifier,predicted_score` rows at or below `cutoff`.
    pub output: PathBuf,
    pub cutoff: f64,
    pub id_column: String,
    pub score_column: String,
    pub delimiter: char,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictor: Option<ExternalJobSpec>,
}

impl ChunkJob {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        toml::from_str(&text).map_err(|e| EngineError::Parse {
            path: path.to_path_buf(),
            line: 0,
            message: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let text = toml::to_string(self)
            .map_err(|e| EngineError::Internal(format!("cannot serialize chunk job: {e}")))?;
        std::fs::write(path, text).map_err(|e| EngineError::io(path, e))
    }

    fn columns(&self) -> ScoreColumns {
        let delimiter = u8::try_from(self.delimiter).unwrap_or(b',');
        ScoreColumns::new(&self.id_column, &self.score_column, delimiter)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShardedChunk {
    pub plan: ChunkPlan,
    pub job_path: PathBuf,
    pub candidates: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShardReport {
    pub cutoff: f64,
    pub chunks: Vec<ShardedChunk>,
    pub candidates: usize,
}

impl ShardReport {
    /// `run-chunk` invocations grouped by worker, in chunk order.
    pub fn jobs_by_worker(&self) -> Vec<(usize, Vec<PathBuf>)> {
        let mut grouped: Vec<(usize, Vec<PathBuf>)> = Vec::new();
        for chunk in &self.chunks {
            match grouped.iter_mut().find(|(w, _)| *w == chunk.plan.worker) {
                Some((_, jobs)) => jobs.push(chunk.job_path.clone()),
                None => grouped.push((chunk.plan.worker, vec![chunk.job_path.clone()])),
            }
        }
        grouped.sort_by_key(|(w, _)| *w);
        grouped
    }
}

/// Writes per-chunk inputs and jobs for `iteration`. Fails with
/// `MissingCutoff` before touching the filesystem if no cutoff is recorded.
#[instrument(skip_all, fields(screen = %ctx.screen(), iteration))]
pub fn shard_predictions(ctx: &mut ScreenContext, iteration: u32) -> Result<ShardReport, EngineError> {
    let cutoff = ctx
        .cutoff(iteration)
        .ok_or(EngineError::MissingCutoff { iteration })?;
    let prediction = &ctx.config.prediction;
    let population = ctx.store.population_size()?;
    let plans = plan_chunks(population, prediction.chunk_size, prediction.workers);
    let scored = ctx.store.scored_ids(ctx.screen())?;

    let predict_dir = ctx.layout.predict_dir(iteration);
    if predict_dir.exists() {
        std::fs::remove_dir_all(&predict_dir).map_err(|e| EngineError::io(&predict_dir, e))?;
    }

    let (chunks, total) = ctx.reporter.phase("Prediction Sharding", || {
        ctx.reporter.report(Progress::TaskStart {
            total_steps: plans.len() as u64,
        });

        let mut chunks = Vec::with_capacity(plans.len());
        let mut total = 0;
        for plan in plans {
            create_dir(&ctx.layout.worker_dir(iteration, plan.worker))?;
            let file = |kind: &str| ctx.layout.chunk_file(iteration, plan.worker, plan.chunk, kind);
            let (input, raw_output, output, job_path) = (
                file("input.csv"),
                file("raw.csv"),
                file("pred.csv"),
                file("job.toml"),
            );

            let mut writer = StructureCsvWriter::create(&input)?;
            ctx.store
                .for_each_in_range::<EngineError, _>(plan.first.get()..=plan.last.get(), |candidate| {
                    if !scored.contains(&candidate.id) {
                        writer.write(&candidate)?;
                    }
                    Ok(())
                })?;
            let written = writer.finish()?;
            total += written;

            let predictor = prediction.command.as_ref().map(|command| {
                command.render(
                    &Placeholders::new()
                        .input(&input)
                        .output(&raw_output)
                        .job(&job_path)
                        .model(&ctx.layout.model_path(iteration))
                        .iteration(iteration),
                )
            });
            let job = ChunkJob {
                chunk: plan.chunk,
                input,
                raw_output,
                output,
                cutoff,
                id_column: prediction.columns.id_column.clone(),
                score_column: prediction.columns.score_column.clone(),
                delimiter: char::from(prediction.columns.delimiter),
                predictor,
            };
            job.save(&job_path)?;
            debug!("Chunk {} for worker {}: {} candidates", plan.chunk, plan.worker, written);
            chunks.push(ShardedChunk {
                plan,
                job_path,
                candidates: written,
            });
            ctx.reporter.report(Progress::TaskIncrement);
        }
        ctx.reporter.report(Progress::TaskFinish);
        Ok::<_, EngineError>((chunks, total))
    })?;

    info!(
        "Sharded {} unscored candidates into {} chunks (cutoff {})",
        total,
        chunks.len(),
        cutoff
    );
    Ok(ShardReport {
        cutoff,
        chunks,
        candidates: total,
    })
}

#[derive(Serialize)]
struct FilteredRow {
    identifier: u64,
    predicted_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRunReport {
    pub rows: usize,
    pub kept: usize,
    pub dropped: usize,
}

/// Worker entry point: runs the chunk's predictor, if any, and filters its
/// output by the cutoff.
///
/// The filtered file is written under a temporary name and renamed into place,
/// so its presence means the chunk is complete.
pub fn run_chunk(job_path: &Path, launcher: &dyn JobLauncher) -> Result<ChunkRunReport, EngineError> {
    let job = ChunkJob::load(job_path)?;
    if let Some(predictor) = &job.predictor {
        launcher.launch(predictor)?;
    }

    let rows = read_score_rows(&job.raw_output, &job.columns())?;
    let mut kept = Vec::new();
    let mut dropped = 0;
    for row in &rows {
        let id = row.id.parse::<CandidateId>();
        let score = row.score.parse::<f64>();
        match (id, score) {
            (Ok(id), Ok(score)) if score.is_finite() => {
                if score <= job.cutoff {
                    kept.push(FilteredRow {
                        identifier: id.get(),
                        predicted_score: score,
                    });
                }
            }
            _ => dropped += 1,
        }
    }
    if dropped > 0 {
        warn!("Dropped {} unparseable predictions from {:?}", dropped, job.raw_output);
    }

    let partial = job.output.with_extension("partial");
    let count = write_records(&partial, kept)?;
    std::fs::rename(&partial, &job.output).map_err(|e| EngineError::io(&job.output, e))?;
    info!(
        "Chunk {}: kept {} of {} predictions at or below {}",
        job.chunk,
        count,
        rows.len(),
        job.cutoff
    );
    Ok(ChunkRunReport {
        rows: rows.len(),
        kept: count,
        dropped,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictionImport {
    pub files: usize,
    pub loaded: usize,
    pub already_scored: usize,
}

/// Filtered chunk outputs expected for `iteration`, or a precondition error
/// naming the first missing ones.
fn filtered_outputs(ctx: &ScreenContext, iteration: u32) -> Result<Vec<PathBuf>, EngineError> {
    let predict_dir = ctx.layout.predict_dir(iteration);
    let mut jobs = Vec::new();
    for worker_dir in list_dirs(&predict_dir, "worker_")? {
        jobs.extend(list_files(&worker_dir, "chunk_", ".job.toml")?);
    }
    if jobs.is_empty() {
        return Err(EngineError::Precondition {
            action: Action::ImportPredictions,
            artifact: format!("chunk jobs under {}", predict_dir.display()),
            producer: "shard-predictions",
        });
    }

    let outputs: Vec<PathBuf> = jobs
        .iter()
        .map(|job| ChunkJob::load(job).map(|j| j.output))
        .collect::<Result<_, _>>()?;
    let missing: Vec<String> = outputs
        .iter()
        .filter(|p| !p.is_file())
        .map(|p| p.display().to_string())
        .collect();
    if !missing.is_empty() {
        let shown: Vec<_> = missing.iter().take(5).cloned().collect();
        return Err(EngineError::Precondition {
            action: Action::ImportPredictions,
            artifact: format!(
                "{} filtered chunk outputs (e.g. {})",
                missing.len(),
                shown.join(", ")
            ),
            producer: "run-chunk on every chunk job",
        });
    }
    Ok(outputs)
}

fn list_dirs(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, EngineError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(EngineError::io(dir, e)),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::io(dir, e))?;
        let path = entry.path();
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(prefix));
        if matches && path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Parses one filtered output strictly: any malformed row is fatal.
fn parse_filtered(path: &Path) -> Result<Vec<(CandidateId, f64)>, EngineError> {
    let columns = ScoreColumns::new(FILTERED_ID, FILTERED_SCORE, b',');
    read_score_rows(path, &columns)?
        .into_iter()
        .map(|row| -> Result<(CandidateId, f64), EngineError> {
            let bad = |message: String| EngineError::Parse {
                path: path.to_path_buf(),
                line: row.line,
                message,
            };
            let id = row.id.parse::<CandidateId>().map_err(|e| bad(e.to_string()))?;
            let score = row
                .score
                .parse::<f64>()
                .ok()
                .filter(|s| s.is_finite())
                .ok_or_else(|| bad(format!("'{}' is not a valid predicted score", row.score)))?;
            Ok((id, score))
        })
        .collect()
}

/// Replaces the screen's prediction table with the filtered outputs of
/// `iteration`.
#[instrument(skip_all, fields(screen = %ctx.screen(), iteration))]
pub fn import_predictions(
    ctx: &mut ScreenContext,
    iteration: u32,
) -> Result<PredictionImport, EngineError> {
    let outputs = filtered_outputs(ctx, iteration)?;
    let (loaded, already_scored) = ctx.reporter.phase("Prediction Import", || {
        let parsed: Vec<Vec<(CandidateId, f64)>> = outputs
            .par_iter()
            .map(|path| parse_filtered(path))
            .collect::<Result<_, _>>()?;

        ctx.store.replace_predictions::<_, EngineError, _>(ctx.screen(), |sink| {
            let (mut loaded, mut already_scored) = (0, 0);
            for (id, score) in parsed.iter().flatten() {
                match sink.insert(*id, *score)? {
                    PredictionLoad::Inserted => loaded += 1,
                    PredictionLoad::AlreadyScored => already_scored += 1,
                }
            }
            Ok((loaded, already_scored))
        })
    })?;

    if already_scored > 0 {
        warn!("Ignored {} predictions for already scored candidates", already_scored);
    }
    info!("Loaded {} predictions from {} files", loaded, outputs.len());
    Ok(PredictionImport {
        files: outputs.len(),
        loaded,
        already_scored,
    })
}

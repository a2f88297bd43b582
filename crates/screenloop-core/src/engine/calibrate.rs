use super::context::ScreenContext;
use super::error::EngineError;
use super::jobs::{ExternalJobSpec, Placeholders};
use super::layout::{list_files, prepare_dir};
use super::partition::shard_ranges;
use super::state::Action;
use super::utils::sampling::sample_unscored_up_to;
use super::utils::stats::{mean_and_std, round1};
use crate::core::io::table::{StructureCsvWriter, read_score_rows};
use std::path::PathBuf;
use tracing::{info, instrument, warn};

const INPUT_SUFFIX: &str = ".input.csv";

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationOutcome {
    /// A cutoff was already recorded; nothing was touched.
    AlreadyCalibrated { cutoff: f64 },
    /// Sample inputs were written and now await predictions.
    SamplesWritten {
        candidates: usize,
        inputs: Vec<PathBuf>,
        jobs: Vec<ExternalJobSpec>,
    },
    Calibrated {
        cutoff: f64,
        mean: f64,
        std_dev: f64,
        valid: usize,
        skipped: usize,
    },
}

/// Runs whichever calibration phase applies to `iteration`.
#[instrument(skip_all, fields(screen = %ctx.screen(), iteration))]
pub fn calibrate(ctx: &mut ScreenContext, iteration: u32) -> Result<CalibrationOutcome, EngineError> {
    if let Some(cutoff) = ctx.cutoff(iteration) {
        info!("Cutoff {} already recorded for iteration {}", cutoff, iteration);
        return Ok(CalibrationOutcome::AlreadyCalibrated { cutoff });
    }

    let dir = ctx.layout.calibration_dir(iteration);
    let inputs = list_files(&dir, "sample_", INPUT_SUFFIX)?;
    let outputs: Vec<(PathBuf, PathBuf)> = inputs
        .iter()
        .map(|input| (input.clone(), prediction_path(input)))
        .collect();
    let present = outputs.iter().filter(|(_, out)| out.is_file()).count();

    if inputs.is_empty() || present == 0 {
        return write_samples(ctx, iteration);
    }
    if present < outputs.len() {
        let missing: Vec<String> = outputs
            .iter()
            .filter(|(_, out)| !out.is_file())
            .map(|(_, out)| out.display().to_string())
            .collect();
        return Err(EngineError::Precondition {
            action: Action::Calibrate,
            artifact: format!("sample predictions {}", missing.join(", ")),
            producer: "the predictor on the calibration samples",
        });
    }

    let files: Vec<PathBuf> = outputs.into_iter().map(|(_, out)| out).collect();
    compute_cutoff(ctx, iteration, &files)
}

fn prediction_path(input: &std::path::Path) -> PathBuf {
    let name = input
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(INPUT_SUFFIX))
        .unwrap_or("sample");
    input.with_file_name(format!("{name}.pred.csv"))
}

fn write_samples(ctx: &mut ScreenContext, iteration: u32) -> Result<CalibrationOutcome, EngineError> {
    let population = ctx.store.population_size()?;
    let quota = ctx.config.calibration_quota(population);
    let scored = ctx.store.scored_ids(ctx.screen())?;
    let ids = sample_unscored_up_to(population, &scored, quota, ctx.rng());
    let candidates = ctx.store.candidates(&ids)?;

    let dir = ctx.layout.calibration_dir(iteration);
    prepare_dir(&dir, "sample_")?;

    let workers = ctx.config.calibration.workers;
    let mut inputs = Vec::with_capacity(workers);
    let mut jobs = Vec::new();
    for (offset, range) in shard_ranges(candidates.len(), workers).into_iter().enumerate() {
        let index = offset + 1;
        let input = ctx.layout.sample_file(iteration, index, "input.csv");
        let mut writer = StructureCsvWriter::create(&input)?;
        for candidate in &candidates[range] {
            writer.write(candidate)?;
        }
        writer.finish()?;

        if let Some(command) = &ctx.config.prediction.command {
            let job_path = ctx.layout.sample_file(iteration, index, "job.toml");
            let job = command.render(
                &Placeholders::new()
                    .input(&input)
                    .output(&ctx.layout.sample_file(iteration, index, "pred.csv"))
                    .job(&job_path)
                    .model(&ctx.layout.model_path(iteration))
                    .iteration(iteration),
            );
            let text = toml::to_string(&job)
                .map_err(|e| EngineError::Internal(format!("cannot serialize job: {e}")))?;
            std::fs::write(&job_path, text).map_err(|e| EngineError::io(&job_path, e))?;
            jobs.push(job);
        }
        inputs.push(input);
    }

    info!(
        "Wrote {} calibration candidates in {} sample files",
        candidates.len(),
        inputs.len()
    );
    Ok(CalibrationOutcome::SamplesWritten {
        candidates: candidates.len(),
        inputs,
        jobs,
    })
}

fn compute_cutoff(
    ctx: &mut ScreenContext,
    iteration: u32,
    files: &[PathBuf],
) -> Result<CalibrationOutcome, EngineError> {
    let reporter = ctx.reporter;
    let (cutoff, mean, std_dev, scores, skipped) = reporter.phase("Cutoff Calibration", || {
        let columns = &ctx.config.prediction.columns;
        let mut scores = Vec::new();
        let mut skipped = 0;
        for file in files {
            for row in read_score_rows(file, columns)? {
                match row.score.parse::<f64>() {
                    Ok(score) if score.is_finite() => scores.push(score),
                    _ => skipped += 1,
                }
            }
        }
        if skipped > 0 {
            warn!("Skipped {} unparseable calibration predictions", skipped);
        }

        let (mean, std_dev) = match mean_and_std(&scores) {
            Some(stats) if scores.len() >= 2 => stats,
            _ => {
                return Err(EngineError::InsufficientSample {
                    valid: scores.len(),
                });
            }
        };
        let cutoff = round1(mean - ctx.config.calibration.sigma_offset * std_dev);
        let cutoff = ctx.set_cutoff(iteration, cutoff)?;

        let cutoff_file = ctx.layout.cutoff_file(iteration);
        std::fs::write(&cutoff_file, format!("{cutoff}\n"))
            .map_err(|e| EngineError::io(&cutoff_file, e))?;
        Ok::<_, EngineError>((cutoff, mean, std_dev, scores, skipped))
    })?;

    info!(
        mean,
        std_dev,
        valid = scores.len(),
        "Cutoff for iteration {} is {}",
        iteration,
        cutoff
    );
    Ok(CalibrationOutcome::Calibrated {
        cutoff,
        mean,
        std_dev,
        valid: scores.len(),
        skipped,
    })
}

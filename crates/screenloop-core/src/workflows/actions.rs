use crate::core::io::reference::ReferenceScores;
use crate::core::io::template::JobTemplate;
use crate::engine::calibrate::{self, CalibrationOutcome};
use crate::engine::context::ScreenContext;
use crate::engine::error::EngineError;
use crate::engine::jobs::JobLauncher;
use crate::engine::merge::{self, ImportReport};
use crate::engine::partition::{ShardFiles, write_batch};
use crate::engine::predict::{self, PredictionImport, ShardReport};
use crate::engine::selection::choose_batch;
use crate::engine::simulate::{SimulationReport, simulate_evaluation};
use crate::engine::state::Action;
use crate::engine::training::{self, TrainingExport};
use std::path::PathBuf;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq)]
pub struct SelectOutcome {
    pub iteration: u32,
    pub selected: usize,
    pub shards: Vec<ShardFiles>,
}

/// Chooses and shards the next evaluation batch.
///
/// From `seeded` this starts iteration 1; from `predictions-ready` it starts
/// the next iteration; from `batch-selected` it rewrites the current batch
/// with the same random draw.
#[instrument(skip_all, name = "select_action")]
pub fn select(ctx: &mut ScreenContext) -> Result<SelectOutcome, EngineError> {
    let iteration = ctx.record().selection_iteration();
    ctx.begin(Action::Select, iteration)?;
    let template = match &ctx.config.selection.job_template {
        Some(path) => Some(JobTemplate::load(path)?),
        None => None,
    };

    let reporter = ctx.reporter;
    let (batch, shards) = reporter.phase("Batch Selection", || {
        let batch = choose_batch(ctx, iteration)?;
        let shards = write_batch(
            &ctx.layout,
            iteration,
            &batch,
            ctx.config.selection.workers,
            template.as_ref(),
        )?;
        Ok::<_, EngineError>((batch, shards))
    })?;

    ctx.complete(Action::Select, iteration)?;
    Ok(SelectOutcome {
        iteration,
        selected: batch.len(),
        shards,
    })
}

#[instrument(skip_all, name = "import_results_action")]
pub fn import_results(
    ctx: &mut ScreenContext,
    files: &[PathBuf],
) -> Result<ImportReport, EngineError> {
    let iteration = ctx.iteration();
    ctx.begin(Action::ImportResults, iteration)?;
    let report = merge::import_results(ctx, iteration, files)?;
    ctx.complete(Action::ImportResults, iteration)?;
    Ok(report)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainOutcome {
    pub export: TrainingExport,
    pub trainer_launched: bool,
}

/// Exports the training split and runs the trainer, if one is configured.
#[instrument(skip_all, name = "train_action")]
pub fn train(ctx: &mut ScreenContext, launcher: &dyn JobLauncher) -> Result<TrainOutcome, EngineError> {
    let iteration = ctx.iteration();
    ctx.begin(Action::Train, iteration)?;
    let export = training::export_training_set(ctx, iteration)?;
    let trainer_launched = training::launch_trainer(ctx, iteration, launcher)?;
    ctx.complete(Action::Train, iteration)?;
    Ok(TrainOutcome {
        export,
        trainer_launched,
    })
}

/// Writes calibration samples, or derives the cutoff once their predictions
/// exist. The state only advances once a cutoff is recorded.
#[instrument(skip_all, name = "calibrate_action")]
pub fn calibrate(ctx: &mut ScreenContext) -> Result<CalibrationOutcome, EngineError> {
    let iteration = ctx.iteration();
    ctx.begin(Action::Calibrate, iteration)?;
    let outcome = calibrate::calibrate(ctx, iteration)?;
    match &outcome {
        CalibrationOutcome::SamplesWritten { inputs, .. } => {
            info!(
                "Wrote {} calibration sample files; run the predictor on them and rerun 'calibrate'",
                inputs.len()
            );
        }
        CalibrationOutcome::Calibrated { .. } | CalibrationOutcome::AlreadyCalibrated { .. } => {
            ctx.complete(Action::Calibrate, iteration)?;
        }
    }
    Ok(outcome)
}

/// Writes prediction chunks for the current iteration. The cutoff is checked
/// before the state so that nothing is written without one.
#[instrument(skip_all, name = "shard_predictions_action")]
pub fn shard_predictions(ctx: &mut ScreenContext) -> Result<ShardReport, EngineError> {
    let iteration = ctx.iteration();
    if ctx.cutoff(iteration).is_none() {
        return Err(EngineError::MissingCutoff { iteration });
    }
    ctx.begin(Action::ShardPredictions, iteration)?;
    predict::shard_predictions(ctx, iteration)
}

#[instrument(skip_all, name = "import_predictions_action")]
pub fn import_predictions(ctx: &mut ScreenContext) -> Result<PredictionImport, EngineError> {
    let iteration = ctx.iteration();
    ctx.begin(Action::ImportPredictions, iteration)?;
    let import = predict::import_predictions(ctx, iteration)?;
    ctx.complete(Action::ImportPredictions, iteration)?;
    Ok(import)
}

/// Writes evaluator-style score files for the selected batch from a reference
/// library. The state is unchanged; run `import-results` afterwards.
#[instrument(skip_all, name = "simulate_action")]
pub fn simulate(
    ctx: &mut ScreenContext,
    reference: &ReferenceScores,
) -> Result<SimulationReport, EngineError> {
    let iteration = ctx.iteration();
    Action::ImportResults.check(ctx.state())?;
    simulate_evaluation(ctx, iteration, reference)
}

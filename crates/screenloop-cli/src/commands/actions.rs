//! Hand-operated actions: each runs exactly one step of the iteration loop.

use super::with_screen;
use crate::cli::{ImportResultsArgs, ScreenArgs};
use crate::error::Result;
use crate::ui::UiEvent;
use screenloop::engine::calibrate::CalibrationOutcome;
use screenloop::engine::jobs::ProcessLauncher;
use screenloop::workflows::actions;
use tokio::sync::mpsc;
use tracing::info;

pub async fn select(args: ScreenArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let outcome = with_screen(&args, None, &ui_sender, |ctx| Ok(actions::select(ctx)?))?;
    println!(
        "Iteration {}: selected {} candidates in {} shards.",
        outcome.iteration,
        outcome.selected,
        outcome.shards.len()
    );
    for shard in &outcome.shards {
        let target = shard.descriptor.as_ref().unwrap_or(&shard.work_list);
        println!("  shard {:>3}: {:>8} candidates  {}", shard.index, shard.size, target.display());
    }
    Ok(())
}

pub async fn import_results(args: ImportResultsArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let report = with_screen(&args.screen, None, &ui_sender, |ctx| {
        Ok(actions::import_results(ctx, &args.files)?)
    })?;
    println!(
        "Imported {} rows from {} files: {} new, {} improved, {} unchanged.",
        report.rows,
        report.files,
        report.upsert.inserted,
        report.upsert.improved,
        report.upsert.unchanged
    );
    if report.failed > 0 || report.skipped > 0 || report.missing_penalized > 0 {
        println!(
            "  {} failed scores substituted, {} rows skipped, {} missing candidates penalized.",
            report.failed, report.skipped, report.missing_penalized
        );
    }
    Ok(())
}

pub async fn train(args: ScreenArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let outcome = with_screen(&args, None, &ui_sender, |ctx| {
        Ok(actions::train(ctx, &ProcessLauncher)?)
    })?;
    let export = outcome.export;
    println!(
        "Exported {} training, {} validation and {} test rows ({} excluded).",
        export.train, export.valid, export.test, export.excluded
    );
    if outcome.trainer_launched {
        println!("Trainer finished.");
    } else {
        println!("No trainer configured; train the model on the exported files before 'calibrate'.");
    }
    Ok(())
}

pub async fn calibrate(args: ScreenArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let outcome = with_screen(&args, None, &ui_sender, |ctx| Ok(actions::calibrate(ctx)?))?;
    match outcome {
        CalibrationOutcome::AlreadyCalibrated { cutoff } => {
            println!("Cutoff already recorded: {cutoff}");
        }
        CalibrationOutcome::SamplesWritten {
            candidates,
            inputs,
            jobs,
        } => {
            println!(
                "Wrote {} calibration candidates to {} sample files.",
                candidates,
                inputs.len()
            );
            for job in &jobs {
                println!("  {} {}", job.program, job.args.join(" "));
            }
            println!("Run the predictor on each sample, then rerun 'calibrate'.");
        }
        CalibrationOutcome::Calibrated {
            cutoff,
            mean,
            std_dev,
            valid,
            skipped,
        } => {
            info!(mean, std_dev, skipped, "Calibration statistics");
            println!(
                "Cutoff {cutoff} from {valid} predictions (mean {mean:.3}, std dev {std_dev:.3})."
            );
        }
    }
    Ok(())
}

pub async fn shard_predictions(args: ScreenArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let report = with_screen(&args, None, &ui_sender, |ctx| {
        Ok(actions::shard_predictions(ctx)?)
    })?;
    println!(
        "Wrote {} chunks covering {} candidates at cutoff {}.",
        report.chunks.len(),
        report.candidates,
        report.cutoff
    );
    for (worker, jobs) in report.jobs_by_worker() {
        let paths: Vec<String> = jobs.iter().map(|p| p.display().to_string()).collect();
        println!("  worker {worker}: screenloop run-chunk {}", paths.join(" "));
    }
    Ok(())
}

pub async fn import_predictions(args: ScreenArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let import = with_screen(&args, None, &ui_sender, |ctx| {
        Ok(actions::import_predictions(ctx)?)
    })?;
    println!(
        "Loaded {} predictions from {} files ({} already scored).",
        import.loaded, import.files, import.already_scored
    );
    Ok(())
}

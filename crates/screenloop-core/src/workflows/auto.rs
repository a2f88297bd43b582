use super::actions;
use crate::core::io::template::JobTemplate;
use crate::engine::calibrate::CalibrationOutcome;
use crate::engine::config::ConfigError;
use crate::engine::context::ScreenContext;
use crate::engine::error::EngineError;
use crate::engine::jobs::{ExternalJobSpec, JobLauncher, Placeholders};
use crate::engine::layout::list_files;
use crate::engine::predict::run_chunk;
use crate::engine::progress::Progress;
use crate::engine::state::IterationState;
use rayon::prelude::*;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Iterations whose evaluator results were imported during this run.
    pub iterations_evaluated: u32,
    pub final_iteration: u32,
    pub final_state: IterationState,
}

/// Drives the screen from its current state until `stop-after` iterations
/// have been evaluated, launching the configured evaluator, trainer and
/// predictor through `launcher`.
///
/// The loop stops once the last iteration's results are imported; no model is
/// trained for a batch that will never be selected.
#[instrument(skip_all, name = "auto_run", fields(screen = %ctx.screen()))]
pub fn run(ctx: &mut ScreenContext, launcher: &dyn JobLauncher) -> Result<RunSummary, EngineError> {
    let stop_after = ctx
        .config
        .stop_after
        .ok_or(ConfigError::MissingParameter("stop-after"))?;
    let mut evaluated = 0;

    loop {
        let state = ctx.state();
        let iteration = ctx.iteration();
        if state == IterationState::BatchEvaluated && iteration >= stop_after {
            break;
        }
        if state == IterationState::PredictionsReady && iteration >= stop_after {
            break;
        }
        ctx.reporter.report(Progress::Message(format!(
            "Iteration {iteration}: {state}"
        )));

        match state {
            IterationState::Seeded | IterationState::PredictionsReady => {
                actions::select(ctx)?;
            }
            IterationState::BatchSelected => {
                launcher.launch_all(&evaluator_jobs(ctx)?)?;
                actions::import_results(ctx, &[])?;
                evaluated += 1;
            }
            IterationState::BatchEvaluated => {
                actions::train(ctx, launcher)?;
            }
            IterationState::ModelTrained => {
                if let CalibrationOutcome::SamplesWritten { jobs, .. } = actions::calibrate(ctx)? {
                    if ctx.config.prediction.command.is_none() {
                        return Err(ConfigError::MissingParameter("prediction.command").into());
                    }
                    launcher.launch_all(&jobs)?;
                    actions::calibrate(ctx)?;
                }
            }
            IterationState::CutoffCalibrated => {
                let report = actions::shard_predictions(ctx)?;
                report
                    .jobs_by_worker()
                    .par_iter()
                    .try_for_each(|(_, jobs)| {
                        jobs.iter()
                            .try_for_each(|job| run_chunk(job, launcher).map(|_| ()))
                    })?;
                actions::import_predictions(ctx)?;
            }
        }
    }

    let summary = RunSummary {
        iterations_evaluated: evaluated,
        final_iteration: ctx.iteration(),
        final_state: ctx.state(),
    };
    info!(?summary, "Automatic run finished");
    Ok(summary)
}

/// One evaluator invocation per batch shard. `{input}` is the shard's job
/// descriptor when a template is configured, otherwise its work list.
fn evaluator_jobs(ctx: &ScreenContext) -> Result<Vec<ExternalJobSpec>, EngineError> {
    let evaluation = &ctx.config.evaluation;
    let command = evaluation
        .command
        .as_ref()
        .ok_or(ConfigError::MissingParameter("evaluation.command"))?;
    let iteration = ctx.iteration();
    let batch_dir = ctx.layout.batch_dir(iteration);
    let work_lists = list_files(&batch_dir, "shard_", ".smi")?;
    let template = match &ctx.config.selection.job_template {
        Some(path) => Some(JobTemplate::load(path)?),
        None => None,
    };

    Ok(work_lists
        .iter()
        .enumerate()
        .map(|(offset, work_list)| {
            let shard = offset + 1;
            let input = match &template {
                Some(template) => ctx
                    .layout
                    .shard_descriptor(iteration, shard, template.extension()),
                None => work_list.clone(),
            };
            command.render(
                &Placeholders::new()
                    .input(&input)
                    .output(&ctx.layout.shard_scores(
                        iteration,
                        shard,
                        &evaluation.results_suffix,
                    ))
                    .job(&input)
                    .iteration(iteration),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::table::read_work_list;
    use crate::engine::context::test_support::Fixture;
    use crate::engine::jobs::CommandTemplate;
    use crate::engine::jobs::testing::RecordingLauncher;
    use std::path::Path;

    fn command(program: &str, args: &[&str]) -> Option<CommandTemplate> {
        Some(CommandTemplate {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        })
    }

    /// Fakes every external program: the evaluator scores each candidate by
    /// its identifier, the predictor echoes the same score for its inputs.
    fn fake_programs(job: &ExternalJobSpec) -> std::io::Result<()> {
        let (input, output) = (Path::new(&job.args[0]), Path::new(&job.args[1]));
        let mut text = String::new();
        match job.program.as_str() {
            "dock" => {
                text.push_str("identifier,score\n");
                for (_, id) in read_work_list(input).map_err(std::io::Error::other)? {
                    text.push_str(&format!("{id},{}\n", -(id.get() as f64) / 10.0));
                }
            }
            "predict" => {
                text.push_str("identifier,predicted_score\n");
                let body = std::fs::read_to_string(input)?;
                for line in body.lines().skip(1) {
                    let id: u64 = line.rsplit(',').next().unwrap_or("0").parse().unwrap_or(0);
                    text.push_str(&format!("{id},{}\n", -(id as f64) / 10.0));
                }
            }
            _ => return Ok(()),
        }
        std::fs::write(output, text)
    }

    #[test]
    fn runs_until_the_requested_iteration_is_evaluated() {
        let mut fixture = Fixture::new(300, 0.02, 2);
        fixture.config.stop_after = Some(2);
        fixture.config.prediction.chunk_size = 100;
        fixture.config.prediction.workers = 2;
        fixture.config.calibration.sample_fraction = 0.1;
        fixture.config.evaluation.command = command("dock", &["{input}", "{output}"]);
        fixture.config.training.command = command("fit", &["{train}", "{model}"]);
        fixture.config.prediction.command = command("predict", &["{input}", "{output}"]);
        let mut ctx = fixture.context();
        let launcher = RecordingLauncher::with_hook(fake_programs);

        let summary = run(&mut ctx, &launcher).unwrap();
        assert_eq!(
            summary,
            RunSummary {
                iterations_evaluated: 2,
                final_iteration: 2,
                final_state: IterationState::BatchEvaluated
            }
        );
        assert_eq!(ctx.store.result_count("test").unwrap(), 12);

        let programs: Vec<String> = launcher.jobs().into_iter().map(|j| j.program).collect();
        assert_eq!(programs.iter().filter(|p| *p == "dock").count(), 4);
        assert_eq!(programs.iter().filter(|p| *p == "fit").count(), 1);
        assert!(programs.iter().filter(|p| *p == "predict").count() >= 4);

        // Predictions favour high identifiers, so the second batch is the top of the range.
        let second: Vec<u64> = ctx
            .store
            .results("test")
            .unwrap()
            .into_iter()
            .filter(|r| r.iteration == 2)
            .map(|r| r.id.get())
            .collect();
        assert!(second.iter().all(|&id| id > 250));
    }

    #[test]
    fn run_without_evaluator_is_a_configuration_error() {
        let mut fixture = Fixture::new(100, 0.1, 1);
        fixture.config.stop_after = Some(1);
        let mut ctx = fixture.context();
        let err = run(&mut ctx, &RecordingLauncher::new()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Config(ConfigError::MissingParameter("evaluation.command"))
        ));
        assert_eq!(ctx.state(), IterationState::BatchSelected);
    }

    #[test]
    fn run_requires_stop_after() {
        let mut fixture = Fixture::new(100, 0.1, 1);
        let mut ctx = fixture.context();
        assert!(matches!(
            run(&mut ctx, &RecordingLauncher::new()),
            Err(EngineError::Config(ConfigError::MissingParameter("stop-after")))
        ));
    }
}

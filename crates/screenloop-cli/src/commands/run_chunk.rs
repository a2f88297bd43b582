use crate::cli::RunChunkArgs;
use crate::error::Result;
use screenloop::engine::jobs::{JobLauncher, ProcessLauncher};
use screenloop::engine::predict::run_chunk;
use tracing::info;

pub async fn run(args: RunChunkArgs) -> Result<()> {
    tokio::task::block_in_place(|| run_jobs(&args, &ProcessLauncher))
}

/// Runs the jobs in order and stops at the first failure; chunks already
/// filtered stay complete.
fn run_jobs(args: &RunChunkArgs, launcher: &dyn JobLauncher) -> Result<()> {
    for job in &args.jobs {
        info!("Running chunk job {:?}", job);
        let report = run_chunk(job, launcher)?;
        println!(
            "{}: kept {} of {} predictions ({} unparseable).",
            job.display(),
            report.kept,
            report.rows,
            report.dropped
        );
    }
    Ok(())
}

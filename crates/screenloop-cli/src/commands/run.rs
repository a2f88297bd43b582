use super::with_screen;
use crate::cli::RunArgs;
use crate::error::Result;
use crate::ui::UiEvent;
use screenloop::engine::jobs::ProcessLauncher;
use screenloop::workflows::auto;
use tokio::sync::mpsc;

pub async fn run(args: RunArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let summary = with_screen(&args.screen, args.stop_after, &ui_sender, |ctx| {
        Ok(auto::run(ctx, &ProcessLauncher)?)
    })?;
    println!(
        "Evaluated {} iterations; screen is at iteration {} ({}).",
        summary.iterations_evaluated, summary.final_iteration, summary.final_state
    );
    Ok(())
}

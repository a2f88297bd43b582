use super::with_screen;
use crate::cli::SimulateArgs;
use crate::error::Result;
use crate::ui::UiEvent;
use screenloop::core::io::reference::ReferenceScores;
use screenloop::engine::error::EngineError;
use screenloop::workflows::actions;
use tokio::sync::mpsc;

pub async fn run(args: SimulateArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let reference = ReferenceScores::load(&args.reference).map_err(EngineError::from)?;
    let report = with_screen(&args.screen, None, &ui_sender, |ctx| {
        Ok(actions::simulate(ctx, &reference)?)
    })?;
    println!(
        "Wrote {} score files with {} scores ({} candidates missing from the reference).",
        report.files.len(),
        report.scored,
        report.missing
    );
    println!("Run 'import-results' to merge them.");
    Ok(())
}

use super::with_screen;
use crate::cli::ExportArgs;
use crate::error::{CliError, Result};
use crate::ui::UiEvent;
use screenloop::engine::report;
use tokio::sync::mpsc;

pub async fn run(args: ExportArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    if args.output.is_none() && args.predicted.is_none() {
        return Err(CliError::Argument(
            "Nothing to export: pass --output, --predicted or both.".to_string(),
        ));
    }

    with_screen(&args.screen, None, &ui_sender, |ctx| {
        if let Some(output) = &args.output {
            let cutoff = match args.cutoff {
                Some(cutoff) => cutoff,
                None => report::status(ctx)?.hit_threshold.ok_or_else(|| {
                    CliError::Argument(
                        "The screen has no results yet; pass --cutoff explicitly.".to_string(),
                    )
                })?,
            };
            let written = report::export_hits(ctx, cutoff, output)?;
            println!(
                "Wrote {} results at or below {} to {}.",
                written,
                cutoff,
                output.display()
            );
        }
        if let Some(predicted) = &args.predicted {
            let written = report::export_predicted(ctx, predicted)?;
            println!(
                "Wrote {} predicted candidates to {}.",
                written,
                predicted.display()
            );
        }
        Ok(())
    })
}

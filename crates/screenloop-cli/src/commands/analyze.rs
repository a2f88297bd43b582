use super::with_screen;
use crate::cli::AnalyzeArgs;
use crate::error::{CliError, Result};
use crate::ui::UiEvent;
use screenloop::core::io::reference::ReferenceScores;
use screenloop::engine::error::EngineError;
use screenloop::engine::report::{self, RecallReport};
use tokio::sync::mpsc;

pub async fn run(args: AnalyzeArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    if !(args.top_fraction > 0.0 && args.top_fraction <= 1.0) {
        return Err(CliError::Argument(format!(
            "--top-fraction must be in (0, 1], got {}",
            args.top_fraction
        )));
    }
    let reference = ReferenceScores::load(&args.reference).map_err(EngineError::from)?;
    let recall = with_screen(&args.screen, None, &ui_sender, |ctx| {
        Ok(report::analyze_recall(ctx, &reference, args.top_fraction)?)
    })?;
    print!("{}", render(&recall));
    Ok(())
}

fn render(recall: &RecallReport) -> String {
    let mut out = format!(
        "Reference top {} candidates score at or below {}.\n\nIteration  Found  Cumulative  Recall\n",
        recall.top, recall.cutoff
    );
    for row in &recall.rows {
        out.push_str(&format!(
            "{:>9}  {:>5}  {:>10}  {:>5.1}%\n",
            row.iteration,
            row.found,
            row.cumulative,
            row.recall * 100.0
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenloop::engine::report::RecallRow;

    #[test]
    fn render_prints_recall_as_percentage() {
        let recall = RecallReport {
            top: 10,
            cutoff: -11.5,
            rows: vec![RecallRow {
                iteration: 1,
                found: 4,
                cumulative: 4,
                recall: 0.4,
            }],
        };
        let text = render(&recall);
        assert!(text.starts_with("Reference top 10 candidates score at or below -11.5."));
        assert!(text.trim_end().ends_with("40.0%"));
    }
}

use super::with_screen;
use crate::cli::ScreenArgs;
use crate::error::Result;
use crate::ui::UiEvent;
use screenloop::engine::report::{self, StatusReport};
use tokio::sync::mpsc;

pub async fn run(args: ScreenArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let status = with_screen(&args, None, &ui_sender, |ctx| Ok(report::status(ctx)?))?;
    print!("{}", render(&status));
    Ok(())
}

fn or_dash(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v}"))
}

fn render(status: &StatusReport) -> String {
    let mut out = format!(
        "Screen:      {}\nState:       {} (iteration {})\nPopulation:  {}\nScored:      {} ({} excluded)\nPredictions: {}\nCutoff:      {}\nBest score:  {}\nHit below:   {}\n",
        status.screen,
        status.state,
        status.iteration,
        status.population,
        status.scored,
        status.excluded,
        status.predictions,
        or_dash(status.cutoff),
        or_dash(status.best),
        or_dash(status.hit_threshold),
    );
    if !status.per_iteration.is_empty() {
        out.push_str("\nIteration  Evaluated  Hits  Cumulative\n");
        for row in &status.per_iteration {
            out.push_str(&format!(
                "{:>9}  {:>9}  {:>4}  {:>10}\n",
                row.iteration, row.evaluated, row.hits, row.cumulative_hits
            ));
        }
    }
    out
}

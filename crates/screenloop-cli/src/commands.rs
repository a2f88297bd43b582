pub mod actions;
pub mod analyze;
pub mod export;
pub mod import;
pub mod run;
pub mod run_chunk;
pub mod simulate;
pub mod status;

use crate::cli::ScreenArgs;
use crate::config::build_config;
use crate::error::Result;
use crate::ui::{CliProgressHandler, UiEvent};
use screenloop::core::store::Store;
use screenloop::engine::context::ScreenContext;
use screenloop::engine::progress::ProgressReporter;
use tokio::sync::mpsc;
use tracing::info;

/// Resolves the configuration, opens the screen and runs `work` on it
/// outside the async executor.
pub(crate) fn with_screen<T>(
    args: &ScreenArgs,
    stop_after: Option<u32>,
    ui_sender: &mpsc::Sender<UiEvent>,
    work: impl FnOnce(&mut ScreenContext<'_>) -> Result<T>,
) -> Result<T> {
    let config = build_config(args, stop_after)?;
    info!(
        "Opening screen '{}' in {:?}",
        config.name, config.database
    );
    let store = Store::open(&config.database)?;
    let progress_handler = CliProgressHandler::new(ui_sender.clone());
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let mut ctx = ScreenContext::new(store, &config, &reporter)?;
    tokio::task::block_in_place(|| work(&mut ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{ExportArgs, ImportArgs, ImportResultsArgs, SimulateArgs};
    use crate::error::CliError;
    use screenloop::engine::error::EngineError;
    use screenloop::engine::report;
    use screenloop::engine::state::IterationState;
    use std::fs;
    use std::path::Path;

    fn write_protocol(dir: &Path) -> ScreenArgs {
        let protocol = dir.join("protocol.toml");
        fs::write(
            &protocol,
            format!(
                "name = \"demo\"\ndatabase = '{}'\nworkdir = '{}'\n\n[selection]\nbatch-fraction = 0.25\nworkers = 2\n",
                dir.join("lib.redb").display(),
                dir.join("work").display()
            ),
        )
        .unwrap();
        ScreenArgs {
            protocol: Some(protocol),
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn hand_operated_iteration_through_the_commands() {
        let dir = tempfile::tempdir().unwrap();
        let (sender, _receiver) = mpsc::channel(1024);

        let library = dir.path().join("library.smi");
        let rows: String = (1..=20).map(|i| format!("C{i} mol{i}\n")).collect();
        fs::write(&library, rows).unwrap();
        let reference = dir.path().join("reference.txt");
        let scores: String = (1..=20).map(|i| format!("-{i} mol{i}\n")).collect();
        fs::write(&reference, scores).unwrap();

        import::run(
            ImportArgs {
                input: library,
                database: dir.path().join("lib.redb"),
                delimiter: "space".to_string(),
                chunk_size: 8,
            },
            sender.clone(),
        )
        .await
        .unwrap();

        let screen = write_protocol(dir.path());
        actions::select(screen.clone(), sender.clone()).await.unwrap();
        simulate::run(
            SimulateArgs {
                screen: screen.clone(),
                reference,
            },
            sender.clone(),
        )
        .await
        .unwrap();
        actions::import_results(
            ImportResultsArgs {
                screen: screen.clone(),
                files: Vec::new(),
            },
            sender.clone(),
        )
        .await
        .unwrap();

        let status = with_screen(&screen, None, &sender, |ctx| Ok(report::status(ctx)?)).unwrap();
        assert_eq!(status.state, IterationState::BatchEvaluated);
        assert_eq!(status.iteration, 1);
        assert_eq!(status.scored, 5);

        let hits = dir.path().join("hits.csv");
        export::run(
            ExportArgs {
                screen: screen.clone(),
                output: Some(hits.clone()),
                cutoff: Some(0.0),
                predicted: None,
            },
            sender.clone(),
        )
        .await
        .unwrap();
        let exported = fs::read_to_string(&hits).unwrap();
        assert_eq!(exported.lines().count(), 6);
        assert!(exported.starts_with("representation,label,identifier,score,iteration"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn actions_out_of_order_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (sender, _receiver) = mpsc::channel(1024);
        let library = dir.path().join("library.smi");
        fs::write(&library, "C1 mol1\nC2 mol2\nC3 mol3\nC4 mol4\n").unwrap();
        import::run(
            ImportArgs {
                input: library,
                database: dir.path().join("lib.redb"),
                delimiter: "space".to_string(),
                chunk_size: 100,
            },
            sender.clone(),
        )
        .await
        .unwrap();

        let screen = write_protocol(dir.path());
        let result = actions::train(screen.clone(), sender.clone()).await;
        assert!(matches!(
            result,
            Err(CliError::Engine(EngineError::NotAllowed { .. }))
        ));

        let result = actions::shard_predictions(screen, sender).await;
        assert!(matches!(
            result,
            Err(CliError::Engine(EngineError::MissingCutoff { iteration: 0 }))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_database_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (sender, _receiver) = mpsc::channel(8);
        let screen = write_protocol(dir.path());
        let result = actions::select(screen, sender).await;
        assert!(matches!(result, Err(CliError::Store(_))));
    }
}

use crate::cli::ImportArgs;
use crate::error::{CliError, Result};
use crate::ui::{CliProgressHandler, UiEvent};
use crate::utils::parser;
use screenloop::core::store::{ImportOptions, Store};
use screenloop::engine::progress::ProgressReporter;
use std::fs::File;
use std::io::BufReader;
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(args: ImportArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let options = ImportOptions {
        delimiter: parser::parse_delimiter(&args.delimiter)
            .map_err(|e| CliError::Argument(e.to_string()))?,
        chunk_size: args.chunk_size,
    };
    let reader = BufReader::new(File::open(&args.input)?);

    info!("Importing {:?} into {:?}", &args.input, &args.database);
    let store = Store::create(&args.database)?;
    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    let summary =
        tokio::task::block_in_place(|| store.import_population(reader, &options, &reporter))?;

    match summary.first_id {
        Some(first) => println!(
            "Imported {} candidates (identifiers {} to {}); population is now {}.",
            summary.imported, first, summary.population, summary.population
        ),
        None => println!(
            "No candidates found in {}; population is {}.",
            args.input.display(),
            summary.population
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenloop::core::models::ids::CandidateId;
    use std::fs;

    #[tokio::test(flavor = "multi_thread")]
    async fn import_appends_with_dense_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let library = dir.path().join("library.smi");
        fs::write(&library, "CCO ethanol\nc1ccccc1 benzene\n").unwrap();
        let database = dir.path().join("lib.redb");
        let (sender, _receiver) = mpsc::channel(64);

        for _ in 0..2 {
            let args = ImportArgs {
                input: library.clone(),
                database: database.clone(),
                delimiter: "space".to_string(),
                chunk_size: 1,
            };
            run(args, sender.clone()).await.unwrap();
        }

        let store = Store::open(&database).unwrap();
        assert_eq!(store.population_size().unwrap(), 4);
        let third = store.candidate(CandidateId(3)).unwrap().unwrap();
        assert_eq!(third.label, "ethanol");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bad_delimiter_is_an_argument_error() {
        let (sender, _receiver) = mpsc::channel(8);
        let args = ImportArgs {
            input: "missing.smi".into(),
            database: "missing.redb".into(),
            delimiter: "pipe".to_string(),
            chunk_size: 10,
        };
        let result = run(args, sender).await;
        assert!(matches!(result, Err(CliError::Argument(_))));
    }
}

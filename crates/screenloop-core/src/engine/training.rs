use super::context::ScreenContext;
use super::error::EngineError;
use super::jobs::{JobLauncher, Placeholders};
use super::layout::{SplitPart, create_dir};
use super::state::Action;
use crate::core::io::table::write_records;
use crate::core::models::candidate::Candidate;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{info, instrument};

#[derive(Serialize)]
struct TrainingRow<'a> {
    representation: &'a str,
    identifier: u64,
    score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingExport {
    pub train: usize,
    pub valid: usize,
    pub test: usize,
    /// Result rows holding the exclusion sentinel.
    pub excluded: usize,
}

/// Sizes of the train and valid parts; the test part takes the rest.
fn split_sizes(total: usize, train: f64, valid: f64) -> (usize, usize) {
    let n_train = ((total as f64) * train).floor() as usize;
    let n_valid = (((total as f64) * valid).floor() as usize).min(total - n_train);
    (n_train, n_valid)
}

/// Writes every usable result row, shuffled, into the train, valid and test
/// files of `iteration`.
#[instrument(skip_all, fields(screen = %ctx.screen(), iteration))]
pub fn export_training_set(
    ctx: &mut ScreenContext,
    iteration: u32,
) -> Result<TrainingExport, EngineError> {
    let results = ctx.store.results(ctx.screen())?;
    let total = results.len();
    let mut usable: Vec<_> = results.into_iter().filter(|r| !r.is_excluded()).collect();
    let excluded = total - usable.len();
    if usable.is_empty() {
        return Err(EngineError::Precondition {
            action: Action::Train,
            artifact: "scored results usable for training".to_string(),
            producer: "import-results",
        });
    }

    usable.shuffle(ctx.rng());
    let ids: Vec<_> = usable.iter().map(|r| r.id).collect();
    let candidates: Vec<Candidate> = ctx.store.candidates(&ids)?;

    let split = ctx.config.training.split;
    let (n_train, n_valid) = split_sizes(usable.len(), split.train, split.valid);
    let bounds = [
        (SplitPart::Train, 0..n_train),
        (SplitPart::Valid, n_train..n_train + n_valid),
        (SplitPart::Test, n_train + n_valid..usable.len()),
    ];

    create_dir(&ctx.layout.train_dir(iteration))?;
    let mut counts = [0usize; 3];
    for (slot, (part, range)) in bounds.into_iter().enumerate() {
        let path = ctx.layout.train_file(iteration, part);
        let rows = usable[range.clone()]
            .iter()
            .zip(&candidates[range])
            .map(|(result, candidate)| TrainingRow {
                representation: &candidate.representation,
                identifier: result.id.get(),
                score: result.score,
            });
        counts[slot] = write_records(&path, rows)?;
    }

    let export = TrainingExport {
        train: counts[0],
        valid: counts[1],
        test: counts[2],
        excluded,
    };
    info!(?export, "Exported training data");
    Ok(export)
}

/// Launches the configured trainer for `iteration`, capturing its standard
/// output in `train/trainer.log`. Returns `false` when no trainer command is
/// configured.
pub fn launch_trainer(
    ctx: &ScreenContext,
    iteration: u32,
    launcher: &dyn JobLauncher,
) -> Result<bool, EngineError> {
    let Some(command) = &ctx.config.training.command else {
        info!(
            "No trainer command configured; train a model at {:?} from {:?}",
            ctx.layout.model_path(iteration),
            ctx.layout.train_dir(iteration)
        );
        return Ok(false);
    };
    let layout = &ctx.layout;
    let job = command
        .render(
            &Placeholders::new()
                .train(&layout.train_file(iteration, SplitPart::Train))
                .valid(&layout.train_file(iteration, SplitPart::Valid))
                .test(&layout.train_file(iteration, SplitPart::Test))
                .model(&layout.model_path(iteration))
                .iteration(iteration),
        )
        .with_stdout(layout.trainer_log(iteration));
    create_dir(&layout.train_dir(iteration))?;
    launcher.launch(&job)?;
    Ok(true)
}

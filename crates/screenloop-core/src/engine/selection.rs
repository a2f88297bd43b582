use super::context::ScreenContext;
use super::error::EngineError;
use super::utils::sampling::sample_unscored_up_to;
use crate::core::models::candidate::Candidate;
use crate::core::models::ids::CandidateId;
use tracing::{info, instrument, warn};

/// Chooses the candidates to evaluate in `iteration`, in shard order.
///
/// The first iteration samples uniformly among unscored candidates. Later
/// iterations take the unscored candidates with the lowest predictions,
/// ascending by `(prediction, id)`.
#[instrument(skip_all, fields(screen = %ctx.screen(), iteration))]
pub fn choose_batch(ctx: &mut ScreenContext, iteration: u32) -> Result<Vec<Candidate>, EngineError> {
    let population = ctx.store.population_size()?;
    let quota = ctx.config.batch_quota(population)?;

    let ids: Vec<CandidateId> = if iteration <= 1 {
        let scored = ctx.store.scored_ids(ctx.screen())?;
        sample_unscored_up_to(population, &scored, quota, ctx.rng())
    } else {
        let ranked = ctx.store.best_predictions(ctx.screen(), quota)?;
        if ranked.len() < quota {
            warn!(
                "Only {} predicted candidates are available for a batch of {}",
                ranked.len(),
                quota
            );
        }
        ranked.into_iter().map(|(id, _)| id).collect()
    };

    info!("Selected {} of {} candidates", ids.len(), population);
    Ok(ctx.store.candidates(&ids)?)
}

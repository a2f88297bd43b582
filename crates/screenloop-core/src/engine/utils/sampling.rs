use crate::core::models::ids::CandidateId;
use rand::Rng;
use rand::seq::index;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{instrument, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SamplingError {
    #[error("Requested {requested} candidates but only {available} are unscored")]
    NotEnoughCandidates { requested: usize, available: u64 },
}

/// Draws `n` distinct identifiers uniformly from `[1, population]`, skipping
/// those in `excluded`.
///
/// Sparse draws use rejection sampling; when more than half of the eligible
/// identifiers are requested, the eligible set is materialized and sampled by
/// index. The result is in draw order.
#[instrument(level = "debug", skip(excluded, rng), fields(excluded = excluded.len()))]
pub fn sample_unscored(
    population: u64,
    excluded: &HashSet<CandidateId>,
    n: usize,
    rng: &mut impl Rng,
) -> Result<Vec<CandidateId>, SamplingError> {
    let excluded_in_range = excluded
        .iter()
        .filter(|id| id.get() >= 1 && id.get() <= population)
        .count() as u64;
    let available = population - excluded_in_range;
    if n as u64 > available {
        return Err(SamplingError::NotEnoughCandidates {
            requested: n,
            available,
        });
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    if (n as u64) * 2 > available {
        let eligible: Vec<CandidateId> = (1..=population)
            .map(CandidateId)
            .filter(|id| !excluded.contains(id))
            .collect();
        return Ok(index::sample(rng, eligible.len(), n)
            .into_iter()
            .map(|i| eligible[i])
            .collect());
    }

    let mut chosen = HashSet::with_capacity(n);
    let mut order = Vec::with_capacity(n);
    while order.len() < n {
        let id = CandidateId(rng.gen_range(1..=population));
        if !excluded.contains(&id) && chosen.insert(id) {
            order.push(id);
        }
    }
    Ok(order)
}

/// Like [`sample_unscored`], but takes everything available with a warning
/// when fewer than `n` candidates remain.
pub fn sample_unscored_up_to(
    population: u64,
    excluded: &HashSet<CandidateId>,
    n: usize,
    rng: &mut impl Rng,
) -> Vec<CandidateId> {
    match sample_unscored(population, excluded, n, rng) {
        Ok(ids) => ids,
        Err(SamplingError::NotEnoughCandidates { available, .. }) => {
            warn!(
                "Only {} unscored candidates remain; taking all of them instead of {}",
                available, n
            );
            let all = available as usize;
            sample_unscored(population, excluded, all, rng).unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn draws_distinct_unscored_ids() {
        let mut rng = StdRng::seed_from_u64(11);
        let excluded: HashSet<_> = (1..=10).map(CandidateId).collect();
        let ids = sample_unscored(100, &excluded, 10, &mut rng).unwrap();
        let unique: HashSet<_> = ids.iter().copied().collect();
        assert_eq!(ids.len(), 10);
        assert_eq!(unique.len(), 10);
        assert!(ids.iter().all(|id| id.get() > 10 && id.get() <= 100));
    }

    #[test]
    fn dense_requests_use_the_materialized_path() {
        let mut rng = StdRng::seed_from_u64(3);
        let excluded: HashSet<_> = [CandidateId(2)].into_iter().collect();
        let mut ids = sample_unscored(5, &excluded, 4, &mut rng).unwrap();
        ids.sort();
        assert_eq!(ids, vec![CandidateId(1), CandidateId(3), CandidateId(4), CandidateId(5)]);
    }

    #[test]
    fn same_seed_gives_same_sample() {
        let excluded = HashSet::new();
        let a = sample_unscored(1_000, &excluded, 20, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = sample_unscored(1_000, &excluded, 20, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn over_request_fails_or_is_clamped() {
        let mut rng = StdRng::seed_from_u64(1);
        let excluded: HashSet<_> = [CandidateId(1)].into_iter().collect();
        assert_eq!(
            sample_unscored(3, &excluded, 3, &mut rng),
            Err(SamplingError::NotEnoughCandidates {
                requested: 3,
                available: 2
            })
        );
        assert_eq!(sample_unscored_up_to(3, &excluded, 3, &mut rng).len(), 2);
    }
}

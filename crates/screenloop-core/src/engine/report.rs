use super::context::ScreenContext;
use super::error::EngineError;
use super::state::IterationState;
use crate::core::io::reference::ReferenceScores;
use crate::core::io::table::write_records;
use crate::core::models::candidate::ScoredCandidate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationHits {
    pub iteration: u32,
    pub evaluated: usize,
    pub hits: usize,
    pub cumulative_hits: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub screen: String,
    pub state: IterationState,
    pub iteration: u32,
    pub population: u64,
    pub scored: usize,
    /// Result rows holding the exclusion sentinel.
    pub excluded: usize,
    pub predictions: u64,
    pub cutoff: Option<f64>,
    pub best: Option<f64>,
    /// `hit_fraction × best`; results at or below it count as hits.
    pub hit_threshold: Option<f64>,
    pub per_iteration: Vec<IterationHits>,
}

fn usable(results: &[ScoredCandidate]) -> impl Iterator<Item = &ScoredCandidate> {
    results.iter().filter(|r| !r.is_excluded())
}

pub fn status(ctx: &ScreenContext) -> Result<StatusReport, EngineError> {
    let results = ctx.store.results(ctx.screen())?;
    let best = usable(&results).map(|r| r.score).min_by(f64::total_cmp);
    let hit_threshold = best.map(|b| ctx.config.report.hit_fraction * b);

    let mut by_iteration: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
    for result in &results {
        let entry = by_iteration.entry(result.iteration).or_default();
        entry.0 += 1;
        if !result.is_excluded() && hit_threshold.is_some_and(|t| result.score <= t) {
            entry.1 += 1;
        }
    }
    let mut cumulative = 0;
    let per_iteration = by_iteration
        .into_iter()
        .map(|(iteration, (evaluated, hits))| {
            cumulative += hits;
            IterationHits {
                iteration,
                evaluated,
                hits,
                cumulative_hits: cumulative,
            }
        })
        .collect();

    Ok(StatusReport {
        screen: ctx.screen().to_string(),
        state: ctx.state(),
        iteration: ctx.iteration(),
        population: ctx.store.population_size()?,
        scored: results.len(),
        excluded: results.len() - usable(&results).count(),
        predictions: ctx.store.prediction_count(ctx.screen())?,
        cutoff: ctx.cutoff(ctx.iteration()),
        best,
        hit_threshold,
        per_iteration,
    })
}

#[derive(Serialize)]
struct HitRow<'a> {
    representation: &'a str,
    label: &'a str,
    identifier: u64,
    score: f64,
    iteration: u32,
}

/// Writes every usable result at or below `cutoff`, best first.
pub fn export_hits(ctx: &ScreenContext, cutoff: f64, path: &Path) -> Result<usize, EngineError> {
    let mut hits: Vec<ScoredCandidate> = usable(&ctx.store.results(ctx.screen())?)
        .filter(|r| r.score <= cutoff)
        .copied()
        .collect();
    hits.sort_by(|a, b| a.score.total_cmp(&b.score).then(a.id.cmp(&b.id)));
    let ids: Vec<_> = hits.iter().map(|h| h.id).collect();
    let candidates = ctx.store.candidates(&ids)?;

    let written = write_records(
        path,
        hits.iter().zip(&candidates).map(|(hit, candidate)| HitRow {
            representation: &candidate.representation,
            label: &candidate.label,
            identifier: hit.id.get(),
            score: hit.score,
            iteration: hit.iteration,
        }),
    )?;
    info!("Exported {} results at or below {} to {:?}", written, cutoff, path);
    Ok(written)
}

#[derive(Serialize)]
struct PredictedRow<'a> {
    representation: &'a str,
    label: &'a str,
    identifier: u64,
    predicted_score: f64,
}

/// Writes unscored candidates whose prediction is at or below the active
/// iteration's cutoff, best first.
pub fn export_predicted(ctx: &ScreenContext, path: &Path) -> Result<usize, EngineError> {
    let iteration = ctx.iteration();
    let cutoff = ctx
        .cutoff(iteration)
        .ok_or(EngineError::MissingCutoff { iteration })?;
    let mut rows = ctx.store.predictions_at_or_below(ctx.screen(), cutoff)?;
    rows.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    let ids: Vec<_> = rows.iter().map(|(id, _)| *id).collect();
    let candidates = ctx.store.candidates(&ids)?;

    let written = write_records(
        path,
        rows.iter()
            .zip(&candidates)
            .map(|((id, score), candidate)| PredictedRow {
                representation: &candidate.representation,
                label: &candidate.label,
                identifier: id.get(),
                predicted_score: *score,
            }),
    )?;
    info!("Exported {} predicted candidates to {:?}", written, path);
    Ok(written)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecallRow {
    pub iteration: u32,
    pub found: usize,
    pub cumulative: usize,
    pub recall: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecallReport {
    /// Size of the reference top fraction.
    pub top: usize,
    pub cutoff: f64,
    pub rows: Vec<RecallRow>,
}

/// Compares the screen's results with a fully evaluated reference library.
///
/// The reference scores are sorted and the score at the `top_fraction`
/// boundary becomes the cutoff; each iteration's results at or below it count
/// towards recall.
pub fn analyze_recall(
    ctx: &ScreenContext,
    reference: &ReferenceScores,
    top_fraction: f64,
) -> Result<RecallReport, EngineError> {
    let (top, cutoff) = reference
        .top_fraction_cutoff(top_fraction)
        .ok_or_else(|| EngineError::Internal("reference score file is empty".to_string()))?;

    let results = ctx.store.results(ctx.screen())?;
    let mut found: BTreeMap<u32, usize> = BTreeMap::new();
    for result in usable(&results) {
        let entry = found.entry(result.iteration).or_default();
        if result.score <= cutoff {
            *entry += 1;
        }
    }
    let mut cumulative = 0;
    let rows = found
        .into_iter()
        .map(|(iteration, found)| {
            cumulative += found;
            RecallRow {
                iteration,
                found,
                cumulative,
                recall: cumulative as f64 / top as f64,
            }
        })
        .collect();
    Ok(RecallReport { top, cutoff, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::candidate::EXCLUDED_SCORE;
    use crate::core::models::ids::CandidateId;
    use crate::core::store::StoreError;
    use crate::engine::context::test_support::Fixture;

    fn seed_results(ctx: &ScreenContext) {
        ctx.store
            .upsert_results(
                "test",
                1,
                &[
                    (CandidateId(1), -10.0),
                    (CandidateId(2), -5.0),
                    (CandidateId(3), EXCLUDED_SCORE),
                ],
            )
            .unwrap();
        ctx.store
            .upsert_results("test", 2, &[(CandidateId(4), -9.5), (CandidateId(5), -8.0)])
            .unwrap();
    }

    #[test]
    fn status_counts_hits_per_iteration() {
        let mut fixture = Fixture::new(10, 0.2, 1);
        let ctx = fixture.context();
        seed_results(&ctx);

        let report = status(&ctx).unwrap();
        assert_eq!(report.best, Some(-10.0));
        assert_eq!(report.hit_threshold, Some(-9.0));
        assert_eq!(report.scored, 5);
        assert_eq!(report.excluded, 1);
        assert_eq!(
            report.per_iteration,
            vec![
                IterationHits {
                    iteration: 1,
                    evaluated: 3,
                    hits: 1,
                    cumulative_hits: 1
                },
                IterationHits {
                    iteration: 2,
                    evaluated: 2,
                    hits: 1,
                    cumulative_hits: 2
                },
            ]
        );
    }

    #[test]
    fn export_writes_hits_best_first_without_sentinels() {
        let mut fixture = Fixture::new(10, 0.2, 1);
        let ctx = fixture.context();
        seed_results(&ctx);
        let path = fixture_path(&ctx, "hits.csv");

        assert_eq!(export_hits(&ctx, -8.0, &path).unwrap(), 3);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "representation,label,identifier,score,iteration\n\
             C1,mol1,1,-10.0,1\n\
             C4,mol4,4,-9.5,2\n\
             C5,mol5,5,-8.0,2\n"
        );
        assert_eq!(export_hits(&ctx, f64::MAX, &path).unwrap(), 4);
    }

    fn fixture_path(ctx: &ScreenContext, name: &str) -> std::path::PathBuf {
        std::fs::create_dir_all(ctx.layout.root()).unwrap();
        ctx.layout.root().join(name)
    }

    #[test]
    fn predicted_export_requires_cutoff() {
        let mut fixture = Fixture::new(10, 0.2, 1);
        let mut ctx = fixture.context();
        let path = fixture_path(&ctx, "pred.csv");
        assert!(matches!(
            export_predicted(&ctx, &path),
            Err(EngineError::MissingCutoff { .. })
        ));

        ctx.set_cutoff(0, -6.0).unwrap();
        ctx.store
            .replace_predictions::<_, StoreError, _>("test", |sink| {
                sink.insert(CandidateId(7), -6.5)?;
                sink.insert(CandidateId(8), -5.0)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(export_predicted(&ctx, &path).unwrap(), 1);
        assert!(std::fs::read_to_string(&path).unwrap().contains("C7,mol7,7,-6.5"));
    }

    #[test]
    fn recall_is_cumulative_over_iterations() {
        let mut fixture = Fixture::new(10, 0.2, 1);
        let ctx = fixture.context();
        seed_results(&ctx);
        let reference_path = fixture_path(&ctx, "dock.txt");
        let text: String = (0..200)
            .map(|i| format!("{} mol{}\n", -10.0 + i as f64 * 0.25, i + 1))
            .collect();
        std::fs::write(&reference_path, text).unwrap();
        let reference = ReferenceScores::load(&reference_path).unwrap();

        let report = analyze_recall(&ctx, &reference, 0.01).unwrap();
        assert_eq!(report.top, 2);
        assert_eq!(report.cutoff, -9.75);
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].found, 1);
        assert_eq!(report.rows[1].cumulative, 1);
        assert!((report.rows[1].recall - 0.5).abs() < 1e-12);
    }
}

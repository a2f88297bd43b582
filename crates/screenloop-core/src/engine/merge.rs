use super::context::ScreenContext;
use super::error::EngineError;
use super::layout::list_files;
use super::state::Action;
use crate::core::io::table::{ScoreColumns, read_score_rows, read_work_list};
use crate::core::models::candidate::EXCLUDED_SCORE;
use crate::core::models::ids::CandidateId;
use crate::core::store::UpsertSummary;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// Replacement rule for evaluator scores that cannot be trusted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailurePolicy {
    pub ceiling: Option<f64>,
    pub penalty: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolvedScore {
    Valid(f64),
    Failed(f64),
}

impl ResolvedScore {
    pub fn value(self) -> f64 {
        match self {
            Self::Valid(v) | Self::Failed(v) => v,
        }
    }
}

impl FailurePolicy {
    /// Penalty if configured, otherwise the exclusion sentinel.
    pub fn failure_value(&self) -> f64 {
        self.penalty.unwrap_or(EXCLUDED_SCORE)
    }

    /// A raw score fails when it is empty, unparseable, non-finite or above
    /// the ceiling.
    pub fn resolve(&self, raw: &str) -> ResolvedScore {
        match raw.trim().parse::<f64>() {
            Ok(score)
                if score.is_finite() && self.ceiling.is_none_or(|ceiling| score <= ceiling) =>
            {
                ResolvedScore::Valid(score)
            }
            _ => ResolvedScore::Failed(self.failure_value()),
        }
    }
}

/// Best score per candidate across a set of evaluator outputs.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MergedScores {
    pub scores: HashMap<CandidateId, f64>,
    pub rows: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl MergedScores {
    fn absorb(mut self, other: MergedScores) -> Self {
        for (id, score) in other.scores {
            self.keep_min(id, score);
        }
        self.rows += other.rows;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self
    }

    fn keep_min(&mut self, id: CandidateId, score: f64) {
        self.scores
            .entry(id)
            .and_modify(|best| {
                if score < *best {
                    *best = score;
                }
            })
            .or_insert(score);
    }

    /// Sorted by identifier for deterministic upserts.
    pub fn into_sorted(self) -> Vec<(CandidateId, f64)> {
        let mut rows: Vec<_> = self.scores.into_iter().collect();
        rows.sort_by_key(|(id, _)| *id);
        rows
    }
}

/// Parses evaluator output files in parallel and keeps the minimum score per
/// identifier. Rows with unparseable or out-of-population identifiers are
/// skipped and counted.
pub fn merge_score_files(
    files: &[PathBuf],
    columns: &ScoreColumns,
    policy: &FailurePolicy,
    population: u64,
) -> Result<MergedScores, EngineError> {
    let parsed: Vec<MergedScores> = files
        .par_iter()
        .map(|path| -> Result<MergedScores, EngineError> {
            let mut merged = MergedScores::default();
            for row in read_score_rows(path, columns)? {
                merged.rows += 1;
                let id = match row.id.parse::<CandidateId>() {
                    Ok(id) if id.get() <= population => id,
                    _ => {
                        warn!(
                            "Skipping row {} of {:?}: unknown identifier '{}'",
                            row.line, path, row.id
                        );
                        merged.skipped += 1;
                        continue;
                    }
                };
                let resolved = policy.resolve(&row.score);
                if let ResolvedScore::Failed(_) = resolved {
                    debug!("Score '{}' for {} treated as failed", row.score, id);
                    merged.failed += 1;
                }
                merged.keep_min(id, resolved.value());
            }
            Ok(merged)
        })
        .collect::<Result<_, _>>()?;

    Ok(parsed
        .into_iter()
        .fold(MergedScores::default(), MergedScores::absorb))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub files: usize,
    pub rows: usize,
    pub failed: usize,
    pub skipped: usize,
    pub missing_penalized: usize,
    pub upsert: UpsertSummary,
}

/// Imports evaluator results for `iteration` into the screen's result table.
///
/// With no explicit files, every file in the batch directory ending with the
/// configured suffix is used.
#[instrument(skip_all, fields(screen = %ctx.screen(), iteration))]
pub fn import_results(
    ctx: &mut ScreenContext,
    iteration: u32,
    explicit: &[PathBuf],
) -> Result<ImportReport, EngineError> {
    let evaluation = &ctx.config.evaluation;
    let batch_dir = ctx.layout.batch_dir(iteration);
    let files = if explicit.is_empty() {
        list_files(&batch_dir, "", &evaluation.results_suffix)?
    } else {
        explicit.to_vec()
    };
    if files.is_empty() {
        return Err(EngineError::Precondition {
            action: Action::ImportResults,
            artifact: format!(
                "evaluator output files ending in '{}' under {}",
                evaluation.results_suffix,
                batch_dir.display()
            ),
            producer: "the evaluator on the selected batch",
        });
    }

    let policy = FailurePolicy {
        ceiling: evaluation.score_ceiling,
        penalty: evaluation.failure_penalty,
    };
    let population = ctx.store.population_size()?;
    let (rows, failed, skipped, missing_penalized, upsert) =
        ctx.reporter.phase("Result Merge", || {
            let mut merged = merge_score_files(&files, &evaluation.columns, &policy, population)?;

            let mut missing_penalized = 0;
            if evaluation.penalize_missing {
                for work_list in list_files(&batch_dir, "shard_", ".smi")? {
                    for (_, id) in read_work_list(&work_list)? {
                        if !merged.scores.contains_key(&id) {
                            merged.scores.insert(id, policy.failure_value());
                            missing_penalized += 1;
                        }
                    }
                }
                if missing_penalized > 0 {
                    warn!(
                        "{} batch candidates had no evaluator output and received the failure score",
                        missing_penalized
                    );
                }
            }
            if merged.skipped > 0 {
                warn!("Skipped {} rows with unknown identifiers", merged.skipped);
            }

            let (rows, failed, skipped) = (merged.rows, merged.failed, merged.skipped);
            let upsert = ctx
                .store
                .upsert_results(ctx.screen(), iteration, &merged.into_sorted())?;
            Ok::<_, EngineError>((rows, failed, skipped, missing_penalized, upsert))
        })?;

    info!(
        files = files.len(),
        rows,
        failed,
        inserted = upsert.inserted,
        improved = upsert.improved,
        "Imported evaluator results"
    );
    Ok(ImportReport {
        files: files.len(),
        rows,
        failed,
        skipped,
        missing_penalized,
        upsert,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::candidate::Candidate;
    use crate::engine::context::test_support::Fixture;
    use crate::engine::partition::write_batch;

    fn policy(ceiling: Option<f64>, penalty: Option<f64>) -> FailurePolicy {
        FailurePolicy { ceiling, penalty }
    }

    #[test]
    fn failed_scores_use_penalty_or_sentinel() {
        let clamped = policy(Some(0.0), Some(0.0));
        assert_eq!(clamped.resolve("-7.2"), ResolvedScore::Valid(-7.2));
        assert_eq!(clamped.resolve("3.5"), ResolvedScore::Failed(0.0));
        assert_eq!(clamped.resolve(""), ResolvedScore::Failed(0.0));
        assert_eq!(clamped.resolve("NaN"), ResolvedScore::Failed(0.0));

        let unclamped = policy(Some(0.0), None);
        assert_eq!(unclamped.resolve("12"), ResolvedScore::Failed(EXCLUDED_SCORE));
        assert_eq!(unclamped.resolve("inf"), ResolvedScore::Failed(EXCLUDED_SCORE));
        assert_eq!(policy(None, None).resolve("12"), ResolvedScore::Valid(12.0));
    }

    #[test]
    fn merge_keeps_minimum_across_files_and_skips_bad_ids() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.scores.csv");
        let b = dir.path().join("b.scores.csv");
        std::fs::write(&a, "identifier,score\n1,-5.0\n2,-1.0\nxyz,-9\n").unwrap();
        std::fs::write(&b, "identifier,score\n1,-6.5\n2,\n99,-4\n").unwrap();

        let merged = merge_score_files(
            &[a, b],
            &ScoreColumns::new("identifier", "score", b','),
            &policy(None, None),
            10,
        )
        .unwrap();
        assert_eq!(merged.rows, 6);
        assert_eq!(merged.skipped, 2);
        assert_eq!(merged.failed, 1);
        assert_eq!(
            merged.into_sorted(),
            vec![(CandidateId(1), -6.5), (CandidateId(2), -1.0)]
        );
    }

    fn write_scores(ctx: &ScreenContext, iteration: u32, rows: &str) {
        let path = ctx.layout.shard_scores(iteration, 1, ".scores.csv");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, format!("identifier,score\n{rows}")).unwrap();
    }

    #[test]
    fn import_twice_leaves_identical_table() {
        let mut fixture = Fixture::new(20, 0.1, 1);
        let mut ctx = fixture.context();
        write_scores(&ctx, 1, "3,-7.0\n4,-8.0\n3,-7.5\n5,oops\n");

        let first = import_results(&mut ctx, 1, &[]).unwrap();
        let table = ctx.store.results("test").unwrap();
        let second = import_results(&mut ctx, 1, &[]).unwrap();

        assert_eq!(first.upsert.inserted, 3);
        assert_eq!(second.upsert.unchanged, 3);
        assert_eq!(ctx.store.results("test").unwrap(), table);
        let five = ctx.store.result("test", CandidateId(5)).unwrap().unwrap();
        assert!(five.is_excluded());
        assert_eq!(
            ctx.store.result("test", CandidateId(3)).unwrap().unwrap().score,
            -7.5
        );
    }

    #[test]
    fn missing_outputs_are_a_precondition_failure() {
        let mut fixture = Fixture::new(20, 0.1, 1);
        let mut ctx = fixture.context();
        assert!(matches!(
            import_results(&mut ctx, 1, &[]),
            Err(EngineError::Precondition { .. })
        ));
    }

    #[test]
    fn penalize_missing_scores_silent_failures() {
        let mut fixture = Fixture::new(20, 0.1, 1);
        fixture.config.evaluation.penalize_missing = true;
        fixture.config.evaluation.failure_penalty = Some(0.0);
        let mut ctx = fixture.context();

        let batch: Vec<Candidate> = ctx
            .store
            .candidates(&[CandidateId(1), CandidateId(2)])
            .unwrap();
        write_batch(&ctx.layout, 1, &batch, 1, None).unwrap();
        write_scores(&ctx, 1, "1,-4.0\n");

        let report = import_results(&mut ctx, 1, &[]).unwrap();
        assert_eq!(report.missing_penalized, 1);
        assert_eq!(
            ctx.store.result("test", CandidateId(2)).unwrap().unwrap().score,
            0.0
        );
    }

    #[test]
    fn explicit_files_override_directory_scan() {
        let mut fixture = Fixture::new(20, 0.1, 1);
        let explicit = fixture.dir.path().join("elsewhere.csv");
        std::fs::write(&explicit, "identifier,score\n7,-3.0\n").unwrap();
        let mut ctx = fixture.context();
        let report = import_results(&mut ctx, 2, &[explicit]).unwrap();
        assert_eq!(report.files, 1);
        assert_eq!(
            ctx.store.result("test", CandidateId(7)).unwrap().unwrap().iteration,
            2
        );
    }
}

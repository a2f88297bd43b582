use super::context::ScreenContext;
use super::error::EngineError;
use super::layout::list_files;
use super::state::Action;
use crate::core::io::reference::ReferenceScores;
use crate::core::io::table::{TableIoError, read_work_list};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    pub files: Vec<PathBuf>,
    pub scored: usize,
    /// Batch candidates whose label has no reference score.
    pub missing: usize,
}

/// Stands in for the evaluator: writes a score file per batch shard from a
/// fully evaluated reference library, using the configured column layout.
/// Candidates missing from the reference get an empty score.
pub fn simulate_evaluation(
    ctx: &ScreenContext,
    iteration: u32,
    reference: &ReferenceScores,
) -> Result<SimulationReport, EngineError> {
    let batch_dir = ctx.layout.batch_dir(iteration);
    let work_lists = list_files(&batch_dir, "shard_", ".smi")?;
    if work_lists.is_empty() {
        return Err(EngineError::Precondition {
            action: Action::ImportResults,
            artifact: format!("batch work lists under {}", batch_dir.display()),
            producer: "select",
        });
    }

    let evaluation = &ctx.config.evaluation;
    let columns = &evaluation.columns;
    let mut report = SimulationReport {
        files: Vec::with_capacity(work_lists.len()),
        scored: 0,
        missing: 0,
    };
    for work_list in work_lists {
        let entries = read_work_list(&work_list)?;
        let ids: Vec<_> = entries.iter().map(|(_, id)| *id).collect();
        let candidates = ctx.store.candidates(&ids)?;

        let stem = work_list
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("shard");
        let out = batch_dir.join(format!("{stem}{}", evaluation.results_suffix));
        let csv_error = |source: csv::Error| {
            EngineError::Table(TableIoError::Csv {
                path: out.clone(),
                source,
            })
        };
        let mut writer = csv::WriterBuilder::new()
            .delimiter(columns.delimiter)
            .from_path(&out)
            .map_err(csv_error)?;
        writer
            .write_record([columns.id_column.as_str(), columns.score_column.as_str()])
            .map_err(csv_error)?;
        for candidate in &candidates {
            let score = match reference.score(&candidate.label) {
                Some(score) => {
                    report.scored += 1;
                    score.to_string()
                }
                None => {
                    report.missing += 1;
                    String::new()
                }
            };
            writer
                .write_record([candidate.id.to_string(), score])
                .map_err(csv_error)?;
        }
        writer.flush().map_err(|e| EngineError::io(&out, e))?;
        report.files.push(out);
    }

    if report.missing > 0 {
        warn!("{} batch candidates have no reference score", report.missing);
    }
    info!(
        "Simulated {} scores in {} files",
        report.scored,
        report.files.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ids::CandidateId;
    use crate::engine::context::test_support::Fixture;
    use crate::engine::merge::import_results;
    use crate::engine::partition::write_batch;

    #[test]
    fn simulated_scores_round_trip_through_result_import() {
        let mut fixture = Fixture::new(10, 0.3, 2);
        let reference_path = fixture.dir.path().join("dock.txt");
        std::fs::write(&reference_path, "-9.5 mol1\n-4.0 mol2\n").unwrap();
        let reference = ReferenceScores::load(&reference_path).unwrap();

        let mut ctx = fixture.context();
        let batch = ctx
            .store
            .candidates(&[CandidateId(1), CandidateId(2), CandidateId(3)])
            .unwrap();
        write_batch(&ctx.layout, 1, &batch, 2, None).unwrap();

        let report = simulate_evaluation(&ctx, 1, &reference).unwrap();
        assert_eq!(report.files.len(), 2);
        assert_eq!((report.scored, report.missing), (2, 1));
        assert!(report.files[0].ends_with("shard_001.scores.csv"));

        import_results(&mut ctx, 1, &[]).unwrap();
        let one = ctx.store.result("test", CandidateId(1)).unwrap().unwrap();
        assert_eq!(one.score, -9.5);
        assert!(ctx.store.result("test", CandidateId(3)).unwrap().unwrap().is_excluded());
    }

    #[test]
    fn simulation_needs_a_selected_batch() {
        let mut fixture = Fixture::new(10, 0.3, 2);
        let ctx = fixture.context();
        let reference = ReferenceScores::default();
        assert!(matches!(
            simulate_evaluation(&ctx, 1, &reference),
            Err(EngineError::Precondition { .. })
        ));
    }
}

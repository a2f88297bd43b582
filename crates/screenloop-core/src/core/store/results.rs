use super::{Store, StoreError, open_readable, results_table_name};
use crate::core::models::candidate::ScoredCandidate;
use crate::core::models::ids::CandidateId;
use redb::{ReadableTable, ReadableTableMetadata, TableDefinition};
use std::collections::HashSet;
use tracing::debug;

/// Result rows are keyed by candidate id and hold `(best_score, iteration)`.
pub(super) type ResultDefinition<'a> = TableDefinition<'a, u64, (f64, u32)>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub improved: usize,
    pub unchanged: usize,
}

/// Whether `(score, iteration)` should replace the stored `(best, found)`.
fn supersedes(score: f64, iteration: u32, best: f64, found: u32) -> bool {
    score < best || (score == best && iteration < found)
}

impl Store {
    /// Merges scores into the screen's result table inside one transaction.
    ///
    /// Lower scores win; on a tie the earlier iteration is kept. Identifiers
    /// outside the population abort the whole upsert.
    pub fn upsert_results(
        &self,
        screen: &str,
        iteration: u32,
        scores: &[(CandidateId, f64)],
    ) -> Result<UpsertSummary, StoreError> {
        let population = self.population_size()?;
        if let Some(&(id, _)) = scores
            .iter()
            .find(|(id, _)| id.get() == 0 || id.get() > population)
        {
            return Err(StoreError::UnknownCandidate(id));
        }

        let name = results_table_name(screen);
        let mut summary = UpsertSummary::default();
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ResultDefinition::new(&name))?;
            for &(id, score) in scores {
                let existing = table.get(id.get())?.map(|guard| guard.value());
                match existing {
                    None => {
                        table.insert(id.get(), (score, iteration))?;
                        summary.inserted += 1;
                    }
                    Some((best, found)) if supersedes(score, iteration, best, found) => {
                        table.insert(id.get(), (score, iteration))?;
                        summary.improved += 1;
                    }
                    Some(_) => summary.unchanged += 1,
                }
            }
        }
        txn.commit()?;
        debug!(screen, iteration, ?summary, "Upserted results");
        Ok(summary)
    }

    /// All result rows of a screen, ascending by identifier.
    pub fn results(&self, screen: &str) -> Result<Vec<ScoredCandidate>, StoreError> {
        let name = results_table_name(screen);
        let txn = self.db.begin_read()?;
        let Some(table) = open_readable(&txn, ResultDefinition::new(&name))? else {
            return Ok(Vec::new());
        };
        let mut rows = Vec::with_capacity(table.len()? as usize);
        for entry in table.iter()? {
            let (key, value) = entry?;
            let (score, iteration) = value.value();
            rows.push(ScoredCandidate {
                id: CandidateId(key.value()),
                score,
                iteration,
            });
        }
        Ok(rows)
    }

    pub fn result(&self, screen: &str, id: CandidateId) -> Result<Option<ScoredCandidate>, StoreError> {
        let name = results_table_name(screen);
        let txn = self.db.begin_read()?;
        let Some(table) = open_readable(&txn, ResultDefinition::new(&name))? else {
            return Ok(None);
        };
        Ok(table.get(id.get())?.map(|guard| {
            let (score, iteration) = guard.value();
            ScoredCandidate {
                id,
                score,
                iteration,
            }
        }))
    }

    pub fn scored_ids(&self, screen: &str) -> Result<HashSet<CandidateId>, StoreError> {
        let name = results_table_name(screen);
        let txn = self.db.begin_read()?;
        let Some(table) = open_readable(&txn, ResultDefinition::new(&name))? else {
            return Ok(HashSet::new());
        };
        let mut ids = HashSet::with_capacity(table.len()? as usize);
        for entry in table.iter()? {
            let (key, _) = entry?;
            ids.insert(CandidateId(key.value()));
        }
        Ok(ids)
    }

    pub fn result_count(&self, screen: &str) -> Result<u64, StoreError> {
        let name = results_table_name(screen);
        let txn = self.db.begin_read()?;
        match open_readable(&txn, ResultDefinition::new(&name))? {
            Some(table) => Ok(table.len()?),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::store_with_population;
    use super::*;

    #[test]
    fn keeps_minimum_score_and_earliest_iteration_on_ties() {
        let (_dir, store) = store_with_population(5);
        store
            .upsert_results("s", 1, &[(CandidateId(1), -7.0), (CandidateId(2), -5.0)])
            .unwrap();
        let summary = store
            .upsert_results(
                "s",
                2,
                &[
                    (CandidateId(1), -7.0),
                    (CandidateId(2), -6.5),
                    (CandidateId(3), -4.0),
                ],
            )
            .unwrap();

        assert_eq!(
            summary,
            UpsertSummary {
                inserted: 1,
                improved: 1,
                unchanged: 1
            }
        );
        let first = store.result("s", CandidateId(1)).unwrap().unwrap();
        assert_eq!((first.score, first.iteration), (-7.0, 1));
        let second = store.result("s", CandidateId(2)).unwrap().unwrap();
        assert_eq!((second.score, second.iteration), (-6.5, 2));
    }

    #[test]
    fn tie_from_earlier_iteration_replaces_later_one() {
        let (_dir, store) = store_with_population(2);
        store.upsert_results("s", 3, &[(CandidateId(1), -2.0)]).unwrap();
        store.upsert_results("s", 2, &[(CandidateId(1), -2.0)]).unwrap();
        assert_eq!(store.result("s", CandidateId(1)).unwrap().unwrap().iteration, 2);
    }

    #[test]
    fn repeated_upsert_is_idempotent() {
        let (_dir, store) = store_with_population(4);
        let rows = [(CandidateId(4), -1.0), (CandidateId(2), -3.0)];
        store.upsert_results("s", 1, &rows).unwrap();
        let before = store.results("s").unwrap();
        store.upsert_results("s", 1, &rows).unwrap();
        assert_eq!(store.results("s").unwrap(), before);
        assert_eq!(before.iter().map(|r| r.id.get()).collect::<Vec<_>>(), vec![2, 4]);
    }

    #[test]
    fn unknown_identifier_rejects_whole_batch() {
        let (_dir, store) = store_with_population(2);
        let err = store
            .upsert_results("s", 1, &[(CandidateId(1), -1.0), (CandidateId(3), -1.0)])
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownCandidate(CandidateId(3))));
        assert_eq!(store.result_count("s").unwrap(), 0);
    }

    #[test]
    fn screens_are_independent() {
        let (_dir, store) = store_with_population(3);
        store.upsert_results("a", 1, &[(CandidateId(1), -1.0)]).unwrap();
        assert_eq!(store.scored_ids("a").unwrap().len(), 1);
        assert!(store.scored_ids("b").unwrap().is_empty());
        assert!(store.results("b").unwrap().is_empty());
    }
}

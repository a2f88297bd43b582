use super::results::ResultDefinition;
use super::{Store, StoreError, open_readable, predictions_table_name, results_table_name};
use crate::core::models::ids::CandidateId;
use redb::{ReadableTable, ReadableTableMetadata, Table, TableDefinition};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use tracing::debug;

type PredictionDefinition<'a> = TableDefinition<'a, u64, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionLoad {
    Inserted,
    /// The candidate already has a result row and was not loaded.
    AlreadyScored,
}

/// Write handle for a prediction table that is being rebuilt.
pub struct PredictionSink<'t> {
    predictions: Table<'t, u64, f64>,
    results: Table<'t, u64, (f64, u32)>,
    population: u64,
}

impl PredictionSink<'_> {
    pub fn insert(&mut self, id: CandidateId, score: f64) -> Result<PredictionLoad, StoreError> {
        if id.get() == 0 || id.get() > self.population {
            return Err(StoreError::UnknownCandidate(id));
        }
        if self.results.get(id.get())?.is_some() {
            return Ok(PredictionLoad::AlreadyScored);
        }
        self.predictions.insert(id.get(), score)?;
        Ok(PredictionLoad::Inserted)
    }
}

/// Heap entry ordered by `(score, id)` with a total order on scores.
#[derive(Debug, Clone, Copy)]
struct Ranked {
    score: f64,
    id: u64,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl Store {
    /// Drops the screen's prediction table and rebuilds it from whatever `load`
    /// inserts, all in one transaction. If `load` fails, the previous table is
    /// left untouched.
    pub fn replace_predictions<T, E, F>(&self, screen: &str, load: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut PredictionSink<'_>) -> Result<T, E>,
    {
        let population = self.population_size()?;
        let predictions_name = predictions_table_name(screen);
        let results_name = results_table_name(screen);

        let txn = self.db.begin_write().map_err(StoreError::from)?;
        txn.delete_table(PredictionDefinition::new(&predictions_name))
            .map_err(StoreError::from)?;
        let outcome = {
            let mut sink = PredictionSink {
                predictions: txn
                    .open_table(PredictionDefinition::new(&predictions_name))
                    .map_err(StoreError::from)?,
                results: txn
                    .open_table(ResultDefinition::new(&results_name))
                    .map_err(StoreError::from)?,
                population,
            };
            load(&mut sink)?
        };
        txn.commit().map_err(StoreError::from)?;
        debug!(screen, "Prediction table rebuilt");
        Ok(outcome)
    }

    /// The `limit` lowest predictions among unscored candidates, ascending by
    /// `(score, id)`.
    pub fn best_predictions(
        &self,
        screen: &str,
        limit: usize,
    ) -> Result<Vec<(CandidateId, f64)>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let scored: HashSet<CandidateId> = self.scored_ids(screen)?;
        let name = predictions_table_name(screen);
        let txn = self.db.begin_read()?;
        let Some(table) = open_readable(&txn, PredictionDefinition::new(&name))? else {
            return Ok(Vec::new());
        };

        let mut heap: BinaryHeap<Ranked> = BinaryHeap::with_capacity(limit + 1);
        for entry in table.iter()? {
            let (key, value) = entry?;
            let id = key.value();
            if scored.contains(&CandidateId(id)) {
                continue;
            }
            let ranked = Ranked {
                score: value.value(),
                id,
            };
            if heap.len() < limit {
                heap.push(ranked);
            } else if heap.peek().is_some_and(|worst| ranked < *worst) {
                heap.pop();
                heap.push(ranked);
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|r| (CandidateId(r.id), r.score))
            .collect())
    }

    /// Predictions at or below `cutoff` for candidates that are still unscored,
    /// ascending by identifier.
    pub fn predictions_at_or_below(
        &self,
        screen: &str,
        cutoff: f64,
    ) -> Result<Vec<(CandidateId, f64)>, StoreError> {
        let scored = self.scored_ids(screen)?;
        let name = predictions_table_name(screen);
        let txn = self.db.begin_read()?;
        let Some(table) = open_readable(&txn, PredictionDefinition::new(&name))? else {
            return Ok(Vec::new());
        };
        let mut rows = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let id = CandidateId(key.value());
            let score = value.value();
            if score <= cutoff && !scored.contains(&id) {
                rows.push((id, score));
            }
        }
        Ok(rows)
    }

    pub fn prediction_count(&self, screen: &str) -> Result<u64, StoreError> {
        let name = predictions_table_name(screen);
        let txn = self.db.begin_read()?;
        match open_readable(&txn, PredictionDefinition::new(&name))? {
            Some(table) => Ok(table.len()?),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::store_with_population;
    use super::*;

    fn load(store: &Store, screen: &str, rows: &[(u64, f64)]) -> Vec<PredictionLoad> {
        store
            .replace_predictions::<_, StoreError, _>(screen, |sink| {
                rows.iter()
                    .map(|&(id, score)| sink.insert(CandidateId(id), score))
                    .collect()
            })
            .unwrap()
    }

    #[test]
    fn replace_drops_previous_rows_and_skips_scored() {
        let (_dir, store) = store_with_population(6);
        store.upsert_results("s", 1, &[(CandidateId(2), -3.0)]).unwrap();

        load(&store, "s", &[(1, -1.0), (3, -2.0), (4, -5.0)]);
        assert_eq!(store.prediction_count("s").unwrap(), 3);

        let outcome = load(&store, "s", &[(2, -9.0), (5, -4.0)]);
        assert_eq!(
            outcome,
            vec![PredictionLoad::AlreadyScored, PredictionLoad::Inserted]
        );
        assert_eq!(store.prediction_count("s").unwrap(), 1);
    }

    #[test]
    fn failed_load_keeps_previous_table() {
        let (_dir, store) = store_with_population(3);
        load(&store, "s", &[(1, -1.0), (2, -2.0)]);

        let err = store
            .replace_predictions::<(), StoreError, _>("s", |sink| {
                sink.insert(CandidateId(3), -3.0)?;
                sink.insert(CandidateId(40), -3.0)?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownCandidate(CandidateId(40))));
        assert_eq!(store.prediction_count("s").unwrap(), 2);
    }

    #[test]
    fn best_predictions_orders_by_score_then_id() {
        let (_dir, store) = store_with_population(8);
        load(
            &store,
            "s",
            &[(1, -1.0), (2, -6.0), (3, -4.0), (4, -6.0), (5, 0.5), (6, -7.5)],
        );
        let best = store.best_predictions("s", 3).unwrap();
        assert_eq!(
            best,
            vec![
                (CandidateId(6), -7.5),
                (CandidateId(2), -6.0),
                (CandidateId(4), -6.0)
            ]
        );
        assert_eq!(store.best_predictions("s", 100).unwrap().len(), 6);
        assert!(store.best_predictions("other", 5).unwrap().is_empty());
    }

    #[test]
    fn cutoff_filter_excludes_candidates_scored_after_loading() {
        let (_dir, store) = store_with_population(4);
        load(&store, "s", &[(1, -8.0), (2, -9.0), (3, -2.0)]);
        store.upsert_results("s", 2, &[(CandidateId(2), -9.5)]).unwrap();
        let rows = store.predictions_at_or_below("s", -8.0).unwrap();
        assert_eq!(rows, vec![(CandidateId(1), -8.0)]);
    }
}

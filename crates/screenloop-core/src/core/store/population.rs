use super::{CANDIDATES, Store, StoreError, decode, encode, open_readable};
use crate::core::models::candidate::Candidate;
use crate::core::models::ids::CandidateId;
use crate::engine::progress::{Progress, ProgressReporter};
use redb::{ReadableTable, ReadableTableMetadata, Table};
use std::io::Read;
use std::ops::RangeInclusive;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    pub delimiter: u8,
    /// Rows buffered before they are inserted into the import transaction.
    pub chunk_size: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            delimiter: b' ',
            chunk_size: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: u64,
    pub first_id: Option<CandidateId>,
    pub population: u64,
}

impl Store {
    /// Appends every row of `reader` to the population, assigning dense
    /// identifiers that continue after the current largest one.
    ///
    /// Each row contributes its first two non-empty fields as
    /// `representation` and `label`. All rows are written in one transaction:
    /// a row with fewer fields aborts the import and leaves the population
    /// unchanged.
    pub fn import_population<R: Read>(
        &self,
        reader: R,
        options: &ImportOptions,
        reporter: &ProgressReporter,
    ) -> Result<ImportSummary, StoreError> {
        let txn = self.db.begin_write()?;
        let staged = reporter.phase("Population Import", || {
            let mut table = txn.open_table(CANDIDATES)?;
            let start = table.len()?;
            let imported = stage_rows(&mut table, start, reader, options, reporter)?;
            Ok::<_, StoreError>((start, imported))
        });
        let (start, imported) = match staged {
            Ok(counts) => counts,
            Err(e) => {
                txn.abort()?;
                return Err(e);
            }
        };
        txn.commit()?;

        let population = start + imported;
        info!(imported, population, "Population import finished");
        Ok(ImportSummary {
            imported,
            first_id: (imported > 0).then_some(CandidateId(start + 1)),
            population,
        })
    }

    /// Number of imported candidates. Identifiers are dense, so this is also
    /// the largest identifier.
    pub fn population_size(&self) -> Result<u64, StoreError> {
        let txn = self.db.begin_read()?;
        match open_readable(&txn, CANDIDATES)? {
            Some(table) => Ok(table.len()?),
            None => Ok(0),
        }
    }

    pub fn candidate(&self, id: CandidateId) -> Result<Option<Candidate>, StoreError> {
        let txn = self.db.begin_read()?;
        let Some(table) = open_readable(&txn, CANDIDATES)? else {
            return Ok(None);
        };
        match table.get(id.get())? {
            Some(guard) => Ok(Some(decode("candidates", guard.value())?)),
            None => Ok(None),
        }
    }

    /// Looks up candidates in the order given. Unknown identifiers are an error.
    pub fn candidates(&self, ids: &[CandidateId]) -> Result<Vec<Candidate>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = open_readable(&txn, CANDIDATES)?;
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            let guard = match &table {
                Some(table) => table.get(id.get())?,
                None => None,
            };
            let guard = guard.ok_or(StoreError::UnknownCandidate(id))?;
            out.push(decode("candidates", guard.value())?);
        }
        Ok(out)
    }

    /// Visits candidates with identifiers in `range`, in ascending order.
    pub fn for_each_in_range<E, F>(&self, range: RangeInclusive<u64>, mut visit: F) -> Result<(), E>
    where
        E: From<StoreError>,
        F: FnMut(Candidate) -> Result<(), E>,
    {
        let txn = self.db.begin_read().map_err(StoreError::from)?;
        let Some(table) = open_readable(&txn, CANDIDATES)? else {
            return Ok(());
        };
        for entry in table.range(range).map_err(StoreError::from)? {
            let (_, value) = entry.map_err(StoreError::from)?;
            visit(decode("candidates", value.value())?)?;
        }
        Ok(())
    }
}

/// Parses `reader` into `table`, numbering rows from `start + 1` and inserting
/// them `chunk_size` at a time. Returns the number of rows staged.
fn stage_rows<R: Read>(
    table: &mut Table<'_, u64, &'static [u8]>,
    start: u64,
    reader: R,
    options: &ImportOptions,
    reporter: &ProgressReporter,
) -> Result<u64, StoreError> {
    let chunk_size = options.chunk_size.max(1);
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(options.delimiter)
        .from_reader(reader);

    let mut next_id = start + 1;
    let mut pending: Vec<(u64, Vec<u8>)> = Vec::with_capacity(chunk_size.min(65_536));
    for record in csv_reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let mut fields = record.iter().filter(|f| !f.is_empty());
        let (Some(representation), Some(label)) = (fields.next(), fields.next()) else {
            if record.iter().all(|f| f.is_empty()) {
                continue;
            }
            return Err(StoreError::PopulationRow {
                line,
                reason: "expected a representation and a label".to_string(),
            });
        };

        let candidate = Candidate {
            id: CandidateId(next_id),
            representation: representation.to_string(),
            label: label.to_string(),
        };
        pending.push((next_id, encode("candidates", &candidate)?));
        next_id += 1;

        if pending.len() >= chunk_size {
            insert_chunk(table, &mut pending)?;
            reporter.report(Progress::Message(format!(
                "Staged {} candidates",
                next_id - 1 - start
            )));
        }
    }
    insert_chunk(table, &mut pending)?;
    Ok(next_id - 1 - start)
}

fn insert_chunk(
    table: &mut Table<'_, u64, &'static [u8]>,
    pending: &mut Vec<(u64, Vec<u8>)>,
) -> Result<(), StoreError> {
    debug!("Inserting {} candidate rows", pending.len());
    for (id, bytes) in pending.drain(..) {
        table.insert(id, bytes.as_slice())?;
    }
    Ok(())
}

use crate::core::models::candidate::Candidate;
use crate::core::models::ids::CandidateId;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableIoError {
    #[error("File I/O error for '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CSV error for '{path}': {source}", path = path.display())]
    Csv { path: PathBuf, source: csv::Error },
    #[error("Column '{column}' not found in header of '{path}'", path = path.display())]
    MissingColumn { path: PathBuf, column: String },
    #[error("Malformed row at {path}:{line}: {reason}", path = path.display())]
    Row {
        path: PathBuf,
        line: u64,
        reason: String,
    },
}

impl TableIoError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where to find the identifier and score in a delimited table with a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreColumns {
    pub id_column: String,
    pub score_column: String,
    pub delimiter: u8,
}

impl ScoreColumns {
    pub fn new(id_column: &str, score_column: &str, delimiter: u8) -> Self {
        Self {
            id_column: id_column.to_string(),
            score_column: score_column.to_string(),
            delimiter,
        }
    }
}

/// An unparsed `(identifier, score)` pair and the line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawScoreRow {
    pub line: u64,
    pub id: String,
    pub score: String,
}

/// Reads the identifier and score columns of every data row.
///
/// Short rows yield empty strings; interpreting the values is left to the
/// caller, which decides whether a bad row is fatal.
pub fn read_score_rows(path: &Path, columns: &ScoreColumns) -> Result<Vec<RawScoreRow>, TableIoError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(columns.delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| TableIoError::csv(path, e))?;

    let headers = reader.headers().map_err(|e| TableIoError::csv(path, e))?.clone();
    let find = |column: &str| {
        headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| TableIoError::MissingColumn {
                path: path.to_path_buf(),
                column: column.to_string(),
            })
    };
    let id_index = find(&columns.id_column)?;
    let score_index = find(&columns.score_column)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| TableIoError::csv(path, e))?;
        rows.push(RawScoreRow {
            line: record.position().map_or(0, |p| p.line()),
            id: record.get(id_index).unwrap_or_default().to_string(),
            score: record.get(score_index).unwrap_or_default().to_string(),
        });
    }
    Ok(rows)
}

/// Writes `representation identifier` lines, one candidate per line.
pub fn write_work_list(path: &Path, candidates: &[Candidate]) -> Result<(), TableIoError> {
    let file = File::create(path).map_err(|e| TableIoError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for candidate in candidates {
        writeln!(writer, "{} {}", candidate.representation, candidate.id)
            .map_err(|e| TableIoError::io(path, e))?;
    }
    writer.flush().map_err(|e| TableIoError::io(path, e))
}

/// Reads a work list written by [`write_work_list`].
pub fn read_work_list(path: &Path) -> Result<Vec<(String, CandidateId)>, TableIoError> {
    let file = File::open(path).map_err(|e| TableIoError::io(path, e))?;
    let mut entries = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| TableIoError::io(path, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        // The identifier is the last field; representations may contain spaces.
        let Some((representation, id)) = trimmed
            .rsplit_once(char::is_whitespace)
            .map(|(representation, id)| (representation.trim_end(), id))
            .filter(|(representation, _)| !representation.is_empty())
        else {
            return Err(TableIoError::Row {
                path: path.to_path_buf(),
                line: index as u64 + 1,
                reason: "expected '<representation> <identifier>'".to_string(),
            });
        };
        let id = id.parse::<CandidateId>().map_err(|e| TableIoError::Row {
            path: path.to_path_buf(),
            line: index as u64 + 1,
            reason: e.to_string(),
        })?;
        entries.push((representation.to_string(), id));
    }
    Ok(entries)
}

#[derive(Serialize)]
struct StructureRow<'a> {
    representation: &'a str,
    identifier: u64,
}

/// Streams candidates into a `representation,identifier` CSV file.
pub struct StructureCsvWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
    written: usize,
}

impl StructureCsvWriter {
    pub fn create(path: &Path) -> Result<Self, TableIoError> {
        let writer = csv::Writer::from_path(path).map_err(|e| TableIoError::csv(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            written: 0,
        })
    }

    pub fn write(&mut self, candidate: &Candidate) -> Result<(), TableIoError> {
        self.writer
            .serialize(StructureRow {
                representation: &candidate.representation,
                identifier: candidate.id.get(),
            })
            .map_err(|e| TableIoError::csv(&self.path, e))?;
        self.written += 1;
        Ok(())
    }

    /// Flushes the file and returns the number of rows written.
    ///
    /// An empty file still receives its header.
    pub fn finish(mut self) -> Result<usize, TableIoError> {
        if self.written == 0 {
            self.writer
                .write_record(["representation", "identifier"])
                .map_err(|e| TableIoError::csv(&self.path, e))?;
        }
        self.writer
            .flush()
            .map_err(|e| TableIoError::io(&self.path, e))?;
        Ok(self.written)
    }
}

/// Writes serializable rows to a comma-separated file with a header derived
/// from the row type.
pub fn write_records<T, I>(path: &Path, rows: I) -> Result<usize, TableIoError>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut writer = csv::Writer::from_path(path).map_err(|e| TableIoError::csv(path, e))?;
    let mut count = 0;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| TableIoError::csv(path, e))?;
        count += 1;
    }
    writer.flush().map_err(|e| TableIoError::io(path, e))?;
    Ok(count)
}

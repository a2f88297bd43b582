use crate::core::models::ids::CandidateId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("Failed to open database '{path}': {source}", path = path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: redb::DatabaseError,
    },

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Corrupt record in table '{table}': {source}")]
    Encoding {
        table: String,
        #[source]
        source: bincode::Error,
    },

    #[error("Unknown candidate identifier: {0}")]
    UnknownCandidate(CandidateId),

    #[error("Malformed population row at line {line}: {reason}")]
    PopulationRow { line: u64, reason: String },

    #[error("Failed to read population input: {0}")]
    Input(#[from] csv::Error),
}
